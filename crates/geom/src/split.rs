use crate::aabb::BoundingBox;
use crate::node::Node;

/// Errors from tree parameter validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("min_children must be at least 1")]
    ZeroMinChildren,
    #[error("max_children ({max}) must be at least twice min_children ({min})")]
    MaxTooSmall { min: usize, max: usize },
}

/// Sort axis used while splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Sort key of a box along this axis: its minimum coordinate.
    pub fn key(self, bbox: &BoundingBox) -> f32 {
        match self {
            Axis::X => bbox.min.x,
            Axis::Y => bbox.min.y,
        }
    }
}

/// Overlap-minimising node split in the R*-tree family.
///
/// 1. For each axis, sort a copy of the child boxes by their minimum coordinate
///    and sum the semi-perimeters of the left and right group boxes over every
///    valid split point. The cheaper axis wins; X wins ties.
/// 2. Sort the children once by the winning axis.
/// 3. Pick the split point with the least overlap area between the two groups,
///    breaking ties by the least summed area, then by the lowest index.
///
/// Valid split points are `min_children..=len - min_children`, so both groups
/// always hold at least `min_children` children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitStrategy {
    min_children: usize,
    max_children: usize,
}

impl Default for SplitStrategy {
    fn default() -> Self {
        Self {
            min_children: 4,
            max_children: 16,
        }
    }
}

impl SplitStrategy {
    pub fn new(min_children: usize, max_children: usize) -> Result<Self, TreeError> {
        if min_children == 0 {
            return Err(TreeError::ZeroMinChildren);
        }
        if max_children < min_children * 2 {
            return Err(TreeError::MaxTooSmall {
                min: min_children,
                max: max_children,
            });
        }
        Ok(Self {
            min_children,
            max_children,
        })
    }

    pub fn min_children(&self) -> usize {
        self.min_children
    }

    pub fn max_children(&self) -> usize {
        self.max_children
    }

    pub fn is_overfull<T>(&self, node: &Node<T>) -> bool {
        node.len() > self.max_children
    }

    /// Total semi-perimeter cost of splitting `boxes` along `axis`.
    ///
    /// `boxes` is left untouched; the cost is computed over a sorted copy.
    pub fn axis_cost(&self, boxes: &[BoundingBox], axis: Axis) -> f32 {
        let mut sorted = boxes.to_vec();
        sorted.sort_by(|a, b| axis.key(a).total_cmp(&axis.key(b)));
        let (prefix, suffix) = group_boxes(&sorted);
        self.split_points(sorted.len())
            .map(|i| prefix[i - 1].semi_perimeter() + suffix[i].semi_perimeter())
            .sum()
    }

    pub fn choose_axis(&self, boxes: &[BoundingBox]) -> Axis {
        let x = self.axis_cost(boxes, Axis::X);
        let y = self.axis_cost(boxes, Axis::Y);
        if y < x { Axis::Y } else { Axis::X }
    }

    /// Best split point over boxes already sorted along the chosen axis.
    pub fn choose_split_index(&self, sorted: &[BoundingBox]) -> usize {
        let (prefix, suffix) = group_boxes(sorted);
        let mut best: Option<(usize, f32, f32)> = None;
        for i in self.split_points(sorted.len()) {
            let left = &prefix[i - 1];
            let right = &suffix[i];
            let overlap = left.overlap_area(right);
            let area = left.area() + right.area();
            let better = match best {
                None => true,
                Some((_, best_overlap, best_area)) => {
                    overlap < best_overlap || (overlap == best_overlap && area < best_area)
                }
            };
            if better {
                best = Some((i, overlap, area));
            }
        }
        match best {
            Some((i, _, _)) => i,
            None => unreachable!("no valid split point for {} children", sorted.len()),
        }
    }

    /// Split an overfull internal node into two siblings of the same height.
    ///
    /// Panics when the node has fewer than `2 * min_children` children: such a
    /// node reaching the split routine is a bug in the caller.
    pub fn split<T>(&self, node: Node<T>) -> (Node<T>, Node<T>) {
        let len = node.len();
        assert!(
            len >= self.min_children * 2,
            "cannot split {len} children with min_children={}",
            self.min_children
        );
        let height = node.height();
        let mut children = node.into_children();
        let boxes: Vec<BoundingBox> = children.iter().map(|c| *c.bbox()).collect();

        let axis = self.choose_axis(&boxes);
        children.sort_by(|a, b| axis.key(a.bbox()).total_cmp(&axis.key(b.bbox())));
        let sorted: Vec<BoundingBox> = children.iter().map(|c| *c.bbox()).collect();
        let index = self.choose_split_index(&sorted);

        tracing::trace!(len, ?axis, index, "split node");

        let (left, right) = Node::internal(children, height).split_at(index);
        (Node::internal(left, height), Node::internal(right, height))
    }

    fn split_points(&self, len: usize) -> std::ops::RangeInclusive<usize> {
        self.min_children..=len.saturating_sub(self.min_children)
    }
}

/// Prefix and suffix group boxes: `prefix[i]` covers `[0, i]`, `suffix[i]`
/// covers `[i, len)`.
fn group_boxes(sorted: &[BoundingBox]) -> (Vec<BoundingBox>, Vec<BoundingBox>) {
    let mut prefix: Vec<BoundingBox> = Vec::with_capacity(sorted.len());
    for b in sorted {
        let next = match prefix.last() {
            Some(prev) => prev.combine(b),
            None => *b,
        };
        prefix.push(next);
    }
    let mut suffix: Vec<BoundingBox> = Vec::with_capacity(sorted.len());
    for b in sorted.iter().rev() {
        let next = match suffix.last() {
            Some(prev) => b.combine(prev),
            None => *b,
        };
        suffix.push(next);
    }
    suffix.reverse();
    (prefix, suffix)
}

use glam::Vec2;

use crate::aabb::BoundingBox;

/// Payload of a tree node.
#[derive(Debug, Clone)]
pub enum NodeKind<T> {
    /// One stored item.
    Leaf(T),
    /// Ordered children; never empty.
    Internal(Vec<Node<T>>),
}

/// A node of a bulk-built tree.
///
/// Leaves sit at height 0. An internal node's height is one more than its
/// children's, and its box is always the combination of the children's boxes.
#[derive(Debug, Clone)]
pub struct Node<T> {
    bbox: BoundingBox,
    height: u32,
    kind: NodeKind<T>,
}

impl<T> Node<T> {
    pub fn leaf(item: T, bbox: BoundingBox) -> Self {
        Self {
            bbox,
            height: 0,
            kind: NodeKind::Leaf(item),
        }
    }

    /// Leaf with a degenerate box at `p`.
    pub fn point(item: T, p: Vec2) -> Self {
        Self::leaf(item, BoundingBox::point(p))
    }

    /// Internal node over `children` at the given height.
    ///
    /// Panics if `children` is empty: an internal node without children has no
    /// box and is a construction bug.
    pub fn internal(children: Vec<Node<T>>, height: u32) -> Self {
        let bbox = BoundingBox::combine_all(children.iter().map(Node::bbox))
            .expect("internal node needs at least one child");
        Self {
            bbox,
            height,
            kind: NodeKind::Internal(children),
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn kind(&self) -> &NodeKind<T> {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Children of an internal node; empty for a leaf.
    pub fn children(&self) -> &[Node<T>] {
        match &self.kind {
            NodeKind::Internal(children) => children.as_slice(),
            NodeKind::Leaf(_) => &[],
        }
    }

    /// The stored item of a leaf.
    pub fn item(&self) -> Option<&T> {
        match &self.kind {
            NodeKind::Leaf(item) => Some(item),
            NodeKind::Internal(_) => None,
        }
    }

    /// Number of direct children (0 for a leaf).
    pub fn len(&self) -> usize {
        self.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the node and hand back its children.
    pub fn into_children(self) -> Vec<Node<T>> {
        match self.kind {
            NodeKind::Internal(children) => children,
            NodeKind::Leaf(_) => Vec::new(),
        }
    }

    /// Partition the children at `index`: `[0, index)` and `[index, len)`.
    ///
    /// The node is consumed; callers build new siblings from the two halves.
    pub fn split_at(self, index: usize) -> (Vec<Node<T>>, Vec<Node<T>>) {
        let mut left = self.into_children();
        assert!(index <= left.len(), "split index {index} past end");
        let right = left.split_off(index);
        (left, right)
    }

    /// Visit every leaf item whose box intersects `query`.
    pub fn search<'a>(&'a self, query: &BoundingBox, out: &mut Vec<&'a T>) {
        if !self.bbox.intersects(query) {
            return;
        }
        match &self.kind {
            NodeKind::Leaf(item) => out.push(item),
            NodeKind::Internal(children) => {
                for child in children {
                    child.search(query, out);
                }
            }
        }
    }

    /// Number of leaves below (and including) this node.
    pub fn leaf_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 1,
            NodeKind::Internal(children) => children.iter().map(Node::leaf_count).sum(),
        }
    }
}

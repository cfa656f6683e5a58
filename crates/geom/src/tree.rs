use glam::Vec2;

use crate::aabb::BoundingBox;
use crate::node::Node;
use crate::split::SplitStrategy;

/// A read-only spatial tree bulk-loaded from a complete item set.
///
/// Construction works level by level. All nodes of a level are wrapped in one
/// overfull parent which is split recursively until every part fits in
/// `max_children`; the parts become the next level. The process stops once a
/// level fits under a single root.
#[derive(Debug, Clone)]
pub struct BulkTree<T> {
    root: Option<Node<T>>,
    len: usize,
    strategy: SplitStrategy,
}

impl<T> BulkTree<T> {
    pub fn build(
        items: impl IntoIterator<Item = (T, BoundingBox)>,
        strategy: SplitStrategy,
    ) -> Self {
        let mut level: Vec<Node<T>> = items
            .into_iter()
            .map(|(item, bbox)| Node::leaf(item, bbox))
            .collect();
        let len = level.len();
        let _span = tracing::info_span!("bulk_build", len).entered();

        if level.is_empty() {
            return Self {
                root: None,
                len,
                strategy,
            };
        }

        let mut height = 1;
        while level.len() > strategy.max_children() {
            let mut next = Vec::new();
            partition(&strategy, Node::internal(level, height), &mut next);
            tracing::trace!(height, nodes = next.len(), "built level");
            level = next;
            height += 1;
        }
        let root = Node::internal(level, height);
        tracing::debug!(height, "bulk build complete");

        Self {
            root: Some(root),
            len,
            strategy,
        }
    }

    /// Build from point items; each leaf gets a degenerate box.
    pub fn points(items: impl IntoIterator<Item = (T, Vec2)>, strategy: SplitStrategy) -> Self {
        Self::build(
            items.into_iter().map(|(item, p)| (item, BoundingBox::point(p))),
            strategy,
        )
    }

    pub fn root(&self) -> Option<&Node<T>> {
        self.root.as_ref()
    }

    pub fn strategy(&self) -> &SplitStrategy {
        &self.strategy
    }

    /// Number of items in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the root; 0 for an empty tree.
    pub fn height(&self) -> u32 {
        self.root.as_ref().map_or(0, Node::height)
    }

    /// Box covering every item.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.root.as_ref().map(|r| *r.bbox())
    }

    /// All items whose box intersects `query`.
    pub fn search(&self, query: &BoundingBox) -> Vec<&T> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.search(query, &mut out);
        }
        out
    }

    /// All items whose box contains `p`.
    pub fn containing(&self, p: Vec2) -> Vec<&T> {
        self.search(&BoundingBox::point(p))
    }
}

fn partition<T>(strategy: &SplitStrategy, node: Node<T>, out: &mut Vec<Node<T>>) {
    if node.len() <= strategy.max_children() {
        out.push(node);
        return;
    }
    let (left, right) = strategy.split(node);
    partition(strategy, left, out);
    partition(strategy, right, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamer_common::SplitMix64;

    fn check_invariants<T>(node: &Node<T>, strategy: &SplitStrategy, is_root: bool) -> usize {
        if node.is_leaf() {
            assert_eq!(node.height(), 0);
            return 1;
        }
        let children = node.children();
        if !is_root {
            assert!(children.len() >= strategy.min_children());
        }
        assert!(children.len() <= strategy.max_children());
        let combined = BoundingBox::combine_all(children.iter().map(Node::bbox)).unwrap();
        assert_eq!(*node.bbox(), combined);
        children
            .iter()
            .map(|c| {
                assert_eq!(c.height() + 1, node.height());
                check_invariants(c, strategy, false)
            })
            .sum()
    }

    fn random_items(rng: &mut SplitMix64, n: usize) -> Vec<(usize, BoundingBox)> {
        (0..n)
            .map(|i| {
                let x = rng.range(-3000.0, 3000.0);
                let y = rng.range(-3000.0, 3000.0);
                let w = rng.range(0.0, 150.0);
                let h = rng.range(0.0, 150.0);
                (i, BoundingBox::new(Vec2::new(x, y), Vec2::new(x + w, y + h)))
            })
            .collect()
    }

    #[test]
    fn empty_tree() {
        let tree: BulkTree<u32> = BulkTree::build(Vec::new(), SplitStrategy::new(2, 4).unwrap());
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert!(tree.bounds().is_none());
        assert!(tree.containing(Vec2::ZERO).is_empty());
    }

    #[test]
    fn small_set_fits_under_root() {
        let strategy = SplitStrategy::new(2, 8).unwrap();
        let tree = BulkTree::points((0..5).map(|i| (i, Vec2::new(i as f32, 0.0))), strategy);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root().unwrap().len(), 5);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn large_build_keeps_node_invariants() {
        let mut rng = SplitMix64::new(1234);
        for &(min, max, n) in &[(2, 4, 37), (3, 9, 500), (4, 16, 2000), (1, 2, 64)] {
            let strategy = SplitStrategy::new(min, max).unwrap();
            let tree = BulkTree::build(random_items(&mut rng, n), strategy);
            let root = tree.root().unwrap();
            assert_eq!(check_invariants(root, &strategy, true), n);
            assert_eq!(root.leaf_count(), n);
            assert!(tree.height() >= 2);
        }
    }

    #[test]
    fn search_matches_brute_force() {
        let mut rng = SplitMix64::new(55);
        let items = random_items(&mut rng, 800);
        let tree = BulkTree::build(items.clone(), SplitStrategy::new(3, 10).unwrap());

        for _ in 0..50 {
            let c = Vec2::new(rng.range(-3000.0, 3000.0), rng.range(-3000.0, 3000.0));
            let query = BoundingBox::around(c, rng.range(10.0, 600.0));
            let mut found: Vec<usize> = tree.search(&query).into_iter().copied().collect();
            found.sort();
            let expected: Vec<usize> = items
                .iter()
                .filter(|(_, b)| b.intersects(&query))
                .map(|(i, _)| *i)
                .collect();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn containing_finds_overlapping_zones() {
        let zones = vec![
            ("docks", BoundingBox::new(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0))),
            ("market", BoundingBox::new(Vec2::new(50.0, 50.0), Vec2::new(150.0, 150.0))),
            ("airport", BoundingBox::new(Vec2::new(500.0, 500.0), Vec2::new(900.0, 700.0))),
        ];
        let tree = BulkTree::build(zones, SplitStrategy::new(1, 2).unwrap());
        let mut at = tree.containing(Vec2::new(75.0, 75.0));
        at.sort();
        assert_eq!(at, vec![&"docks", &"market"]);
        assert_eq!(tree.containing(Vec2::new(600.0, 600.0)), vec![&"airport"]);
        assert!(tree.containing(Vec2::new(300.0, 300.0)).is_empty());
    }
}

use std::collections::HashMap;

use glam::Vec3;
use streamer_geom::{BoundingBox, BulkTree, SplitStrategy};

use crate::index::{BoxFuture, IndexId, SpatialIndex, nearest};

/// Spatial index backed by a bulk-loaded [`BulkTree`].
///
/// The tree is immutable between rebuilds. Ids added since the last
/// [`SpatialIndex::optimise`] sit in an unsorted overflow list that every
/// query scans, and deleted ids stay in the tree until the rebuild, where
/// queries skip them. Suited to mostly static populations that are optimised
/// after each bulk load.
#[derive(Debug, Clone)]
pub struct TreeIndex {
    tree: BulkTree<IndexId>,
    positions: HashMap<IndexId, Vec3>,
    overflow: Vec<IndexId>,
    tombstones: usize,
}

impl TreeIndex {
    pub fn new(strategy: SplitStrategy) -> Self {
        Self {
            tree: BulkTree::build(Vec::new(), strategy),
            positions: HashMap::new(),
            overflow: Vec::new(),
            tombstones: 0,
        }
    }

    /// Entries that a rebuild would fold in or drop.
    pub fn pending_rebuild(&self) -> usize {
        self.overflow.len() + self.tombstones
    }

    pub fn tree(&self) -> &BulkTree<IndexId> {
        &self.tree
    }
}

impl Default for TreeIndex {
    fn default() -> Self {
        Self::new(SplitStrategy::default())
    }
}

impl SpatialIndex for TreeIndex {
    fn add(&mut self, id: IndexId, position: Vec3) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        self.positions.insert(id, position);
        self.overflow.push(id);
        true
    }

    fn delete(&mut self, id: IndexId) -> bool {
        if self.positions.remove(&id).is_none() {
            return false;
        }
        match self.overflow.iter().position(|o| *o == id) {
            Some(i) => {
                self.overflow.swap_remove(i);
            }
            None => self.tombstones += 1,
        }
        true
    }

    fn stream(&self, position: Vec3, radius: f32, limit: usize) -> BoxFuture<'static, Vec<IndexId>> {
        let query = BoundingBox::around(position.truncate(), radius);
        let mut ids: Vec<IndexId> = self.tree.search(&query).into_iter().copied().collect();
        ids.extend(self.overflow.iter().copied());
        // A deleted-then-re-added id can appear in both the tree and the overflow.
        ids.sort_unstable();
        ids.dedup();
        let candidates = ids
            .into_iter()
            .filter_map(|id| self.positions.get(&id).map(|p| (id, *p)));
        let hits = nearest(candidates, position, radius, limit);
        Box::pin(std::future::ready(hits))
    }

    fn optimise(&mut self) {
        let mut points: Vec<(IndexId, Vec3)> = self.positions.iter().map(|(id, p)| (*id, *p)).collect();
        points.sort_unstable_by_key(|(id, _)| *id);
        let strategy = *self.tree.strategy();
        self.tree = BulkTree::points(points.into_iter().map(|(id, p)| (id, p.truncate())), strategy);
        self.overflow.clear();
        self.tombstones = 0;
        tracing::debug!(len = self.tree.len(), height = self.tree.height(), "tree index rebuilt");
    }

    fn clear(&mut self) {
        let strategy = *self.tree.strategy();
        self.tree = BulkTree::build(Vec::new(), strategy);
        self.positions.clear();
        self.overflow.clear();
        self.tombstones = 0;
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

//! The host spatial index seam.
//!
//! The streamer never answers proximity queries itself. It hands stable
//! integer ids to a [`SpatialIndex`] and asks it for the nearest ids around a
//! point. Answers arrive as futures, and the caller resolves ids back to
//! entities only once the future completes.

use std::future::Future;
use std::pin::Pin;

use glam::Vec3;

/// A boxed future that can be sent across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal id of an entity inside one streamer and its index.
///
/// Ids are handed out in increasing order and never reused by a streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexId(pub u32);

/// Proximity index provided by the host.
pub trait SpatialIndex {
    /// Insert `id` at `position`. Returns false if `id` is already present.
    fn add(&mut self, id: IndexId, position: Vec3) -> bool;

    /// Remove `id`. Returns false if it was not present.
    fn delete(&mut self, id: IndexId) -> bool;

    /// Up to `limit` ids within `radius` of `position`, nearest first.
    ///
    /// Ids at equal distance are ordered by id. The result may be computed
    /// eagerly or lazily; callers must treat it as possibly stale.
    fn stream(&self, position: Vec3, radius: f32, limit: usize) -> BoxFuture<'static, Vec<IndexId>>;

    /// Compact internal storage after bulk mutation.
    fn optimise(&mut self);

    fn clear(&mut self);

    /// Number of ids currently indexed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keep candidates within `radius` of `center`, nearest first, at most `limit`.
pub(crate) fn nearest(
    candidates: impl IntoIterator<Item = (IndexId, Vec3)>,
    center: Vec3,
    radius: f32,
    limit: usize,
) -> Vec<IndexId> {
    let radius_sq = radius * radius;
    let mut hits: Vec<(f32, IndexId)> = candidates
        .into_iter()
        .map(|(id, p)| (p.distance_squared(center), id))
        .filter(|(d, _)| *d <= radius_sq)
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    hits.truncate(limit);
    hits.into_iter().map(|(_, id)| id).collect()
}

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use glam::Vec3;
use streamer_common::EntityId;

use crate::config::{ConfigError, StreamConfig};
use crate::entity::{Lifecycle, StoredEntity};
use crate::grid::GridIndex;
use crate::index::{BoxFuture, IndexId, SpatialIndex};

/// Tracks the stored entities of one category and answers "what is near this
/// point" through a host [`SpatialIndex`].
///
/// Entities live in an arena keyed by [`IndexId`]; a separate map resolves
/// the collaborator's [`EntityId`] to its handle. The set of ids known to the
/// index is always exactly the set of entities in the arena.
///
/// Queries are two-phase. [`EntityStreamer::query`] returns a
/// [`StreamRequest`] that owns nothing from the streamer, so the streamer can
/// be mutated while the request is outstanding. Once it completes, pass the
/// hits to [`EntityStreamer::resolve`], which drops ids whose entity was
/// deleted in the meantime: a stale read is filtered, never an error.
pub struct EntityStreamer<P, I = GridIndex> {
    config: StreamConfig,
    index: I,
    next_id: u32,
    entries: BTreeMap<IndexId, StoredEntity<P>>,
    handles: HashMap<EntityId, IndexId>,
    in_flight: Arc<AtomicUsize>,
    optimise_pending: bool,
    disposed: bool,
}

impl<P> EntityStreamer<P, GridIndex> {
    /// Streamer over a [`GridIndex`] sized from the config.
    pub fn new(config: StreamConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::with_index(config, GridIndex::new(config.effective_cell_size()))
    }
}

impl<P, I: SpatialIndex> EntityStreamer<P, I> {
    pub fn with_index(config: StreamConfig, index: I) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            index,
            next_id: 0,
            entries: BTreeMap::new(),
            handles: HashMap::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            optimise_pending: false,
            disposed: false,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start tracking an entity. Returns false if an entity with the same id
    /// is already tracked or the streamer has been disposed.
    pub fn add(&mut self, mut entity: StoredEntity<P>) -> bool {
        if self.disposed {
            tracing::warn!(entity = %entity.id(), "add on disposed streamer");
            return false;
        }
        if self.handles.contains_key(&entity.id()) {
            tracing::debug!(entity = %entity.id(), "entity already tracked");
            return false;
        }
        let Some(next) = self.next_id.checked_add(1) else {
            tracing::warn!("index id space exhausted");
            return false;
        };
        let handle = IndexId(self.next_id);
        if !self.index.add(handle, entity.position()) {
            tracing::warn!(?handle, "index refused a fresh id");
            return false;
        }
        self.next_id = next;
        entity.set_lifecycle(Lifecycle::Indexed);
        self.handles.insert(entity.id(), handle);
        self.entries.insert(handle, entity);
        true
    }

    /// Stop tracking an entity. Returns false if it was not tracked.
    pub fn delete(&mut self, id: EntityId) -> bool {
        self.take(id).is_some()
    }

    /// Stop tracking an entity and hand it back, marked disposed.
    pub fn take(&mut self, id: EntityId) -> Option<StoredEntity<P>> {
        let handle = self.handles.remove(&id)?;
        self.index.delete(handle);
        let mut entity = self.entries.remove(&handle)?;
        entity.set_lifecycle(Lifecycle::Disposed);
        Some(entity)
    }

    /// Nearest entities around `position`, capped at `max_visible`.
    pub fn query(&self, position: Vec3) -> StreamRequest {
        self.stream_for_player(position, None)
    }

    /// Nearest entities around an observer at `position`, capped at
    /// `cap_override` or `max_visible`.
    pub fn stream_for_player(&self, position: Vec3, cap_override: Option<usize>) -> StreamRequest {
        let limit = cap_override.unwrap_or(self.config.max_visible);
        let inner = if position.is_finite() {
            self.index
                .stream(position, self.config.streaming_distance, limit)
        } else {
            tracing::debug!(%position, "non-finite query position");
            Box::pin(std::future::ready(Vec::new()))
        };
        StreamRequest {
            inner,
            limit,
            guard: Some(InFlight::new(&self.in_flight)),
        }
    }

    /// Translate completed hits back to live handles, nearest first.
    ///
    /// Ids that no longer resolve are skipped and counted. Also runs an
    /// optimise that was deferred while requests were in flight.
    pub fn resolve(&mut self, hits: StreamHits) -> Resolved {
        let mut resolved = Resolved::default();
        for id in hits.ids.into_iter().take(hits.limit) {
            if self.entries.contains_key(&id) {
                resolved.handles.push(id);
            } else {
                tracing::debug!(?id, "skipping stale index id");
                resolved.stale += 1;
            }
        }
        self.settle();
        resolved
    }

    /// Compact the index. Deferred (returns false) while any request is in
    /// flight; the deferred run happens at the next [`resolve`] or [`settle`]
    /// with nothing outstanding.
    ///
    /// [`resolve`]: Self::resolve
    /// [`settle`]: Self::settle
    pub fn optimise(&mut self) -> bool {
        if self.in_flight() > 0 {
            tracing::debug!(in_flight = self.in_flight(), "deferring optimise");
            self.optimise_pending = true;
            return false;
        }
        self.index.optimise();
        self.optimise_pending = false;
        true
    }

    /// Run a deferred optimise if no request is outstanding.
    pub fn settle(&mut self) -> bool {
        if self.optimise_pending && self.in_flight() == 0 {
            self.optimise()
        } else {
            false
        }
    }

    pub fn optimise_pending(&self) -> bool {
        self.optimise_pending
    }

    /// Requests issued but not yet completed or dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Forget every tracked entity. Ids are not reused afterwards, so hits
    /// from requests issued before the clear never resolve.
    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.index.clear();
        self.entries.clear();
        self.handles.clear();
        tracing::debug!(count, "streamer cleared");
    }

    /// Clear and refuse further adds.
    pub fn dispose(&mut self) {
        self.clear();
        self.optimise_pending = false;
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn get(&self, handle: IndexId) -> Option<&StoredEntity<P>> {
        self.entries.get(&handle)
    }

    pub fn get_mut(&mut self, handle: IndexId) -> Option<&mut StoredEntity<P>> {
        self.entries.get_mut(&handle)
    }

    pub fn handle_of(&self, id: EntityId) -> Option<IndexId> {
        self.handles.get(&id).copied()
    }

    pub fn entity(&self, id: EntityId) -> Option<&StoredEntity<P>> {
        self.handle_of(id).and_then(|h| self.entries.get(&h))
    }

    /// Tracked entities in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (IndexId, &StoredEntity<P>)> {
        self.entries.iter().map(|(h, e)| (*h, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> &I {
        &self.index
    }
}

/// Counts a request as in flight until it completes or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An outstanding nearest-entities request.
pub struct StreamRequest {
    inner: BoxFuture<'static, Vec<IndexId>>,
    limit: usize,
    guard: Option<InFlight>,
}

impl Future for StreamRequest {
    type Output = StreamHits;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<StreamHits> {
        let this = self.get_mut();
        match this.inner.as_mut().poll(cx) {
            Poll::Ready(ids) => {
                this.guard = None;
                Poll::Ready(StreamHits {
                    ids,
                    limit: this.limit,
                })
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Raw ids returned by the index, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHits {
    ids: Vec<IndexId>,
    limit: usize,
}

impl StreamHits {
    pub fn ids(&self) -> &[IndexId] {
        &self.ids
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Hits that still resolve to tracked entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Handles nearest first.
    pub handles: Vec<IndexId>,
    /// Ids dropped because their entity was gone.
    pub stale: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree_index::TreeIndex;
    use pollster::block_on;
    use streamer_common::SplitMix64;

    fn config(max_visible: usize, distance: f32) -> StreamConfig {
        StreamConfig::new(max_visible, distance).unwrap()
    }

    fn entity_at(x: f32, y: f32, z: f32) -> StoredEntity<u32> {
        StoredEntity::new(Vec3::new(x, y, z), 0).unwrap()
    }

    fn run_query<I: SpatialIndex>(s: &mut EntityStreamer<u32, I>, p: Vec3) -> Vec<IndexId> {
        let hits = block_on(s.query(p));
        s.resolve(hits).handles
    }

    #[test]
    fn add_assigns_increasing_handles_and_indexes() {
        let mut s = EntityStreamer::new(config(10, 100.0)).unwrap();
        let a = entity_at(0.0, 0.0, 0.0);
        let b = entity_at(1.0, 0.0, 0.0);
        let (ida, idb) = (a.id(), b.id());
        assert!(s.add(a));
        assert!(s.add(b));
        assert_eq!(s.handle_of(ida), Some(IndexId(0)));
        assert_eq!(s.handle_of(idb), Some(IndexId(1)));
        assert_eq!(s.entity(ida).unwrap().lifecycle(), Lifecycle::Indexed);
        assert_eq!(s.index().len(), 2);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let mut s = EntityStreamer::new(config(10, 100.0)).unwrap();
        let e = entity_at(0.0, 0.0, 0.0);
        let id = e.id();
        assert!(s.add(e.clone()));
        assert!(!s.add(e));
        assert_eq!(s.len(), 1);
        assert_eq!(s.index().len(), 1);
        assert!(s.delete(id));
        assert!(!s.delete(id));
    }

    #[test]
    fn take_returns_disposed_entity() {
        let mut s = EntityStreamer::new(config(10, 100.0)).unwrap();
        let e = entity_at(0.0, 0.0, 0.0);
        let id = e.id();
        s.add(e);
        let taken = s.take(id).unwrap();
        assert_eq!(taken.lifecycle(), Lifecycle::Disposed);
        assert!(s.is_empty());
        assert!(s.index().is_empty());
    }

    #[test]
    fn query_is_capped_and_nearest_first() {
        let mut s = EntityStreamer::new(config(5, 1000.0)).unwrap();
        for i in (0..50).rev() {
            s.add(entity_at(i as f32, 0.0, 0.0));
        }
        let handles = run_query(&mut s, Vec3::ZERO);
        assert_eq!(handles.len(), 5);
        let xs: Vec<f32> = handles
            .iter()
            .map(|h| s.get(*h).unwrap().position().x)
            .collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        let hits = block_on(s.stream_for_player(Vec3::ZERO, Some(12)));
        assert_eq!(s.resolve(hits).handles.len(), 12);
    }

    #[test]
    fn cap_holds_for_random_populations() {
        let mut rng = SplitMix64::new(5);
        let mut s = EntityStreamer::new(config(30, 300.0)).unwrap();
        for _ in 0..2000 {
            s.add(entity_at(rng.range(-400.0, 400.0), rng.range(-400.0, 400.0), 0.0));
        }
        for _ in 0..50 {
            let p = Vec3::new(rng.range(-400.0, 400.0), rng.range(-400.0, 400.0), 0.0);
            let handles = run_query(&mut s, p);
            assert!(handles.len() <= 30);
            for h in &handles {
                assert!(s.get(*h).unwrap().position().distance(p) <= 300.0);
            }
        }
    }

    #[test]
    fn delete_racing_an_in_flight_query_is_skipped() {
        let mut s = EntityStreamer::new(config(10, 100.0)).unwrap();
        let near = entity_at(1.0, 0.0, 0.0);
        let far = entity_at(2.0, 0.0, 0.0);
        let near_id = near.id();
        s.add(near);
        s.add(far);

        let request = s.query(Vec3::ZERO);
        assert_eq!(s.in_flight(), 1);
        assert!(s.delete(near_id));
        let hits = block_on(request);
        assert_eq!(s.in_flight(), 0);
        assert_eq!(hits.ids().len(), 2);

        let resolved = s.resolve(hits);
        assert_eq!(resolved.stale, 1);
        assert_eq!(resolved.handles, vec![IndexId(1)]);

        // Later queries never see it either.
        assert_eq!(run_query(&mut s, Vec3::ZERO), vec![IndexId(1)]);
    }

    #[test]
    fn deleted_entity_never_returns_even_if_re_added() {
        let mut s = EntityStreamer::new(config(10, 100.0)).unwrap();
        let e = entity_at(1.0, 0.0, 0.0);
        let id = e.id();
        s.add(e.clone());
        let request = s.query(Vec3::ZERO);
        s.delete(id);
        s.add(e);
        let resolved = s.resolve(block_on(request));
        // The old handle is gone; the re-added entity has a new one.
        assert_eq!(resolved.handles, Vec::<IndexId>::new());
        assert_eq!(s.handle_of(id), Some(IndexId(1)));
    }

    #[test]
    fn optimise_waits_for_in_flight_requests() {
        let mut s = EntityStreamer::new(config(10, 100.0)).unwrap();
        s.add(entity_at(0.0, 0.0, 0.0));
        let request = s.query(Vec3::ZERO);
        assert!(!s.optimise());
        assert!(s.optimise_pending());
        let hits = block_on(request);
        s.resolve(hits);
        assert!(!s.optimise_pending());
        assert!(s.optimise());
    }

    #[test]
    fn dropped_request_releases_in_flight_slot() {
        let mut s = EntityStreamer::<u32>::new(config(10, 100.0)).unwrap();
        let request = s.query(Vec3::ZERO);
        assert!(!s.optimise());
        drop(request);
        assert_eq!(s.in_flight(), 0);
        assert!(s.settle());
    }

    #[test]
    fn dispose_forgets_everything_and_blocks_late_results() {
        let mut s = EntityStreamer::new(config(20, 100.0)).unwrap();
        for i in 0..10 {
            s.add(entity_at(i as f32, 0.0, 0.0));
        }
        let request = s.query(Vec3::ZERO);
        s.dispose();
        assert_eq!(s.index().len(), 0);
        assert!(s.is_empty());

        let resolved = s.resolve(block_on(request));
        assert!(resolved.handles.is_empty());
        assert_eq!(resolved.stale, 10);
        assert!(!s.add(entity_at(0.0, 0.0, 0.0)));
    }

    #[test]
    fn queries_outside_the_world_come_back_empty() {
        let mut s = EntityStreamer::new(config(10, 300.0)).unwrap();
        s.add(entity_at(10.0, 0.0, 0.0));
        assert!(run_query(&mut s, Vec3::new(-1e12, 0.0, 0.0)).is_empty());
        assert!(run_query(&mut s, Vec3::new(f32::NAN, 0.0, 0.0)).is_empty());
        assert!(run_query(&mut s, Vec3::new(0.0, f32::INFINITY, 0.0)).is_empty());
        assert_eq!(s.in_flight(), 0);
        assert_eq!(run_query(&mut s, Vec3::ZERO), vec![IndexId(0)]);
    }

    #[test]
    fn clear_keeps_streamer_usable() {
        let mut s = EntityStreamer::new(config(20, 100.0)).unwrap();
        s.add(entity_at(0.0, 0.0, 0.0));
        s.clear();
        assert!(s.is_empty());
        assert!(s.add(entity_at(0.0, 0.0, 0.0)));
        assert_eq!(run_query(&mut s, Vec3::ZERO), vec![IndexId(1)]);
    }

    #[test]
    fn works_over_tree_index() {
        let mut s = EntityStreamer::with_index(config(3, 50.0), TreeIndex::default()).unwrap();
        for i in 0..10 {
            s.add(entity_at(i as f32 * 10.0, 0.0, 0.0));
        }
        assert!(s.optimise());
        assert_eq!(s.index().pending_rebuild(), 0);
        let handles = run_query(&mut s, Vec3::new(42.0, 0.0, 0.0));
        assert_eq!(handles, vec![IndexId(4), IndexId(5), IndexId(3)]);
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let bad = StreamConfig {
            max_visible: 0,
            ..StreamConfig::default()
        };
        assert!(EntityStreamer::<u32>::new(bad).is_err());
    }
}

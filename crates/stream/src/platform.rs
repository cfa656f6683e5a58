//! Seams towards the host platform and towards collaborators.

use std::collections::BTreeMap;

use streamer_common::{EntityId, LiveHandle, ObserverId};

use crate::entity::StoredEntity;

/// Creates and destroys live, platform-side instances of stored entities.
pub trait LivePlatform<P> {
    /// Materialise `entity` for `observer`. `None` means the host refused,
    /// for example because one of its own limits was hit.
    fn create(&mut self, observer: ObserverId, entity: &StoredEntity<P>) -> Option<LiveHandle>;

    fn destroy(&mut self, observer: ObserverId, live: LiveHandle);
}

/// Visibility notifications for entities that opted in with
/// [`StoredEntity::with_callbacks`].
pub trait StreamListener<P> {
    fn on_enter(&mut self, _observer: ObserverId, _entity: &StoredEntity<P>) {}

    fn on_leave(&mut self, _observer: ObserverId, _entity: &StoredEntity<P>) {}
}

impl<P> StreamListener<P> for () {}

/// In-memory platform that mints sequential handles.
///
/// Stands in for the host in tools and tests. An optional per-observer limit
/// makes it refuse creations the way a real host does when full.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlatform {
    next: u32,
    live: BTreeMap<(ObserverId, LiveHandle), EntityId>,
    limit: Option<usize>,
    created: u64,
    destroyed: u64,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse creations beyond `limit` live instances per observer.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub fn live_count(&self, observer: ObserverId) -> usize {
        self.live.keys().filter(|(o, _)| *o == observer).count()
    }

    pub fn total_live(&self) -> usize {
        self.live.len()
    }

    /// Which entity a live handle belongs to.
    pub fn lookup(&self, observer: ObserverId, live: LiveHandle) -> Option<EntityId> {
        self.live.get(&(observer, live)).copied()
    }

    /// Live handle of `entity` for `observer`, if any.
    pub fn handle_for(&self, observer: ObserverId, entity: EntityId) -> Option<LiveHandle> {
        self.live
            .iter()
            .find(|((o, _), e)| *o == observer && **e == entity)
            .map(|((_, h), _)| *h)
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed
    }
}

impl<P> LivePlatform<P> for MemoryPlatform {
    fn create(&mut self, observer: ObserverId, entity: &StoredEntity<P>) -> Option<LiveHandle> {
        if let Some(limit) = self.limit {
            if self.live_count(observer) >= limit {
                return None;
            }
        }
        let handle = LiveHandle(self.next);
        self.next = self.next.wrapping_add(1);
        self.live.insert((observer, handle), entity.id());
        self.created += 1;
        Some(handle)
    }

    fn destroy(&mut self, observer: ObserverId, live: LiveHandle) {
        if self.live.remove(&(observer, live)).is_some() {
            self.destroyed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn memory_platform_tracks_instances() {
        let mut platform = MemoryPlatform::new();
        let e = StoredEntity::new(Vec3::ZERO, ()).unwrap();
        let obs = ObserverId(1);
        let live = platform.create(obs, &e).unwrap();
        assert_eq!(platform.lookup(obs, live), Some(e.id()));
        assert_eq!(platform.handle_for(obs, e.id()), Some(live));
        assert_eq!(platform.live_count(obs), 1);
        LivePlatform::<()>::destroy(&mut platform, obs, live);
        assert_eq!(platform.total_live(), 0);
        assert_eq!((platform.created(), platform.destroyed()), (1, 1));
    }

    #[test]
    fn limit_refuses_per_observer() {
        let mut platform = MemoryPlatform::with_limit(1);
        let e = StoredEntity::new(Vec3::ZERO, ()).unwrap();
        assert!(platform.create(ObserverId(1), &e).is_some());
        assert!(platform.create(ObserverId(1), &e).is_none());
        assert!(platform.create(ObserverId(2), &e).is_some());
    }
}

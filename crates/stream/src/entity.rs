use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use streamer_common::EntityId;

use crate::config::{ConfigError, validate_position};

/// Category-specific data carried by a stored entity.
pub trait EntityPayload {
    /// Short category name used in logs.
    const CATEGORY: &'static str;

    /// Cooldown after consumption, or `None` if this entity is never consumed.
    fn respawn_delay(&self) -> Option<Duration> {
        None
    }
}

/// Where a stored entity is in its streaming life.
///
/// ```text
/// Registered -> Indexed -> Live <-> NotVisible
///                            |
///                            v
///               Consumed { respawn_at } -> Indexed
/// any -> Disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Created by a collaborator, not yet added to a streamer.
    Registered,
    /// Tracked by a streamer and eligible for streaming.
    Indexed,
    /// Materialised for at least one observer.
    Live,
    /// Was live, evicted by distance or by closer entities.
    NotVisible,
    /// Consumed; not eligible again until `respawn_at` (game time).
    Consumed { respawn_at: Duration },
    /// Removed by its owner. Terminal.
    Disposed,
}

/// The engine's record of one logical entity, independent of whether any
/// observer currently has a live instance of it.
#[derive(Debug, Clone)]
pub struct StoredEntity<P> {
    id: EntityId,
    position: Vec3,
    payload: P,
    lifecycle: Lifecycle,
    notify: bool,
}

impl<P> StoredEntity<P> {
    /// Create an entity with a fresh id. Fails if the position is outside the
    /// world.
    pub fn new(position: Vec3, payload: P) -> Result<Self, ConfigError> {
        Self::with_id(EntityId::new(), position, payload)
    }

    pub fn with_id(id: EntityId, position: Vec3, payload: P) -> Result<Self, ConfigError> {
        validate_position(position)?;
        Ok(Self {
            id,
            position,
            payload,
            lifecycle: Lifecycle::Registered,
            notify: false,
        })
    }

    /// Opt in to enter/leave notifications for this entity.
    pub fn with_callbacks(mut self) -> Self {
        self.notify = true;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn wants_callbacks(&self) -> bool {
        self.notify
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Consumed { .. })
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_is_registered() {
        let e = StoredEntity::new(Vec3::new(1.0, 2.0, 3.0), ()).unwrap();
        assert_eq!(e.lifecycle(), Lifecycle::Registered);
        assert!(!e.wants_callbacks());
        assert!(e.with_callbacks().wants_callbacks());
    }

    #[test]
    fn out_of_world_position_is_rejected() {
        let err = StoredEntity::new(Vec3::new(0.0, 0.0, 1e9), ()).unwrap_err();
        assert!(matches!(err, ConfigError::PositionOutOfRange(_)));
    }

    #[test]
    fn consumed_state_is_detected() {
        let mut e = StoredEntity::new(Vec3::ZERO, ()).unwrap();
        e.set_lifecycle(Lifecycle::Consumed {
            respawn_at: Duration::from_secs(5),
        });
        assert!(e.is_consumed());
    }
}

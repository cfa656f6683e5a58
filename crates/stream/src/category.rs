//! Payloads of the streamed categories.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entity::EntityPayload;

/// Behaviour of a pickup once an observer collects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupKind {
    /// Decorative or informational; collecting it does nothing.
    Static,
    /// Disappears when collected and comes back after its respawn delay.
    Respawning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupPayload {
    pub model: u16,
    pub kind: PickupKind,
    pub respawn_delay: Duration,
}

impl PickupPayload {
    pub fn respawning(model: u16, respawn_delay: Duration) -> Self {
        Self {
            model,
            kind: PickupKind::Respawning,
            respawn_delay,
        }
    }

    pub fn fixed(model: u16) -> Self {
        Self {
            model,
            kind: PickupKind::Static,
            respawn_delay: Duration::ZERO,
        }
    }
}

impl EntityPayload for PickupPayload {
    const CATEGORY: &'static str = "pickup";

    fn respawn_delay(&self) -> Option<Duration> {
        match self.kind {
            PickupKind::Respawning => Some(self.respawn_delay),
            PickupKind::Static => None,
        }
    }
}

/// A parked vehicle. Vehicles are never consumed by the streamer; the
/// respawn delay is handed to the host for its own abandoned-vehicle timer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehiclePayload {
    pub model: u16,
    /// Heading in degrees.
    pub heading: f32,
    pub colours: [i16; 2],
    pub respawn_delay: Duration,
}

impl EntityPayload for VehiclePayload {
    const CATEGORY: &'static str = "vehicle";
}

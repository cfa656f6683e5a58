//! Streaming: bounded per-observer materialisation of world entities.
//!
//! # Invariants
//! - An observer never holds more than `max_visible` live instances of one
//!   category.
//! - Every id known to the spatial index resolves to a stored entity, and the
//!   other way round.
//! - Index answers are snapshots; ids deleted while a query was in flight are
//!   filtered when the answer is resolved.
//!
//! The [`EntityStreamer`] tracks entities and asks a host [`SpatialIndex`]
//! what is near. The [`StreamingManager`] turns those answers into live
//! instances on a [`LivePlatform`], one diff per observer per pass.

mod category;
mod config;
mod entity;
mod grid;
mod index;
mod manager;
mod platform;
mod respawn;
mod streamer;
mod tree_index;

pub use category::{PickupKind, PickupPayload, VehiclePayload};
pub use config::{ConfigError, EngineConfig, StreamConfig, WORLD_EXTENT, validate_position};
pub use entity::{EntityPayload, Lifecycle, StoredEntity};
pub use grid::{CellCoord, GridIndex};
pub use index::{BoxFuture, IndexId, SpatialIndex};
pub use manager::{
    PassHits, PassStats, PendingPass, PickupManager, StreamEvent, StreamingManager,
    VehicleManager, VisibleSet,
};
pub use platform::{LivePlatform, MemoryPlatform, StreamListener};
pub use respawn::RespawnQueue;
pub use streamer::{EntityStreamer, Resolved, StreamHits, StreamRequest};
pub use tree_index::TreeIndex;

pub fn crate_info() -> &'static str {
    "streamer-core v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("streamer"));
    }
}

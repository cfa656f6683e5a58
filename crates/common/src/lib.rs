//! Shared identifiers and small utilities used across the streamer workspace.

pub mod rng;
pub mod types;

pub use rng::SplitMix64;
pub use types::{EntityId, LiveHandle, ObserverId};

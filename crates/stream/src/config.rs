use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Half-extent of the playable world on every axis.
pub const WORLD_EXTENT: f32 = 20_000.0;

/// Errors raised while validating configuration or entity placement.
///
/// These are only produced at setup time. Steady-state streaming operations
/// report failure through their return values instead.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_visible must be at least 1")]
    ZeroMaxVisible,
    #[error("streaming distance must be positive and finite, got {0}")]
    InvalidDistance(f32),
    #[error("cell size must be positive and finite, got {0}")]
    InvalidCellSize(f32),
    #[error("cell size {0} gives more cells per axis than grid coordinates can address")]
    CellSizeTooSmall(f32),
    #[error("tick interval must be at least 1 ms")]
    ZeroTick,
    #[error("position {0} is outside the world bounds (+/-20000)")]
    PositionOutOfRange(Vec3),
    #[error("{section}: {source}")]
    Section {
        section: &'static str,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Streaming parameters for one category of entities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Hard ceiling on live entities of this category per observer.
    pub max_visible: usize,
    /// Radius around the observer within which entities may become live.
    pub streaming_distance: f32,
    /// Grid cell size; defaults to the streaming distance.
    pub cell_size: Option<f32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_visible: 300,
            streaming_distance: 300.0,
            cell_size: None,
        }
    }
}

impl StreamConfig {
    /// Build and validate a config with the default cell size.
    pub fn new(max_visible: usize, streaming_distance: f32) -> Result<Self, ConfigError> {
        let config = Self {
            max_visible,
            streaming_distance,
            cell_size: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_visible == 0 {
            return Err(ConfigError::ZeroMaxVisible);
        }
        if !(self.streaming_distance.is_finite() && self.streaming_distance > 0.0) {
            return Err(ConfigError::InvalidDistance(self.streaming_distance));
        }
        if let Some(size) = self.cell_size {
            if !(size.is_finite() && size > 0.0) {
                return Err(ConfigError::InvalidCellSize(size));
            }
        }
        // Cell coordinates of in-world positions must fit an i32.
        let cell_size = self.effective_cell_size();
        if WORLD_EXTENT / cell_size >= i32::MAX as f32 {
            return Err(ConfigError::CellSizeTooSmall(cell_size));
        }
        Ok(())
    }

    pub fn effective_cell_size(&self) -> f32 {
        self.cell_size.unwrap_or(self.streaming_distance)
    }
}

/// Check that a position is finite and inside the world.
pub fn validate_position(position: Vec3) -> Result<(), ConfigError> {
    let inside = position
        .to_array()
        .iter()
        .all(|c| c.is_finite() && c.abs() <= WORLD_EXTENT);
    if inside {
        Ok(())
    } else {
        Err(ConfigError::PositionOutOfRange(position))
    }
}

/// Top-level engine configuration, one section per streamed category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pickups: StreamConfig,
    pub vehicles: StreamConfig,
    /// Interval between reconciliation passes.
    pub tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pickups: StreamConfig::default(),
            vehicles: StreamConfig {
                max_visible: 200,
                streaming_distance: 250.0,
                cell_size: None,
            },
            tick_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Load from a `.json` file, or YAML for any other extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            _ => serde_yaml::from_str(&text)?,
        };
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let section = |section: &'static str, r: Result<(), ConfigError>| {
            r.map_err(|e| ConfigError::Section {
                section,
                source: Box::new(e),
            })
        };
        section("pickups", self.pickups.validate())?;
        section("vehicles", self.vehicles.validate())?;
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}

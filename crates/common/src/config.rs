use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::geometry::{ShardCoord, ShardGeometry};

/// Errors from loading or validating a shard configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration surface supplied once at shard startup.
///
/// Ranges are in world units. The shard volume is a cube of edge
/// `shard_edge`, and the world is `world_extent` shards per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Shard grid shape.
    pub world_extent: ShardCoord,
    pub shard_edge: f32,
    /// S: max distance at which presence is advertised.
    pub sensor_range: f32,
    /// M: max per-generation displacement.
    pub motion_range: f32,
    /// R: max distance for direct messages and broadcasts, and the motion
    /// bound of entities that suppress their advertisement.
    pub interaction_range: f32,
    /// IC cells per axis.
    pub ic_resolution: u32,
    /// Upper bound on retained/reconstructable generations.
    pub max_history: usize,
    /// Destination-table time steps a replica may lag before it is ignored.
    pub staleness_tolerance: u64,
    pub evolution_budget_ms: u64,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            world_extent: ShardCoord::new(1, 1, 1),
            shard_edge: 1.0,
            sensor_range: 0.5,
            motion_range: 0.1,
            interaction_range: 0.4,
            ic_resolution: 8,
            max_history: 32,
            staleness_tolerance: 4,
            evolution_budget_ms: 1_000,
        }
    }
}

impl ShardConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            other => Err(ConfigError::Invalid(format!(
                "unsupported config extension: {other:?}"
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let extent = self.world_extent;
        if extent.x < 1 || extent.y < 1 || extent.z < 1 {
            return Err(ConfigError::Invalid(format!(
                "world_extent must be at least 1 per axis, got {extent}"
            )));
        }
        if !(self.shard_edge.is_finite() && self.shard_edge > 0.0) {
            return Err(ConfigError::Invalid("shard_edge must be positive".into()));
        }
        let (m, r, s) = (self.motion_range, self.interaction_range, self.sensor_range);
        if !(m > 0.0 && m <= r && r <= s && s.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "ranges must satisfy 0 < M <= R <= S, got M={m} R={r} S={s}"
            )));
        }
        if s > self.shard_edge {
            return Err(ConfigError::Invalid(format!(
                "sensor_range {s} exceeds shard_edge {}",
                self.shard_edge
            )));
        }
        if self.ic_resolution == 0 {
            return Err(ConfigError::Invalid("ic_resolution must be >= 1".into()));
        }
        if self.max_history == 0 {
            return Err(ConfigError::Invalid("max_history must be >= 1".into()));
        }
        Ok(())
    }

    pub fn evolution_budget(&self) -> Duration {
        Duration::from_millis(self.evolution_budget_ms)
    }

    /// Motion bound for one generation: M normally, R when the entity
    /// suppresses its advertisement.
    pub fn motion_bound(&self, advertisement_suppressed: bool) -> f32 {
        if advertisement_suppressed {
            self.interaction_range
        } else {
            self.motion_range
        }
    }

    pub fn shard_geometry(&self, coord: ShardCoord) -> ShardGeometry {
        ShardGeometry::of_shard(coord, self.shard_edge)
    }

    /// Whole-world box; evolved positions are clamped into it.
    pub fn world_geometry(&self) -> ShardGeometry {
        let max = glam::Vec3::new(
            self.world_extent.x as f32,
            self.world_extent.y as f32,
            self.world_extent.z as f32,
        ) * self.shard_edge;
        ShardGeometry::new(glam::Vec3::ZERO, max)
    }

    /// Edge length of one IC cell.
    pub fn ic_cell_edge(&self) -> f32 {
        self.shard_edge / self.ic_resolution as f32
    }

    /// Number of IC cells the sensor range spans (at least one).
    pub fn sensor_cells(&self) -> u32 {
        ((self.sensor_range / self.ic_cell_edge()).ceil() as u32).max(1)
    }

    /// Owner shard of a world position, if inside the world.
    pub fn shard_of(&self, p: glam::Vec3) -> Option<ShardCoord> {
        let c = (p / self.shard_edge).floor();
        let coord = ShardCoord::new(c.x as i32, c.y as i32, c.z as i32);
        coord.within(self.world_extent).then_some(coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ShardConfig::default().validate().unwrap();
    }

    #[test]
    fn yaml_overrides_defaults() {
        let config = ShardConfig::from_yaml_str(
            "world_extent: { x: 2, y: 1, z: 1 }\nmotion_range: 0.05\nmax_history: 8\n",
        )
        .unwrap();
        assert_eq!(config.world_extent, ShardCoord::new(2, 1, 1));
        assert_eq!(config.motion_range, 0.05);
        assert_eq!(config.max_history, 8);
        assert_eq!(config.sensor_range, ShardConfig::default().sensor_range);
    }

    #[test]
    fn json_roundtrip() {
        let config = ShardConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(ShardConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn invalid_range_order_rejected() {
        let config = ShardConfig {
            motion_range: 0.6,
            ..ShardConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shard.yml");
        std::fs::write(&path, "ic_resolution: 4\n").unwrap();
        assert_eq!(ShardConfig::load(&path).unwrap().ic_resolution, 4);

        let bad = tmp.path().join("shard.toml");
        std::fs::write(&bad, "").unwrap();
        assert!(ShardConfig::load(&bad).is_err());
    }

    #[test]
    fn shard_of_and_sensor_cells() {
        let config = ShardConfig {
            world_extent: ShardCoord::new(2, 1, 1),
            ..ShardConfig::default()
        };
        assert_eq!(
            config.shard_of(glam::Vec3::new(1.5, 0.5, 0.5)),
            Some(ShardCoord::new(1, 0, 0))
        );
        assert_eq!(config.shard_of(glam::Vec3::new(2.5, 0.5, 0.5)), None);
        // 0.5 / (1/8) = 4 cells
        assert_eq!(config.sensor_cells(), 4);
    }
}

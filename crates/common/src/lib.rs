//! Shared identifiers, shard geometry and the configuration surface.

pub mod config;
pub mod geometry;
pub mod types;

pub use config::{ConfigError, ShardConfig};
pub use geometry::{ShardCoord, ShardGeometry};
pub use types::{ClientId, EntityGuid, EntityId, cmp_vec3, vec3_bits};

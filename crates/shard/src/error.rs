use shardspace_boundary::BoundaryError;
use shardspace_common::{ConfigError, ShardCoord};
use shardspace_kernel::{CodecError, IntegrityError, LogicError};
use shardspace_persist::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("logic: {0}")]
    Logic(#[from] LogicError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("boundary: {0}")]
    Boundary(#[from] BoundaryError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("shard {0} lies outside the world grid")]
    OutsideWorld(ShardCoord),
    #[error("shard has not been seeded")]
    NotSeeded,
    #[error("generation {0} is not retained")]
    UnknownGeneration(u64),
    #[error("{0} is not a neighbor of this shard")]
    UnknownNeighbor(ShardCoord),
}

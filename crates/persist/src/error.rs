use shardspace_common::ShardCoord;
use shardspace_kernel::{CodecError, LogicError};

/// Errors from snapshot handling and durable stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logic state error: {0}")]
    Logic(#[from] LogicError),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("snapshot for generation {got} does not follow generation {expected}")]
    OutOfSequence { expected: u64, got: u64 },
    #[error("generation {0} is not retained")]
    NotRetained(u64),
    #[error("blob stored for {shard} generation {expected} holds generation {got}")]
    GenerationMismatch {
        shard: ShardCoord,
        expected: u64,
        got: u64,
    },
}

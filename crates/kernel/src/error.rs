use shardspace_common::{EntityGuid, EntityId};

/// Integrity violations. Fatal to the operation that detects them and never
/// retried: they indicate an ordering or replay bug, not a transient state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error(
        "entity {entity}: logic executed out of order (bookkeeping generation {bookkeeping}, requested {requested})"
    )]
    OutOfOrderExecution {
        entity: EntityGuid,
        bookkeeping: u64,
        requested: u64,
    },
    #[error("generation mismatch: context is at {context}, caller requested {requested}")]
    GenerationMismatch { context: u64, requested: u64 },
    #[error("pool container mismatch: slot {slot} cannot hold entity {entity}")]
    ContainerMismatch { slot: EntityGuid, entity: EntityGuid },
}

/// Failures raised by behavior code or by (de)serializing behavior state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogicError {
    #[error("unknown logic kind: {0}")]
    UnknownKind(String),
    #[error("logic state encode failed: {0}")]
    Encode(String),
    #[error("logic state decode failed: {0}")]
    Decode(String),
    #[error("{0}")]
    Failed(String),
}

/// Canonical-encoding failures for change sets and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("CBOR serialization error: {0}")]
    Encode(String),
    #[error("CBOR deserialization error: {0}")]
    Decode(String),
}

/// Why a single entity did not evolve normally. Isolated to that entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvolutionFailure {
    #[error("logic error: {0}")]
    Logic(#[from] LogicError),
    #[error("logic panicked: {0}")]
    Panicked(String),
    #[error("wall-clock budget exhausted before evolution started")]
    BudgetExhausted,
}

/// A per-entity evolution failure, reported alongside the completed generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("entity {entity}: {failure}")]
pub struct EntityEvolutionError {
    pub entity: EntityId,
    pub failure: EvolutionFailure,
}

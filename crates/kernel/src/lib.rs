//! Shard kernel: entities, their deterministic evolution, and the change sets
//! that carry one generation to the next.
//!
//! # Invariants
//! - Entities are immutable values; evolution and dispatch install successors.
//! - Behavior code only writes into its `Actions` and draws from the random
//!   source seeded by (entity guid, generation).
//! - Change-set contents and digests are independent of insertion order.
//! - Executing a behavior out of generation order is an integrity fault.
//! - Recomputing a generation with more neighbor data only clears coverage bits.

pub mod actions;
pub mod change_set;
pub mod codec;
pub mod contact;
pub mod context;
pub mod coverage;
pub mod entity;
pub mod error;
pub mod logic;
pub mod message;
pub mod pool;
pub mod random;

#[cfg(test)]
pub(crate) mod testing;

pub use actions::{Actions, MessageTarget};
pub use change_set::{
    Advertisement, BroadcastDelta, EntityChangeSet, ExecutionReport, Instantiation, MessageDelta,
    Motion, Removal,
};
pub use contact::{Appearances, EntityContact};
pub use context::EvolutionContext;
pub use coverage::InconsistencyCoverage;
pub use entity::{Entity, Inbound, SerialEntity};
pub use error::{CodecError, EntityEvolutionError, EvolutionFailure, IntegrityError, LogicError};
pub use logic::{EntityLogic, ExecutableLogic, LogicRegistry, LogicState, decode_state, encode_state};
pub use message::{ClientMessage, ClientMessageLog, ClientSink, Message, NullSink, OrderedMessage};
pub use pool::EntityPool;
pub use random::{EntityRng, entity_rng, spawn_guid};

//! The per-entity evolution contract.
//!
//! Behaviors implement [`EntityLogic`]. Each entity carries one behavior
//! object wrapped in an [`ExecutableLogic`], which owns the generation
//! bookkeeping, plus the behavior's serialized [`LogicState`]. The registry
//! rebuilds behavior objects from serialized state when entities arrive from
//! snapshots, neighbor payloads or instantiation deltas.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shardspace_common::EntityGuid;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::actions::Actions;
use crate::entity::Entity;
use crate::error::{IntegrityError, LogicError};
use crate::random::EntityRng;

/// Deterministic behavior of one entity.
///
/// `evolve` may only write into `actions` and draw from `rng`. It must not
/// read or write anything else; the same inputs must produce the same
/// actions and the same successor state on every replica.
pub trait EntityLogic: Send + Sync + fmt::Debug {
    /// Registry tag used to rebuild this behavior from its serialized state.
    fn kind(&self) -> &'static str;

    fn evolve(
        &mut self,
        actions: &mut Actions,
        current: &Entity,
        generation: u64,
        rng: &mut EntityRng,
    ) -> Result<(), LogicError>;

    fn serialize_state(&self) -> Result<Vec<u8>, LogicError>;

    fn boxed_clone(&self) -> Box<dyn EntityLogic>;
}

/// CBOR-encode a serde behavior; the usual body of `serialize_state`.
pub fn encode_state<T: Serialize>(state: &T) -> Result<Vec<u8>, LogicError> {
    let mut buf = Vec::new();
    ciborium::into_writer(state, &mut buf).map_err(|e| LogicError::Encode(e.to_string()))?;
    Ok(buf)
}

pub fn decode_state<T: DeserializeOwned>(data: &[u8]) -> Result<T, LogicError> {
    ciborium::from_reader(data).map_err(|e| LogicError::Decode(e.to_string()))
}

/// Serialized behavior: kind tag, bookkeeping generation and state bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicState {
    pub kind: String,
    pub generation: u64,
    pub data: Vec<u8>,
}

impl LogicState {
    /// Same state with the bookkeeping generation moved forward, for
    /// entities whose evolution was skipped.
    pub fn held_for(&self, generation: u64) -> LogicState {
        LogicState {
            generation: generation + 2,
            ..self.clone()
        }
    }
}

/// A behavior plus its generation bookkeeping.
///
/// The bookkeeping value is 0 for a fresh behavior. Executing generation `g`
/// requires it to be 0 or `g + 1`, and leaves it at `g + 2`: `g` is the
/// generation about to be computed and the stored value names the one after
/// that. Anything else is an out-of-order replay.
#[derive(Debug)]
pub struct ExecutableLogic {
    generation: u64,
    logic: Box<dyn EntityLogic>,
}

impl Clone for ExecutableLogic {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            logic: self.logic.boxed_clone(),
        }
    }
}

impl ExecutableLogic {
    pub fn fresh(logic: Box<dyn EntityLogic>) -> Self {
        Self {
            generation: 0,
            logic,
        }
    }

    pub fn with_generation(logic: Box<dyn EntityLogic>, generation: u64) -> Self {
        Self { generation, logic }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind(&self) -> &'static str {
        self.logic.kind()
    }

    /// Check ordering, advance bookkeeping, then run the behavior.
    ///
    /// An ordering violation is returned as the outer error and leaves the
    /// bookkeeping untouched; a behavior failure is the inner one.
    pub fn execute(
        &mut self,
        owner: EntityGuid,
        actions: &mut Actions,
        current: &Entity,
        generation: u64,
        rng: &mut EntityRng,
    ) -> Result<Result<(), LogicError>, IntegrityError> {
        if self.generation != 0 && self.generation != generation + 1 {
            return Err(IntegrityError::OutOfOrderExecution {
                entity: owner,
                bookkeeping: self.generation,
                requested: generation,
            });
        }
        self.generation = generation + 2;
        Ok(self.logic.evolve(actions, current, generation, rng))
    }

    pub fn state(&self) -> Result<LogicState, LogicError> {
        Ok(LogicState {
            kind: self.logic.kind().to_string(),
            generation: self.generation,
            data: self.logic.serialize_state()?,
        })
    }
}

type LogicFactory = dyn Fn(&[u8]) -> Result<Box<dyn EntityLogic>, LogicError> + Send + Sync;

/// Open set of behaviors, keyed by kind tag.
#[derive(Clone, Default)]
pub struct LogicRegistry {
    factories: HashMap<String, Arc<LogicFactory>>,
}

impl LogicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom decoder for `kind`.
    pub fn register<F>(&mut self, kind: &str, factory: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Result<Box<dyn EntityLogic>, LogicError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
        self
    }

    /// Register a behavior whose state is the CBOR form of the type itself.
    pub fn register_serde<L>(&mut self, kind: &str) -> &mut Self
    where
        L: EntityLogic + DeserializeOwned + 'static,
    {
        self.register(kind, |data| {
            let logic: L = decode_state(data)?;
            Ok(Box::new(logic) as Box<dyn EntityLogic>)
        })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Rebuild a behavior with its bookkeeping generation.
    pub fn instantiate(&self, state: &LogicState) -> Result<ExecutableLogic, LogicError> {
        let factory = self
            .factories
            .get(&state.kind)
            .ok_or_else(|| LogicError::UnknownKind(state.kind.clone()))?;
        let logic = factory(&state.data)?;
        Ok(ExecutableLogic::with_generation(logic, state.generation))
    }
}

impl fmt::Debug for LogicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("LogicRegistry").field("kinds", &kinds).finish()
    }
}

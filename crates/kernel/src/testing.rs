//! Behaviors and fixtures shared by the unit tests.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use shardspace_common::{EntityGuid, EntityId, ShardConfig, ShardCoord};

use crate::actions::Actions;
use crate::contact::Appearances;
use crate::context::EvolutionContext;
use crate::entity::Entity;
use crate::error::LogicError;
use crate::logic::{EntityLogic, LogicRegistry, encode_state};
use crate::message::{ClientSink, NullSink};
use crate::random::EntityRng;

/// Stays put and counts its steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counter {
    pub ticks: u64,
}

impl EntityLogic for Counter {
    fn kind(&self) -> &'static str {
        "counter"
    }

    fn evolve(
        &mut self,
        _actions: &mut Actions,
        _current: &Entity,
        _generation: u64,
        _rng: &mut EntityRng,
    ) -> Result<(), LogicError> {
        self.ticks += 1;
        Ok(())
    }

    fn serialize_state(&self) -> Result<Vec<u8>, LogicError> {
        encode_state(self)
    }

    fn boxed_clone(&self) -> Box<dyn EntityLogic> {
        Box::new(self.clone())
    }
}

/// Fails every step, by error or by panic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Faulty {
    pub panic: bool,
}

impl EntityLogic for Faulty {
    fn kind(&self) -> &'static str {
        "faulty"
    }

    fn evolve(
        &mut self,
        _actions: &mut Actions,
        _current: &Entity,
        _generation: u64,
        _rng: &mut EntityRng,
    ) -> Result<(), LogicError> {
        if self.panic {
            panic!("faulty behavior panicked");
        }
        Err(LogicError::Failed("faulty behavior failed".into()))
    }

    fn serialize_state(&self) -> Result<Vec<u8>, LogicError> {
        encode_state(self)
    }

    fn boxed_clone(&self) -> Box<dyn EntityLogic> {
        Box::new(self.clone())
    }
}

pub fn registry() -> LogicRegistry {
    let mut registry = LogicRegistry::new();
    registry
        .register_serde::<Counter>("counter")
        .register_serde::<Faulty>("faulty");
    registry
}

pub fn counter_entity(position: Vec3) -> Entity {
    Entity::new(
        EntityId::new(EntityGuid::new(), position),
        Appearances::new(),
        Box::new(Counter::default()),
    )
    .unwrap()
}

/// Config, registry and sink for building evolution contexts on the origin shard.
pub struct TestWorld {
    pub config: ShardConfig,
    pub registry: LogicRegistry,
    sink: NullSink,
}

impl TestWorld {
    pub fn new(config: ShardConfig) -> Self {
        Self {
            config,
            registry: registry(),
            sink: NullSink,
        }
    }

    pub fn context(&self, generation: u64) -> EvolutionContext<'_> {
        self.context_with_sink(generation, &self.sink)
    }

    pub fn context_with_sink<'a>(
        &'a self,
        generation: u64,
        sink: &'a dyn ClientSink,
    ) -> EvolutionContext<'a> {
        EvolutionContext::new(
            generation,
            ShardCoord::ORIGIN,
            &self.config,
            &self.registry,
            sink,
        )
    }
}

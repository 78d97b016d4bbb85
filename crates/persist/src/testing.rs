//! Fixtures for the unit tests.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use shardspace_common::{EntityGuid, EntityId};
use shardspace_kernel::{
    Actions, Appearances, Entity, EntityLogic, EntityRng, LogicError, LogicRegistry, encode_state,
};

/// Remembers its seed; does nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idle {
    pub seed: u8,
}

impl EntityLogic for Idle {
    fn kind(&self) -> &'static str {
        "idle"
    }

    fn evolve(
        &mut self,
        _actions: &mut Actions,
        _current: &Entity,
        _generation: u64,
        _rng: &mut EntityRng,
    ) -> Result<(), LogicError> {
        Ok(())
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
    registry.register_serde::<Idle>("idle");
    registry
}

/// Entity with a guid derived from `seed`.
pub fn wanderer(position: Vec3, seed: u8) -> Entity {
    Entity::new(
        EntityId::new(EntityGuid::from_random_bytes([seed; 16]), position),
        Appearances::new().with("seed", vec![seed]),
        Box::new(Idle { seed }),
    )
    .unwrap()
}

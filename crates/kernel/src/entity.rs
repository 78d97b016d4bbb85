use glam::Vec3;
use serde::{Deserialize, Serialize};
use shardspace_common::{EntityGuid, EntityId};
use std::sync::Arc;

use crate::contact::{Appearances, EntityContact};
use crate::error::LogicError;
use crate::logic::{EntityLogic, ExecutableLogic, LogicRegistry, LogicState};
use crate::message::OrderedMessage;

/// Messages and contacts delivered to an entity by the previous generation's
/// dispatch. Frozen for the duration of one evolution step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    /// Sorted by (order index, sender).
    pub messages: Vec<OrderedMessage>,
    /// Sorted by contact identity.
    pub contacts: Vec<EntityContact>,
}

impl Inbound {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.contacts.is_empty()
    }
}

/// One simulated agent.
///
/// Immutable: evolution and dispatch produce successor values. The behavior
/// object and its serialized state are kept in step by construction.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    appearances: Appearances,
    logic: Arc<ExecutableLogic>,
    logic_state: LogicState,
    inbound: Inbound,
}

/// Plain-data form of an entity: what snapshots store and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialEntity {
    pub id: EntityId,
    pub appearances: Appearances,
    pub logic: LogicState,
    pub inbound: Inbound,
}

impl Entity {
    /// Seed a new entity with a fresh behavior.
    pub fn new(
        id: EntityId,
        appearances: Appearances,
        logic: Box<dyn EntityLogic>,
    ) -> Result<Self, LogicError> {
        let logic = ExecutableLogic::fresh(logic);
        let logic_state = logic.state()?;
        Ok(Self {
            id,
            appearances,
            logic: Arc::new(logic),
            logic_state,
            inbound: Inbound::default(),
        })
    }

    /// Rebuild an entity from serialized behavior state.
    pub fn from_state(
        id: EntityId,
        appearances: Appearances,
        logic_state: LogicState,
        registry: &LogicRegistry,
    ) -> Result<Self, LogicError> {
        let logic = registry.instantiate(&logic_state)?;
        Ok(Self {
            id,
            appearances,
            logic: Arc::new(logic),
            logic_state,
            inbound: Inbound::default(),
        })
    }

    pub fn from_serial(serial: SerialEntity, registry: &LogicRegistry) -> Result<Self, LogicError> {
        let entity = Self::from_state(serial.id, serial.appearances, serial.logic, registry)?;
        Ok(entity.with_inbound(serial.inbound))
    }

    pub fn to_serial(&self) -> SerialEntity {
        SerialEntity {
            id: self.id,
            appearances: self.appearances.clone(),
            logic: self.logic_state.clone(),
            inbound: self.inbound.clone(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn guid(&self) -> EntityGuid {
        self.id.guid
    }

    pub fn position(&self) -> Vec3 {
        self.id.position
    }

    pub fn appearances(&self) -> &Appearances {
        &self.appearances
    }

    pub fn logic_state(&self) -> &LogicState {
        &self.logic_state
    }

    pub fn inbound(&self) -> &Inbound {
        &self.inbound
    }

    /// A private copy of the behavior, ready to execute.
    pub fn executable_logic(&self) -> ExecutableLogic {
        (*self.logic).clone()
    }

    /// Successor with a replaced inbound buffer.
    pub fn with_inbound(&self, inbound: Inbound) -> Entity {
        Entity {
            inbound,
            ..self.clone()
        }
    }

    /// Successor produced by a motion delta. Inbound buffers start empty.
    pub fn successor(
        &self,
        destination: Vec3,
        appearances: Appearances,
        logic_state: LogicState,
        registry: &LogicRegistry,
    ) -> Result<Entity, LogicError> {
        Entity::from_state(
            self.id.relocated(destination),
            appearances,
            logic_state,
            registry,
        )
    }
}

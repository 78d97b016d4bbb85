use glam::Vec3;
use shardspace_common::{ClientId, EntityGuid, EntityId};

use crate::change_set::{
    Advertisement, BroadcastDelta, EntityChangeSet, Instantiation, MessageDelta, Motion, Removal,
};
use crate::contact::{Appearances, EntityContact};
use crate::context::EvolutionContext;
use crate::error::LogicError;
use crate::logic::{EntityLogic, ExecutableLogic, LogicState};
use crate::message::{ClientMessage, Message, OrderedMessage};
use crate::random::spawn_guid;

/// Receiver of a unicast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    Entity(EntityGuid),
    Client(ClientId),
}

#[derive(Debug, Clone)]
struct PendingMessage {
    target: MessageTarget,
    channel: u32,
    payload: Vec<u8>,
}

#[derive(Debug, Clone)]
struct PendingBroadcast {
    channel: u32,
    payload: Vec<u8>,
    radius: Option<f32>,
}

#[derive(Debug)]
struct PendingInstantiation {
    location: Vec3,
    appearances: Appearances,
    logic: Box<dyn EntityLogic>,
}

/// Everything one entity asked for during one evolution step.
///
/// Bound to a single entity for its whole life. Nothing here touches the pool
/// directly; [`Actions::apply_to`] turns the requests into change-set deltas.
#[derive(Debug)]
pub struct Actions {
    origin: EntityId,
    new_position: Option<Vec3>,
    messages: Vec<PendingMessage>,
    broadcasts: Vec<PendingBroadcast>,
    instantiations: Vec<PendingInstantiation>,
    kills: Vec<EntityId>,
    appearance_delta: Appearances,
    suppress_advertisement: bool,
}

impl Actions {
    pub fn new(origin: EntityId) -> Self {
        Self {
            origin,
            new_position: None,
            messages: Vec::new(),
            broadcasts: Vec::new(),
            instantiations: Vec::new(),
            kills: Vec::new(),
            appearance_delta: Appearances::new(),
            suppress_advertisement: false,
        }
    }

    pub fn origin(&self) -> EntityId {
        self.origin
    }

    /// Request a new position. Clamped to the motion bound when applied.
    pub fn set_position(&mut self, position: Vec3) {
        self.new_position = Some(position);
    }

    pub fn send_message(&mut self, receiver: EntityGuid, channel: u32, payload: impl Into<Vec<u8>>) {
        self.messages.push(PendingMessage {
            target: MessageTarget::Entity(receiver),
            channel,
            payload: payload.into(),
        });
    }

    pub fn send_client_message(
        &mut self,
        receiver: ClientId,
        channel: u32,
        payload: impl Into<Vec<u8>>,
    ) {
        self.messages.push(PendingMessage {
            target: MessageTarget::Client(receiver),
            channel,
            payload: payload.into(),
        });
    }

    /// Broadcast to every entity within the interaction range.
    pub fn broadcast(&mut self, channel: u32, payload: impl Into<Vec<u8>>) {
        self.broadcasts.push(PendingBroadcast {
            channel,
            payload: payload.into(),
            radius: None,
        });
    }

    /// Broadcast with a smaller radius. Never exceeds the interaction range.
    pub fn broadcast_within(&mut self, channel: u32, payload: impl Into<Vec<u8>>, radius: f32) {
        self.broadcasts.push(PendingBroadcast {
            channel,
            payload: payload.into(),
            radius: Some(radius),
        });
    }

    pub fn instantiate(
        &mut self,
        location: Vec3,
        appearances: Appearances,
        logic: Box<dyn EntityLogic>,
    ) {
        self.instantiations.push(PendingInstantiation {
            location,
            appearances,
            logic,
        });
    }

    pub fn kill(&mut self, target: EntityId) {
        self.kills.push(target);
    }

    /// Add or replace an appearance attribute.
    pub fn set_appearance(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.appearance_delta.set(key, value);
    }

    /// Skip the "I moved" advertisement this step. Widens the motion bound
    /// from M to R at the cost of slower presence propagation.
    pub fn suppress_advertisement(&mut self) {
        self.suppress_advertisement = true;
    }

    pub fn is_advertisement_suppressed(&self) -> bool {
        self.suppress_advertisement
    }

    /// Convert the accumulated requests into deltas.
    ///
    /// The motion delta always carries `successor`, the behavior state after
    /// this step: motion is the only vehicle for logic-state updates, so every
    /// evolved entity emits exactly one, even when it stays in place.
    pub fn apply_to(
        self,
        change_set: &mut EntityChangeSet,
        current_appearances: &Appearances,
        successor: LogicState,
        ctx: &EvolutionContext<'_>,
    ) -> Result<(), LogicError> {
        let origin = self.origin;
        let bound = ctx.config.motion_bound(self.suppress_advertisement);
        let requested = self.new_position.unwrap_or(origin.position);
        let destination = ctx
            .world
            .clamp_inside(clamp_distance("motion", origin.position, requested, bound));
        let appearances = current_appearances.merged(&self.appearance_delta);
        let moved = origin.relocated(destination);

        change_set.add_motion(Motion {
            origin,
            destination,
            appearances: appearances.clone(),
            logic: successor,
        });

        if !self.suppress_advertisement {
            change_set.add_advertisement(Advertisement {
                contact: EntityContact::new(moved, appearances, destination - origin.position),
            });
        }

        for (index, spawn) in self.instantiations.into_iter().enumerate() {
            let location = ctx
                .world
                .clamp_inside(clamp_distance("instantiation", destination, spawn.location, bound));
            let guid = spawn_guid(origin.guid, ctx.generation, index as u32);
            let logic = ExecutableLogic::fresh(spawn.logic).state()?;
            change_set.add_instantiation(Instantiation {
                origin,
                created: EntityId::new(guid, location),
                appearances: spawn.appearances,
                logic,
            });
        }

        for target in self.kills {
            if within_reach("kill", destination, target.position, bound) {
                change_set.add_removal(Removal { origin, target });
            }
        }

        let mut order_index = 0u32;
        for pending in self.messages {
            match pending.target {
                MessageTarget::Client(receiver) => {
                    ctx.client_sink.relay(ClientMessage {
                        sender: moved,
                        order_index,
                        receiver,
                        channel: pending.channel,
                        payload: pending.payload,
                    });
                }
                MessageTarget::Entity(receiver) => {
                    change_set.add_message(MessageDelta {
                        receiver,
                        message: OrderedMessage::new(
                            order_index,
                            Message {
                                sender: moved,
                                channel: pending.channel,
                                payload: pending.payload,
                            },
                        ),
                    });
                }
            }
            order_index += 1;
        }

        let reach = ctx.config.interaction_range;
        for pending in self.broadcasts {
            let radius = pending.radius.map_or(reach, |r| r.clamp(0.0, reach));
            change_set.add_broadcast(BroadcastDelta {
                radius,
                message: OrderedMessage::new(
                    order_index,
                    Message {
                        sender: moved,
                        channel: pending.channel,
                        payload: pending.payload,
                    },
                ),
            });
            order_index += 1;
        }

        Ok(())
    }
}

/// Clamp `to` so it lies at most `bound` away from `from`. The clamped point
/// sits exactly on the bound, along the requested direction.
pub fn clamp_distance(reason: &'static str, from: Vec3, to: Vec3, bound: f32) -> Vec3 {
    let delta = to - from;
    let distance = delta.length();
    if distance <= bound {
        return to;
    }
    tracing::debug!(reason, distance, bound, "clamping displacement to bound");
    from + delta * (bound / distance)
}

/// Whether `to` lies within `bound` of `from`; logs the rejection otherwise.
pub fn within_reach(reason: &'static str, from: Vec3, to: Vec3, bound: f32) -> bool {
    let distance = from.distance(to);
    if distance <= bound {
        return true;
    }
    tracing::debug!(reason, distance, bound, "target out of reach, request dropped");
    false
}

//! One generation's worth of deltas.
//!
//! Every collection is a `BTreeSet` over a total order keyed first by the
//! originating identity. Inserting the same deltas in any order therefore
//! yields the same set, the same canonical bytes and the same digest.

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shardspace_common::{EntityGuid, EntityId, cmp_vec3};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use crate::codec;
use crate::contact::{Appearances, EntityContact};
use crate::context::EvolutionContext;
use crate::coverage::InconsistencyCoverage;
use crate::entity::Entity;
use crate::error::{CodecError, EntityEvolutionError, IntegrityError};
use crate::logic::LogicState;
use crate::message::OrderedMessage;
use crate::pool::EntityPool;

macro_rules! order_from_ord {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }

        impl Eq for $ty {}

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
    };
}

/// Relocation plus logic-state update of one entity.
///
/// Doubles as the logic-state update vehicle: there is no separate
/// "state changed" delta, so `logic` is always the successor state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Motion {
    pub origin: EntityId,
    pub destination: Vec3,
    pub appearances: Appearances,
    pub logic: LogicState,
}

impl Ord for Motion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.origin
            .cmp(&other.origin)
            .then_with(|| cmp_vec3(self.destination, other.destination))
            .then_with(|| self.appearances.cmp(&other.appearances))
            .then_with(|| self.logic.cmp(&other.logic))
    }
}
order_from_ord!(Motion);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Removal {
    pub origin: EntityId,
    pub target: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instantiation {
    pub origin: EntityId,
    pub created: EntityId,
    pub appearances: Appearances,
    pub logic: LogicState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDelta {
    pub receiver: EntityGuid,
    pub message: OrderedMessage,
}

impl Ord for MessageDelta {
    fn cmp(&self, other: &Self) -> Ordering {
        self.message
            .sender()
            .cmp(other.message.sender())
            .then_with(|| self.message.order_index.cmp(&other.message.order_index))
            .then_with(|| self.receiver.cmp(&other.receiver))
            .then_with(|| self.message.cmp(&other.message))
    }
}
order_from_ord!(MessageDelta);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastDelta {
    /// Transmission radius, never above the interaction range.
    pub radius: f32,
    pub message: OrderedMessage,
}

impl Ord for BroadcastDelta {
    fn cmp(&self, other: &Self) -> Ordering {
        self.message
            .sender()
            .cmp(other.message.sender())
            .then_with(|| self.message.order_index.cmp(&other.message.order_index))
            .then_with(|| self.radius.total_cmp(&other.radius))
            .then_with(|| self.message.cmp(&other.message))
    }
}
order_from_ord!(BroadcastDelta);

/// "I moved" notice, fanned out as a contact to everything within S.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Advertisement {
    pub contact: EntityContact,
}

/// Counters from applying a change set to a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub removed: usize,
    pub moved: usize,
    pub immigrated: usize,
    pub emigrated: usize,
    pub instantiated: usize,
    pub messages_delivered: usize,
    pub broadcast_recipients: usize,
    pub contacts_delivered: usize,
    /// Deltas that were dropped (stale origin, duplicate identity, unknown
    /// receiver, unreachable target).
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChangeSet {
    motions: BTreeSet<Motion>,
    removals: BTreeSet<Removal>,
    instantiations: BTreeSet<Instantiation>,
    messages: BTreeSet<MessageDelta>,
    broadcasts: BTreeSet<BroadcastDelta>,
    advertisements: BTreeSet<Advertisement>,
}

impl EntityChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_motion(&mut self, motion: Motion) {
        self.motions.insert(motion);
    }

    pub fn add_removal(&mut self, removal: Removal) {
        self.removals.insert(removal);
    }

    pub fn add_instantiation(&mut self, instantiation: Instantiation) {
        self.instantiations.insert(instantiation);
    }

    pub fn add_message(&mut self, message: MessageDelta) {
        self.messages.insert(message);
    }

    pub fn add_broadcast(&mut self, broadcast: BroadcastDelta) {
        self.broadcasts.insert(broadcast);
    }

    pub fn add_advertisement(&mut self, advertisement: Advertisement) {
        self.advertisements.insert(advertisement);
    }

    pub fn motions(&self) -> impl Iterator<Item = &Motion> {
        self.motions.iter()
    }

    pub fn removals(&self) -> impl Iterator<Item = &Removal> {
        self.removals.iter()
    }

    pub fn instantiations(&self) -> impl Iterator<Item = &Instantiation> {
        self.instantiations.iter()
    }

    pub fn messages(&self) -> impl Iterator<Item = &MessageDelta> {
        self.messages.iter()
    }

    pub fn broadcasts(&self) -> impl Iterator<Item = &BroadcastDelta> {
        self.broadcasts.iter()
    }

    pub fn advertisements(&self) -> impl Iterator<Item = &Advertisement> {
        self.advertisements.iter()
    }

    pub fn len(&self) -> usize {
        self.motions.len()
            + self.removals.len()
            + self.instantiations.len()
            + self.messages.len()
            + self.broadcasts.len()
            + self.advertisements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union with another set, e.g. a neighbor's boundary deltas.
    pub fn include(&mut self, other: &EntityChangeSet) {
        self.motions.extend(other.motions.iter().cloned());
        self.removals.extend(other.removals.iter().cloned());
        self.instantiations
            .extend(other.instantiations.iter().cloned());
        self.messages.extend(other.messages.iter().cloned());
        self.broadcasts.extend(other.broadcasts.iter().cloned());
        self.advertisements
            .extend(other.advertisements.iter().cloned());
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::to_cbor(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        codec::from_cbor(data)
    }

    /// SHA-256 over the canonical bytes; equal across replicas that computed
    /// the same deltas.
    pub fn digest(&self) -> Result<String, CodecError> {
        Ok(codec::sha256_hex(&self.canonical_bytes()?))
    }

    /// Batch entry point: evolve every entity in `pool` into this set.
    ///
    /// Returns the per-entity failures (possibly empty). The generation
    /// always completes for the remaining entities.
    pub fn evolve(
        &mut self,
        pool: &EntityPool,
        ic: &mut InconsistencyCoverage,
        generation: u64,
        budget: Duration,
        ctx: &EvolutionContext<'_>,
    ) -> Result<Vec<EntityEvolutionError>, IntegrityError> {
        if generation != ctx.generation {
            return Err(IntegrityError::GenerationMismatch {
                context: ctx.generation,
                requested: generation,
            });
        }
        pool.evolve(self, ic, budget, ctx)
    }

    /// Apply every delta to `pool`, producing the entities of the next
    /// generation, then dispatch inbound buffers.
    ///
    /// Order: removals, motions (including migration in and out of the
    /// shard), instantiations, then messages, broadcasts and contacts fanned
    /// out in parallel against the post-motion positions.
    pub fn execute(
        &self,
        pool: &EntityPool,
        ctx: &EvolutionContext<'_>,
    ) -> Result<ExecutionReport, IntegrityError> {
        let _span = tracing::info_span!("execute_change_set", generation = ctx.generation).entered();
        let mut report = ExecutionReport::default();
        let own = ctx.geometry;

        let mut removed: HashSet<EntityGuid> = HashSet::new();
        for removal in &self.removals {
            if pool.remove(&removal.target) {
                removed.insert(removal.target.guid);
                report.removed += 1;
            } else {
                tracing::debug!(target_id = %removal.target, "removal target absent or moved");
                report.rejected += 1;
            }
        }

        for motion in &self.motions {
            if removed.contains(&motion.origin.guid) {
                continue;
            }
            match pool.get(motion.origin.guid) {
                Some(current) if current.id() == motion.origin => {
                    let next = match current.successor(
                        motion.destination,
                        motion.appearances.clone(),
                        motion.logic.clone(),
                        ctx.registry,
                    ) {
                        Ok(next) => next,
                        Err(err) => {
                            tracing::warn!(entity = %motion.origin, %err, "motion dropped");
                            report.rejected += 1;
                            continue;
                        }
                    };
                    if !own.contains(motion.destination) {
                        pool.remove(&motion.origin);
                        report.emigrated += 1;
                    } else if pool.update(&motion.origin, next)? {
                        report.moved += 1;
                    } else {
                        report.rejected += 1;
                    }
                }
                Some(_) => {
                    tracing::debug!(entity = %motion.origin, "motion origin is stale");
                    report.rejected += 1;
                }
                None => {
                    // Arrivals from a neighbor: origin outside, destination inside.
                    if own.contains(motion.origin.position) || !own.contains(motion.destination) {
                        continue;
                    }
                    match Entity::from_state(
                        motion.origin.relocated(motion.destination),
                        motion.appearances.clone(),
                        motion.logic.clone(),
                        ctx.registry,
                    ) {
                        Ok(entity) => {
                            if pool.insert(entity) {
                                report.immigrated += 1;
                            } else {
                                report.rejected += 1;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(entity = %motion.origin, %err, "arrival dropped");
                            report.rejected += 1;
                        }
                    }
                }
            }
        }

        for spawn in &self.instantiations {
            if !own.contains(spawn.created.position) {
                continue;
            }
            match Entity::from_state(
                spawn.created,
                spawn.appearances.clone(),
                spawn.logic.clone(),
                ctx.registry,
            ) {
                Ok(entity) => {
                    if pool.insert(entity) {
                        report.instantiated += 1;
                    } else {
                        tracing::debug!(entity = %spawn.created, "duplicate instantiation rejected");
                        report.rejected += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(entity = %spawn.created, %err, "instantiation dropped");
                    report.rejected += 1;
                }
            }
        }

        let delivered: usize = self
            .messages
            .par_iter()
            .filter(|m| {
                pool.relay_message(m.message.sender().position, m.receiver, m.message.clone())
            })
            .count();
        report.messages_delivered = delivered;
        report.rejected += self.messages.len() - delivered;

        report.broadcast_recipients = self
            .broadcasts
            .par_iter()
            .map(|b| {
                pool.broadcast_message_within(b.message.sender().position, b.message.clone(), b.radius)
            })
            .sum();

        report.contacts_delivered = self
            .advertisements
            .par_iter()
            .map(|a| pool.add_contact(a.contact.clone()))
            .sum();

        pool.dispatch_all();

        tracing::trace!(
            moved = report.moved,
            removed = report.removed,
            instantiated = report.instantiated,
            delivered = report.messages_delivered,
            rejected = report.rejected,
            "change set executed"
        );
        Ok(report)
    }
}

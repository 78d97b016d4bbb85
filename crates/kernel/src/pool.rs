//! Concurrent home of the shard's entities during one generation.
//!
//! Lock order is `LazyIndex` gate, then the slot map, then a slot's own
//! mutexes. Writers that change structure only bump the index epoch
//! while holding the slot map, so a rebuild in progress never blocks them
//! on the gate.

use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use shardspace_common::{EntityGuid, EntityId, ShardConfig};
use shardspace_spatial::{KdTree, LazyIndex};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actions::Actions;
use crate::change_set::{EntityChangeSet, Motion};
use crate::contact::EntityContact;
use crate::context::EvolutionContext;
use crate::coverage::InconsistencyCoverage;
use crate::entity::{Entity, Inbound};
use crate::error::{EntityEvolutionError, EvolutionFailure, IntegrityError};
use crate::message::OrderedMessage;
use crate::random::entity_rng;

struct Slot {
    entity: Mutex<Entity>,
    /// Keyed by (sender guid, order index) so redelivery is idempotent.
    messages: Mutex<BTreeMap<(EntityGuid, u32), OrderedMessage>>,
    /// Keyed by the advertised entity's guid; greatest contact wins.
    contacts: Mutex<HashMap<EntityGuid, EntityContact>>,
}

impl Slot {
    fn new(entity: Entity) -> Self {
        Self {
            entity: Mutex::new(entity),
            messages: Mutex::new(BTreeMap::new()),
            contacts: Mutex::new(HashMap::new()),
        }
    }

    fn position(&self) -> Vec3 {
        self.entity.lock().position()
    }
}

enum Outcome {
    Evolved(EntityChangeSet),
    Held(Motion, EntityEvolutionError),
}

pub struct EntityPool {
    slots: RwLock<HashMap<EntityGuid, Arc<Slot>>>,
    index: LazyIndex<EntityGuid>,
    sensor_range: f32,
    interaction_range: f32,
}

impl EntityPool {
    pub fn new(config: &ShardConfig) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            index: LazyIndex::new(),
            sensor_range: config.sensor_range,
            interaction_range: config.interaction_range,
        }
    }

    /// Pool seeded with `entities`. Duplicate guids after the first are dropped.
    pub fn with_entities(config: &ShardConfig, entities: impl IntoIterator<Item = Entity>) -> Self {
        let pool = Self::new(config);
        for entity in entities {
            pool.insert(entity);
        }
        pool
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, guid: EntityGuid) -> bool {
        self.slots.read().contains_key(&guid)
    }

    pub fn get(&self, guid: EntityGuid) -> Option<Entity> {
        let slot = self.slot(guid)?;
        let entity = slot.entity.lock().clone();
        Some(entity)
    }

    /// Every entity, ordered by id.
    pub fn entities_sorted(&self) -> Vec<Entity> {
        let slots: Vec<Arc<Slot>> = self.slots.read().values().cloned().collect();
        let mut entities: Vec<Entity> = slots.iter().map(|s| s.entity.lock().clone()).collect();
        entities.sort_by_key(Entity::id);
        entities
    }

    /// Add an entity. False if its guid is already present.
    pub fn insert(&self, entity: Entity) -> bool {
        let guid = entity.guid();
        let mut slots = self.slots.write();
        if slots.contains_key(&guid) {
            tracing::debug!(entity = %entity.id(), "duplicate insert rejected");
            return false;
        }
        slots.insert(guid, Arc::new(Slot::new(entity)));
        self.index.invalidate();
        true
    }

    /// Remove the entity only if it is still exactly `id` (same position).
    pub fn remove(&self, id: &EntityId) -> bool {
        self.remove_if(id.guid, |entity| entity.id() == *id)
    }

    /// Remove `guid` if `predicate` accepts its current value. The check and
    /// the removal happen under one write lock, so a rejected entity is
    /// never observably absent.
    pub fn remove_if(&self, guid: EntityGuid, predicate: impl FnOnce(&Entity) -> bool) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get(&guid) else {
            return false;
        };
        if !predicate(&slot.entity.lock()) {
            return false;
        }
        slots.remove(&guid);
        self.index.invalidate();
        true
    }

    /// Replace the entity currently at `old` with `new`.
    ///
    /// Returns false when `old` is stale (the entity is gone or has moved).
    /// The index is invalidated only if the position changed.
    pub fn update(&self, old: &EntityId, new: Entity) -> Result<bool, IntegrityError> {
        if old.guid != new.guid() {
            return Err(IntegrityError::ContainerMismatch {
                slot: old.guid,
                entity: new.guid(),
            });
        }
        let Some(slot) = self.slot(old.guid) else {
            return Ok(false);
        };
        let mut current = slot.entity.lock();
        if current.id() != *old {
            return Ok(false);
        }
        let moved = current.position() != new.position();
        *current = new;
        if moved {
            self.index.invalidate();
        }
        Ok(true)
    }

    /// The current spatial index, rebuilt first if anything moved.
    pub fn spatial_index(&self) -> Arc<KdTree<EntityGuid>> {
        self.index.current(|| {
            self.slots
                .read()
                .iter()
                .map(|(guid, slot)| (slot.position(), *guid))
                .collect()
        })
    }

    /// Guids of entities within `radius` of `center`.
    pub fn find_within(&self, center: Vec3, radius: f32) -> Vec<EntityGuid> {
        self.spatial_index()
            .within_radius(center, radius)
            .into_iter()
            .copied()
            .collect()
    }

    /// Fan a contact out to every entity within S of it, except itself.
    /// Returns the number of entities that received it.
    pub fn add_contact(&self, contact: EntityContact) -> usize {
        let origin = contact.id.guid;
        let mut reached = 0;
        for guid in self.find_within(contact.position(), self.sensor_range) {
            if guid == origin {
                continue;
            }
            let Some(slot) = self.slot(guid) else {
                continue;
            };
            let mut contacts = slot.contacts.lock();
            match contacts.get(&origin) {
                Some(existing) if *existing >= contact => {}
                _ => {
                    contacts.insert(origin, contact.clone());
                }
            }
            reached += 1;
        }
        reached
    }

    /// Queue `message` for `receiver` if it exists and lies within R of
    /// `sender_position`. Redelivering the same (sender, order index) is a
    /// successful no-op.
    pub fn relay_message(
        &self,
        sender_position: Vec3,
        receiver: EntityGuid,
        message: OrderedMessage,
    ) -> bool {
        let Some(slot) = self.slot(receiver) else {
            tracing::debug!(%receiver, "relay to unknown receiver");
            return false;
        };
        let distance = slot.position().distance(sender_position);
        if distance > self.interaction_range {
            tracing::debug!(%receiver, distance, range = self.interaction_range, "relay out of range");
            return false;
        }
        let key = (message.sender().guid, message.order_index);
        slot.messages.lock().entry(key).or_insert(message);
        true
    }

    /// Deliver to every other entity within R. Returns the recipient count.
    pub fn broadcast_message(&self, sender_position: Vec3, message: OrderedMessage) -> usize {
        self.broadcast_message_within(sender_position, message, self.interaction_range)
    }

    /// As [`Self::broadcast_message`] with a radius capped at R.
    pub fn broadcast_message_within(
        &self,
        sender_position: Vec3,
        message: OrderedMessage,
        radius: f32,
    ) -> usize {
        let sender = message.sender().guid;
        let key = (sender, message.order_index);
        let radius = radius.min(self.interaction_range);
        let mut recipients = 0;
        for guid in self.find_within(sender_position, radius) {
            if guid == sender {
                continue;
            }
            if let Some(slot) = self.slot(guid) {
                slot.messages
                    .lock()
                    .entry(key)
                    .or_insert_with(|| message.clone());
                recipients += 1;
            }
        }
        recipients
    }

    /// Drain every entity's pending queues into its inbound buffers.
    ///
    /// Messages are ordered by (order index, sender), contacts by identity.
    /// Entities with nothing pending end up with empty buffers.
    pub fn dispatch_all(&self) {
        let slots: Vec<Arc<Slot>> = self.slots.read().values().cloned().collect();
        slots.par_iter().for_each(|slot| {
            let messages = std::mem::take(&mut *slot.messages.lock());
            let contacts = std::mem::take(&mut *slot.contacts.lock());

            let mut messages: Vec<OrderedMessage> = messages.into_values().collect();
            messages.sort_by(|a, b| {
                a.order_index
                    .cmp(&b.order_index)
                    .then_with(|| a.sender().cmp(b.sender()))
            });
            let mut contacts: Vec<EntityContact> = contacts.into_values().collect();
            contacts.sort();

            let mut entity = slot.entity.lock();
            *entity = entity.with_inbound(Inbound { messages, contacts });
        });
    }

    /// Run every entity's logic for `ctx.generation` in parallel and collect
    /// the resulting deltas into `change_set`.
    ///
    /// Each entity sees only its own frozen state and inbound buffers. A
    /// failing, panicking or late entity is held in place with its bookkeeping
    /// advanced and reported in the returned list; late entities also flag
    /// their IC cell. An integrity fault from any entity aborts the step.
    pub fn evolve(
        &self,
        change_set: &mut EntityChangeSet,
        ic: &mut InconsistencyCoverage,
        budget: Duration,
        ctx: &EvolutionContext<'_>,
    ) -> Result<Vec<EntityEvolutionError>, IntegrityError> {
        let entities = self.entities_sorted();
        let _span = tracing::info_span!(
            "evolve_pool",
            generation = ctx.generation,
            entities = entities.len()
        )
        .entered();
        let deadline = Instant::now() + budget;

        let outcomes = entities
            .par_iter()
            .map(|entity| evolve_entity(entity, deadline, ctx))
            .collect::<Result<Vec<Outcome>, IntegrityError>>()?;

        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Evolved(deltas) => change_set.include(&deltas),
                Outcome::Held(motion, error) => {
                    if error.failure == EvolutionFailure::BudgetExhausted {
                        ic.mark_position(&ctx.geometry, error.entity.position);
                    }
                    tracing::warn!(entity = %error.entity, failure = %error.failure, "entity held in place");
                    change_set.add_motion(motion);
                    errors.push(error);
                }
            }
        }
        Ok(errors)
    }

    fn slot(&self, guid: EntityGuid) -> Option<Arc<Slot>> {
        self.slots.read().get(&guid).cloned()
    }
}

impl std::fmt::Debug for EntityPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityPool")
            .field("entities", &self.len())
            .field("index_stale", &self.index.is_stale())
            .finish_non_exhaustive()
    }
}

fn evolve_entity(
    entity: &Entity,
    deadline: Instant,
    ctx: &EvolutionContext<'_>,
) -> Result<Outcome, IntegrityError> {
    if Instant::now() >= deadline {
        return Ok(hold(entity, ctx, EvolutionFailure::BudgetExhausted));
    }
    let mut logic = entity.executable_logic();
    let mut actions = Actions::new(entity.id());
    let mut rng = entity_rng(entity.guid(), ctx.generation);

    let ran = catch_unwind(AssertUnwindSafe(|| {
        logic.execute(entity.guid(), &mut actions, entity, ctx.generation, &mut rng)
    }));
    let evolved = match ran {
        Err(panic) => Err(EvolutionFailure::Panicked(panic_message(panic.as_ref()))),
        Ok(Err(integrity)) => return Err(integrity),
        Ok(Ok(result)) => result.map_err(EvolutionFailure::from),
    };

    let deltas = evolved.and_then(|()| {
        let successor = logic.state()?;
        let mut deltas = EntityChangeSet::new();
        actions.apply_to(&mut deltas, entity.appearances(), successor, ctx)?;
        Ok(deltas)
    });
    Ok(match deltas {
        Ok(deltas) => Outcome::Evolved(deltas),
        Err(failure) => hold(entity, ctx, failure),
    })
}

/// Motion that keeps the entity where it is with its bookkeeping advanced,
/// so the next generation can execute it in order.
fn hold(entity: &Entity, ctx: &EvolutionContext<'_>, failure: EvolutionFailure) -> Outcome {
    let motion = Motion {
        origin: entity.id(),
        destination: entity.position(),
        appearances: entity.appearances().clone(),
        logic: entity.logic_state().held_for(ctx.generation),
    };
    Outcome::Held(
        motion,
        EntityEvolutionError {
            entity: entity.id(),
            failure,
        },
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::Appearances;
    use crate::message::Message;
    use crate::testing::{Counter, Faulty, TestWorld, counter_entity};
    use std::collections::HashSet;

    fn config() -> ShardConfig {
        ShardConfig::default()
    }

    fn message_from(sender: EntityId, order_index: u32) -> OrderedMessage {
        OrderedMessage::new(
            order_index,
            Message {
                sender,
                channel: 0,
                payload: vec![order_index as u8],
            },
        )
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let pool = EntityPool::new(&config());
        let entity = counter_entity(Vec3::splat(0.5));
        assert!(pool.insert(entity.clone()));
        assert!(!pool.insert(entity));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn concurrent_inserts_are_not_lost() {
        let pool = EntityPool::new(&config());
        let inserted: usize = (0..1000)
            .into_par_iter()
            .map(|i| {
                let x = (i % 10) as f32 / 10.0 + 0.05;
                let y = ((i / 10) % 10) as f32 / 10.0 + 0.05;
                let z = (i / 100) as f32 / 10.0 + 0.05;
                usize::from(pool.insert(counter_entity(Vec3::new(x, y, z))))
            })
            .sum();
        assert_eq!(inserted, 1000);
        assert_eq!(pool.len(), 1000);
        let guids: HashSet<EntityGuid> = pool.entities_sorted().iter().map(Entity::guid).collect();
        assert_eq!(guids.len(), 1000);
        assert_eq!(pool.spatial_index().len(), 1000);
    }

    #[test]
    fn remove_requires_current_position() {
        let pool = EntityPool::new(&config());
        let entity = counter_entity(Vec3::splat(0.5));
        pool.insert(entity.clone());
        let stale = entity.id().relocated(Vec3::ZERO);
        assert!(!pool.remove(&stale));
        assert!(pool.remove(&entity.id()));
        assert!(!pool.remove(&entity.id()));
        assert!(pool.is_empty());
    }

    #[test]
    fn remove_if_keeps_rejected_entity() {
        let pool = EntityPool::new(&config());
        let entity = counter_entity(Vec3::splat(0.5));
        pool.insert(entity.clone());
        assert!(!pool.remove_if(entity.guid(), |_| false));
        assert!(pool.contains(entity.guid()));
        assert!(pool.remove_if(entity.guid(), |e| e.position() == Vec3::splat(0.5)));
        assert!(!pool.contains(entity.guid()));
    }

    #[test]
    fn update_invalidates_index_only_on_motion() {
        let pool = EntityPool::new(&config());
        let entity = counter_entity(Vec3::splat(0.5));
        pool.insert(entity.clone());
        pool.spatial_index();
        assert!(!pool.index.is_stale());

        let same_place = entity.with_inbound(Inbound::default());
        assert!(pool.update(&entity.id(), same_place).unwrap());
        assert!(!pool.index.is_stale());

        let registry = crate::testing::registry();
        let moved = entity
            .successor(
                Vec3::splat(0.6),
                Appearances::new(),
                entity.logic_state().clone(),
                &registry,
            )
            .unwrap();
        assert!(pool.update(&entity.id(), moved.clone()).unwrap());
        assert!(pool.index.is_stale());
        assert_eq!(pool.find_within(Vec3::splat(0.6), 0.01), vec![entity.guid()]);

        // The old id is stale now.
        assert!(!pool.update(&entity.id(), moved).unwrap());
    }

    #[test]
    fn update_with_foreign_entity_is_integrity_fault() {
        let pool = EntityPool::new(&config());
        let a = counter_entity(Vec3::splat(0.5));
        let b = counter_entity(Vec3::splat(0.4));
        pool.insert(a.clone());
        assert!(matches!(
            pool.update(&a.id(), b),
            Err(IntegrityError::ContainerMismatch { .. })
        ));
    }

    #[test]
    fn relay_checks_range_and_is_idempotent() {
        let pool = EntityPool::new(&config());
        let sender = counter_entity(Vec3::new(0.1, 0.5, 0.5));
        let near = counter_entity(Vec3::new(0.3, 0.5, 0.5));
        let far = counter_entity(Vec3::new(0.9, 0.5, 0.5));
        for e in [&sender, &near, &far] {
            pool.insert(e.clone());
        }

        let msg = message_from(sender.id(), 0);
        assert!(!pool.relay_message(sender.position(), far.guid(), msg.clone()));
        assert!(!pool.relay_message(sender.position(), EntityGuid::new(), msg.clone()));
        assert!(pool.relay_message(sender.position(), near.guid(), msg.clone()));
        assert!(pool.relay_message(sender.position(), near.guid(), msg.clone()));

        pool.dispatch_all();
        assert_eq!(pool.get(near.guid()).unwrap().inbound().messages, vec![msg]);
        assert!(pool.get(far.guid()).unwrap().inbound().messages.is_empty());
    }

    #[test]
    fn broadcast_reaches_others_within_radius() {
        let pool = EntityPool::new(&config());
        let sender = counter_entity(Vec3::new(0.5, 0.5, 0.5));
        let close = counter_entity(Vec3::new(0.55, 0.5, 0.5));
        let mid = counter_entity(Vec3::new(0.8, 0.5, 0.5));
        let far = counter_entity(Vec3::new(0.95, 0.95, 0.95));
        for e in [&sender, &close, &mid, &far] {
            pool.insert(e.clone());
        }
        assert_eq!(pool.broadcast_message(sender.position(), message_from(sender.id(), 0)), 2);
        assert_eq!(
            pool.broadcast_message_within(sender.position(), message_from(sender.id(), 1), 0.1),
            1
        );
        // Radius is capped at R.
        assert_eq!(
            pool.broadcast_message_within(sender.position(), message_from(sender.id(), 2), 10.0),
            2
        );
        pool.dispatch_all();
        let inbound = pool.get(close.guid()).unwrap().inbound().clone();
        let order: Vec<u32> = inbound.messages.iter().map(|m| m.order_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(pool.get(sender.guid()).unwrap().inbound().is_empty());
    }

    #[test]
    fn contacts_converge_on_greatest_value() {
        let pool = EntityPool::new(&config());
        let observer = counter_entity(Vec3::new(0.5, 0.5, 0.5));
        pool.insert(observer.clone());
        let mover = EntityId::new(EntityGuid::new(), Vec3::new(0.6, 0.5, 0.5));
        let slow = EntityContact::new(mover, Appearances::new(), Vec3::X * 0.01);
        let fast = EntityContact::new(mover, Appearances::new(), Vec3::X * 0.05);

        for order in [[&slow, &fast], [&fast, &slow]] {
            for contact in order {
                assert_eq!(pool.add_contact(contact.clone()), 1);
            }
            pool.dispatch_all();
            let contacts = pool.get(observer.guid()).unwrap().inbound().contacts.clone();
            assert_eq!(contacts, vec![fast.clone()]);
        }
    }

    #[test]
    fn contact_does_not_reach_its_origin_or_far_entities() {
        let pool = EntityPool::new(&config());
        let origin = counter_entity(Vec3::new(0.1, 0.1, 0.1));
        let far = counter_entity(Vec3::new(0.9, 0.9, 0.9));
        pool.insert(origin.clone());
        pool.insert(far.clone());
        let contact = EntityContact::new(origin.id(), Appearances::new(), Vec3::ZERO);
        assert_eq!(pool.add_contact(contact), 0);
    }

    #[test]
    fn evolve_isolates_failing_entities() {
        let world = TestWorld::new(config());
        let ctx = world.context(1);
        let good = counter_entity(Vec3::new(0.2, 0.5, 0.5));
        let failing = Entity::new(
            EntityId::new(EntityGuid::new(), Vec3::new(0.4, 0.5, 0.5)),
            Appearances::new(),
            Box::new(Faulty { panic: false }),
        )
        .unwrap();
        let panicking = Entity::new(
            EntityId::new(EntityGuid::new(), Vec3::new(0.6, 0.5, 0.5)),
            Appearances::new(),
            Box::new(Faulty { panic: true }),
        )
        .unwrap();
        let pool = EntityPool::with_entities(
            &world.config,
            [good.clone(), failing.clone(), panicking.clone()],
        );

        let mut cs = EntityChangeSet::new();
        let mut ic = InconsistencyCoverage::new(world.config.ic_resolution);
        let errors = pool
            .evolve(&mut cs, &mut ic, Duration::from_secs(10), &ctx)
            .unwrap();

        let failed: HashSet<EntityGuid> = errors.iter().map(|e| e.entity.guid).collect();
        assert_eq!(failed, HashSet::from([failing.guid(), panicking.guid()]));
        assert!(errors.iter().any(|e| matches!(e.failure, EvolutionFailure::Panicked(_))));
        assert!(ic.is_fully_consistent());

        // Every entity still has exactly one motion, held ones in place.
        assert_eq!(cs.motions().count(), 3);
        let held = cs.motions().find(|m| m.origin == failing.id()).unwrap();
        assert_eq!(held.destination, failing.position());
        assert_eq!(held.logic.generation, 3);
        let advanced = cs.motions().find(|m| m.origin == good.id()).unwrap();
        assert_eq!(advanced.logic.generation, 3);
        assert_eq!(cs.advertisements().count(), 1);
    }

    #[test]
    fn exhausted_budget_holds_and_marks_coverage() {
        let world = TestWorld::new(config());
        let ctx = world.context(1);
        let entity = counter_entity(Vec3::splat(0.5));
        let pool = EntityPool::with_entities(&world.config, [entity.clone()]);

        let mut cs = EntityChangeSet::new();
        let mut ic = InconsistencyCoverage::new(world.config.ic_resolution);
        let errors = pool.evolve(&mut cs, &mut ic, Duration::ZERO, &ctx).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].failure, EvolutionFailure::BudgetExhausted);
        assert!(ic.is_inconsistent_at(&ctx.geometry, entity.position()));
        assert_eq!(ic.population_count(), 1);
    }

    #[test]
    fn evolving_same_generation_twice_is_integrity_fault() {
        let world = TestWorld::new(config());
        let entity = counter_entity(Vec3::splat(0.5));
        let pool = EntityPool::with_entities(&world.config, [entity.clone()]);
        let mut ic = InconsistencyCoverage::new(world.config.ic_resolution);

        let mut cs = EntityChangeSet::new();
        pool.evolve(&mut cs, &mut ic, Duration::from_secs(10), &world.context(4))
            .unwrap();
        cs.execute(&pool, &world.context(4)).unwrap();

        let mut again = EntityChangeSet::new();
        let err = pool
            .evolve(&mut again, &mut ic, Duration::from_secs(10), &world.context(4))
            .unwrap_err();
        assert!(matches!(err, IntegrityError::OutOfOrderExecution { requested: 4, .. }));

        let mut next = EntityChangeSet::new();
        assert!(
            pool.evolve(&mut next, &mut ic, Duration::from_secs(10), &world.context(5))
                .is_ok()
        );
    }

    #[test]
    fn evolution_is_deterministic_across_pools() {
        let world = TestWorld::new(config());
        let ctx = world.context(1);
        let entities: Vec<Entity> = (0..20)
            .map(|i| {
                let t = i as f32 / 20.0 + 0.01;
                Entity::new(
                    EntityId::new(
                        EntityGuid::from_random_bytes([i as u8; 16]),
                        Vec3::new(t, 1.0 - t, 0.5),
                    ),
                    Appearances::new(),
                    Box::new(Counter::default()),
                )
                .unwrap()
            })
            .collect();

        let digest = |entities: Vec<Entity>| {
            let pool = EntityPool::with_entities(&world.config, entities);
            let mut cs = EntityChangeSet::new();
            let mut ic = InconsistencyCoverage::new(world.config.ic_resolution);
            pool.evolve(&mut cs, &mut ic, Duration::from_secs(10), &ctx)
                .unwrap();
            cs.digest().unwrap()
        };
        let mut reversed = entities.clone();
        reversed.reverse();
        assert_eq!(digest(entities), digest(reversed));
    }

    #[test]
    fn generation_mismatch_is_rejected() {
        let world = TestWorld::new(config());
        let pool = EntityPool::new(&world.config);
        let mut cs = EntityChangeSet::new();
        let mut ic = InconsistencyCoverage::new(world.config.ic_resolution);
        let err = cs
            .evolve(&pool, &mut ic, 3, Duration::from_secs(1), &world.context(2))
            .unwrap_err();
        assert_eq!(
            err,
            IntegrityError::GenerationMismatch {
                context: 2,
                requested: 3
            }
        );
    }
}

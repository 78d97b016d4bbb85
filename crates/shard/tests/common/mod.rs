//! Behaviors and a small in-process cluster shared by the shard integration tests.
#![allow(dead_code)]

use anyhow::Context;
use glam::Vec3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shardspace_boundary::BoundaryOutbox;
use shardspace_common::{ClientId, EntityGuid, EntityId, ShardConfig, ShardCoord};
use shardspace_kernel::{
    Actions, Appearances, Entity, EntityLogic, EntityRng, LogicError, LogicRegistry, SerialEntity,
    decode_state, encode_state,
};
use shardspace_persist::Sds;
use shardspace_shard::{GenerationReport, Shard};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Moves by a fixed velocity every generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Walker {
    pub velocity: [f32; 3],
}

impl EntityLogic for Walker {
    fn kind(&self) -> &'static str {
        "walker"
    }

    fn evolve(
        &mut self,
        actions: &mut Actions,
        current: &Entity,
        _generation: u64,
        _rng: &mut EntityRng,
    ) -> Result<(), LogicError> {
        actions.set_position(current.position() + Vec3::from(self.velocity));
        Ok(())
    }

    fn serialize_state(&self) -> Result<Vec<u8>, LogicError> {
        encode_state(self)
    }

    fn boxed_clone(&self) -> Box<dyn EntityLogic> {
        Box::new(self.clone())
    }
}

/// Sends the current generation to a peer and a client every step, and
/// remembers every message and contact it was handed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chatter {
    pub peer: Option<EntityGuid>,
    pub client: Option<ClientId>,
    pub heard: Vec<(u64, Vec<u8>)>,
    pub sensed: Vec<(u64, EntityGuid)>,
}

impl EntityLogic for Chatter {
    fn kind(&self) -> &'static str {
        "chatter"
    }

    fn evolve(
        &mut self,
        actions: &mut Actions,
        current: &Entity,
        generation: u64,
        _rng: &mut EntityRng,
    ) -> Result<(), LogicError> {
        let inbound = current.inbound();
        for message in &inbound.messages {
            self.heard.push((generation, message.message.payload.clone()));
        }
        for contact in &inbound.contacts {
            self.sensed.push((generation, contact.id.guid));
        }
        if let Some(peer) = self.peer {
            actions.send_message(peer, 1, generation.to_le_bytes());
        }
        if let Some(client) = self.client {
            actions.send_client_message(client, 7, generation.to_le_bytes());
        }
        Ok(())
    }

    fn serialize_state(&self) -> Result<Vec<u8>, LogicError> {
        encode_state(self)
    }

    fn boxed_clone(&self) -> Box<dyn EntityLogic> {
        Box::new(self.clone())
    }
}

/// Panics on one chosen generation and idles otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volatile {
    pub panic_at: u64,
    pub steps: u64,
}

impl EntityLogic for Volatile {
    fn kind(&self) -> &'static str {
        "volatile"
    }

    fn evolve(
        &mut self,
        _actions: &mut Actions,
        _current: &Entity,
        generation: u64,
        _rng: &mut EntityRng,
    ) -> Result<(), LogicError> {
        if generation == self.panic_at {
            panic!("volatile behavior gave up at generation {generation}");
        }
        self.steps += 1;
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
    registry
        .register_serde::<Walker>("walker")
        .register_serde::<Chatter>("chatter")
        .register_serde::<Volatile>("volatile");
    registry
}

/// Reproducible guid, so independent runs agree on entity identity.
pub fn guid(tag: u8) -> EntityGuid {
    EntityGuid::from_random_bytes([tag; 16])
}

pub fn entity(tag: u8, position: Vec3, logic: impl EntityLogic + 'static) -> Entity {
    Entity::new(
        EntityId::new(guid(tag), position),
        Appearances::new(),
        Box::new(logic),
    )
    .expect("fresh behavior serializes")
}

pub fn at(x: f32) -> Vec3 {
    Vec3::new(x, 0.5, 0.5)
}

pub fn find(sds: &Sds, guid: EntityGuid) -> Option<&SerialEntity> {
    sds.entities.iter().find(|e| e.id.guid == guid)
}

pub fn state_of<T: DeserializeOwned>(sds: &Sds, guid: EntityGuid) -> anyhow::Result<T> {
    let entity = find(sds, guid).with_context(|| format!("{guid} not in generation {}", sds.generation))?;
    Ok(decode_state(&entity.logic.data)?)
}

/// Two shards side by side along x.
pub fn pair_config() -> ShardConfig {
    ShardConfig {
        world_extent: ShardCoord::new(2, 1, 1),
        ..ShardConfig::default()
    }
}

/// Every shard of a world, wired to one in-process boundary outbox.
pub struct Cluster {
    pub config: ShardConfig,
    pub outbox: Arc<BoundaryOutbox>,
    pub shards: BTreeMap<ShardCoord, Shard>,
}

/// Delivery rounds after which a boundary exchange is considered stuck.
const MAX_ROUNDS: usize = 64;

impl Cluster {
    pub fn new(config: ShardConfig) -> anyhow::Result<Self> {
        let outbox = Arc::new(BoundaryOutbox::new());
        let extent = config.world_extent;
        let mut shards = BTreeMap::new();
        for x in 0..extent.x {
            for y in 0..extent.y {
                for z in 0..extent.z {
                    let coord = ShardCoord::new(x, y, z);
                    let shard = Shard::new(coord, config.clone(), registry(), outbox.clone())?;
                    shards.insert(coord, shard);
                }
            }
        }
        Ok(Self {
            config,
            outbox,
            shards,
        })
    }

    /// Hand every entity to the shard owning its position and seed them all.
    pub fn seed(&mut self, entities: Vec<Entity>) -> anyhow::Result<()> {
        let mut owned: BTreeMap<ShardCoord, Vec<Entity>> = BTreeMap::new();
        for entity in entities {
            let coord = self
                .config
                .shard_of(entity.position())
                .context("seed entity outside the world")?;
            owned.entry(coord).or_default().push(entity);
        }
        for (coord, shard) in &mut self.shards {
            shard.seed(owned.remove(coord).unwrap_or_default())?;
        }
        Ok(())
    }

    pub fn shard(&self, coord: ShardCoord) -> &Shard {
        &self.shards[&coord]
    }

    /// Step every shard once, without exchanging boundary data.
    pub fn step(&mut self) -> anyhow::Result<()> {
        for shard in self.shards.values_mut() {
            shard.step()?;
        }
        Ok(())
    }

    /// Deliver queued boundary entries until no shard publishes anything new.
    pub fn deliver(&mut self) -> anyhow::Result<Vec<GenerationReport>> {
        let mut reports = Vec::new();
        for _ in 0..MAX_ROUNDS {
            let batch = self.outbox.drain();
            if batch.is_empty() {
                return Ok(reports);
            }
            for published in batch {
                let shard = self
                    .shards
                    .get_mut(&published.to)
                    .context("entry for a shard outside the world")?;
                reports.extend(shard.receive_rcs(published.from, published.entry)?);
            }
        }
        anyhow::bail!("boundary exchange did not settle after {MAX_ROUNDS} rounds")
    }

    /// Step and settle `generations` times.
    pub fn advance(&mut self, generations: u64) -> anyhow::Result<()> {
        for _ in 0..generations {
            self.step()?;
            self.deliver()?;
        }
        Ok(())
    }

    /// Latest-snapshot owners of `guid`.
    pub fn owners(&self, guid: EntityGuid) -> Vec<ShardCoord> {
        self.shards
            .iter()
            .filter(|(_, shard)| {
                shard
                    .latest_snapshot()
                    .is_some_and(|sds| find(sds, guid).is_some())
            })
            .map(|(coord, _)| *coord)
            .collect()
    }

    /// (shard, generation, digest) of every retained snapshot.
    pub fn digests(&self) -> Vec<(ShardCoord, u64, String)> {
        let mut out = Vec::new();
        for (coord, shard) in &self.shards {
            let Some(latest) = shard.latest_generation() else {
                continue;
            };
            for generation in 0..=latest {
                if let Some(sds) = shard.snapshot(generation) {
                    out.push((*coord, generation, sds.digest.clone()));
                }
            }
        }
        out
    }

    pub fn all_consistent(&self) -> bool {
        self.shards
            .values()
            .filter_map(Shard::latest_snapshot)
            .all(Sds::is_fully_consistent)
    }
}

use shardspace_boundary::{
    BoundaryChannel, RcsEntry, RcsLookup, RcsStack, extract_for_neighbors,
};
use shardspace_common::{ShardConfig, ShardCoord};
use shardspace_kernel::{
    ClientMessageLog, Entity, EntityChangeSet, EntityEvolutionError, EntityPool,
    EvolutionContext, ExecutionReport, InconsistencyCoverage, LogicRegistry,
};
use shardspace_persist::{DurableStore, Sds, SdsStack, store_snapshot};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::client::{ClientChannel, ClientRelay, NullClients};
use crate::error::ShardError;

/// Outcome of computing (or recomputing) one generation.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub generation: u64,
    pub recomputed: bool,
    /// Entities that failed, panicked or missed the budget; held in place.
    pub errors: Vec<EntityEvolutionError>,
    /// Neighbors whose boundary data was missing or inconsistent.
    pub incomplete_neighbors: BTreeSet<ShardCoord>,
    pub execution: ExecutionReport,
    pub digest: String,
    pub consistent: bool,
}

/// Drives one shard through its generations.
///
/// Generation 0 is the seed. Computing generation `g` restores the pool from
/// snapshot `g - 1`, evolves every entity, publishes the outbound boundary
/// deltas, folds in whatever neighbor deltas have arrived for `g`, and
/// applies the result. Boundary data arriving later for an already computed
/// generation recomputes it and every generation derived from it.
pub struct Shard {
    coord: ShardCoord,
    config: ShardConfig,
    registry: LogicRegistry,
    inbound: BTreeMap<ShardCoord, RcsStack>,
    snapshots: SdsStack,
    incomplete: BTreeMap<u64, BTreeSet<ShardCoord>>,
    boundary: Arc<dyn BoundaryChannel>,
    clients: Arc<dyn ClientChannel>,
    store: Option<Arc<dyn DurableStore>>,
    replica: u32,
}

impl Shard {
    pub fn new(
        coord: ShardCoord,
        config: ShardConfig,
        registry: LogicRegistry,
        boundary: Arc<dyn BoundaryChannel>,
    ) -> Result<Self, ShardError> {
        config.validate()?;
        if !coord.within(config.world_extent) {
            return Err(ShardError::OutsideWorld(coord));
        }
        let inbound = coord
            .neighbors(config.world_extent)
            .into_iter()
            .map(|n| (n, RcsStack::new(n, &config)))
            .collect();
        Ok(Self {
            coord,
            snapshots: SdsStack::new(config.max_history),
            config,
            registry,
            inbound,
            incomplete: BTreeMap::new(),
            boundary,
            clients: Arc::new(NullClients),
            store: None,
            replica: 0,
        })
    }

    pub fn with_client_channel(mut self, clients: Arc<dyn ClientChannel>) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replica index this instance records in the neighbors' destination tables.
    pub fn with_replica(mut self, replica: u32) -> Self {
        self.replica = replica;
        self
    }

    pub fn replica(&self) -> u32 {
        self.replica
    }

    pub fn coord(&self) -> ShardCoord {
        self.coord
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn neighbors(&self) -> impl Iterator<Item = ShardCoord> + '_ {
        self.inbound.keys().copied()
    }

    pub fn latest_generation(&self) -> Option<u64> {
        self.snapshots.latest().map(|s| s.generation)
    }

    pub fn latest_snapshot(&self) -> Option<&Sds> {
        self.snapshots.latest()
    }

    pub fn snapshot(&self, generation: u64) -> Option<&Sds> {
        self.snapshots.get(generation)
    }

    pub fn inbound(&self, neighbor: ShardCoord) -> Option<&RcsStack> {
        self.inbound.get(&neighbor)
    }

    /// Neighbors that were missing or inconsistent when `generation` was last computed.
    pub fn incomplete_neighbors(&self, generation: u64) -> Option<&BTreeSet<ShardCoord>> {
        self.incomplete.get(&generation)
    }

    /// Install generation 0. Entities outside the shard volume are skipped,
    /// as are duplicate guids.
    pub fn seed(&mut self, entities: impl IntoIterator<Item = Entity>) -> Result<&Sds, ShardError> {
        let geometry = self.config.shard_geometry(self.coord);
        let pool = EntityPool::new(&self.config);
        for entity in entities {
            if !geometry.contains(entity.position()) {
                tracing::warn!(entity = %entity.id(), shard = %self.coord, "seed entity outside shard skipped");
                continue;
            }
            pool.insert(entity);
        }
        let ic = InconsistencyCoverage::new(self.config.ic_resolution);
        let sds = Sds::capture(0, &pool, ic, BTreeMap::new())?;
        self.resume(sds)
    }

    /// Restart from a previously computed snapshot, discarding all history.
    pub fn resume(&mut self, sds: Sds) -> Result<&Sds, ShardError> {
        let generation = sds.generation;
        self.snapshots = SdsStack::new(self.config.max_history);
        self.incomplete.clear();
        for stack in self.inbound.values_mut() {
            *stack = RcsStack::starting_at(stack.neighbor(), generation + 1, &self.config);
        }
        self.publish_snapshot(&sds)?;
        self.snapshots.append(sds)?;
        self.snapshots
            .latest()
            .ok_or(ShardError::UnknownGeneration(generation))
    }

    /// Compute the next generation.
    pub fn step(&mut self) -> Result<GenerationReport, ShardError> {
        let next = self
            .snapshots
            .next_generation()
            .ok_or(ShardError::NotSeeded)?;
        self.compute(next, false)
    }

    /// Accept a neighbor's boundary entry.
    ///
    /// Returns the reports of any generations recomputed because of it.
    /// Entries for computed generations whose base snapshot has already been
    /// dropped are ignored. The destination table is refreshed under this
    /// shard's replica index, timestamped with the latest computed generation.
    pub fn receive_rcs(
        &mut self,
        from: ShardCoord,
        entry: RcsEntry,
    ) -> Result<Vec<GenerationReport>, ShardError> {
        let latest = self.latest_generation().ok_or(ShardError::NotSeeded)?;
        let generation = entry.generation;
        if generation > 0 && generation <= latest && self.snapshots.get(generation - 1).is_none() {
            tracing::debug!(
                shard = %self.coord,
                %from,
                generation,
                "boundary entry too old to apply"
            );
            return Ok(Vec::new());
        }
        let stack = self
            .inbound
            .get_mut(&from)
            .ok_or(ShardError::UnknownNeighbor(from))?;
        if !stack.insert(entry)? {
            return Ok(Vec::new());
        }
        let oldest = stack.oldest_generation();
        stack.destinations_mut().update(self.replica, oldest, latest);
        tracing::debug!(shard = %self.coord, %from, generation, "boundary entry received");

        if generation == 0 || generation > latest {
            return Ok(Vec::new());
        }
        self.recompute_from(generation)
    }

    /// Reconcile the retained history for `from` with another replica's view,
    /// recomputing from the first generation whose boundary data changed.
    pub fn merge_neighbor_history(
        &mut self,
        from: ShardCoord,
        other: &RcsStack,
    ) -> Result<Vec<GenerationReport>, ShardError> {
        let latest = self.latest_generation().ok_or(ShardError::NotSeeded)?;
        let first_computed = self.snapshots.oldest_generation().unwrap_or(latest) + 1;
        let stack = self
            .inbound
            .get(&from)
            .ok_or(ShardError::UnknownNeighbor(from))?;
        let merged = stack.merge(other)?;
        let changed = (first_computed..=latest)
            .find(|g| stack.lookup(*g).entry() != merged.lookup(*g).entry());
        self.inbound.insert(from, merged);
        match changed {
            Some(generation) => self.recompute_from(generation),
            None => Ok(Vec::new()),
        }
    }

    /// Recompute `from` and every later generation already computed.
    pub fn recompute_from(&mut self, from: u64) -> Result<Vec<GenerationReport>, ShardError> {
        let latest = self.latest_generation().ok_or(ShardError::NotSeeded)?;
        let base = from.checked_sub(1).ok_or(ShardError::UnknownGeneration(from))?;
        if self.snapshots.get(base).is_none() {
            tracing::warn!(shard = %self.coord, generation = from, "too old to recompute");
            return Err(ShardError::UnknownGeneration(base));
        }
        let _span = tracing::info_span!("recompute", shard = %self.coord, from, latest).entered();
        (from..=latest).map(|g| self.compute(g, true)).collect()
    }

    fn compute(&mut self, generation: u64, recompute: bool) -> Result<GenerationReport, ShardError> {
        let _span = tracing::info_span!(
            "compute_generation",
            shard = %self.coord,
            generation,
            recompute
        )
        .entered();
        let previous = generation
            .checked_sub(1)
            .ok_or(ShardError::UnknownGeneration(generation))?;
        let base = self
            .snapshots
            .get(previous)
            .ok_or(ShardError::UnknownGeneration(previous))?
            .clone();

        let pool = base.restore_pool(&self.config, &self.registry)?;
        // Client messages were already relayed the first time round.
        let log = if recompute {
            ClientMessageLog::new()
        } else {
            ClientMessageLog::forwarding_to(Arc::new(ClientRelay(self.clients.clone())))
        };
        let ctx = EvolutionContext::new(generation, self.coord, &self.config, &self.registry, &log);

        let mut ic = base.ic.grown(self.config.sensor_cells());
        let mut change_set = EntityChangeSet::new();
        let errors = change_set.evolve(
            &pool,
            &mut ic,
            generation,
            self.config.evolution_budget(),
            &ctx,
        )?;

        // Publish our own deltas before folding in the neighbors'.
        let consistent_input = base.is_fully_consistent();
        for (neighbor, deltas) in extract_for_neighbors(&change_set, self.coord, &self.config) {
            let entry = RcsEntry::from_change_set(generation, &deltas, consistent_input)?;
            self.boundary.publish(self.coord, neighbor, entry);
        }

        let depth = self.config.sensor_cells();
        let mut incomplete = BTreeSet::new();
        for (neighbor, stack) in &self.inbound {
            let usable = match stack.lookup(generation) {
                RcsLookup::Available(entry) => match entry.change_set() {
                    Ok(deltas) => {
                        change_set.include(&deltas);
                        entry.consistent
                    }
                    Err(err) => {
                        tracing::warn!(%neighbor, generation, %err, "undecodable boundary entry");
                        false
                    }
                },
                RcsLookup::Missing | RcsLookup::Fossil => false,
            };
            if !usable {
                ic.mark_border(self.coord.delta_to(*neighbor), depth);
                incomplete.insert(*neighbor);
            }
        }
        if !incomplete.is_empty() {
            tracing::warn!(
                shard = %self.coord,
                generation,
                missing = incomplete.len(),
                "computing with incomplete boundary data"
            );
        }

        let execution = change_set.execute(&pool, &ctx)?;
        let sds = Sds::capture(generation, &pool, ic, log.take())?;

        let report = GenerationReport {
            generation,
            recomputed: recompute,
            errors,
            incomplete_neighbors: incomplete.clone(),
            execution,
            digest: sds.digest.clone(),
            consistent: sds.is_fully_consistent(),
        };
        tracing::info!(
            entities = sds.entities.len(),
            consistent = report.consistent,
            failed = report.errors.len(),
            "generation computed"
        );

        self.publish_snapshot(&sds)?;
        if self.snapshots.get(generation).is_some() {
            self.snapshots.replace(sds)?;
        } else {
            let fossils = self.snapshots.append(sds)?;
            if !fossils.is_empty() {
                self.remove_fossils();
            }
        }
        self.incomplete.insert(generation, incomplete);
        Ok(report)
    }

    fn publish_snapshot(&self, sds: &Sds) -> Result<(), ShardError> {
        if let Some(store) = &self.store {
            store_snapshot(store.as_ref(), self.coord, sds)?;
        }
        self.clients.broadcast(sds);
        Ok(())
    }

    fn remove_fossils(&mut self) {
        let Some(oldest) = self.snapshots.oldest_generation() else {
            return;
        };
        for stack in self.inbound.values_mut() {
            stack.remove_fossils(oldest);
        }
        self.incomplete = self.incomplete.split_off(&oldest);
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("coord", &self.coord)
            .field("latest_generation", &self.latest_generation())
            .field("neighbors", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

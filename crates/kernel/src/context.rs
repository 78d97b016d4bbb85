use shardspace_common::{ShardConfig, ShardCoord, ShardGeometry};

use crate::logic::LogicRegistry;
use crate::message::ClientSink;

/// Everything a generation step may consult besides the entities themselves.
#[derive(Clone, Copy)]
pub struct EvolutionContext<'a> {
    /// The generation being computed.
    pub generation: u64,
    pub shard: ShardCoord,
    pub config: &'a ShardConfig,
    pub registry: &'a LogicRegistry,
    pub client_sink: &'a dyn ClientSink,
    /// Volume owned by `shard`.
    pub geometry: ShardGeometry,
    /// Whole-world box; evolved positions never leave it.
    pub world: ShardGeometry,
}

impl<'a> EvolutionContext<'a> {
    pub fn new(
        generation: u64,
        shard: ShardCoord,
        config: &'a ShardConfig,
        registry: &'a LogicRegistry,
        client_sink: &'a dyn ClientSink,
    ) -> Self {
        Self {
            generation,
            shard,
            config,
            registry,
            client_sink,
            geometry: config.shard_geometry(shard),
            world: config.world_geometry(),
        }
    }
}

impl std::fmt::Debug for EvolutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionContext")
            .field("generation", &self.generation)
            .field("shard", &self.shard)
            .finish_non_exhaustive()
    }
}

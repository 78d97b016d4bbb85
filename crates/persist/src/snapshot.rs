use serde::{Deserialize, Serialize};
use shardspace_common::{ClientId, ShardConfig};
use shardspace_kernel::{
    ClientMessage, CodecError, Entity, EntityPool, InconsistencyCoverage, LogicError,
    LogicRegistry, SerialEntity, codec,
};
use std::collections::BTreeMap;

/// Generation snapshot: the immutable result of computing one generation.
///
/// The digest is SHA-256 over the canonical CBOR of (consistency flag,
/// generation, entities, coverage, client messages), so two replicas that
/// computed the same generation from the same inputs agree on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sds {
    /// The generation this snapshot holds.
    pub generation: u64,
    /// Final entities, ordered by id.
    pub entities: Vec<SerialEntity>,
    /// Cells computed from missing or stale neighbor input.
    pub ic: InconsistencyCoverage,
    /// Client-addressed messages emitted while computing this generation.
    pub client_messages: BTreeMap<ClientId, Vec<ClientMessage>>,
    /// Lowercase hex SHA-256 content digest.
    pub digest: String,
}

#[derive(Serialize)]
struct DigestInput<'a> {
    consistent: bool,
    generation: u64,
    entities: &'a [SerialEntity],
    ic: &'a InconsistencyCoverage,
    client_messages: &'a BTreeMap<ClientId, Vec<ClientMessage>>,
}

impl Sds {
    /// Build a snapshot, sorting entities into canonical order and computing the digest.
    pub fn compute(
        generation: u64,
        mut entities: Vec<SerialEntity>,
        ic: InconsistencyCoverage,
        client_messages: BTreeMap<ClientId, Vec<ClientMessage>>,
    ) -> Result<Self, CodecError> {
        entities.sort_by_key(|e| e.id);
        let digest = digest_of(generation, &entities, &ic, &client_messages)?;
        Ok(Self {
            generation,
            entities,
            ic,
            client_messages,
            digest,
        })
    }

    /// Snapshot the current contents of `pool`.
    pub fn capture(
        generation: u64,
        pool: &EntityPool,
        ic: InconsistencyCoverage,
        client_messages: BTreeMap<ClientId, Vec<ClientMessage>>,
    ) -> Result<Self, CodecError> {
        let entities = pool.entities_sorted().iter().map(Entity::to_serial).collect();
        Self::compute(generation, entities, ic, client_messages)
    }

    /// True iff no coverage cell is flagged.
    pub fn is_fully_consistent(&self) -> bool {
        self.ic.is_fully_consistent()
    }

    /// Recompute the digest and compare.
    pub fn verify(&self) -> bool {
        digest_of(
            self.generation,
            &self.entities,
            &self.ic,
            &self.client_messages,
        )
        .is_ok_and(|d| d == self.digest)
    }

    /// Rebuild a pool holding this snapshot's entities, inbound buffers included.
    pub fn restore_pool(
        &self,
        config: &ShardConfig,
        registry: &LogicRegistry,
    ) -> Result<EntityPool, LogicError> {
        let pool = EntityPool::new(config);
        for serial in &self.entities {
            pool.insert(Entity::from_serial(serial.clone(), registry)?);
        }
        Ok(pool)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::to_cbor(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        codec::from_cbor(data)
    }
}

fn digest_of(
    generation: u64,
    entities: &[SerialEntity],
    ic: &InconsistencyCoverage,
    client_messages: &BTreeMap<ClientId, Vec<ClientMessage>>,
) -> Result<String, CodecError> {
    let input = DigestInput {
        consistent: ic.is_fully_consistent(),
        generation,
        entities,
        ic,
        client_messages,
    };
    Ok(codec::sha256_hex(&codec::to_cbor(&input)?))
}

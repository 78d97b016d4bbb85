use serde::{Deserialize, Serialize};
use shardspace_kernel::{EntityChangeSet, codec};

use std::cmp::Ordering;

use crate::error::BoundaryError;

/// One neighbor's boundary deltas for one generation.
///
/// An entry with an empty change set means "nothing to report"; that is
/// different from having no entry at all, which means the data is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcsEntry {
    pub generation: u64,
    /// Canonical CBOR of the boundary change set.
    pub payload: Vec<u8>,
    /// Whether the sender computed this generation with full neighbor input.
    pub consistent: bool,
}

/// Consistent entries sort above inconsistent ones, then by payload bytes, so
/// replicas that disagree on a generation can pick the same winner.
impl Ord for RcsEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.generation
            .cmp(&other.generation)
            .then(self.consistent.cmp(&other.consistent))
            .then_with(|| self.payload.cmp(&other.payload))
    }
}

impl PartialOrd for RcsEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl RcsEntry {
    pub fn from_change_set(
        generation: u64,
        change_set: &EntityChangeSet,
        consistent: bool,
    ) -> Result<Self, BoundaryError> {
        Ok(Self {
            generation,
            payload: change_set.canonical_bytes()?,
            consistent,
        })
    }

    pub fn change_set(&self) -> Result<EntityChangeSet, BoundaryError> {
        Ok(EntityChangeSet::from_bytes(&self.payload)?)
    }

    pub fn digest(&self) -> String {
        codec::sha256_hex(&self.payload)
    }
}

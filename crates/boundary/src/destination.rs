use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// What one replica of a neighbor relationship still retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationEntry {
    /// Oldest generation the replica still holds.
    pub oldest_generation: u64,
    /// Local time step of the last refresh.
    pub last_update: u64,
}

/// Later refreshes sort higher; equal refresh times fall back to the oldest
/// generation.
impl Ord for DestinationEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.last_update
            .cmp(&other.last_update)
            .then(self.oldest_generation.cmp(&other.oldest_generation))
    }
}

impl PartialOrd for DestinationEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-replica retention bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationTable {
    entries: BTreeMap<u32, DestinationEntry>,
}

impl DestinationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `replica` retains history from `oldest_generation` as of `time_step`.
    /// The greater entry is kept, so older refreshes never overwrite newer ones.
    pub fn update(&mut self, replica: u32, oldest_generation: u64, time_step: u64) {
        let fresh = DestinationEntry {
            oldest_generation,
            last_update: time_step,
        };
        self.entries
            .entry(replica)
            .and_modify(|e| *e = (*e).max(fresh))
            .or_insert(fresh);
    }

    pub fn get(&self, replica: u32) -> Option<&DestinationEntry> {
        self.entries.get(&replica)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn newest_update(&self) -> Option<u64> {
        self.entries.values().map(|e| e.last_update).max()
    }

    /// Minimum oldest generation among replicas refreshed within `tolerance`
    /// time steps of the newest refresh. Stale replicas are ignored so a
    /// lagging one cannot pin history forever.
    pub fn oldest_retained(&self, tolerance: u64) -> Option<u64> {
        let newest = self.newest_update()?;
        self.entries
            .values()
            .filter(|e| newest - e.last_update <= tolerance)
            .map(|e| e.oldest_generation)
            .min()
    }

    /// Union of both tables; per replica the more recently refreshed entry wins.
    pub fn merged(&self, other: &DestinationTable) -> DestinationTable {
        let mut out = self.clone();
        for (replica, entry) in &other.entries {
            out.update(*replica, entry.oldest_generation, entry.last_update);
        }
        out
    }
}

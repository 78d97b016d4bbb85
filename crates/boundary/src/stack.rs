use serde::{Deserialize, Serialize};
use shardspace_common::{ShardConfig, ShardCoord};
use std::collections::VecDeque;

use crate::destination::DestinationTable;
use crate::entry::RcsEntry;
use crate::error::BoundaryError;

/// Result of asking a stack for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcsLookup<'a> {
    Available(&'a RcsEntry),
    /// Inside the window but not (yet) received.
    Missing,
    /// Older than anything retained.
    Fossil,
}

impl<'a> RcsLookup<'a> {
    pub fn entry(self) -> Option<&'a RcsEntry> {
        match self {
            RcsLookup::Available(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Rolling window of boundary entries received from one neighbor.
///
/// Slot `i` holds generation `oldest + i`. The window never grows past
/// `max_history` slots; advancing it drops the oldest entries as fossils.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcsStack {
    neighbor: ShardCoord,
    max_history: u64,
    staleness_tolerance: u64,
    oldest: u64,
    entries: VecDeque<Option<RcsEntry>>,
    destinations: DestinationTable,
}

impl RcsStack {
    pub fn new(neighbor: ShardCoord, config: &ShardConfig) -> Self {
        Self::starting_at(neighbor, 0, config)
    }

    pub fn starting_at(neighbor: ShardCoord, oldest: u64, config: &ShardConfig) -> Self {
        Self {
            neighbor,
            max_history: config.max_history as u64,
            staleness_tolerance: config.staleness_tolerance,
            oldest,
            entries: VecDeque::new(),
            destinations: DestinationTable::new(),
        }
    }

    pub fn neighbor(&self) -> ShardCoord {
        self.neighbor
    }

    pub fn oldest_generation(&self) -> u64 {
        self.oldest
    }

    /// One past the newest generation slot in the window.
    pub fn end_generation(&self) -> u64 {
        self.oldest + self.entries.len() as u64
    }

    /// Number of generations with data.
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn destinations(&self) -> &DestinationTable {
        &self.destinations
    }

    pub fn destinations_mut(&mut self) -> &mut DestinationTable {
        &mut self.destinations
    }

    /// Store `entry`, sliding the window forward if needed.
    ///
    /// Returns false when an identical entry was already present. A differing
    /// entry for the same generation (the neighbor recomputed it) replaces
    /// the old one.
    pub fn insert(&mut self, entry: RcsEntry) -> Result<bool, BoundaryError> {
        let generation = entry.generation;
        if generation < self.oldest {
            return Err(BoundaryError::Fossil {
                generation,
                oldest: self.oldest,
            });
        }
        let needed_oldest = (generation + 1).saturating_sub(self.max_history);
        if needed_oldest > self.oldest {
            self.remove_fossils(needed_oldest);
        }
        let index = (generation - self.oldest) as usize;
        if self.entries.len() <= index {
            self.entries.resize(index + 1, None);
        }
        let slot = &mut self.entries[index];
        if slot.as_ref() == Some(&entry) {
            return Ok(false);
        }
        if slot.is_some() {
            tracing::debug!(neighbor = %self.neighbor, generation, "boundary entry replaced");
        }
        *slot = Some(entry);
        Ok(true)
    }

    pub fn lookup(&self, generation: u64) -> RcsLookup<'_> {
        if generation < self.oldest {
            return RcsLookup::Fossil;
        }
        match self.entries.get((generation - self.oldest) as usize) {
            Some(Some(entry)) => RcsLookup::Available(entry),
            _ => RcsLookup::Missing,
        }
    }

    /// Generations in `[from, to)` without data.
    pub fn missing_in(&self, from: u64, to: u64) -> Vec<u64> {
        (from..to)
            .filter(|g| !matches!(self.lookup(*g), RcsLookup::Available(_)))
            .collect()
    }

    /// Drop everything older than `before`. Returns the number of entries
    /// with data that were discarded.
    pub fn remove_fossils(&mut self, before: u64) -> usize {
        let mut dropped = 0;
        while self.oldest < before {
            match self.entries.pop_front() {
                Some(slot) => dropped += usize::from(slot.is_some()),
                None => {
                    self.oldest = before;
                    break;
                }
            }
            self.oldest += 1;
        }
        if dropped > 0 {
            tracing::debug!(neighbor = %self.neighbor, before, dropped, "fossil boundary entries removed");
        }
        dropped
    }

    /// Reconcile two divergent views of the same neighbor relationship.
    ///
    /// The merged window starts at the oldest generation any fresh replica
    /// still retains and runs to the newest generation either side knows.
    /// Each slot takes whichever side has data; when both do, the greater
    /// entry wins, so the result does not depend on which side is `self`. A window longer than `max_history` is an integrity fault.
    pub fn merge(&self, other: &RcsStack) -> Result<RcsStack, BoundaryError> {
        if self.neighbor != other.neighbor {
            return Err(BoundaryError::NeighborMismatch {
                left: self.neighbor,
                right: other.neighbor,
            });
        }
        let destinations = self.destinations.merged(&other.destinations);
        let fallback = [self.first_available(), other.first_available()]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.oldest.min(other.oldest));
        let tolerance = self.staleness_tolerance.max(other.staleness_tolerance);
        let new_oldest = destinations.oldest_retained(tolerance).unwrap_or(fallback);
        let end = self.end_generation().max(other.end_generation()).max(new_oldest);
        let limit = self.max_history.min(other.max_history);
        let span = end - new_oldest;
        if span > limit {
            tracing::error!(neighbor = %self.neighbor, span, limit, "boundary history overflow");
            return Err(BoundaryError::HistoryOverflow { span, limit });
        }

        let entries = (new_oldest..end)
            .map(|generation| {
                let mine = self.lookup(generation).entry();
                let theirs = other.lookup(generation).entry();
                match (mine, theirs) {
                    (Some(a), Some(b)) => Some(a.max(b).clone()),
                    (a, b) => a.or(b).cloned(),
                }
            })
            .collect();

        Ok(RcsStack {
            neighbor: self.neighbor,
            max_history: limit,
            staleness_tolerance: tolerance,
            oldest: new_oldest,
            entries,
            destinations,
        })
    }

    fn first_available(&self) -> Option<u64> {
        self.entries
            .iter()
            .position(Option::is_some)
            .map(|i| self.oldest + i as u64)
    }
}

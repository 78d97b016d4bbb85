use std::collections::VecDeque;

use crate::error::StoreError;
use crate::snapshot::Sds;

/// Per-generation snapshot history of one shard.
///
/// Append-only at the head; a recomputed generation replaces its snapshot
/// and drops every snapshot derived from it. At most `max_history`
/// snapshots are retained.
#[derive(Debug, Clone)]
pub struct SdsStack {
    snapshots: VecDeque<Sds>,
    max_history: usize,
}

impl SdsStack {
    /// Create an empty stack retaining at most `max_history` snapshots (at least one).
    pub fn new(max_history: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            max_history: max_history.max(1),
        }
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no snapshot is retained.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Oldest retained generation.
    pub fn oldest_generation(&self) -> Option<u64> {
        self.snapshots.front().map(|s| s.generation)
    }

    /// Generation the next appended snapshot must carry.
    pub fn next_generation(&self) -> Option<u64> {
        self.snapshots.back().map(|s| s.generation + 1)
    }

    pub fn latest(&self) -> Option<&Sds> {
        self.snapshots.back()
    }

    pub fn get(&self, generation: u64) -> Option<&Sds> {
        let oldest = self.oldest_generation()?;
        let index = generation.checked_sub(oldest)?;
        self.snapshots.get(usize::try_from(index).ok()?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sds> {
        self.snapshots.iter()
    }

    /// Append the snapshot of the next generation, dropping fossils past the
    /// history limit. Returns the fossil generations removed.
    pub fn append(&mut self, sds: Sds) -> Result<Vec<u64>, StoreError> {
        match self.next_generation() {
            Some(expected) if sds.generation != expected => {
                return Err(StoreError::OutOfSequence {
                    expected,
                    got: sds.generation,
                });
            }
            _ => {}
        }
        self.snapshots.push_back(sds);
        let mut fossils = Vec::new();
        while self.snapshots.len() > self.max_history {
            if let Some(old) = self.snapshots.pop_front() {
                fossils.push(old.generation);
            }
        }
        Ok(fossils)
    }

    /// Replace a retained generation with its recomputation and invalidate
    /// every later generation. Returns the invalidated generations.
    pub fn replace(&mut self, sds: Sds) -> Result<Vec<u64>, StoreError> {
        let generation = sds.generation;
        let oldest = self
            .oldest_generation()
            .ok_or(StoreError::NotRetained(generation))?;
        if generation < oldest || self.get(generation).is_none() {
            return Err(StoreError::NotRetained(generation));
        }
        let invalidated = self.invalidate_after(generation);
        if let Some(slot) = self.snapshots.back_mut() {
            tracing::debug!(
                generation,
                previous = %slot.digest,
                replacement = %sds.digest,
                "snapshot replaced"
            );
            *slot = sds;
        }
        Ok(invalidated)
    }

    /// Drop every snapshot newer than `generation`. Returns their generations.
    pub fn invalidate_after(&mut self, generation: u64) -> Vec<u64> {
        let mut dropped = Vec::new();
        while self
            .snapshots
            .back()
            .is_some_and(|s| s.generation > generation)
        {
            if let Some(s) = self.snapshots.pop_back() {
                dropped.push(s.generation);
            }
        }
        dropped.reverse();
        dropped
    }
}

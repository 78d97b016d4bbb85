use parking_lot::Mutex;
use shardspace_common::ShardCoord;

use crate::entry::RcsEntry;

/// Outlet for boundary entries bound for neighbor shards.
///
/// Delivery may reorder or lose entries; receivers treat a missing entry as
/// missing data, never as "nothing to report".
pub trait BoundaryChannel: Send + Sync {
    fn publish(&self, from: ShardCoord, to: ShardCoord, entry: RcsEntry);
}

/// One published entry, as recorded by [`BoundaryOutbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub from: ShardCoord,
    pub to: ShardCoord,
    pub entry: RcsEntry,
}

/// In-process channel that queues entries until a driver drains them.
#[derive(Debug, Default)]
pub struct BoundaryOutbox {
    queue: Mutex<Vec<Published>>,
}

impl BoundaryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything published so far, in publication order.
    pub fn drain(&self) -> Vec<Published> {
        std::mem::take(&mut *self.queue.lock())
    }
}

impl BoundaryChannel for BoundaryOutbox {
    fn publish(&self, from: ShardCoord, to: ShardCoord, entry: RcsEntry) {
        tracing::trace!(%from, %to, generation = entry.generation, "boundary entry published");
        self.queue.lock().push(Published { from, to, entry });
    }
}

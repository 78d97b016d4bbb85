//! Boundary bookkeeping between neighboring shards.
//!
//! Each shard keeps one [`RcsStack`] per neighbor holding the boundary deltas
//! that neighbor published, per generation. Missing entries are what drive
//! inconsistency coverage; late entries trigger recomputation.
//!
//! # Invariants
//! - A missing entry and an empty entry are different things.
//! - Merged history never silently exceeds the configured limit.

mod channel;
mod destination;
mod entry;
mod error;
mod extract;
mod stack;

pub use channel::{BoundaryChannel, BoundaryOutbox, Published};
pub use destination::{DestinationEntry, DestinationTable};
pub use entry::RcsEntry;
pub use error::BoundaryError;
pub use extract::{extract_for_neighbors, extract_outbound};
pub use stack::{RcsLookup, RcsStack};

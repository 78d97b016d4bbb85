//! Persistence: generation snapshots, their history, and durable stores.
//!
//! # Invariants
//! - A snapshot's digest is a pure function of its contents.
//! - Snapshots are replaced by recomputation, never mutated.
//! - Replacing a generation invalidates every generation derived from it.
//! - Stored blobs are verified against the integrity manifest on load.

mod error;
mod snapshot;
mod stack;
mod store;

#[cfg(test)]
mod testing;

pub use error::StoreError;
pub use snapshot::Sds;
pub use stack::SdsStack;
pub use store::{
    DurableStore, FileStore, IntegrityManifest, ManifestEntry, MemoryStore, StoreMeta,
    load_snapshot, store_snapshot,
};

//! Shard driver: advances one shard through its generations and keeps its
//! history consistent as neighbor boundary data arrives.
//!
//! # Invariants
//! - A generation always completes; missing neighbor data shows up as
//!   inconsistency coverage, never as blocked progress.
//! - Recomputing a generation with more boundary data never flags new cells.
//! - Replacing a generation recomputes every generation derived from it.

mod client;
mod error;
mod shard;

pub use client::{ClientChannel, NullClients, RecordingClients};
pub use error::ShardError;
pub use shard::{GenerationReport, Shard};

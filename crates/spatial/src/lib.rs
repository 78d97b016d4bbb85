//! Spatial index: k-d tree over entity positions.
//!
//! # Invariants
//! - A published tree is never mutated; structural changes mark it stale.
//! - Rebuilds happen behind a single gate; queries against a published tree
//!   take no lock.

mod kdtree;
mod lazy;

pub use kdtree::KdTree;
pub use lazy::LazyIndex;

use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::kdtree::KdTree;

/// A k-d tree that is rebuilt on demand after structural changes.
///
/// Writers only bump the epoch. A reader whose published tree was built at
/// the current epoch takes it under a shared read lock. Otherwise it takes
/// the gate, rebuilds a fresh tree and publishes it as a new `Arc`; readers
/// holding an older `Arc` keep querying their complete, immutable tree.
#[derive(Debug)]
pub struct LazyIndex<T> {
    gate: Mutex<()>,
    published: RwLock<Option<(u64, Arc<KdTree<T>>)>>,
    epoch: AtomicU64,
    rebuilds: AtomicU64,
}

impl<T> Default for LazyIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LazyIndex<T> {
    pub fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            published: RwLock::new(None),
            epoch: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Mark the published tree out of date. Takes effect on the next `current`.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_stale(&self) -> bool {
        self.fresh().is_none()
    }

    /// Number of rebuilds performed so far.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    fn fresh(&self) -> Option<Arc<KdTree<T>>> {
        let epoch = self.epoch.load(Ordering::Acquire);
        match self.published.read().as_ref() {
            Some((built, tree)) if *built == epoch => Some(Arc::clone(tree)),
            _ => None,
        }
    }

    /// Return the published tree, rebuilding it from `source` first if stale.
    ///
    /// The epoch is read before `source` runs, so an invalidation racing
    /// with the rebuild schedules another rebuild instead of being lost.
    pub fn current<F>(&self, source: F) -> Arc<KdTree<T>>
    where
        F: FnOnce() -> Vec<(Vec3, T)>,
    {
        if let Some(tree) = self.fresh() {
            return tree;
        }
        let _gate = self.gate.lock();
        if let Some(tree) = self.fresh() {
            return tree;
        }
        let epoch = self.epoch.load(Ordering::Acquire);
        let tree = Arc::new(KdTree::build(source()));
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(points = tree.len(), epoch, "spatial index rebuilt");
        *self.published.write() = Some((epoch, Arc::clone(&tree)));
        tree
    }
}

//! Thread-safe operation counters for a tree instance.
//!
//! Counters are incremented with relaxed atomics from inside the engine
//! and read via [`TreeStats::snapshot`]; `emit_tracing` logs a snapshot
//! through the `tracing` infrastructure for callers that wire a
//! subscriber.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStatsSnapshot {
    pub searches: u64,
    pub inserts: u64,
    pub removes: u64,
    pub leaf_splits: u64,
    pub interior_splits: u64,
    pub leaf_borrows: u64,
    pub interior_borrows: u64,
    pub leaf_merges: u64,
    pub interior_merges: u64,
    pub root_grows: u64,
    pub root_collapses: u64,
}

#[derive(Debug, Default)]
pub struct TreeStats {
    searches: AtomicU64,
    inserts: AtomicU64,
    removes: AtomicU64,
    leaf_splits: AtomicU64,
    interior_splits: AtomicU64,
    leaf_borrows: AtomicU64,
    interior_borrows: AtomicU64,
    leaf_merges: AtomicU64,
    interior_merges: AtomicU64,
    root_grows: AtomicU64,
    root_collapses: AtomicU64,
}

impl TreeStats {
    pub(crate) fn inc_searches(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_removes(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_leaf_splits(&self) {
        self.leaf_splits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_interior_splits(&self) {
        self.interior_splits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_leaf_borrows(&self) {
        self.leaf_borrows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_interior_borrows(&self) {
        self.interior_borrows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_leaf_merges(&self) {
        self.leaf_merges.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_interior_merges(&self) {
        self.interior_merges.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_root_grows(&self) {
        self.root_grows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_root_collapses(&self) {
        self.root_collapses.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies every counter at a single point in time (counter-by-counter;
    /// not atomic across counters).
    pub fn snapshot(&self) -> TreeStatsSnapshot {
        TreeStatsSnapshot {
            searches: self.searches.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            leaf_splits: self.leaf_splits.load(Ordering::Relaxed),
            interior_splits: self.interior_splits.load(Ordering::Relaxed),
            leaf_borrows: self.leaf_borrows.load(Ordering::Relaxed),
            interior_borrows: self.interior_borrows.load(Ordering::Relaxed),
            leaf_merges: self.leaf_merges.load(Ordering::Relaxed),
            interior_merges: self.interior_merges.load(Ordering::Relaxed),
            root_grows: self.root_grows.load(Ordering::Relaxed),
            root_collapses: self.root_collapses.load(Ordering::Relaxed),
        }
    }

    /// Emits the current counters to the tracing sink.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "crabtree::stats",
            searches = snapshot.searches,
            inserts = snapshot.inserts,
            removes = snapshot.removes,
            leaf_splits = snapshot.leaf_splits,
            interior_splits = snapshot.interior_splits,
            leaf_borrows = snapshot.leaf_borrows,
            interior_borrows = snapshot.interior_borrows,
            leaf_merges = snapshot.leaf_merges,
            interior_merges = snapshot.interior_merges,
            root_grows = snapshot.root_grows,
            root_collapses = snapshot.root_collapses,
            "btree stats snapshot"
        );
    }
}

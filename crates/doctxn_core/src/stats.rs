//! Database statistics.
//!
//! Counters are atomic and can be read while transactions are running.
//!
//! ```rust,ignore
//! let db = Database::open_in_memory();
//! // ... run transactions ...
//! let stats = db.stats();
//! println!("committed: {}", stats.transactions_committed);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live transaction and read counters.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    /// Rollbacks caused by a connection going away mid-transaction.
    implicit_rollbacks: AtomicU64,
    apply_failures: AtomicU64,
    autocommits: AtomicU64,
    buffered_mutations: AtomicU64,
    reads: AtomicU64,
    scans: AtomicU64,
    index_lookups: AtomicU64,
}

impl DatabaseStats {
    /// Creates a zeroed stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_begin(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_implicit_rollback(&self) {
        self.implicit_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_apply_failure(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_autocommit(&self) {
        self.autocommits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_buffered(&self) {
        self.buffered_mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, used_index: bool) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if used_index {
            self.index_lookups.fetch_add(1, Ordering::Relaxed);
        } else {
            self.scans.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a plain copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            implicit_rollbacks: self.implicit_rollbacks.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            autocommits: self.autocommits.load(Ordering::Relaxed),
            buffered_mutations: self.buffered_mutations.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Explicit transactions begun.
    pub transactions_started: u64,
    /// Explicit transactions committed.
    pub transactions_committed: u64,
    /// Explicit and implicit rollbacks, plus commits discarded by an apply failure.
    pub transactions_rolled_back: u64,
    /// Rollbacks caused by disconnecting with a transaction open.
    pub implicit_rollbacks: u64,
    /// Commits (explicit or auto-commit) the storage engine rejected.
    pub apply_failures: u64,
    /// Statements applied outside an explicit transaction.
    pub autocommits: u64,
    /// Mutations appended to a transaction's write buffer.
    pub buffered_mutations: u64,
    /// Find and count operations.
    pub reads: u64,
    /// Reads served by a full collection scan.
    pub scans: u64,
    /// Reads served by an index.
    pub index_lookups: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(DatabaseStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn reads_split_by_access_path() {
        let stats = DatabaseStats::new();
        stats.record_read(true);
        stats.record_read(false);
        stats.record_read(false);
        let snap = stats.snapshot();
        assert_eq!(snap.reads, 3);
        assert_eq!(snap.index_lookups, 1);
        assert_eq!(snap.scans, 2);
    }

    #[test]
    fn lifecycle_counters() {
        let stats = DatabaseStats::new();
        stats.record_begin();
        stats.record_begin();
        stats.record_commit();
        stats.record_rollback();
        stats.record_implicit_rollback();
        let snap = stats.snapshot();
        assert_eq!(snap.transactions_started, 2);
        assert_eq!(snap.transactions_committed, 1);
        assert_eq!(snap.transactions_rolled_back, 1);
        assert_eq!(snap.implicit_rollbacks, 1);
    }
}

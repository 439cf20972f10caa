//! In-memory storage engine.

use crate::error::CoreResult;
use crate::storage::catalog::StagedBatch;
use crate::storage::snapshot::Store;
use crate::storage::{Snapshot, StorageEngine};
use crate::transaction::Mutation;
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Keeps committed state in memory only.
///
/// A batch is staged in place under the catalog write lock at a sequence
/// no reader can see yet. The lock is released while `before_publish`
/// runs (the journal write, for durable engines), then taken again to
/// publish or revert. Readers only wait for the two short locked steps.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    store: Arc<Store>,
    /// One batch between stage and publish at a time.
    writer: Mutex<()>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a batch at the next sequence, runs `before_publish` with it,
    /// then publishes. If either step fails nothing is published.
    pub(crate) fn apply_with<F>(
        &self,
        mutations: &[Mutation],
        before_publish: F,
    ) -> CoreResult<SequenceNumber>
    where
        F: FnOnce(SequenceNumber) -> CoreResult<()>,
    {
        let _writer = self.writer.lock();
        let staged = {
            let mut catalog = self.store.catalog().write();
            let sequence = catalog.published().next();
            catalog.stage(mutations, sequence)?
        };
        self.finish(staged, before_publish)
    }

    /// Applies a recovered batch at the sequence it was journaled with.
    pub(crate) fn replay(&self, sequence: SequenceNumber, mutations: &[Mutation]) -> CoreResult<()> {
        let _writer = self.writer.lock();
        let staged = self.store.catalog().write().stage(mutations, sequence)?;
        self.finish(staged, |_| Ok(())).map(|_| ())
    }

    /// Removed versions still waiting for older snapshots to go.
    #[must_use]
    pub fn pending_removals(&self) -> usize {
        self.store.catalog().read().pending_removals()
    }

    fn finish<F>(&self, staged: StagedBatch, before_publish: F) -> CoreResult<SequenceNumber>
    where
        F: FnOnce(SequenceNumber) -> CoreResult<()>,
    {
        let sequence = staged.sequence();
        if let Err(err) = before_publish(sequence) {
            self.store.catalog().write().revert(staged);
            return Err(err);
        }

        let mut catalog = self.store.catalog().write();
        catalog.publish(staged);
        let horizon = self.store.horizon(sequence);
        let purged = catalog.vacuum(horizon);
        if purged > 0 {
            debug!(%sequence, %horizon, purged, "vacuumed removed versions");
        }
        Ok(sequence)
    }
}

impl StorageEngine for MemoryEngine {
    fn read_snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    fn apply_batch(
        &self,
        _txid: TransactionId,
        mutations: &[Mutation],
    ) -> CoreResult<SequenceNumber> {
        self.apply_with(mutations, |_| Ok(()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

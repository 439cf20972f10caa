//! Journal-backed storage engine.

use crate::error::{CoreError, CoreResult};
use crate::journal::Journal;
use crate::storage::{MemoryEngine, Snapshot, StorageEngine};
use crate::transaction::Mutation;
use crate::types::{SequenceNumber, TransactionId};
use doctxn_storage::StorageBackend;
use tracing::info;

/// Keeps committed state in memory and writes every batch to a journal
/// before publishing it.
#[derive(Debug)]
pub struct JournaledEngine {
    state: MemoryEngine,
    journal: Journal,
}

impl JournaledEngine {
    /// Opens the journal on `backend` and rebuilds committed state from it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChecksumMismatch`] or
    /// [`CoreError::JournalCorruption`] for a damaged journal, or storage
    /// errors.
    pub fn open(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> CoreResult<Self> {
        let journal = Journal::new(backend, sync_on_commit);
        let batches = journal.recover()?;

        let state = MemoryEngine::new();
        let mut last = SequenceNumber::default();
        for batch in &batches {
            if batch.sequence <= last {
                return Err(CoreError::journal_corruption(format!(
                    "{} from {} does not follow {last}",
                    batch.sequence, batch.txid
                )));
            }
            state
                .replay(batch.sequence, &batch.mutations)
                .map_err(|err| {
                    CoreError::journal_corruption(format!(
                        "replaying {} failed: {err}",
                        batch.txid
                    ))
                })?;
            last = batch.sequence;
        }

        info!(
            batches = batches.len(),
            sequence = %last,
            collections = state.read_snapshot().collection_names().len(),
            "recovered journal"
        );

        Ok(Self { state, journal })
    }

    /// The underlying journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl StorageEngine for JournaledEngine {
    fn read_snapshot(&self) -> Snapshot {
        self.state.read_snapshot()
    }

    fn apply_batch(
        &self,
        txid: TransactionId,
        mutations: &[Mutation],
    ) -> CoreResult<SequenceNumber> {
        self.state.apply_with(mutations, |sequence| {
            self.journal
                .append_batch(txid, sequence, mutations)
                .map(|_| ())
        })
    }

    fn name(&self) -> &'static str {
        "journaled"
    }
}

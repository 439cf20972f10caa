//! Commit application.

use crate::error::{CoreError, CoreResult};
use crate::storage::StorageEngine;
use crate::transaction::Transaction;
use crate::types::SequenceNumber;
use parking_lot::Mutex;
use std::sync::Arc;

/// Flushes drained write buffers into shared storage, one at a time.
///
/// The flush lock is held only for the duration of one batch, never for a
/// transaction's lifetime. Storage either takes the whole batch or nothing;
/// on failure the error comes back as [`CoreError::ApplyFailed`] and the
/// buffer is gone either way.
#[derive(Debug)]
pub struct ApplyEngine {
    engine: Arc<dyn StorageEngine>,
    flush_lock: Mutex<()>,
}

impl ApplyEngine {
    /// Creates an apply engine over `engine`.
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            engine,
            flush_lock: Mutex::new(()),
        }
    }

    /// Applies everything `txn` buffered, in issuance order.
    ///
    /// An empty buffer commits nothing and returns the current sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ApplyFailed`] wrapping the storage error.
    pub fn flush(&self, txn: &mut Transaction) -> CoreResult<SequenceNumber> {
        let txid = txn.id();
        let batch = txn.buffer_mut().drain();
        if batch.is_empty() {
            return Ok(self.engine.read_snapshot().sequence());
        }

        let _guard = self.flush_lock.lock();
        self.engine
            .apply_batch(txid, &batch)
            .map_err(|err| CoreError::apply_failed(txid, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Filter;
    use crate::storage::MemoryEngine;
    use crate::transaction::Mutation;
    use crate::types::TransactionId;
    use doctxn_codec::Document;

    fn insert(id: i64) -> Mutation {
        Mutation::Insert {
            collection: "c".into(),
            document: Document::new().with("_id", id),
        }
    }

    #[test]
    fn flush_is_all_or_nothing() {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let apply = ApplyEngine::new(Arc::clone(&engine));

        let mut ok = Transaction::new(TransactionId::new(1), None);
        ok.buffer_mut().append(insert(1));
        assert_eq!(apply.flush(&mut ok).unwrap(), SequenceNumber::new(1));
        assert!(ok.buffer().is_empty());

        let mut bad = Transaction::new(TransactionId::new(2), None);
        bad.buffer_mut().append(insert(2));
        bad.buffer_mut().append(insert(1));
        let err = apply.flush(&mut bad).unwrap_err();
        assert!(matches!(err, CoreError::ApplyFailed { txid, .. } if txid == TransactionId::new(2)));
        assert!(bad.buffer().is_empty());

        let snapshot = engine.read_snapshot();
        assert_eq!(snapshot.read().collection("c").unwrap().count(&Filter::all()), 1);
        assert_eq!(snapshot.sequence(), SequenceNumber::new(1));
    }

    #[test]
    fn empty_flush_changes_nothing() {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let apply = ApplyEngine::new(engine);
        let mut txn = Transaction::new(TransactionId::new(1), None);
        assert_eq!(apply.flush(&mut txn).unwrap(), SequenceNumber::default());
    }
}

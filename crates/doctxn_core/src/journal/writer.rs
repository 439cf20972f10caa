//! Journal writer and recovery scan.

use crate::error::{CoreError, CoreResult};
use crate::journal::record::JournalRecord;
use crate::transaction::Mutation;
use crate::types::{SequenceNumber, TransactionId};
use doctxn_storage::StorageBackend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

/// A batch recovered from the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    /// Transaction that committed the batch.
    pub txid: TransactionId,
    /// Commit sequence.
    pub sequence: SequenceNumber,
    /// Mutations in issuance order.
    pub mutations: Vec<Mutation>,
}

/// Result of reading the whole journal.
#[derive(Debug, Clone)]
pub struct JournalScan {
    /// Every complete record with its offset.
    pub records: Vec<(u64, JournalRecord)>,
    /// Bytes covered by complete records.
    pub valid_len: u64,
    /// Bytes in the backend, including any torn tail.
    pub total_len: u64,
}

impl JournalScan {
    /// True if the file ends in a partial record.
    #[must_use]
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.total_len
    }

    /// Groups records into committed batches, dropping batches whose
    /// commit record never made it.
    pub fn committed_batches(&self) -> Vec<CommittedBatch> {
        let mut open: HashMap<TransactionId, Vec<Mutation>> = HashMap::new();
        let mut batches = Vec::new();
        for (_, record) in &self.records {
            match record {
                JournalRecord::Begin { txid } => {
                    open.insert(*txid, Vec::new());
                }
                JournalRecord::Mutation { txid, mutation } => {
                    open.entry(*txid).or_default().push(mutation.clone());
                }
                JournalRecord::Commit { txid, sequence } => {
                    batches.push(CommittedBatch {
                        txid: *txid,
                        sequence: *sequence,
                        mutations: open.remove(txid).unwrap_or_default(),
                    });
                }
            }
        }
        batches
    }
}

/// Append-only journal over a storage backend.
pub struct Journal {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
    /// Set when a failed batch could not be cut back off the end. Such a
    /// batch would replay on the next open, so nothing more may follow it.
    poisoned: AtomicBool,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_commit", &self.sync_on_commit)
            .field("poisoned", &self.is_poisoned())
            .finish_non_exhaustive()
    }
}

impl Journal {
    /// Wraps a backend. `sync_on_commit` selects `sync` over `flush` after
    /// each batch.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
            poisoned: AtomicBool::new(false),
        }
    }

    /// True once a failed batch could not be removed again. Every later
    /// append is refused until the database is reopened and recovered.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Writes a batch as one append and makes it durable.
    ///
    /// Returns the offset of the batch. If the write or flush fails the
    /// journal is cut back to where it was. If that cut fails too, the
    /// journal is poisoned.
    ///
    /// # Errors
    ///
    /// Returns encoding or storage errors, or
    /// [`CoreError::JournalCorruption`] once the journal is poisoned.
    pub fn append_batch(
        &self,
        txid: TransactionId,
        sequence: SequenceNumber,
        mutations: &[Mutation],
    ) -> CoreResult<u64> {
        let mut data = Vec::new();
        JournalRecord::Begin { txid }.encode_into(&mut data)?;
        for mutation in mutations {
            JournalRecord::Mutation {
                txid,
                mutation: mutation.clone(),
            }
            .encode_into(&mut data)?;
        }
        JournalRecord::Commit { txid, sequence }.encode_into(&mut data)?;

        let mut backend = self.backend.lock();
        if self.is_poisoned() {
            return Err(CoreError::journal_corruption(
                "journal holds a failed batch that could not be removed; reopen to recover",
            ));
        }
        let start = backend.size()?;
        let written = match backend.append(&data) {
            Ok(offset) => {
                let durable = if self.sync_on_commit {
                    backend.sync()
                } else {
                    backend.flush()
                };
                durable.map(|()| offset)
            }
            Err(err) => Err(err),
        };

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if let Err(cut) = backend.truncate(start) {
                    self.poisoned.store(true, Ordering::SeqCst);
                    error!(%txid, error = %cut, "could not cut back journal after failed write; journal poisoned");
                }
                Err(err.into())
            }
        }
    }

    /// Reads every complete record.
    ///
    /// # Errors
    ///
    /// Returns storage errors and fatal record damage.
    pub fn scan(&self) -> CoreResult<JournalScan> {
        let backend = self.backend.lock();
        let total_len = backend.size()?;
        let len = usize::try_from(total_len)
            .map_err(|_| CoreError::journal_corruption("journal larger than address space"))?;
        let bytes = backend.read_at(0, len)?;
        drop(backend);

        let mut records = Vec::new();
        let mut pos = 0usize;
        while pos < bytes.len() {
            match JournalRecord::decode_from(&bytes[pos..], pos as u64)? {
                Some((record, used)) => {
                    records.push((pos as u64, record));
                    pos += used;
                }
                None => break,
            }
        }

        Ok(JournalScan {
            records,
            valid_len: pos as u64,
            total_len,
        })
    }

    /// Scans, cuts off a torn tail, and returns the committed batches.
    ///
    /// # Errors
    ///
    /// Same as [`Journal::scan`], plus storage errors from the truncation.
    pub fn recover(&self) -> CoreResult<Vec<CommittedBatch>> {
        let scan = self.scan()?;
        if scan.has_torn_tail() {
            warn!(
                valid = scan.valid_len,
                total = scan.total_len,
                "discarding torn journal tail"
            );
            self.backend.lock().truncate(scan.valid_len)?;
        }
        Ok(scan.committed_batches())
    }

    /// Current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

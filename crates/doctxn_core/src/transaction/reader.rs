//! Reads that see a transaction's own writes.
//!
//! A read inside a transaction looks at committed state through the
//! transaction's overlay for the collection being read. Overlays of other
//! connections are never consulted, so uncommitted work stays private.

use crate::collection::{Filter, IndexSpec};
use crate::config::IsolationLevel;
use crate::error::CoreResult;
use crate::storage::{CollectionAt, Snapshot, StorageEngine};
use crate::transaction::overlay::Overlay;
use crate::transaction::{Mutation, Transaction};
use doctxn_codec::{Document, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Builds per-collection views for a connection.
#[derive(Debug)]
pub struct SnapshotReader {
    engine: Arc<dyn StorageEngine>,
    isolation: IsolationLevel,
}

impl SnapshotReader {
    /// Creates a reader over `engine`.
    pub fn new(engine: Arc<dyn StorageEngine>, isolation: IsolationLevel) -> Self {
        Self { engine, isolation }
    }

    /// The isolation level reads use.
    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Snapshot to pin when a transaction begins, if the isolation level
    /// pins one.
    #[must_use]
    pub fn begin_snapshot(&self) -> Option<Snapshot> {
        match self.isolation {
            IsolationLevel::Snapshot => Some(self.engine.read_snapshot()),
            IsolationLevel::ReadCommitted => None,
        }
    }

    /// Committed state a read should start from.
    #[must_use]
    pub fn base(&self, txn: Option<&Transaction>) -> Snapshot {
        match txn.and_then(Transaction::snapshot) {
            Some(pinned) => pinned.clone(),
            None => self.engine.read_snapshot(),
        }
    }

    /// Runs `f` over one collection as the connection sees it.
    ///
    /// The catalog is read-locked while `f` runs.
    ///
    /// # Errors
    ///
    /// Returns the error of a buffered mutation that no longer applies on
    /// top of newer committed state (only possible with read-committed
    /// isolation).
    pub fn read<R, F>(&self, collection: &str, txn: Option<&Transaction>, f: F) -> CoreResult<R>
    where
        F: FnOnce(&CollectionView<'_>) -> R,
    {
        let base = self.base(txn);
        let read = base.read();
        let overlay = match txn {
            Some(txn) => txn.overlay(collection, &read)?,
            None => None,
        };
        let view = CollectionView {
            name: collection,
            committed: read.collection(collection),
            overlay: overlay.as_deref(),
        };
        Ok(f(&view))
    }

    /// Checks `mutation` against the connection's view and buffers it.
    /// A rejected mutation is not buffered.
    pub(crate) fn stage(&self, txn: &mut Transaction, mutation: Mutation) -> CoreResult<()> {
        let base = self.base(Some(&*txn));
        let read = base.read();
        txn.stage(&read, mutation)
    }

    /// Checks that `mutation` would apply to the latest committed state,
    /// without changing anything.
    pub(crate) fn check(&self, mutation: &Mutation) -> CoreResult<()> {
        let base = self.engine.read_snapshot();
        let read = base.read();
        let name = mutation.collection();
        let committed = read.collection(name);
        Overlay::new(name, committed, read.sequence()).apply(committed, mutation)
    }

    /// Names of the collections the connection can see, sorted.
    ///
    /// # Errors
    ///
    /// Same as [`SnapshotReader::read`].
    pub fn collection_names(&self, txn: Option<&Transaction>) -> CoreResult<Vec<String>> {
        let base = self.base(txn);
        let read = base.read();
        let mut names: BTreeSet<String> = read.collection_names().into_iter().collect();
        if let Some(txn) = txn {
            for touched in txn.touched_collections() {
                if txn.overlay(touched, &read)?.is_some_and(|overlay| overlay.exists()) {
                    names.insert(touched.to_string());
                } else {
                    names.remove(touched);
                }
            }
        }
        Ok(names.into_iter().collect())
    }
}

/// A collection as seen by one connection at one moment.
#[derive(Debug, Clone, Copy)]
pub struct CollectionView<'a> {
    name: &'a str,
    committed: Option<CollectionAt<'a>>,
    overlay: Option<&'a Overlay>,
}

impl CollectionView<'_> {
    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Whether the collection exists in this view.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.overlay
            .map_or(self.committed.is_some(), Overlay::exists)
    }

    /// Matching documents in insertion order.
    #[must_use]
    pub fn find(&self, filter: &Filter) -> Vec<Document> {
        self.scan(filter).0
    }

    /// Number of matching documents.
    #[must_use]
    pub fn count(&self, filter: &Filter) -> usize {
        self.tally(filter).0
    }

    /// Index specifications, `_id_` first. Empty if the collection does
    /// not exist.
    #[must_use]
    pub fn indexes(&self) -> Vec<IndexSpec> {
        match (self.overlay, self.committed) {
            (Some(overlay), _) if overlay.exists() => overlay.indexes().cloned().collect(),
            (None, Some(committed)) => committed.indexes().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Whether an index identical to `spec` exists.
    #[must_use]
    pub fn has_index(&self, spec: &IndexSpec) -> bool {
        self.indexes().iter().any(|existing| existing == spec)
    }

    /// Documents plus whether an index served the lookup.
    pub(crate) fn scan(&self, filter: &Filter) -> (Vec<Document>, bool) {
        let (docs, used_index) = self.select(filter);
        (docs.into_iter().cloned().collect(), used_index)
    }

    pub(crate) fn tally(&self, filter: &Filter) -> (usize, bool) {
        match (self.overlay, self.committed) {
            (Some(overlay), committed) => overlay.count(committed, filter),
            (None, Some(committed)) if filter.is_empty() => (committed.len(), false),
            (None, Some(_)) => {
                let (docs, used_index) = self.select(filter);
                (docs.len(), used_index)
            }
            (None, None) => (0, false),
        }
    }

    /// `_id` of every matching document, in insertion order.
    pub(crate) fn matching_ids(&self, filter: &Filter) -> (Vec<Value>, bool) {
        let (docs, used_index) = self.select(filter);
        let ids = docs
            .into_iter()
            .filter_map(|doc| doc.get("_id").cloned())
            .collect();
        (ids, used_index)
    }

    fn select(&self, filter: &Filter) -> (Vec<&Document>, bool) {
        match (self.overlay, self.committed) {
            (Some(overlay), committed) => overlay.select(committed, filter),
            (None, Some(committed)) => committed.select(filter, &BTreeSet::new()),
            (None, None) => (Vec::new(), false),
        }
    }
}

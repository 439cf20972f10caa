//! Pinned views of committed state.

use crate::storage::catalog::{Catalog, CollectionAt};
use crate::types::SequenceNumber;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The catalog plus the sequences readers currently hold.
#[derive(Debug, Default)]
pub(crate) struct Store {
    catalog: RwLock<Catalog>,
    /// Pinned sequence -> number of live snapshots at it.
    pins: Mutex<BTreeMap<SequenceNumber, usize>>,
}

impl Store {
    pub(crate) fn catalog(&self) -> &RwLock<Catalog> {
        &self.catalog
    }

    /// Pins the latest published sequence.
    pub(crate) fn snapshot(self: &Arc<Self>) -> Snapshot {
        // Pinning under the read lock keeps vacuum from running between
        // reading the sequence and recording the pin.
        let catalog = self.catalog.read();
        let sequence = catalog.published();
        self.pin(sequence);
        Snapshot {
            store: Arc::clone(self),
            sequence,
        }
    }

    /// Oldest sequence a reader may still look at.
    pub(crate) fn horizon(&self, published: SequenceNumber) -> SequenceNumber {
        self.pins
            .lock()
            .keys()
            .next()
            .map_or(published, |oldest| (*oldest).min(published))
    }

    fn pin(&self, sequence: SequenceNumber) {
        *self.pins.lock().entry(sequence).or_insert(0) += 1;
    }

    fn unpin(&self, sequence: SequenceNumber) {
        let mut pins = self.pins.lock();
        if let Some(count) = pins.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&sequence);
            }
        }
    }
}

/// Committed state as of one commit.
///
/// A snapshot holds no copy of the data. It pins its sequence, and versions
/// visible at a pinned sequence are never vacuumed, so reads through it
/// stay stable however many commits follow. Clones pin again; dropping
/// the last one releases the sequence.
pub struct Snapshot {
    store: Arc<Store>,
    sequence: SequenceNumber,
}

impl Snapshot {
    /// Sequence of the commit this snapshot shows.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Locks the catalog for reading.
    ///
    /// Commits wait while the guard is held, so keep it short, and never
    /// take a second guard on the same thread while holding one.
    #[must_use]
    pub fn read(&self) -> SnapshotRead<'_> {
        SnapshotRead {
            catalog: self.store.catalog.read(),
            sequence: self.sequence,
        }
    }

    /// Collection names, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.read().collection_names()
    }
}

impl Clone for Snapshot {
    fn clone(&self) -> Self {
        self.store.pin(self.sequence);
        Self {
            store: Arc::clone(&self.store),
            sequence: self.sequence,
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.store.unpin(self.sequence);
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// A read-locked [`Snapshot`].
pub struct SnapshotRead<'a> {
    catalog: RwLockReadGuard<'a, Catalog>,
    sequence: SequenceNumber,
}

impl SnapshotRead<'_> {
    /// Sequence being read.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Looks up a collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<CollectionAt<'_>> {
        self.catalog.collection_at(name, self.sequence)
    }

    /// All collections in name order.
    pub fn collections(&self) -> impl Iterator<Item = CollectionAt<'_>> {
        self.catalog.collections_at(self.sequence)
    }

    /// Collection names, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections()
            .map(|collection| collection.name().to_string())
            .collect()
    }
}

impl fmt::Debug for SnapshotRead<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotRead")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

//! A transaction's own writes laid over committed state.
//!
//! An overlay never copies committed documents. It records which committed
//! records the transaction deleted, holds the documents it inserted, and
//! keeps indexes it created in two halves: one over its own documents and
//! one over the committed documents still visible to it. Reads merge the
//! committed collection with the overlay, committed documents first.

use crate::collection::{admit_index, CollectionState, Filter, IndexSpec, IndexState, RecordId};
use crate::error::{CoreError, CoreResult};
use crate::storage::CollectionAt;
use crate::transaction::Mutation;
use crate::types::SequenceNumber;
use doctxn_codec::Document;
use std::collections::BTreeSet;

/// What one transaction changed in one collection.
#[derive(Debug, Clone)]
pub(crate) struct Overlay {
    /// Committed sequence the overlay was built against.
    base: SequenceNumber,
    exists: bool,
    /// Set by a drop: committed documents and indexes no longer show.
    detached: bool,
    /// Committed records deleted by the transaction.
    removed: BTreeSet<RecordId>,
    /// Documents the transaction inserted. Its index list is the full
    /// index list of the collection as the transaction sees it.
    added: CollectionState,
    /// Indexes created by the transaction, over committed records not in
    /// `removed`.
    built: Vec<IndexState>,
}

impl Overlay {
    /// An overlay with no changes yet.
    pub(crate) fn new(name: &str, committed: Option<CollectionAt<'_>>, base: SequenceNumber) -> Self {
        let added = match committed {
            Some(committed) => CollectionState::with_indexes(name, committed.indexes()),
            None => CollectionState::new(name),
        };
        Self {
            base,
            exists: committed.is_some(),
            detached: false,
            removed: BTreeSet::new(),
            added,
            built: Vec::new(),
        }
    }

    /// Builds an overlay by applying `mutations` in order.
    pub(crate) fn replay<'m, I>(
        name: &str,
        committed: Option<CollectionAt<'_>>,
        base: SequenceNumber,
        mutations: I,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = &'m Mutation>,
    {
        let mut overlay = Self::new(name, committed, base);
        for mutation in mutations {
            overlay.apply(committed, mutation)?;
        }
        Ok(overlay)
    }

    pub(crate) fn base(&self) -> SequenceNumber {
        self.base
    }

    pub(crate) fn exists(&self) -> bool {
        self.exists
    }

    /// Index specifications, `_id_` first.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = &IndexSpec> {
        self.added.indexes()
    }

    /// Applies a mutation, or fails and leaves the overlay unchanged.
    ///
    /// `committed` must be the collection at [`Overlay::base`].
    pub(crate) fn apply(&mut self, committed: Option<CollectionAt<'_>>, mutation: &Mutation) -> CoreResult<()> {
        match mutation {
            Mutation::Insert { document, .. } => {
                self.check_insert(committed, document)?;
                self.added.insert(document.clone())?;
                self.exists = true;
            }
            Mutation::Delete { ids, .. } => {
                for id in ids {
                    if self.added.remove_id(id).is_some() {
                        continue;
                    }
                    let Some(committed) = self.visible(committed) else {
                        continue;
                    };
                    let Some(record) = committed.find_id(id) else {
                        continue;
                    };
                    if self.removed.insert(record) {
                        if let Some(doc) = committed.document(record) {
                            for index in &mut self.built {
                                index.remove(doc, record);
                            }
                        }
                    }
                }
            }
            Mutation::CreateIndex { spec, .. } => self.create_index(committed, spec)?,
            Mutation::DropIndex { collection, name } => {
                if !self.exists {
                    return Err(CoreError::CollectionNotFound {
                        name: collection.clone(),
                    });
                }
                self.added.drop_index(name)?;
                self.built.retain(|index| index.spec().name() != name);
            }
            Mutation::DropCollection { collection } => {
                self.exists = false;
                self.detached = true;
                self.removed.clear();
                self.built.clear();
                self.added = CollectionState::new(collection.as_str());
            }
        }
        Ok(())
    }

    /// Matching documents, committed ones first, plus whether an index
    /// served the lookup.
    pub(crate) fn select<'a>(
        &'a self,
        committed: Option<CollectionAt<'a>>,
        filter: &Filter,
    ) -> (Vec<&'a Document>, bool) {
        let (mut docs, used_committed) = match self.visible(committed) {
            Some(committed) => committed.select(filter, &self.removed),
            None => (Vec::new(), false),
        };
        let (added, used_added) = self.added.select(filter);
        docs.extend(added);
        (docs, used_committed || used_added)
    }

    /// Number of matching documents, plus whether an index served it.
    pub(crate) fn count(&self, committed: Option<CollectionAt<'_>>, filter: &Filter) -> (usize, bool) {
        if filter.is_empty() {
            let shown = self
                .visible(committed)
                .map_or(0, |committed| committed.len().saturating_sub(self.removed.len()));
            return (shown + self.added.len(), false);
        }
        let (docs, used_index) = self.select(committed, filter);
        (docs.len(), used_index)
    }

    fn visible<'a>(&self, committed: Option<CollectionAt<'a>>) -> Option<CollectionAt<'a>> {
        committed.filter(|_| !self.detached)
    }

    fn check_insert(&self, committed: Option<CollectionAt<'_>>, doc: &Document) -> CoreResult<()> {
        self.added.check_insert(doc)?;
        let Some(committed) = self.visible(committed) else {
            return Ok(());
        };
        let collection = self.added.name();
        for spec in self.added.indexes().filter(|spec| spec.is_unique()) {
            match self.built.iter().find(|index| index.spec().name() == spec.name()) {
                Some(built) => built.check_insert(collection, doc)?,
                None => {
                    if let Some(index) = committed.index(spec.name()) {
                        index.check_insert_where(collection, doc, |record| {
                            committed.is_visible(record) && !self.removed.contains(&record)
                        })?;
                    }
                }
            }
        }
        Ok(())
    }

    fn create_index(&mut self, committed: Option<CollectionAt<'_>>, spec: &IndexSpec) -> CoreResult<()> {
        if !admit_index(self.added.name(), self.added.indexes(), spec)? {
            self.exists = true;
            return Ok(());
        }

        let built = match self.visible(committed) {
            Some(committed) => {
                let shown = committed
                    .records()
                    .filter(|(record, _)| !self.removed.contains(record));
                Some(IndexState::build(self.added.name(), spec.clone(), shown)?)
            }
            None => None,
        };
        if let Some(built) = &built {
            for doc in self.added.documents() {
                built.check_insert(self.added.name(), doc)?;
            }
        }
        self.added.create_index(spec.clone())?;
        self.built.extend(built);
        self.exists = true;
        Ok(())
    }
}

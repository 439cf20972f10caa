//! Versioned committed state.
//!
//! Every document, index and collection incarnation carries the sequence
//! of the commit that created it and, once removed, the sequence of the
//! commit that removed it. A reader at sequence `s` sees the versions
//! created at or before `s` and not removed at or before `s`.
//!
//! Commits change the catalog in place. A batch is staged at the next
//! sequence, which no reader can see yet, and either published or reverted
//! from its undo log. Removed versions are kept until no pinned snapshot
//! can still see them.

use crate::collection::{
    admit_index, undroppable, Filter, IndexSpec, IndexState, RecordId, ID_INDEX_NAME,
};
use crate::error::{CoreError, CoreResult};
use crate::transaction::Mutation;
use crate::types::SequenceNumber;
use doctxn_codec::{Document, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Commit sequences bounding a version's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Version {
    created: SequenceNumber,
    removed: Option<SequenceNumber>,
}

impl Version {
    fn new(created: SequenceNumber) -> Self {
        Self {
            created,
            removed: None,
        }
    }

    fn visible_at(self, sequence: SequenceNumber) -> bool {
        self.created <= sequence && self.removed.map_or(true, |removed| removed > sequence)
    }

    fn is_live(self) -> bool {
        self.removed.is_none()
    }
}

#[derive(Debug)]
struct Stored<T> {
    version: Version,
    value: T,
}

impl<T> Stored<T> {
    fn new(value: T, created: SequenceNumber) -> Self {
        Self {
            version: Version::new(created),
            value,
        }
    }
}

/// One incarnation of a collection: everything between a create and the
/// drop that ended it.
#[derive(Debug)]
struct Incarnation {
    id: u64,
    name: String,
    version: Version,
    documents: BTreeMap<RecordId, Stored<Document>>,
    /// `_id_` is always first and never removed.
    indexes: Vec<Stored<IndexState>>,
    next_record: u64,
}

impl Incarnation {
    fn new(name: &str, id: u64, created: SequenceNumber) -> Self {
        Self {
            id,
            name: name.to_string(),
            version: Version::new(created),
            documents: BTreeMap::new(),
            indexes: vec![Stored::new(IndexState::empty(IndexSpec::primary()), created)],
            next_record: 0,
        }
    }

    fn is_live_record(&self, record: RecordId) -> bool {
        self.documents
            .get(&record)
            .is_some_and(|doc| doc.version.is_live())
    }

    fn live_indexes(&self) -> impl Iterator<Item = &IndexState> {
        self.indexes
            .iter()
            .filter(|index| index.version.is_live())
            .map(|index| &index.value)
    }

    fn insert(&mut self, document: Document, sequence: SequenceNumber) -> CoreResult<RecordId> {
        for index in self.live_indexes() {
            index.check_insert_where(&self.name, &document, |record| self.is_live_record(record))?;
        }
        let record = RecordId(self.next_record);
        self.next_record += 1;
        for index in self.indexes.iter_mut().filter(|index| index.version.is_live()) {
            index.value.add(&document, record);
        }
        self.documents.insert(record, Stored::new(document, sequence));
        Ok(record)
    }

    fn remove_id(&mut self, id: &Value, sequence: SequenceNumber) -> Option<RecordId> {
        let record = self.indexes[0]
            .value
            .ids_for(std::slice::from_ref(id))
            .find(|record| self.is_live_record(*record))?;
        let doc = self.documents.get_mut(&record)?;
        doc.version.removed = Some(sequence);
        Some(record)
    }

    fn create_index(&mut self, spec: IndexSpec, sequence: SequenceNumber) -> CoreResult<bool> {
        if !admit_index(&self.name, self.live_indexes().map(IndexState::spec), &spec)? {
            return Ok(false);
        }
        let live = self
            .documents
            .iter()
            .filter(|(_, doc)| doc.version.is_live())
            .map(|(record, doc)| (*record, &doc.value));
        let built = IndexState::build(&self.name, spec, live)?;
        self.indexes.push(Stored::new(built, sequence));
        Ok(true)
    }

    fn drop_index(&mut self, name: &str, sequence: SequenceNumber) -> CoreResult<usize> {
        let position = self
            .indexes
            .iter()
            .position(|index| {
                index.version.is_live() && index.value.spec().name() == name && name != ID_INDEX_NAME
            })
            .ok_or_else(|| undroppable(&self.name, name))?;
        self.indexes[position].version.removed = Some(sequence);
        Ok(position)
    }

    /// Removes a document and its index entries for good.
    fn forget_record(&mut self, record: RecordId) {
        if let Some(doc) = self.documents.remove(&record) {
            for index in &mut self.indexes {
                index.value.remove(&doc.value, record);
            }
        }
    }
}

/// How to take back one step of a staged batch.
#[derive(Debug)]
enum Undo {
    Created { name: String },
    Dropped { name: String, incarnation: u64 },
    Inserted { name: String, incarnation: u64, record: RecordId },
    Removed { name: String, incarnation: u64, record: RecordId },
    IndexCreated { name: String, incarnation: u64 },
    IndexDropped { name: String, incarnation: u64, position: usize },
}

/// A batch applied to the catalog but not yet visible to readers.
///
/// Exactly one of [`Catalog::publish`] or [`Catalog::revert`] must follow.
#[derive(Debug)]
#[must_use]
pub(crate) struct StagedBatch {
    sequence: SequenceNumber,
    undo: Vec<Undo>,
}

impl StagedBatch {
    pub(crate) fn sequence(&self) -> SequenceNumber {
        self.sequence
    }
}

#[derive(Debug)]
enum TombKind {
    Document(RecordId),
    Indexes,
    Collection,
}

/// Something a published commit removed, waiting for vacuum.
#[derive(Debug)]
struct Tomb {
    sequence: SequenceNumber,
    name: String,
    incarnation: u64,
    kind: TombKind,
}

/// Every collection with its version history.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    /// Incarnations per name, oldest first. Only the last may be live.
    collections: BTreeMap<String, Vec<Incarnation>>,
    published: SequenceNumber,
    next_incarnation: u64,
    /// Oldest first.
    graveyard: VecDeque<Tomb>,
}

impl Catalog {
    /// Sequence of the latest published commit.
    pub(crate) fn published(&self) -> SequenceNumber {
        self.published
    }

    /// Number of removed versions not yet vacuumed.
    pub(crate) fn pending_removals(&self) -> usize {
        self.graveyard.len()
    }

    fn incarnation_at(&self, name: &str, sequence: SequenceNumber) -> Option<&Incarnation> {
        self.collections
            .get(name)?
            .iter()
            .rev()
            .find(|incarnation| incarnation.version.visible_at(sequence))
    }

    fn incarnations_at(&self, sequence: SequenceNumber) -> impl Iterator<Item = &Incarnation> {
        self.collections.values().filter_map(move |incarnations| {
            incarnations
                .iter()
                .rev()
                .find(|incarnation| incarnation.version.visible_at(sequence))
        })
    }

    fn live_mut(&mut self, name: &str) -> Option<&mut Incarnation> {
        self.collections
            .get_mut(name)?
            .last_mut()
            .filter(|incarnation| incarnation.version.is_live())
    }

    fn live_or_create(
        &mut self,
        name: &str,
        sequence: SequenceNumber,
        undo: &mut Vec<Undo>,
    ) -> &mut Incarnation {
        let incarnations = self.collections.entry(name.to_string()).or_default();
        if !incarnations.last().is_some_and(|last| last.version.is_live()) {
            self.next_incarnation += 1;
            incarnations.push(Incarnation::new(name, self.next_incarnation, sequence));
            undo.push(Undo::Created {
                name: name.to_string(),
            });
        }
        let last = incarnations.len() - 1;
        &mut incarnations[last]
    }

    fn incarnation_mut(&mut self, name: &str, id: u64) -> Option<&mut Incarnation> {
        self.collections
            .get_mut(name)?
            .iter_mut()
            .find(|incarnation| incarnation.id == id)
    }

    /// Applies a batch at `sequence`, which must be newer than anything
    /// published. Readers of published sequences see none of it.
    ///
    /// If a mutation fails, the steps already taken are reverted and the
    /// catalog is as it was.
    pub(crate) fn stage(
        &mut self,
        mutations: &[Mutation],
        sequence: SequenceNumber,
    ) -> CoreResult<StagedBatch> {
        let mut staged = StagedBatch {
            sequence,
            undo: Vec::new(),
        };
        for mutation in mutations {
            if let Err(err) = self.apply(mutation, sequence, &mut staged.undo) {
                self.revert(staged);
                return Err(err);
            }
        }
        Ok(staged)
    }

    fn apply(
        &mut self,
        mutation: &Mutation,
        sequence: SequenceNumber,
        undo: &mut Vec<Undo>,
    ) -> CoreResult<()> {
        match mutation {
            Mutation::Insert {
                collection,
                document,
            } => {
                let target = self.live_or_create(collection, sequence, undo);
                let record = target.insert(document.clone(), sequence)?;
                undo.push(Undo::Inserted {
                    name: collection.clone(),
                    incarnation: target.id,
                    record,
                });
            }
            Mutation::Delete { collection, ids } => {
                if let Some(target) = self.live_mut(collection) {
                    for id in ids {
                        if let Some(record) = target.remove_id(id, sequence) {
                            undo.push(Undo::Removed {
                                name: collection.clone(),
                                incarnation: target.id,
                                record,
                            });
                        }
                    }
                }
            }
            Mutation::CreateIndex { collection, spec } => {
                let target = self.live_or_create(collection, sequence, undo);
                if target.create_index(spec.clone(), sequence)? {
                    undo.push(Undo::IndexCreated {
                        name: collection.clone(),
                        incarnation: target.id,
                    });
                }
            }
            Mutation::DropIndex { collection, name } => {
                let target = self
                    .live_mut(collection)
                    .ok_or_else(|| CoreError::CollectionNotFound {
                        name: collection.clone(),
                    })?;
                let position = target.drop_index(name, sequence)?;
                undo.push(Undo::IndexDropped {
                    name: collection.clone(),
                    incarnation: target.id,
                    position,
                });
            }
            Mutation::DropCollection { collection } => {
                if let Some(target) = self.live_mut(collection) {
                    target.version.removed = Some(sequence);
                    undo.push(Undo::Dropped {
                        name: collection.clone(),
                        incarnation: target.id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Takes a staged batch back, newest step first.
    pub(crate) fn revert(&mut self, staged: StagedBatch) {
        for step in staged.undo.into_iter().rev() {
            match step {
                Undo::Created { name } => {
                    if let Some(incarnations) = self.collections.get_mut(&name) {
                        incarnations.pop();
                        if incarnations.is_empty() {
                            self.collections.remove(&name);
                        }
                    }
                }
                Undo::Dropped { name, incarnation } => {
                    if let Some(target) = self.incarnation_mut(&name, incarnation) {
                        target.version.removed = None;
                    }
                }
                Undo::Inserted {
                    name,
                    incarnation,
                    record,
                } => {
                    if let Some(target) = self.incarnation_mut(&name, incarnation) {
                        target.forget_record(record);
                    }
                }
                Undo::Removed {
                    name,
                    incarnation,
                    record,
                } => {
                    if let Some(doc) = self
                        .incarnation_mut(&name, incarnation)
                        .and_then(|target| target.documents.get_mut(&record))
                    {
                        doc.version.removed = None;
                    }
                }
                Undo::IndexCreated { name, incarnation } => {
                    if let Some(target) = self.incarnation_mut(&name, incarnation) {
                        target.indexes.pop();
                    }
                }
                Undo::IndexDropped {
                    name,
                    incarnation,
                    position,
                } => {
                    if let Some(index) = self
                        .incarnation_mut(&name, incarnation)
                        .and_then(|target| target.indexes.get_mut(position))
                    {
                        index.version.removed = None;
                    }
                }
            }
        }
    }

    /// Makes a staged batch visible and queues what it removed for vacuum.
    pub(crate) fn publish(&mut self, staged: StagedBatch) {
        let sequence = staged.sequence;
        self.published = sequence;
        for step in staged.undo {
            let (name, incarnation, kind) = match step {
                Undo::Removed {
                    name,
                    incarnation,
                    record,
                } => (name, incarnation, TombKind::Document(record)),
                Undo::IndexDropped {
                    name, incarnation, ..
                } => (name, incarnation, TombKind::Indexes),
                Undo::Dropped { name, incarnation } => (name, incarnation, TombKind::Collection),
                Undo::Created { .. } | Undo::Inserted { .. } | Undo::IndexCreated { .. } => continue,
            };
            self.graveyard.push_back(Tomb {
                sequence,
                name,
                incarnation,
                kind,
            });
        }
    }

    /// Purges versions removed at or before `horizon`, the oldest sequence
    /// any reader still holds. Returns how many removals were purged.
    pub(crate) fn vacuum(&mut self, horizon: SequenceNumber) -> usize {
        let mut purged = 0;
        while let Some(tomb) = self.graveyard.pop_front() {
            if tomb.sequence > horizon {
                self.graveyard.push_front(tomb);
                break;
            }
            self.bury(tomb);
            purged += 1;
        }
        purged
    }

    fn bury(&mut self, tomb: Tomb) {
        match tomb.kind {
            TombKind::Collection => {
                if let Some(incarnations) = self.collections.get_mut(&tomb.name) {
                    incarnations.retain(|incarnation| incarnation.id != tomb.incarnation);
                    if incarnations.is_empty() {
                        self.collections.remove(&tomb.name);
                    }
                }
            }
            TombKind::Document(record) => {
                if let Some(target) = self.incarnation_mut(&tomb.name, tomb.incarnation) {
                    target.forget_record(record);
                }
            }
            TombKind::Indexes => {
                if let Some(target) = self.incarnation_mut(&tomb.name, tomb.incarnation) {
                    target
                        .indexes
                        .retain(|index| index.version.removed != Some(tomb.sequence));
                }
            }
        }
    }

    /// Collection `name` as of `sequence`.
    pub(crate) fn collection_at(&self, name: &str, sequence: SequenceNumber) -> Option<CollectionAt<'_>> {
        self.incarnation_at(name, sequence)
            .map(|incarnation| CollectionAt {
                incarnation,
                sequence,
            })
    }

    /// Every collection that exists as of `sequence`, in name order.
    pub(crate) fn collections_at(
        &self,
        sequence: SequenceNumber,
    ) -> impl Iterator<Item = CollectionAt<'_>> {
        self.incarnations_at(sequence).map(move |incarnation| CollectionAt {
            incarnation,
            sequence,
        })
    }
}

/// One committed collection as of one sequence.
#[derive(Debug, Clone, Copy)]
pub struct CollectionAt<'a> {
    incarnation: &'a Incarnation,
    sequence: SequenceNumber,
}

impl<'a> CollectionAt<'a> {
    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        let incarnation = self.incarnation;
        &incarnation.name
    }

    /// Number of documents. Walks the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records().count()
    }

    /// Returns true if the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records().next().is_none()
    }

    /// Documents in insertion order.
    pub fn documents(&self) -> impl Iterator<Item = &'a Document> + 'a {
        self.records().map(|(_, doc)| doc)
    }

    /// Index specifications, `_id_` first.
    pub fn indexes(&self) -> impl Iterator<Item = &'a IndexSpec> + 'a {
        self.visible_indexes().map(IndexState::spec)
    }

    /// Number of distinct keys the named index holds for visible documents.
    #[must_use]
    pub fn index_key_count(&self, name: &str) -> Option<usize> {
        self.index(name)
            .map(|index| index.key_count_where(|record| self.is_visible(record)))
    }

    /// Matching documents in insertion order.
    #[must_use]
    pub fn find(&self, filter: &Filter) -> Vec<Document> {
        self.select(filter, &BTreeSet::new())
            .0
            .into_iter()
            .cloned()
            .collect()
    }

    /// Number of matching documents.
    #[must_use]
    pub fn count(&self, filter: &Filter) -> usize {
        if filter.is_empty() {
            return self.len();
        }
        self.select(filter, &BTreeSet::new()).0.len()
    }

    /// Visible documents with their record ids, in insertion order.
    pub(crate) fn records(&self) -> impl Iterator<Item = (RecordId, &'a Document)> + 'a {
        let (incarnation, sequence) = (self.incarnation, self.sequence);
        incarnation
            .documents
            .iter()
            .filter(move |(_, doc)| doc.version.visible_at(sequence))
            .map(|(record, doc)| (*record, &doc.value))
    }

    pub(crate) fn document(&self, record: RecordId) -> Option<&'a Document> {
        let incarnation = self.incarnation;
        incarnation
            .documents
            .get(&record)
            .filter(|doc| doc.version.visible_at(self.sequence))
            .map(|doc| &doc.value)
    }

    pub(crate) fn is_visible(&self, record: RecordId) -> bool {
        self.document(record).is_some()
    }

    /// Record holding `_id == id`.
    pub(crate) fn find_id(&self, id: &Value) -> Option<RecordId> {
        self.incarnation.indexes[0]
            .value
            .ids_for(std::slice::from_ref(id))
            .find(|record| self.is_visible(*record))
    }

    pub(crate) fn index(&self, name: &str) -> Option<&'a IndexState> {
        self.visible_indexes()
            .find(|index| index.spec().name() == name)
    }

    fn visible_indexes(&self) -> impl Iterator<Item = &'a IndexState> + 'a {
        let (incarnation, sequence) = (self.incarnation, self.sequence);
        incarnation
            .indexes
            .iter()
            .filter(move |index| index.version.visible_at(sequence))
            .map(|index| &index.value)
    }

    /// Evaluates a filter over the visible documents not in `hidden`,
    /// using an index when one of the conditions is on the leading field of
    /// an index. The flag reports whether it did.
    pub(crate) fn select(
        &self,
        filter: &Filter,
        hidden: &BTreeSet<RecordId>,
    ) -> (Vec<&'a Document>, bool) {
        let candidate = filter.conditions().find_map(|(path, value)| {
            self.visible_indexes()
                .find(|index| index.spec().keys().first().is_some_and(|(f, _)| f == path))
                .map(|index| index.lookup_leading(value))
        });

        match candidate {
            Some(records) => {
                let docs = records
                    .into_iter()
                    .filter(|record| !hidden.contains(record))
                    .filter_map(|record| self.document(record))
                    .filter(|doc| filter.matches(doc))
                    .collect();
                (docs, true)
            }
            None => {
                let docs = self
                    .records()
                    .filter(|(record, doc)| !hidden.contains(record) && filter.matches(doc))
                    .map(|(_, doc)| doc)
                    .collect();
                (docs, false)
            }
        }
    }
}

//! Unversioned document sets.

use crate::collection::filter::Filter;
use crate::collection::index::{admit_index, undroppable, IndexSpec, IndexState, ID_INDEX_NAME};
use crate::error::CoreResult;
use doctxn_codec::{Document, Value};
use std::collections::BTreeMap;

/// Position of a document within its collection. Assigned in insertion
/// order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct RecordId(pub u64);

/// Documents and indexes of one collection with no version history.
///
/// A transaction keeps the documents it inserted in one of these, next to
/// the committed collection it reads through.
#[derive(Debug, Clone)]
pub(crate) struct CollectionState {
    name: String,
    documents: BTreeMap<RecordId, Document>,
    /// `_id_` is always first.
    indexes: Vec<IndexState>,
    next_record: u64,
}

impl CollectionState {
    /// Creates an empty collection with its `_id_` index.
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: BTreeMap::new(),
            indexes: vec![IndexState::empty(IndexSpec::primary())],
            next_record: 0,
        }
    }

    /// Creates an empty collection carrying `specs`, which must start with
    /// `_id_`.
    pub(crate) fn with_indexes<'a, I>(name: impl Into<String>, specs: I) -> Self
    where
        I: IntoIterator<Item = &'a IndexSpec>,
    {
        let mut state = Self::new(name);
        state.indexes.extend(
            specs
                .into_iter()
                .filter(|spec| spec.name() != ID_INDEX_NAME)
                .cloned()
                .map(IndexState::empty),
        );
        state
    }

    /// Collection name.
    #[must_use]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Number of documents.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the collection holds no documents.
    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents in insertion order.
    pub(crate) fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    /// Index specifications, `_id_` first.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = &IndexSpec> {
        self.indexes.iter().map(IndexState::spec)
    }

    /// Evaluates a filter, using an index when one of the conditions is on
    /// the leading field of an index. The flag reports whether it did.
    pub(crate) fn select(&self, filter: &Filter) -> (Vec<&Document>, bool) {
        let candidate = filter.conditions().find_map(|(path, value)| {
            self.indexes
                .iter()
                .find(|index| index.spec().keys().first().is_some_and(|(f, _)| f == path))
                .map(|index| index.lookup_leading(value))
        });

        match candidate {
            Some(ids) => {
                let docs = ids
                    .iter()
                    .filter_map(|id| self.documents.get(id))
                    .filter(|doc| filter.matches(doc))
                    .collect();
                (docs, true)
            }
            None => {
                let docs = self
                    .documents
                    .values()
                    .filter(|doc| filter.matches(doc))
                    .collect();
                (docs, false)
            }
        }
    }

    /// Fails if inserting `document` would break a unique index.
    pub(crate) fn check_insert(&self, document: &Document) -> CoreResult<()> {
        self.indexes
            .iter()
            .try_for_each(|index| index.check_insert(&self.name, document))
    }

    /// Inserts a document. Every unique index is checked before anything
    /// is modified.
    pub(crate) fn insert(&mut self, document: Document) -> CoreResult<()> {
        self.check_insert(&document)?;
        let id = RecordId(self.next_record);
        self.next_record += 1;
        for index in &mut self.indexes {
            index.add(&document, id);
        }
        self.documents.insert(id, document);
        Ok(())
    }

    /// Record holding `_id == id`.
    pub(crate) fn find_id(&self, id: &Value) -> Option<RecordId> {
        self.indexes[0].ids_for(std::slice::from_ref(id)).next()
    }

    /// Removes the document whose `_id` is `id`.
    pub(crate) fn remove_id(&mut self, id: &Value) -> Option<Document> {
        let record = self.find_id(id)?;
        let doc = self.documents.remove(&record)?;
        for index in &mut self.indexes {
            index.remove(&doc, record);
        }
        Some(doc)
    }

    /// Builds an index. Returns `false` if an identical index already
    /// exists.
    pub(crate) fn create_index(&mut self, spec: IndexSpec) -> CoreResult<bool> {
        if !admit_index(&self.name, self.indexes(), &spec)? {
            return Ok(false);
        }

        let built = IndexState::build(
            &self.name,
            spec,
            self.documents.iter().map(|(id, doc)| (*id, doc)),
        )?;
        self.indexes.push(built);
        Ok(true)
    }

    /// Drops a secondary index.
    pub(crate) fn drop_index(&mut self, name: &str) -> CoreResult<()> {
        let position = self.droppable_index(name)?;
        self.indexes.remove(position);
        Ok(())
    }

    /// Position of a secondary index that may be dropped.
    pub(crate) fn droppable_index(&self, name: &str) -> CoreResult<usize> {
        self.indexes
            .iter()
            .skip(1)
            .position(|index| index.spec().name() == name)
            .map(|position| position + 1)
            .ok_or_else(|| undroppable(&self.name, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn doc(id: i64, a: &str) -> Document {
        Document::new().with("_id", id).with("a", a)
    }

    fn populated() -> CollectionState {
        let mut state = CollectionState::new("c");
        state.insert(doc(1, "x")).unwrap();
        state.insert(doc(2, "y")).unwrap();
        state.insert(doc(3, "x")).unwrap();
        state
    }

    #[test]
    fn insertion_order_is_kept() {
        let state = populated();
        let ids: Vec<_> = state
            .documents()
            .map(|d| d.get("_id").cloned().unwrap())
            .collect();
        assert_eq!(ids, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
    }

    #[test]
    fn duplicate_id_is_rejected_without_side_effects() {
        let mut state = populated();
        let err = state.insert(doc(2, "z")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { ref index, .. } if index == ID_INDEX_NAME));
        assert_eq!(state.len(), 3);
        assert_eq!(state.indexes[0].key_count_where(|_| true), 3);
    }

    #[test]
    fn lookups_use_an_index_when_possible() {
        let mut state = populated();
        let (hits, used) = state.select(&Filter::eq("a", "x"));
        assert_eq!(hits.len(), 2);
        assert!(!used);

        assert!(state.create_index(IndexSpec::ascending("a").unwrap()).unwrap());
        let (hits, used) = state.select(&Filter::eq("a", "x"));
        assert_eq!(hits.len(), 2);
        assert!(used);
        assert_eq!(state.select(&Filter::eq("a", "y")).0.len(), 1);
    }

    #[test]
    fn create_index_is_idempotent_for_identical_specs() {
        let mut state = populated();
        let spec = IndexSpec::ascending("a").unwrap();
        assert!(state.create_index(spec.clone()).unwrap());
        assert!(!state.create_index(spec).unwrap());
    }

    #[test]
    fn create_index_conflicts() {
        let mut state = populated();
        state.create_index(IndexSpec::ascending("a").unwrap()).unwrap();

        let same_name = IndexSpec::ascending("b").unwrap().named("a_1");
        assert!(matches!(
            state.create_index(same_name),
            Err(CoreError::IndexConflict { .. })
        ));
        let same_keys = IndexSpec::ascending("a").unwrap().named("other");
        assert!(matches!(
            state.create_index(same_keys),
            Err(CoreError::IndexConflict { .. })
        ));
    }

    #[test]
    fn unique_build_over_duplicates_fails() {
        let mut state = populated();
        let err = state
            .create_index(IndexSpec::ascending("a").unwrap().unique())
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
        assert_eq!(state.indexes().count(), 1);
    }

    #[test]
    fn remove_by_id_clears_every_index() {
        let mut state = populated();
        state.create_index(IndexSpec::ascending("a").unwrap()).unwrap();

        let removed = state.remove_id(&Value::Integer(1)).unwrap();
        assert_eq!(removed.get("a"), Some(&Value::from("x")));
        assert!(state.remove_id(&Value::Integer(1)).is_none());
        assert_eq!(state.select(&Filter::eq("a", "x")).0.len(), 1);
        assert_eq!(state.indexes[0].key_count_where(|_| true), 2);
        assert!(state.insert(doc(1, "again")).is_ok());
    }

    #[test]
    fn with_indexes_copies_the_secondary_specs() {
        let unique = IndexSpec::ascending("a").unwrap().unique();
        let state = CollectionState::with_indexes("c", &[IndexSpec::primary(), unique.clone()]);
        let specs: Vec<_> = state.indexes().cloned().collect();
        assert_eq!(specs, vec![IndexSpec::primary(), unique]);
        assert!(state.is_empty());
    }

    #[test]
    fn primary_index_cannot_be_dropped() {
        let mut state = populated();
        assert!(matches!(
            state.drop_index(ID_INDEX_NAME),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            state.drop_index("nope"),
            Err(CoreError::IndexNotFound { .. })
        ));
    }
}

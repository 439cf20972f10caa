//! Secondary index specifications and their in-memory entries.
//!
//! Entries map keys to record ids only. Whether a record is live is up to
//! the owner: committed collections keep entries for deleted records until
//! no snapshot can see them, so lookups filter by visibility.

use crate::collection::state::RecordId;
use crate::error::{CoreError, CoreResult};
use doctxn_codec::{Document, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the implicit unique index on `_id`.
pub const ID_INDEX_NAME: &str = "_id_";

/// Declares an index: ordered key fields with a direction each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    name: String,
    keys: Vec<(String, i32)>,
    unique: bool,
}

impl IndexSpec {
    /// Builds a spec from `(field, direction)` pairs, naming it the
    /// conventional way (`a_1_b_-1`).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIndexSpec`] for an empty key list, an
    /// empty or `$`-prefixed field, a repeated field, or a direction other
    /// than `1` / `-1`.
    pub fn new(keys: Vec<(String, i32)>) -> CoreResult<Self> {
        if keys.is_empty() {
            return Err(CoreError::invalid_index_spec("key pattern is empty"));
        }
        let mut seen = BTreeSet::new();
        for (field, direction) in &keys {
            if field.is_empty() || field.starts_with('$') {
                return Err(CoreError::invalid_index_spec(format!(
                    "bad key field {field:?}"
                )));
            }
            if *direction != 1 && *direction != -1 {
                return Err(CoreError::invalid_index_spec(format!(
                    "direction for {field} must be 1 or -1, got {direction}"
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(CoreError::invalid_index_spec(format!(
                    "field {field} appears twice"
                )));
            }
        }
        let name = keys
            .iter()
            .map(|(f, d)| format!("{f}_{d}"))
            .collect::<Vec<_>>()
            .join("_");
        Ok(Self {
            name,
            keys,
            unique: false,
        })
    }

    /// Single ascending field.
    ///
    /// # Errors
    ///
    /// Same as [`IndexSpec::new`].
    pub fn ascending(field: impl Into<String>) -> CoreResult<Self> {
        Self::new(vec![(field.into(), 1)])
    }

    /// Builds a spec from a key pattern document such as `{a: 1}`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIndexSpec`] if a direction is not an
    /// integer, plus everything [`IndexSpec::new`] rejects.
    pub fn from_key_document(pattern: &Document) -> CoreResult<Self> {
        let keys = pattern
            .iter()
            .map(|(field, dir)| {
                let dir = dir
                    .as_integer()
                    .and_then(|d| i32::try_from(d).ok())
                    .ok_or_else(|| {
                        CoreError::invalid_index_spec(format!(
                            "direction for {field} must be an integer, got {}",
                            dir.type_name()
                        ))
                    })?;
                Ok((field.to_string(), dir))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(keys)
    }

    /// The implicit `_id_` index every collection carries.
    #[must_use]
    pub fn primary() -> Self {
        Self {
            name: ID_INDEX_NAME.to_string(),
            keys: vec![("_id".to_string(), 1)],
            unique: true,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Overrides the generated name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key fields and directions.
    #[must_use]
    pub fn keys(&self) -> &[(String, i32)] {
        &self.keys
    }

    /// Whether the index rejects duplicate keys.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Key pattern as a document, e.g. `{a: 1}`.
    #[must_use]
    pub fn key_document(&self) -> Document {
        self.keys
            .iter()
            .map(|(f, d)| (f.clone(), Value::Integer(i64::from(*d))))
            .collect()
    }

    /// Full description: `{name, key, unique}`.
    #[must_use]
    pub fn to_document(&self) -> Document {
        Document::new()
            .with("name", self.name.as_str())
            .with("key", self.key_document())
            .with("unique", self.unique)
    }

    /// Inverse of [`IndexSpec::to_document`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIndexSpec`] if a part is missing or
    /// malformed.
    pub fn from_document(doc: &Document) -> CoreResult<Self> {
        let name = doc
            .get("name")
            .and_then(Value::as_text)
            .ok_or_else(|| CoreError::invalid_index_spec("missing name"))?;
        let key = doc
            .get("key")
            .and_then(Value::as_document)
            .ok_or_else(|| CoreError::invalid_index_spec("missing key pattern"))?;
        let unique = doc.get("unique").and_then(Value::as_bool).unwrap_or(false);

        if name == ID_INDEX_NAME {
            return Ok(Self::primary());
        }
        let spec = Self::from_key_document(key)?.named(name);
        Ok(if unique { spec.unique() } else { spec })
    }

    /// Extracts this index's key from a document. Missing fields index as
    /// null.
    #[must_use]
    pub fn key_of(&self, doc: &Document) -> Vec<Value> {
        self.keys
            .iter()
            .map(|(field, _)| doc.get_path(field).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// A built index over one collection.
#[derive(Debug, Clone)]
pub(crate) struct IndexState {
    spec: IndexSpec,
    entries: BTreeMap<Vec<Value>, BTreeSet<RecordId>>,
}

impl IndexState {
    pub(crate) fn empty(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    /// Builds an index over existing documents.
    pub(crate) fn build<'a, I>(collection: &str, spec: IndexSpec, docs: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (RecordId, &'a Document)>,
    {
        let mut index = Self::empty(spec);
        for (id, doc) in docs {
            index.check_insert(collection, doc)?;
            index.add(doc, id);
        }
        Ok(index)
    }

    pub(crate) fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Rejects a document whose key a unique index already holds.
    pub(crate) fn check_insert(&self, collection: &str, doc: &Document) -> CoreResult<()> {
        self.check_insert_where(collection, doc, |_| true)
    }

    /// Like [`IndexState::check_insert`], counting only holders for which
    /// `live` returns true.
    pub(crate) fn check_insert_where<F>(&self, collection: &str, doc: &Document, live: F) -> CoreResult<()>
    where
        F: Fn(RecordId) -> bool,
    {
        if !self.spec.unique {
            return Ok(());
        }
        let key = self.spec.key_of(doc);
        if self.ids_for(&key).any(live) {
            return Err(self.duplicate(collection, &key));
        }
        Ok(())
    }

    pub(crate) fn duplicate(&self, collection: &str, key: &[Value]) -> CoreError {
        CoreError::DuplicateKey {
            collection: collection.to_string(),
            index: self.spec.name.clone(),
            key: render_key(key),
        }
    }

    pub(crate) fn add(&mut self, doc: &Document, id: RecordId) {
        self.entries
            .entry(self.spec.key_of(doc))
            .or_default()
            .insert(id);
    }

    pub(crate) fn remove(&mut self, doc: &Document, id: RecordId) {
        let key = self.spec.key_of(doc);
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Record ids whose first key component equals `value`, in record order.
    pub(crate) fn lookup_leading(&self, value: &Value) -> BTreeSet<RecordId> {
        self.entries
            .range(vec![value.clone()]..)
            .take_while(|(key, _)| key.first() == Some(value))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Record ids holding exactly `key`.
    pub(crate) fn ids_for<'a>(&'a self, key: &[Value]) -> impl Iterator<Item = RecordId> + 'a {
        self.entries
            .get(key)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }

    /// Number of distinct keys with at least one holder for which `live`
    /// returns true.
    pub(crate) fn key_count_where<F>(&self, live: F) -> usize
    where
        F: Fn(RecordId) -> bool,
    {
        self.entries
            .values()
            .filter(|ids| ids.iter().any(|id| live(*id)))
            .count()
    }
}

/// Decides whether `spec` may be added next to `existing`.
///
/// Returns `Ok(false)` when an identical index is already there, which
/// makes index creation idempotent.
pub(crate) fn admit_index<'a, I>(collection: &str, existing: I, spec: &IndexSpec) -> CoreResult<bool>
where
    I: IntoIterator<Item = &'a IndexSpec>,
{
    for existing in existing {
        let same_keys = existing.keys() == spec.keys();
        let same_name = existing.name() == spec.name();
        if same_keys && same_name && existing.is_unique() == spec.is_unique() {
            return Ok(false);
        }
        if same_name {
            return Err(CoreError::IndexConflict {
                collection: collection.to_string(),
                message: format!(
                    "index {} already exists with a different definition",
                    spec.name()
                ),
            });
        }
        if same_keys {
            return Err(CoreError::IndexConflict {
                collection: collection.to_string(),
                message: format!(
                    "index with the same key pattern already exists as {}",
                    existing.name()
                ),
            });
        }
    }
    Ok(true)
}

/// Error for dropping an index that cannot be dropped: `_id_`, or a name
/// that is not there.
pub(crate) fn undroppable(collection: &str, name: &str) -> CoreError {
    if name == ID_INDEX_NAME {
        CoreError::invalid_operation("cannot drop the _id_ index")
    } else {
        CoreError::IndexNotFound {
            collection: collection.to_string(),
            name: name.to_string(),
        }
    }
}

fn render_key(key: &[Value]) -> String {
    match key {
        [single] => single.to_string(),
        many => Value::Array(many.to_vec()).to_string(),
    }
}

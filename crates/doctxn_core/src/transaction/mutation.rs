//! Staged mutations.

use crate::collection::IndexSpec;
use crate::error::{CoreError, CoreResult};
use doctxn_codec::{from_cbor, to_cbor, Document, Value};

/// One staged write.
///
/// Mutations are immutable once appended to a write buffer. The same value
/// is laid over committed state for in-transaction reads, applied at
/// commit, and written to the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert a document. The `_id` is assigned before staging.
    Insert {
        /// Target collection.
        collection: String,
        /// Document including its `_id`.
        document: Document,
    },
    /// Delete documents by `_id`.
    ///
    /// The ids are the documents the deleting connection saw match its
    /// filter. Ids that are gone by commit time are skipped, and documents
    /// inserted since with the same filter are left alone.
    Delete {
        /// Target collection.
        collection: String,
        /// `_id` of each document to remove.
        ids: Vec<Value>,
    },
    /// Build a secondary index.
    CreateIndex {
        /// Target collection.
        collection: String,
        /// Index to build.
        spec: IndexSpec,
    },
    /// Drop a secondary index by name.
    DropIndex {
        /// Target collection.
        collection: String,
        /// Index name.
        name: String,
    },
    /// Drop a collection with its documents and indexes.
    DropCollection {
        /// Target collection.
        collection: String,
    },
}

impl Mutation {
    /// The collection this mutation touches.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Insert { collection, .. }
            | Self::Delete { collection, .. }
            | Self::CreateIndex { collection, .. }
            | Self::DropIndex { collection, .. }
            | Self::DropCollection { collection } => collection,
        }
    }

    /// Short operation name, used in logs and the journal.
    #[must_use]
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Delete { .. } => "delete",
            Self::CreateIndex { .. } => "createIndex",
            Self::DropIndex { .. } => "dropIndex",
            Self::DropCollection { .. } => "drop",
        }
    }

    /// True for operations that change collection structure rather than data.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Insert { .. } | Self::Delete { .. })
    }

    /// Document form: `{op, ns, ...}`.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let base = Document::new()
            .with("op", self.op_name())
            .with("ns", self.collection());
        match self {
            Self::Insert { document, .. } => base.with("document", document.clone()),
            Self::Delete { ids, .. } => base.with("ids", Value::Array(ids.clone())),
            Self::CreateIndex { spec, .. } => base.with("spec", spec.to_document()),
            Self::DropIndex { name, .. } => base.with("name", name.as_str()),
            Self::DropCollection { .. } => base,
        }
    }

    /// Parses the form produced by [`Mutation::to_document`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalCorruption`] for unknown operations or
    /// missing fields.
    pub fn from_document(doc: &Document) -> CoreResult<Self> {
        let text = |field: &str| {
            doc.get(field)
                .and_then(Value::as_text)
                .ok_or_else(|| CoreError::journal_corruption(format!("mutation missing {field}")))
        };
        let sub = |field: &str| {
            doc.get(field)
                .and_then(Value::as_document)
                .ok_or_else(|| CoreError::journal_corruption(format!("mutation missing {field}")))
        };

        let collection = text("ns")?.to_string();
        match text("op")? {
            "insert" => Ok(Self::Insert {
                collection,
                document: sub("document")?.clone(),
            }),
            "delete" => match doc.get("ids") {
                Some(Value::Array(ids)) => Ok(Self::Delete {
                    collection,
                    ids: ids.clone(),
                }),
                _ => Err(CoreError::journal_corruption("mutation missing ids")),
            },
            "createIndex" => Ok(Self::CreateIndex {
                collection,
                spec: IndexSpec::from_document(sub("spec")?)?,
            }),
            "dropIndex" => Ok(Self::DropIndex {
                collection,
                name: text("name")?.to_string(),
            }),
            "drop" => Ok(Self::DropCollection { collection }),
            other => Err(CoreError::journal_corruption(format!(
                "unknown mutation op {other}"
            ))),
        }
    }

    /// Encodes to CBOR for the journal.
    ///
    /// # Errors
    ///
    /// Returns a codec error if encoding fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(to_cbor(&Value::Document(self.to_document()))?)
    }

    /// Decodes a journal payload.
    ///
    /// # Errors
    ///
    /// Returns a codec error for bad CBOR, or
    /// [`CoreError::JournalCorruption`] if the payload is not a mutation.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        match from_cbor(bytes)? {
            Value::Document(doc) => Self::from_document(&doc),
            other => Err(CoreError::journal_corruption(format!(
                "mutation payload is {}, not a document",
                other.type_name()
            ))),
        }
    }
}

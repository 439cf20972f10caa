//! Error types for DocTxn core.

use crate::types::TransactionId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in DocTxn core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] doctxn_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] doctxn_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The command is not allowed in the connection's transaction state.
    #[error("invalid transaction state: {message}")]
    InvalidTransactionState {
        /// What was wrong with the state.
        message: String,
    },

    /// Commit or rollback was issued with no transaction open.
    #[error("no transaction is active on this connection")]
    NoActiveTransaction,

    /// A commit could not be applied; nothing was written and the
    /// transaction has been discarded.
    #[error("{txid} failed to apply: {source}")]
    ApplyFailed {
        /// The discarded transaction.
        txid: TransactionId,
        /// What the storage engine rejected.
        #[source]
        source: Box<CoreError>,
    },

    /// A unique index already holds the key.
    #[error("duplicate key in {collection} index {index}: {key}")]
    DuplicateKey {
        /// Collection name.
        collection: String,
        /// Index name.
        index: String,
        /// Rendered key.
        key: String,
    },

    /// An index with the same name or keys exists with different options.
    #[error("index conflict in {collection}: {message}")]
    IndexConflict {
        /// Collection name.
        collection: String,
        /// Description of the conflict.
        message: String,
    },

    /// The named index does not exist.
    #[error("index not found: {name} in {collection}")]
    IndexNotFound {
        /// Collection name.
        collection: String,
        /// Index name.
        name: String,
    },

    /// The collection does not exist.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Collection name.
        name: String,
    },

    /// The collection name is not usable.
    #[error("invalid collection name {name:?}: {reason}")]
    InvalidCollectionName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The document cannot be stored.
    #[error("invalid document: {reason}")]
    InvalidDocument {
        /// Why it was rejected.
        reason: String,
    },

    /// The index specification is malformed.
    #[error("invalid index specification: {reason}")]
    InvalidIndexSpec {
        /// Why it was rejected.
        reason: String,
    },

    /// The query filter is not supported.
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// Why it was rejected.
        reason: String,
    },

    /// The journal holds bytes that are not a valid record.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A journal record failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Another process holds the database directory.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Invalid database directory or layout.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates an invalid transaction state error.
    pub fn invalid_transaction_state(message: impl Into<String>) -> Self {
        Self::InvalidTransactionState {
            message: message.into(),
        }
    }

    /// Wraps a storage failure raised while applying a commit.
    pub fn apply_failed(txid: TransactionId, source: CoreError) -> Self {
        Self::ApplyFailed {
            txid,
            source: Box::new(source),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    /// Creates an invalid index spec error.
    pub fn invalid_index_spec(reason: impl Into<String>) -> Self {
        Self::InvalidIndexSpec {
            reason: reason.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Creates an invalid collection name error.
    pub fn invalid_collection_name(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCollectionName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// True for errors caused by issuing a transaction command in the wrong
    /// state (double begin, commit or rollback with nothing open).
    #[must_use]
    pub fn is_transaction_state_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransactionState { .. } | Self::NoActiveTransaction
        )
    }

    /// Numeric code reported to clients, following the document-store
    /// conventions the command surface imitates.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::DuplicateKey { .. } => 11000,
            Self::InvalidTransactionState { .. } | Self::NoActiveTransaction => 251,
            Self::ApplyFailed { source, .. } => source.code(),
            Self::IndexConflict { .. } => 85,
            Self::IndexNotFound { .. } => 27,
            Self::CollectionNotFound { .. } => 26,
            Self::InvalidCollectionName { .. } => 73,
            Self::InvalidDocument { .. } => 2,
            Self::InvalidIndexSpec { .. } => 67,
            Self::InvalidQuery { .. } => 2,
            _ => 1,
        }
    }
}

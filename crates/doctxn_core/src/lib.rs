//! # DocTxn Core
//!
//! Multi-statement transactions for an embedded document store.
//!
//! This crate provides:
//! - Per-connection transactions (`beginTransaction` / `commitTransaction` /
//!   `rollbackTransaction`) with private write buffers
//! - Reads that see a transaction's own writes in issuance order
//! - Atomic, fail-closed commit application
//! - Collections with a unique `_id_` index and secondary indexes
//! - An optional commit journal for durability
//!
//! ```rust,ignore
//! use doctxn_core::{Database, Document, Filter};
//!
//! let db = Database::open_in_memory();
//! let mut session = db.connect()?;
//! session.insert("c", Document::new().with("a", "before"))?;
//! session.begin_transaction()?;
//! session.insert("c", Document::new().with("a", "during"))?;
//! assert_eq!(session.count("c")?, 2);
//! session.rollback_transaction()?;
//! assert_eq!(session.count("c")?, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod command;
mod config;
mod database;
mod dir;
mod error;
mod journal;
mod session;
mod stats;
mod storage;
mod transaction;
mod types;

pub use collection::{
    assign_id, validate_collection_name, validate_document, Filter, IndexSpec,
    ID_INDEX_NAME,
};
pub use command::{Command, CommandReply};
pub use config::{Config, IsolationLevel};
pub use database::Database;
pub use dir::DatabaseDir;
pub use error::{CoreError, CoreResult};
pub use journal::{
    CommittedBatch, Journal, JournalRecord, JournalRecordType, JournalScan, JOURNAL_MAGIC,
    JOURNAL_VERSION,
};
pub use session::Session;
pub use stats::{DatabaseStats, StatsSnapshot};
pub use storage::{
    CollectionAt, JournaledEngine, MemoryEngine, Snapshot, SnapshotRead, StorageEngine,
};
pub use transaction::{
    ApplyEngine, CollectionView, Mutation, SessionState, SnapshotReader, Transaction,
    TransactionManager, TransactionState, WriteBuffer,
};
pub use types::{ConnectionId, SequenceNumber, TransactionId};

pub use doctxn_codec::{Document, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

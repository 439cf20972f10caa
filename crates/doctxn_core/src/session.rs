//! Client connections.

use crate::collection::{Filter, IndexSpec};
use crate::command::{Command, CommandReply};
use crate::error::CoreResult;
use crate::transaction::{SessionState, TransactionManager};
use crate::types::{ConnectionId, TransactionId};
use doctxn_codec::{Document, Value};
use std::sync::Arc;

/// One client connection.
///
/// Commands on a session run one at a time; different sessions may be used
/// from different threads at once. Dropping a session with a transaction
/// open rolls it back.
///
/// ```rust,ignore
/// let db = Database::open_in_memory();
/// let mut session = db.connect()?;
/// session.begin_transaction()?;
/// session.insert("jstests_txn_basic", Document::new().with("a", "during"))?;
/// assert_eq!(session.count("jstests_txn_basic")?, 1);
/// session.rollback_transaction()?;
/// ```
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    manager: Arc<TransactionManager>,
    state: SessionState,
}

impl Session {
    pub(crate) fn new(manager: Arc<TransactionManager>) -> CoreResult<Self> {
        Ok(Self {
            id: manager.open_connection()?,
            manager,
            state: SessionState::default(),
        })
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current transaction state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.state.is_active()
    }

    /// Id of the open transaction, if any.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.state.transaction().map(|txn| txn.id())
    }

    /// `beginTransaction`.
    ///
    /// # Errors
    ///
    /// Fails if a transaction is already open.
    pub fn begin_transaction(&mut self) -> CoreResult<CommandReply> {
        self.execute(Command::BeginTransaction)
    }

    /// `commitTransaction`.
    ///
    /// # Errors
    ///
    /// Fails with nothing open, or if the batch could not be applied.
    pub fn commit_transaction(&mut self) -> CoreResult<CommandReply> {
        self.execute(Command::CommitTransaction)
    }

    /// `rollbackTransaction`.
    ///
    /// # Errors
    ///
    /// Fails with nothing open.
    pub fn rollback_transaction(&mut self) -> CoreResult<CommandReply> {
        self.execute(Command::RollbackTransaction)
    }

    /// Runs a transaction control command.
    ///
    /// # Errors
    ///
    /// See the individual commands.
    pub fn execute(&mut self, command: Command) -> CoreResult<CommandReply> {
        self.manager.execute(self.id, &mut self.state, command)
    }

    /// Runs a command by name. Returns `None` for names that are not
    /// transaction commands.
    pub fn run_command(&mut self, name: &str) -> Option<CoreResult<CommandReply>> {
        Command::from_name(name).map(|command| self.execute(command))
    }

    /// Inserts a document and returns its `_id`.
    ///
    /// # Errors
    ///
    /// Returns validation errors or a duplicate key.
    pub fn insert(&mut self, collection: &str, document: Document) -> CoreResult<Value> {
        self.manager.insert(&mut self.state, collection, document)
    }

    /// Inserts documents in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Documents before it stay inserted (or
    /// buffered).
    pub fn insert_many<I>(&mut self, collection: &str, documents: I) -> CoreResult<Vec<Value>>
    where
        I: IntoIterator<Item = Document>,
    {
        documents
            .into_iter()
            .map(|doc| self.insert(collection, doc))
            .collect()
    }

    /// Deletes the first matching document. Returns 0 or 1.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn delete_one(&mut self, collection: &str, filter: Filter) -> CoreResult<usize> {
        self.manager.delete(&mut self.state, collection, filter, true)
    }

    /// Deletes every matching document.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn delete_many(&mut self, collection: &str, filter: Filter) -> CoreResult<usize> {
        self.manager.delete(&mut self.state, collection, filter, false)
    }

    /// Creates an index. Returns `false` if an identical one exists.
    ///
    /// # Errors
    ///
    /// Returns index conflicts or duplicate keys.
    pub fn create_index(&mut self, collection: &str, spec: IndexSpec) -> CoreResult<bool> {
        self.manager.create_index(&mut self.state, collection, spec)
    }

    /// Drops a secondary index.
    ///
    /// # Errors
    ///
    /// Fails for a missing collection or index, or for `_id_`.
    pub fn drop_index(&mut self, collection: &str, name: &str) -> CoreResult<()> {
        self.manager.drop_index(&mut self.state, collection, name)
    }

    /// Drops a collection. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn drop_collection(&mut self, collection: &str) -> CoreResult<bool> {
        self.manager.drop_collection(&mut self.state, collection)
    }

    /// Matching documents, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn find(&self, collection: &str, filter: &Filter) -> CoreResult<Vec<Document>> {
        self.manager.find(&self.state, collection, filter)
    }

    /// Every document, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn find_all(&self, collection: &str) -> CoreResult<Vec<Document>> {
        self.find(collection, &Filter::all())
    }

    /// Number of documents.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn count(&self, collection: &str) -> CoreResult<usize> {
        self.count_matching(collection, &Filter::all())
    }

    /// Number of matching documents.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn count_matching(&self, collection: &str, filter: &Filter) -> CoreResult<usize> {
        self.manager.count(&self.state, collection, filter)
    }

    /// Index specifications, `_id_` first.
    ///
    /// # Errors
    ///
    /// Fails if the collection does not exist.
    pub fn list_indexes(&self, collection: &str) -> CoreResult<Vec<IndexSpec>> {
        self.manager.list_indexes(&self.state, collection)
    }

    /// Collection names, sorted.
    ///
    /// # Errors
    ///
    /// Fails after the database is closed.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        self.manager.collection_names(&self.state)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.manager.disconnect(self.id, &mut self.state);
    }
}

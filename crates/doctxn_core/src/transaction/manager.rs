//! Transaction manager.

use crate::collection::{assign_id, validate_collection_name, validate_document, Filter, IndexSpec};
use crate::command::{Command, CommandReply};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::stats::DatabaseStats;
use crate::storage::StorageEngine;
use crate::transaction::{ApplyEngine, CollectionView, Mutation, SessionState, SnapshotReader, Transaction};
use crate::types::{ConnectionId, SequenceNumber, TransactionId};
use doctxn_codec::{Document, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs transaction commands and routes every read and write of every
/// connection.
///
/// The manager holds no per-connection state of its own beyond a registry
/// of which connections have a transaction open. The [`SessionState`] is
/// owned by the caller and passed in by reference.
///
/// - Inside a transaction, writes are validated against the connection's
///   view and appended to its buffer.
/// - Outside one, each write is a one-mutation transaction flushed through
///   the same [`ApplyEngine`] path.
/// - Reads go through the [`SnapshotReader`].
#[derive(Debug)]
pub struct TransactionManager {
    engine: Arc<dyn StorageEngine>,
    reader: SnapshotReader,
    apply: ApplyEngine,
    config: Config,
    stats: Arc<DatabaseStats>,
    next_txid: AtomicU64,
    next_connection: AtomicU64,
    /// Connections with an open transaction.
    active: RwLock<HashMap<ConnectionId, TransactionId>>,
    closed: AtomicBool,
}

impl TransactionManager {
    /// Creates a manager over `engine`.
    pub fn new(engine: Arc<dyn StorageEngine>, config: Config, stats: Arc<DatabaseStats>) -> Self {
        Self {
            reader: SnapshotReader::new(Arc::clone(&engine), config.isolation),
            apply: ApplyEngine::new(Arc::clone(&engine)),
            engine,
            config,
            stats,
            next_txid: AtomicU64::new(1),
            next_connection: AtomicU64::new(1),
            active: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Allocates an id for a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseClosed`] after [`TransactionManager::close`].
    pub fn open_connection(&self) -> CoreResult<ConnectionId> {
        self.ensure_open()?;
        let conn = ConnectionId::new(self.next_connection.fetch_add(1, Ordering::SeqCst));
        debug!(%conn, "connection opened");
        Ok(conn)
    }

    /// Runs a transaction control command.
    ///
    /// # Errors
    ///
    /// See [`TransactionManager::begin`], [`TransactionManager::commit`] and
    /// [`TransactionManager::rollback`].
    pub fn execute(
        &self,
        conn: ConnectionId,
        state: &mut SessionState,
        command: Command,
    ) -> CoreResult<CommandReply> {
        match command {
            Command::BeginTransaction => self.begin(conn, state),
            Command::CommitTransaction => self.commit(conn, state),
            Command::RollbackTransaction => self.rollback(conn, state),
        }
    }

    /// Opens a transaction on the connection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransactionState`] if one is already
    /// open. Nothing changes in that case.
    pub fn begin(&self, conn: ConnectionId, state: &mut SessionState) -> CoreResult<CommandReply> {
        self.ensure_open()?;
        state.ensure_idle()?;

        let txid = self.allocate_txid();
        state.activate(Transaction::new(txid, self.reader.begin_snapshot()))?;
        self.active.write().insert(conn, txid);
        self.stats.record_begin();
        info!(%conn, %txid, isolation = ?self.reader.isolation(), "transaction began");
        Ok(CommandReply::began())
    }

    /// Applies the connection's buffer atomically and ends the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoActiveTransaction`] with nothing open,
    /// [`CoreError::DatabaseClosed`] after close, or
    /// [`CoreError::ApplyFailed`] if storage rejected the batch. In the last
    /// two cases the transaction is discarded and the connection is back to
    /// auto-commit.
    pub fn commit(&self, conn: ConnectionId, state: &mut SessionState) -> CoreResult<CommandReply> {
        let mut txn = state.take_for_termination()?;
        let txid = txn.id();
        let mutations = txn.buffer().len();
        if let Err(err) = self.ensure_open() {
            self.active.write().remove(&conn);
            self.stats.record_rollback();
            warn!(%conn, %txid, discarded = mutations, "commit after close; transaction rolled back");
            return Err(err);
        }
        let result = self.apply.flush(&mut txn);
        self.active.write().remove(&conn);

        match result {
            Ok(sequence) => {
                self.stats.record_commit();
                info!(
                    %conn,
                    %txid,
                    %sequence,
                    mutations,
                    elapsed_us = txn.elapsed().as_micros() as u64,
                    "transaction committed"
                );
                Ok(CommandReply::committed())
            }
            Err(err) => {
                self.stats.record_apply_failure();
                self.stats.record_rollback();
                warn!(%conn, %txid, mutations, error = %err, "commit failed; transaction discarded");
                Err(err)
            }
        }
    }

    /// Discards the connection's buffer and ends the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoActiveTransaction`] with nothing open.
    pub fn rollback(&self, conn: ConnectionId, state: &mut SessionState) -> CoreResult<CommandReply> {
        let txn = state.take_for_termination()?;
        self.active.write().remove(&conn);
        self.stats.record_rollback();
        info!(
            %conn,
            txid = %txn.id(),
            discarded = txn.buffer().len(),
            "transaction rolled back"
        );
        Ok(CommandReply::rolled_back())
    }

    /// Closes a connection. An open transaction is rolled back.
    pub fn disconnect(&self, conn: ConnectionId, state: &mut SessionState) {
        if let Ok(txn) = state.take_for_termination() {
            self.active.write().remove(&conn);
            self.stats.record_rollback();
            self.stats.record_implicit_rollback();
            warn!(
                %conn,
                txid = %txn.id(),
                discarded = txn.buffer().len(),
                "connection closed inside a transaction; rolled back"
            );
        }
        debug!(%conn, "connection closed");
    }

    /// Inserts a document and returns its `_id`.
    ///
    /// # Errors
    ///
    /// Returns validation errors, or [`CoreError::DuplicateKey`] if a
    /// unique index in the connection's view already holds the key.
    pub fn insert(
        &self,
        state: &mut SessionState,
        collection: &str,
        mut document: Document,
    ) -> CoreResult<Value> {
        validate_collection_name(collection)?;
        validate_document(&document, self.config.max_document_depth)?;
        let id = assign_id(&mut document);

        self.stage(
            state,
            Mutation::Insert {
                collection: collection.to_string(),
                document,
            },
        )?;
        Ok(id)
    }

    /// Deletes matching documents and returns how many.
    ///
    /// The documents are picked from the connection's view when the delete
    /// is issued, and the delete is staged by `_id`. Committing it never
    /// removes a document the connection could not see.
    ///
    /// # Errors
    ///
    /// Returns validation or storage errors.
    pub fn delete(
        &self,
        state: &mut SessionState,
        collection: &str,
        filter: Filter,
        just_one: bool,
    ) -> CoreResult<usize> {
        validate_collection_name(collection)?;
        let (mut ids, used_index) = self.read(state, collection, |view| view.matching_ids(&filter))?;
        self.stats.record_read(used_index);
        if just_one {
            ids.truncate(1);
        }
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = ids.len();
        self.stage(
            state,
            Mutation::Delete {
                collection: collection.to_string(),
                ids,
            },
        )?;
        Ok(removed)
    }

    /// Creates an index. Returns `false` if an identical one exists.
    ///
    /// Inside a transaction the index is built only when the transaction
    /// commits; the connection's own reads see it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexConflict`] for a clashing name or key
    /// pattern, or [`CoreError::DuplicateKey`] when a unique index cannot
    /// be built over existing documents.
    pub fn create_index(
        &self,
        state: &mut SessionState,
        collection: &str,
        spec: IndexSpec,
    ) -> CoreResult<bool> {
        validate_collection_name(collection)?;
        if self.read(state, collection, |view| view.has_index(&spec))? {
            return Ok(false);
        }
        self.stage(
            state,
            Mutation::CreateIndex {
                collection: collection.to_string(),
                spec,
            },
        )?;
        Ok(true)
    }

    /// Drops a secondary index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionNotFound`], [`CoreError::IndexNotFound`],
    /// or [`CoreError::InvalidOperation`] for `_id_`.
    pub fn drop_index(&self, state: &mut SessionState, collection: &str, name: &str) -> CoreResult<()> {
        validate_collection_name(collection)?;
        self.stage(
            state,
            Mutation::DropIndex {
                collection: collection.to_string(),
                name: name.to_string(),
            },
        )
    }

    /// Drops a collection. Returns `false` if it did not exist in the
    /// connection's view.
    ///
    /// # Errors
    ///
    /// Returns validation or storage errors.
    pub fn drop_collection(&self, state: &mut SessionState, collection: &str) -> CoreResult<bool> {
        validate_collection_name(collection)?;
        if !self.read(state, collection, |view| view.exists())? {
            return Ok(false);
        }
        self.stage(
            state,
            Mutation::DropCollection {
                collection: collection.to_string(),
            },
        )?;
        Ok(true)
    }

    /// Matching documents as the connection sees them, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn find(&self, state: &SessionState, collection: &str, filter: &Filter) -> CoreResult<Vec<Document>> {
        validate_collection_name(collection)?;
        let (docs, used_index) = self.read(state, collection, |view| view.scan(filter))?;
        self.stats.record_read(used_index);
        debug!(
            collection,
            matched = docs.len(),
            used_index,
            in_transaction = state.is_active(),
            "find"
        );
        Ok(docs)
    }

    /// Number of matching documents as the connection sees them.
    ///
    /// # Errors
    ///
    /// Returns validation errors.
    pub fn count(&self, state: &SessionState, collection: &str, filter: &Filter) -> CoreResult<usize> {
        validate_collection_name(collection)?;
        let (count, used_index) = self.read(state, collection, |view| view.tally(filter))?;
        self.stats.record_read(used_index);
        debug!(collection, count, used_index, in_transaction = state.is_active(), "count");
        Ok(count)
    }

    /// Index specifications of a collection, `_id_` first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionNotFound`] if the collection does not
    /// exist in the connection's view.
    pub fn list_indexes(&self, state: &SessionState, collection: &str) -> CoreResult<Vec<IndexSpec>> {
        validate_collection_name(collection)?;
        self.read(state, collection, |view| view.exists().then(|| view.indexes()))?
            .ok_or_else(|| CoreError::CollectionNotFound {
                name: collection.to_string(),
            })
    }

    /// Collection names the connection can see, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseClosed`] after close.
    pub fn collection_names(&self, state: &SessionState) -> CoreResult<Vec<String>> {
        self.ensure_open()?;
        self.reader.collection_names(state.transaction())
    }

    /// Number of connections with an open transaction.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Whether `conn` has an open transaction.
    #[must_use]
    pub fn is_active(&self, conn: ConnectionId) -> bool {
        self.active.read().contains_key(&conn)
    }

    /// Sequence of the latest commit.
    #[must_use]
    pub fn committed_sequence(&self) -> SequenceNumber {
        self.engine.read_snapshot().sequence()
    }

    /// Refuses new connections and operations from now on. Returns the
    /// number of transactions still open.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.active_count()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CoreError::DatabaseClosed)
        } else {
            Ok(())
        }
    }

    fn allocate_txid(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }

    fn read<R, F>(&self, state: &SessionState, collection: &str, f: F) -> CoreResult<R>
    where
        F: FnOnce(&CollectionView<'_>) -> R,
    {
        self.ensure_open()?;
        self.reader.read(collection, state.transaction(), f)
    }

    /// Checks a mutation against the connection's view, then buffers it,
    /// or commits it on its own outside a transaction.
    fn stage(&self, state: &mut SessionState, mutation: Mutation) -> CoreResult<()> {
        self.ensure_open()?;
        match state {
            SessionState::Active(txn) => {
                let op = mutation.op_name();
                self.reader.stage(txn, mutation)?;
                debug!(
                    txid = %txn.id(),
                    op,
                    position = txn.buffer().len() - 1,
                    "buffered mutation"
                );
                self.stats.record_buffered();
                Ok(())
            }
            SessionState::NoTransaction => {
                self.reader.check(&mutation)?;
                let mut txn = Transaction::new(self.allocate_txid(), None);
                let op = mutation.op_name();
                txn.buffer_mut().append(mutation);
                match self.apply.flush(&mut txn) {
                    Ok(sequence) => {
                        self.stats.record_autocommit();
                        debug!(txid = %txn.id(), %sequence, op, "auto-committed");
                        Ok(())
                    }
                    Err(CoreError::ApplyFailed { source, .. }) => {
                        self.stats.record_apply_failure();
                        Err(*source)
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IsolationLevel;
    use crate::storage::MemoryEngine;

    fn manager() -> TransactionManager {
        manager_with(Config::default())
    }

    fn manager_with(config: Config) -> TransactionManager {
        TransactionManager::new(
            Arc::new(MemoryEngine::new()),
            config,
            Arc::new(DatabaseStats::new()),
        )
    }

    fn doc(a: &str) -> Document {
        Document::new().with("a", a)
    }

    #[test]
    fn commit_and_rollback_need_a_transaction() {
        let tm = manager();
        let conn = tm.open_connection().unwrap();
        let mut state = SessionState::default();

        assert!(matches!(tm.commit(conn, &mut state), Err(CoreError::NoActiveTransaction)));
        assert!(matches!(tm.rollback(conn, &mut state), Err(CoreError::NoActiveTransaction)));
    }

    #[test]
    fn double_begin_fails_and_keeps_the_first() {
        let tm = manager();
        let conn = tm.open_connection().unwrap();
        let mut state = SessionState::default();

        assert_eq!(tm.begin(conn, &mut state).unwrap().status, CommandReply::BEGAN);
        let first = state.transaction().map(Transaction::id);
        let err = tm.begin(conn, &mut state).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransactionState { .. }));
        assert_eq!(state.transaction().map(Transaction::id), first);
        assert_eq!(tm.active_count(), 1);
    }

    #[test]
    fn buffered_insert_is_private_until_commit() {
        let tm = manager();
        let a = tm.open_connection().unwrap();
        let (mut sa, sb) = (SessionState::default(), SessionState::default());

        tm.insert(&mut sa, "c", doc("before")).unwrap();
        tm.begin(a, &mut sa).unwrap();
        tm.insert(&mut sa, "c", doc("during")).unwrap();

        assert_eq!(tm.count(&sa, "c", &Filter::all()).unwrap(), 2);
        assert_eq!(tm.count(&sb, "c", &Filter::all()).unwrap(), 1);

        let reply = tm.commit(a, &mut sa).unwrap();
        assert_eq!(reply.status, CommandReply::COMMITTED);
        let docs = tm.find(&sb, "c", &Filter::all()).unwrap();
        assert_eq!(docs[1].get("a"), Some(&Value::from("during")));
    }

    #[test]
    fn rejected_mutation_is_not_buffered() {
        let tm = manager();
        let conn = tm.open_connection().unwrap();
        let mut state = SessionState::default();
        tm.begin(conn, &mut state).unwrap();

        tm.insert(&mut state, "c", Document::new().with("_id", 1)).unwrap();
        let err = tm
            .insert(&mut state, "c", Document::new().with("_id", 1))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
        assert!(state.is_active());
        assert_eq!(state.transaction().unwrap().buffer().len(), 1);
    }

    #[test]
    fn conflicting_commit_is_discarded() {
        let tm = manager();
        let (a, b) = (tm.open_connection().unwrap(), tm.open_connection().unwrap());
        let (mut sa, mut sb) = (SessionState::default(), SessionState::default());

        tm.begin(a, &mut sa).unwrap();
        tm.insert(&mut sa, "c", Document::new().with("_id", 7).with("from", "a"))
            .unwrap();
        tm.begin(b, &mut sb).unwrap();
        tm.insert(&mut sb, "c", Document::new().with("_id", 7).with("from", "b"))
            .unwrap();

        tm.commit(a, &mut sa).unwrap();
        let err = tm.commit(b, &mut sb).unwrap_err();
        assert!(matches!(err, CoreError::ApplyFailed { .. }));
        assert!(!sb.is_active());
        assert!(!tm.is_active(b));

        let docs = tm.find(&sb, "c", &Filter::all()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("from"), Some(&Value::from("a")));
    }

    #[test]
    fn disconnect_rolls_back() {
        let tm = manager();
        let conn = tm.open_connection().unwrap();
        let mut state = SessionState::default();
        tm.begin(conn, &mut state).unwrap();
        tm.insert(&mut state, "c", doc("lost")).unwrap();

        tm.disconnect(conn, &mut state);
        assert!(!state.is_active());
        assert_eq!(tm.active_count(), 0);
        assert_eq!(tm.count(&state, "c", &Filter::all()).unwrap(), 0);
    }

    #[test]
    fn read_committed_sees_concurrent_commits() {
        let tm = manager_with(Config::default().isolation(IsolationLevel::ReadCommitted));
        let a = tm.open_connection().unwrap();
        let (mut sa, mut sb) = (SessionState::default(), SessionState::default());

        tm.begin(a, &mut sa).unwrap();
        tm.insert(&mut sb, "c", doc("other")).unwrap();
        assert_eq!(tm.count(&sa, "c", &Filter::all()).unwrap(), 1);
    }

    #[test]
    fn auto_commit_errors_pass_through() {
        let tm = manager();
        let mut state = SessionState::default();
        tm.insert(&mut state, "c", Document::new().with("_id", 1)).unwrap();
        assert!(matches!(
            tm.insert(&mut state, "c", Document::new().with("_id", 1)),
            Err(CoreError::DuplicateKey { .. })
        ));
        assert!(matches!(
            tm.insert(&mut state, "system.x", doc("x")),
            Err(CoreError::InvalidCollectionName { .. })
        ));
    }

    #[test]
    fn closed_manager_refuses_work() {
        let tm = manager();
        let mut state = SessionState::default();
        assert_eq!(tm.close(), 0);
        assert!(matches!(tm.open_connection(), Err(CoreError::DatabaseClosed)));
        assert!(matches!(
            tm.insert(&mut state, "c", doc("x")),
            Err(CoreError::DatabaseClosed)
        ));
    }

    #[test]
    fn commit_after_close_rolls_back() {
        let tm = manager();
        let conn = tm.open_connection().unwrap();
        let mut state = SessionState::default();
        tm.begin(conn, &mut state).unwrap();
        tm.insert(&mut state, "c", doc("late")).unwrap();

        assert_eq!(tm.close(), 1);
        assert!(matches!(tm.commit(conn, &mut state), Err(CoreError::DatabaseClosed)));
        assert!(!state.is_active());
        assert_eq!(tm.active_count(), 0);
        assert_eq!(tm.stats.snapshot().transactions_rolled_back, 1);
    }

    #[test]
    fn delete_keeps_documents_committed_after_it_was_issued() {
        let tm = manager();
        let a = tm.open_connection().unwrap();
        let (mut sa, mut sb) = (SessionState::default(), SessionState::default());
        tm.insert(&mut sa, "c", Document::new().with("_id", 1).with("a", "x"))
            .unwrap();

        tm.begin(a, &mut sa).unwrap();
        assert_eq!(tm.delete(&mut sa, "c", Filter::eq("a", "x"), true).unwrap(), 1);

        assert_eq!(tm.delete(&mut sb, "c", Filter::eq("_id", 1), true).unwrap(), 1);
        tm.insert(&mut sb, "c", Document::new().with("_id", 2).with("a", "x"))
            .unwrap();
        tm.commit(a, &mut sa).unwrap();

        let docs = tm.find(&sb, "c", &Filter::all()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("_id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn delete_with_no_match_buffers_nothing() {
        let tm = manager();
        let conn = tm.open_connection().unwrap();
        let mut state = SessionState::default();
        tm.begin(conn, &mut state).unwrap();

        assert_eq!(tm.delete(&mut state, "c", Filter::eq("a", "x"), false).unwrap(), 0);
        assert!(state.transaction().unwrap().buffer().is_empty());
    }
}

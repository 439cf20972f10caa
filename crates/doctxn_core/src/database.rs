//! Database facade and recovery.

use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::session::Session;
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::storage::{JournaledEngine, MemoryEngine, Snapshot, StorageEngine};
use crate::transaction::TransactionManager;
use crate::types::SequenceNumber;
use doctxn_storage::{FileBackend, StorageBackend};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The main database handle.
///
/// A `Database` owns committed state and the transaction manager. Clients
/// talk to it through [`Session`]s, one per connection.
///
/// ```rust,ignore
/// use doctxn_core::{Database, Document};
///
/// let db = Database::open(Path::new("my_database"))?;
/// let mut session = db.connect()?;
/// session.begin_transaction()?;
/// session.insert("orders", Document::new().with("sku", "A-1"))?;
/// session.commit_transaction()?;
/// db.close()?;
/// ```
///
/// For tests, use [`Database::open_in_memory`].
pub struct Database {
    config: Config,
    /// Held for the lock. None for in-memory databases.
    dir: Option<DatabaseDir>,
    engine: Arc<dyn StorageEngine>,
    manager: Arc<TransactionManager>,
    stats: Arc<DatabaseStats>,
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens or creates a durable database in `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseLocked`] if another process has it open,
    /// journal damage errors, or I/O errors.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a durable database with custom configuration.
    ///
    /// ```rust,ignore
    /// let config = Config::default()
    ///     .sync_on_commit(true)
    ///     .isolation(IsolationLevel::ReadCommitted);
    /// let db = Database::open_with_config(Path::new("my_database"), config)?;
    /// ```
    ///
    /// # Errors
    ///
    /// As [`Database::open`], plus [`CoreError::InvalidFormat`] when
    /// `create_if_missing` / `error_if_exists` forbid the open.
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        if config.error_if_exists && !dir.is_new_database() {
            return Err(CoreError::invalid_format(
                "database already exists and error_if_exists is true",
            ));
        }

        let backend = FileBackend::open_with_create_dirs(&dir.journal_path())?;
        let engine = JournaledEngine::open(Box::new(backend), config.sync_on_commit)?;
        info!(path = %dir.path().display(), "opened database");
        Ok(Self::assemble(config, Some(dir), Arc::new(engine)))
    }

    /// Opens a journaled database over an arbitrary backend.
    ///
    /// # Errors
    ///
    /// Returns journal damage or storage errors.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let engine = JournaledEngine::open(backend, config.sync_on_commit)?;
        Ok(Self::assemble(config, None, Arc::new(engine)))
    }

    /// Opens a fresh database that lives only in memory.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Opens an in-memory database with custom configuration.
    #[must_use]
    pub fn open_in_memory_with_config(config: Config) -> Self {
        Self::assemble(config, None, Arc::new(MemoryEngine::new()))
    }

    fn assemble(config: Config, dir: Option<DatabaseDir>, engine: Arc<dyn StorageEngine>) -> Self {
        let stats = Arc::new(DatabaseStats::new());
        let manager = Arc::new(TransactionManager::new(
            Arc::clone(&engine),
            config.clone(),
            Arc::clone(&stats),
        ));
        Self {
            config,
            dir,
            engine,
            manager,
            stats,
            is_open: RwLock::new(true),
        }
    }

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseClosed`] after [`Database::close`].
    pub fn connect(&self) -> CoreResult<Session> {
        self.ensure_open()?;
        Session::new(Arc::clone(&self.manager))
    }

    /// Latest committed state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.engine.read_snapshot()
    }

    /// Committed collection names, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.snapshot().collection_names()
    }

    /// Sequence of the latest commit.
    #[must_use]
    pub fn committed_sequence(&self) -> SequenceNumber {
        self.manager.committed_sequence()
    }

    /// Number of connections with an open transaction.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.manager.active_count()
    }

    /// Counter values.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Name of the storage engine in use.
    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Database directory, for durable databases opened from a path.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Size of the commit journal in bytes, for durable databases opened
    /// from a path.
    #[must_use]
    pub fn journal_size(&self) -> Option<u64> {
        let dir = self.dir.as_ref()?;
        std::fs::metadata(dir.journal_path()).ok().map(|meta| meta.len())
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Closes the database. Open sessions fail from now on; their
    /// transactions are rolled back when they are dropped.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for a final flush.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        let open_transactions = self.manager.close();
        if open_transactions > 0 {
            warn!(open_transactions, "closing database with open transactions");
        }
        *is_open = false;
        info!(sequence = %self.committed_sequence(), "closed database");
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("engine", &self.engine_name())
            .field("is_open", &self.is_open())
            .field("committed_sequence", &self.committed_sequence())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doctxn_codec::Document;
    use tempfile::tempdir;

    #[test]
    fn in_memory_starts_empty() {
        let db = Database::open_in_memory();
        assert!(db.collection_names().is_empty());
        assert_eq!(db.committed_sequence(), SequenceNumber::default());
        assert_eq!(db.engine_name(), "memory");
        assert!(db.path().is_none());
    }

    #[test]
    fn closed_database_refuses_sessions() {
        let db = Database::open_in_memory();
        let mut session = db.connect().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(db.connect(), Err(CoreError::DatabaseClosed)));
        assert!(matches!(
            session.insert("c", Document::new()),
            Err(CoreError::DatabaseClosed)
        ));
        db.close().unwrap();
    }

    #[test]
    fn durable_commits_survive_reopen() {
        let tmp = tempdir().unwrap();
        {
            let db = Database::open(tmp.path()).unwrap();
            let mut session = db.connect().unwrap();
            session.begin_transaction().unwrap();
            session
                .insert("c", Document::new().with("a", "during"))
                .unwrap();
            session.commit_transaction().unwrap();
            session.insert("c", Document::new().with("a", "after")).unwrap();
        }

        let db = Database::open(tmp.path()).unwrap();
        assert_eq!(db.collection_names(), vec!["c".to_string()]);
        assert_eq!(db.committed_sequence(), SequenceNumber::new(2));
        assert_eq!(db.snapshot().read().collection("c").unwrap().len(), 2);
    }

    #[test]
    fn error_if_exists_is_honoured() {
        let tmp = tempdir().unwrap();
        {
            let db = Database::open(tmp.path()).unwrap();
            let mut session = db.connect().unwrap();
            session.insert("c", Document::new()).unwrap();
        }
        let config = Config::default().error_if_exists(true);
        assert!(matches!(
            Database::open_with_config(tmp.path(), config),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn second_open_of_a_directory_is_locked() {
        let tmp = tempdir().unwrap();
        let _db = Database::open(tmp.path()).unwrap();
        assert!(matches!(
            Database::open(tmp.path()),
            Err(CoreError::DatabaseLocked)
        ));
    }
}

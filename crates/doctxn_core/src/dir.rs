//! Database directory layout and locking.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK          # Advisory lock, held while the database is open
//! └─ journal.log   # Commit journal
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// An open database directory.
///
/// Holds an exclusive lock on `LOCK` for as long as it lives, so only one
/// process works on a directory at a time.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens (and optionally creates) a database directory and takes the
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the directory is missing and
    /// `create_if_missing` is false or the path is not a directory, and
    /// [`CoreError::DatabaseLocked`] if another process holds the lock.
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the commit journal.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// True if no commit has ever been journaled here.
    #[must_use]
    pub fn is_new_database(&self) -> bool {
        fs::metadata(self.journal_path()).map_or(true, |meta| meta.len() == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_directory_when_asked() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("db");
        assert!(DatabaseDir::open(&path, false).is_err());

        let dir = DatabaseDir::open(&path, true).unwrap();
        assert!(path.join(LOCK_FILE).exists());
        assert!(dir.is_new_database());
        assert_eq!(dir.journal_path(), path.join(JOURNAL_FILE));
    }

    #[test]
    fn second_open_is_locked_out() {
        let tmp = tempdir().unwrap();
        let _first = DatabaseDir::open(tmp.path(), true).unwrap();
        assert!(matches!(
            DatabaseDir::open(tmp.path(), true),
            Err(CoreError::DatabaseLocked)
        ));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let tmp = tempdir().unwrap();
        drop(DatabaseDir::open(tmp.path(), true).unwrap());
        assert!(DatabaseDir::open(tmp.path(), true).is_ok());
    }

    #[test]
    fn rejects_files() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            DatabaseDir::open(&file, true),
            Err(CoreError::InvalidFormat { .. })
        ));
    }
}

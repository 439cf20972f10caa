//! # DocTxn Storage
//!
//! Byte-level storage backends used by the DocTxn journal.
//!
//! A backend is an append-only byte store. It knows nothing about journal
//! records, documents or transactions; `doctxn_core` owns every format that
//! is written through it.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral storage for tests and in-memory databases
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use doctxn_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"batch").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"batch");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

//! Multi-statement transactions.
//!
//! Each connection owns a [`SessionState`]. While a transaction is open,
//! writes go to its [`WriteBuffer`] and to a per-collection overlay that
//! the [`SnapshotReader`] lays over committed state for reads. Commit
//! drains the buffer into the [`ApplyEngine`], which applies it to storage
//! atomically.

mod apply;
mod buffer;
mod manager;
mod mutation;
mod overlay;
mod reader;
mod state;

pub use apply::ApplyEngine;
pub use buffer::WriteBuffer;
pub use manager::TransactionManager;
pub use mutation::Mutation;
pub use reader::{CollectionView, SnapshotReader};
pub use state::{SessionState, Transaction, TransactionState};

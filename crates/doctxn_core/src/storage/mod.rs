//! Committed state and the engines that publish it.
//!
//! Committed state is a single versioned catalog: each commit stamps what
//! it adds and removes with its sequence number.
//! Engines hand out [`Snapshot`]s, which pin a sequence instead of copying
//! data, so a reader holding a snapshot never sees a partially applied
//! batch and a commit costs what it changes.

mod catalog;
mod journaled;
mod memory;
mod snapshot;

pub use catalog::CollectionAt;
pub use journaled::JournaledEngine;
pub use memory::MemoryEngine;
pub use snapshot::{Snapshot, SnapshotRead};

use crate::error::CoreResult;
use crate::transaction::Mutation;
use crate::types::{SequenceNumber, TransactionId};
use std::fmt;

/// The storage seam the transaction layer writes through.
///
/// Implementations must make `apply_batch` atomic: either every mutation
/// is visible to later snapshots or none is.
pub trait StorageEngine: Send + Sync + fmt::Debug {
    /// Pins the latest committed state.
    fn read_snapshot(&self) -> Snapshot;

    /// Applies an ordered batch as one commit and returns its sequence.
    ///
    /// # Errors
    ///
    /// Returns the first mutation or durability error. Committed state is
    /// unchanged in that case.
    fn apply_batch(
        &self,
        txid: TransactionId,
        mutations: &[Mutation],
    ) -> CoreResult<SequenceNumber>;

    /// Short engine name for logs and diagnostics.
    fn name(&self) -> &'static str;
}

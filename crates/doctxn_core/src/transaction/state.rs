//! Per-connection transaction state.

use crate::error::{CoreError, CoreResult};
use crate::storage::{Snapshot, SnapshotRead};
use crate::transaction::overlay::Overlay;
use crate::transaction::{Mutation, WriteBuffer};
use crate::types::TransactionId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle of a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting mutations and reads.
    Active,
    /// Being committed or rolled back. No further commands apply.
    Terminating,
}

/// An open multi-statement transaction.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    buffer: WriteBuffer,
    /// The buffer's effect per collection, kept up to date as mutations
    /// are staged so reads never replay the whole buffer.
    overlays: HashMap<String, Overlay>,
    /// Committed state pinned at begin, when reads use snapshot isolation.
    snapshot: Option<Snapshot>,
    started_at: Instant,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, snapshot: Option<Snapshot>) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            buffer: WriteBuffer::new(),
            overlays: HashMap::new(),
            snapshot,
            started_at: Instant::now(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction still accepts work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Staged mutations.
    #[must_use]
    pub fn buffer(&self) -> &WriteBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut WriteBuffer {
        &mut self.buffer
    }

    /// Checks `mutation` against the connection's view at `base` and
    /// buffers it. A rejected mutation leaves the transaction unchanged.
    pub(crate) fn stage(&mut self, base: &SnapshotRead<'_>, mutation: Mutation) -> CoreResult<()> {
        let name = mutation.collection();
        let committed = base.collection(name);
        let stale = self
            .overlays
            .get(name)
            .map_or(true, |overlay| overlay.base() != base.sequence());
        if stale {
            let rebuilt = Overlay::replay(
                name,
                committed,
                base.sequence(),
                self.buffer.for_collection(name),
            )?;
            self.overlays.insert(name.to_string(), rebuilt);
        }
        if let Some(overlay) = self.overlays.get_mut(name) {
            overlay.apply(committed, &mutation)?;
        }
        self.buffer.append(mutation);
        Ok(())
    }

    /// The transaction's changes to `collection` over `base`, or `None` if
    /// it has not written there.
    ///
    /// With read-committed isolation `base` moves on between reads; the
    /// overlay is then rebuilt from the buffer for this read only.
    pub(crate) fn overlay(
        &self,
        collection: &str,
        base: &SnapshotRead<'_>,
    ) -> CoreResult<Option<Cow<'_, Overlay>>> {
        match self.overlays.get(collection) {
            None => Ok(None),
            Some(overlay) if overlay.base() == base.sequence() => Ok(Some(Cow::Borrowed(overlay))),
            Some(_) => Overlay::replay(
                collection,
                base.collection(collection),
                base.sequence(),
                self.buffer.for_collection(collection),
            )
            .map(|overlay| Some(Cow::Owned(overlay))),
        }
    }

    /// Collections the transaction has written to.
    pub(crate) fn touched_collections(&self) -> impl Iterator<Item = &str> {
        self.overlays.keys().map(String::as_str)
    }

    /// The pinned snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Time since begin.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn mark_terminating(&mut self) {
        self.state = TransactionState::Terminating;
    }
}

/// What a connection is doing right now.
///
/// Owned by the session and passed by reference into the transaction
/// manager for every command.
#[derive(Debug, Default)]
pub enum SessionState {
    /// Operations auto-commit.
    #[default]
    NoTransaction,
    /// Operations go through the transaction's buffer.
    Active(Transaction),
}

impl SessionState {
    /// Returns true inside a transaction.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// The open transaction, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Active(txn) => Some(txn),
            Self::NoTransaction => None,
        }
    }

    /// Fails if a transaction is already open.
    pub(crate) fn ensure_idle(&self) -> CoreResult<()> {
        match self {
            Self::NoTransaction => Ok(()),
            Self::Active(txn) => Err(CoreError::invalid_transaction_state(format!(
                "already in a transaction ({})",
                txn.id()
            ))),
        }
    }

    pub(crate) fn activate(&mut self, txn: Transaction) -> CoreResult<()> {
        self.ensure_idle()?;
        *self = Self::Active(txn);
        Ok(())
    }

    /// Moves the open transaction out for commit or rollback. The session
    /// is back to `NoTransaction` whatever happens next.
    pub(crate) fn take_for_termination(&mut self) -> CoreResult<Transaction> {
        match std::mem::take(self) {
            Self::Active(mut txn) => {
                txn.mark_terminating();
                Ok(txn)
            }
            Self::NoTransaction => Err(CoreError::NoActiveTransaction),
        }
    }
}

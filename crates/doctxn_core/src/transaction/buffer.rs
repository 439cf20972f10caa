//! Per-transaction write buffer.

use crate::transaction::Mutation;

/// Ordered, append-only list of a transaction's staged mutations.
///
/// Nothing in here is visible to other connections. At commit the whole
/// buffer is drained once and handed to the apply engine.
#[derive(Debug, Clone, Default)]
pub struct WriteBuffer {
    mutations: Vec<Mutation>,
}

impl WriteBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer holding one mutation, used for auto-commit.
    #[must_use]
    pub fn single(mutation: Mutation) -> Self {
        Self {
            mutations: vec![mutation],
        }
    }

    /// Appends a mutation.
    pub fn append(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Read-only view of everything buffered so far, in issuance order.
    #[must_use]
    pub fn snapshot(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Takes every mutation out, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.mutations)
    }

    /// Mutations for one collection, in issuance order.
    pub fn for_collection<'a>(&'a self, collection: &'a str) -> impl Iterator<Item = &'a Mutation> {
        self.mutations
            .iter()
            .filter(move |m| m.collection() == collection)
    }

    /// Names of collections touched so far, first touch first, without
    /// repeats.
    #[must_use]
    pub fn touched_collections(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for mutation in &self.mutations {
            if !names.contains(&mutation.collection()) {
                names.push(mutation.collection());
            }
        }
        names
    }

    /// Number of buffered mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

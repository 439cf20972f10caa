//! Benchmark utilities.

use doctxn_core::{CoreResult, Document, Session};
use rand::Rng;

/// Collection every benchmark writes to.
pub const BENCH_COLLECTION: &str = "bench";

/// Generate a document with a random integer field and a text field of
/// `text_len` random lowercase letters.
pub fn random_document(text_len: usize) -> Document {
    let mut rng = rand::thread_rng();
    let text: String = (0..text_len)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect();
    Document::new()
        .with("n", rng.gen_range(0..1_000_000i64))
        .with("text", text)
}

/// Generate `count` documents with sequential `k` keys.
pub fn keyed_documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| random_document(32).with("k", i as i64))
        .collect()
}

/// Auto-commit `count` keyed documents into [`BENCH_COLLECTION`].
pub fn populate(session: &mut Session, count: usize) -> CoreResult<()> {
    for doc in keyed_documents(count) {
        session.insert(BENCH_COLLECTION, doc)?;
    }
    Ok(())
}

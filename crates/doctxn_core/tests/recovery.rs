//! Journal durability and crash recovery.

use doctxn_core::{
    Config, CoreError, Database, Document, Filter, IndexSpec, JournalRecord, SequenceNumber, Value,
};
use doctxn_storage::{InMemoryBackend, StorageBackend};
use tempfile::tempdir;

const COLL: &str = "durable";

fn open(backend: &InMemoryBackend) -> Result<Database, CoreError> {
    Database::open_with_backend(Config::default(), Box::new(backend.clone()))
}

#[test]
fn committed_transactions_replay_in_order() {
    let backend = InMemoryBackend::new();
    {
        let db = open(&backend).unwrap();
        let mut session = db.connect().unwrap();
        session.insert(COLL, Document::new().with("a", "before")).unwrap();
        session.begin_transaction().unwrap();
        session.insert(COLL, Document::new().with("a", "during")).unwrap();
        session
            .create_index(COLL, IndexSpec::ascending("a").unwrap().unique())
            .unwrap();
        session.commit_transaction().unwrap();
    }

    let db = open(&backend).unwrap();
    assert_eq!(db.committed_sequence(), SequenceNumber::new(2));
    let session = db.connect().unwrap();
    let docs = session.find_all(COLL).unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[1].get("a"), Some(&Value::from("during")));
    assert_eq!(session.list_indexes(COLL).unwrap().len(), 2);
}

#[test]
fn rolled_back_work_never_reaches_the_journal() {
    let backend = InMemoryBackend::new();
    let db = open(&backend).unwrap();
    let mut session = db.connect().unwrap();
    session.begin_transaction().unwrap();
    session.insert(COLL, Document::new().with("a", 1)).unwrap();
    session.rollback_transaction().unwrap();
    assert_eq!(backend.size().unwrap(), 0);

    session.begin_transaction().unwrap();
    session.commit_transaction().unwrap();
    assert_eq!(backend.size().unwrap(), 0);
}

#[test]
fn torn_final_batch_is_discarded() {
    let backend = InMemoryBackend::new();
    {
        let db = open(&backend).unwrap();
        let mut session = db.connect().unwrap();
        session.insert(COLL, Document::new().with("n", 1)).unwrap();
        session.insert(COLL, Document::new().with("n", 2)).unwrap();
    }

    let mut bytes = backend.data();
    bytes.truncate(bytes.len() - 6);
    let torn = InMemoryBackend::with_data(bytes);

    let db = open(&torn).unwrap();
    let session = db.connect().unwrap();
    assert_eq!(session.count(COLL).unwrap(), 1);
    assert_eq!(
        session
            .count_matching(COLL, &Filter::eq("n", 1i64))
            .unwrap(),
        1
    );
    drop(session);
    drop(db);

    let reopened = open(&torn).unwrap();
    assert_eq!(reopened.committed_sequence(), SequenceNumber::new(1));
}

#[test]
fn batch_without_commit_record_is_ignored() {
    let backend = InMemoryBackend::new();
    {
        let db = open(&backend).unwrap();
        db.connect()
            .unwrap()
            .insert(COLL, Document::new().with("n", 1))
            .unwrap();
    }

    let txid = doctxn_core::TransactionId::new(99);
    let mut orphan = Vec::new();
    JournalRecord::Begin { txid }.encode_into(&mut orphan).unwrap();
    JournalRecord::Mutation {
        txid,
        mutation: doctxn_core::Mutation::Insert {
            collection: COLL.into(),
            document: Document::new().with("_id", "orphan"),
        },
    }
    .encode_into(&mut orphan)
    .unwrap();
    let mut writable = backend.clone();
    writable.append(&orphan).unwrap();

    let db = open(&backend).unwrap();
    assert_eq!(db.connect().unwrap().count(COLL).unwrap(), 1);
}

#[test]
fn checksum_damage_refuses_to_open() {
    let backend = InMemoryBackend::new();
    {
        let db = open(&backend).unwrap();
        db.connect()
            .unwrap()
            .insert(COLL, Document::new().with("n", 1))
            .unwrap();
    }
    backend.corrupt_byte(12, 0xAB);
    assert!(matches!(
        open(&backend),
        Err(CoreError::ChecksumMismatch { .. })
    ));
}

#[test]
fn file_backed_database_reopens() {
    let tmp = tempdir().unwrap();
    let config = Config::default().sync_on_commit(true);
    {
        let db = Database::open_with_config(tmp.path(), config.clone()).unwrap();
        let mut session = db.connect().unwrap();
        session.begin_transaction().unwrap();
        for n in 0..5i64 {
            session.insert(COLL, Document::new().with("n", n)).unwrap();
        }
        session.commit_transaction().unwrap();
        session.delete_one(COLL, Filter::eq("n", 0i64)).unwrap();
        db.close().unwrap();
    }

    let db = Database::open_with_config(tmp.path(), config).unwrap();
    let session = db.connect().unwrap();
    assert_eq!(session.count(COLL).unwrap(), 4);
    assert_eq!(db.committed_sequence(), SequenceNumber::new(2));
}

//! Several connections working at once.

use doctxn_core::{CoreError, Database, Document, Filter, Value};
use std::sync::{Arc, Barrier};
use std::thread;

const COLL: &str = "concurrent";

#[test]
fn concurrent_transactions_all_commit() {
    let db = Arc::new(Database::open_in_memory());
    let threads = 8;
    let per_thread = 25;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut session = db.connect().unwrap();
                barrier.wait();
                session.begin_transaction().unwrap();
                for i in 0..per_thread {
                    session
                        .insert(COLL, Document::new().with("t", t as i64).with("i", i as i64))
                        .unwrap();
                }
                assert_eq!(
                    session
                        .count_matching(COLL, &Filter::eq("t", t as i64))
                        .unwrap(),
                    per_thread
                );
                session.commit_transaction().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let session = db.connect().unwrap();
    assert_eq!(session.count(COLL).unwrap(), threads * per_thread);
    assert_eq!(db.active_transactions(), 0);
}

#[test]
fn transactions_stay_contiguous_in_insertion_order() {
    let db = Arc::new(Database::open_in_memory());
    let handles: Vec<_> = (0..4i64)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let mut session = db.connect().unwrap();
                session.begin_transaction().unwrap();
                for i in 0..10i64 {
                    session
                        .insert(COLL, Document::new().with("t", t).with("i", i))
                        .unwrap();
                }
                session.commit_transaction().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let docs = db.connect().unwrap().find_all(COLL).unwrap();
    for chunk in docs.chunks(10) {
        let owner = chunk[0].get("t").cloned();
        assert!(chunk.iter().all(|d| d.get("t").cloned() == owner));
        let order: Vec<_> = chunk.iter().filter_map(|d| d.get("i").and_then(Value::as_integer)).collect();
        assert_eq!(order, (0..10i64).collect::<Vec<_>>());
    }
}

#[test]
fn same_id_from_two_transactions_commits_once() {
    let db = Database::open_in_memory();
    let mut first = db.connect().unwrap();
    let mut second = db.connect().unwrap();

    first.begin_transaction().unwrap();
    second.begin_transaction().unwrap();
    first
        .insert(COLL, Document::new().with("_id", "k").with("by", "first"))
        .unwrap();
    second
        .insert(COLL, Document::new().with("_id", "k").with("by", "second"))
        .unwrap();
    second
        .insert(COLL, Document::new().with("_id", "other"))
        .unwrap();

    first.commit_transaction().unwrap();
    let err = second.commit_transaction().unwrap_err();
    match &err {
        CoreError::ApplyFailed { source, .. } => {
            assert!(matches!(**source, CoreError::DuplicateKey { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!second.in_transaction());

    let docs = second.find_all(COLL).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get("by"), Some(&Value::from("first")));

    let stats = db.stats();
    assert_eq!(stats.apply_failures, 1);
    second.begin_transaction().unwrap();
}

#[test]
fn dropping_a_session_rolls_back() {
    let db = Database::open_in_memory();
    {
        let mut session = db.connect().unwrap();
        session.insert(COLL, Document::new().with("a", 1)).unwrap();
        session.begin_transaction().unwrap();
        session.insert(COLL, Document::new().with("a", 2)).unwrap();
        assert_eq!(db.active_transactions(), 1);
    }

    assert_eq!(db.active_transactions(), 0);
    assert_eq!(db.connect().unwrap().count(COLL).unwrap(), 1);
    let stats = db.stats();
    assert_eq!(stats.implicit_rollbacks, 1);
    assert_eq!(stats.transactions_rolled_back, 1);
}

#[test]
fn readers_do_not_see_other_buffers() {
    let db = Arc::new(Database::open_in_memory());
    let mut writer = db.connect().unwrap();
    writer.begin_transaction().unwrap();
    for i in 0..50i64 {
        writer.insert(COLL, Document::new().with("i", i)).unwrap();
    }

    let db2 = Arc::clone(&db);
    let seen = thread::spawn(move || db2.connect().unwrap().count(COLL).unwrap())
        .join()
        .unwrap();
    assert_eq!(seen, 0);

    writer.commit_transaction().unwrap();
    assert_eq!(db.connect().unwrap().count(COLL).unwrap(), 50);
}

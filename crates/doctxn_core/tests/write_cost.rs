//! Writes against a large collection cost what they change.

use doctxn_core::{Database, Document, Filter, Session};
use std::time::{Duration, Instant};

const COLL: &str = "large";
const SEEDED: i64 = 20_000;
const WRITES: i64 = 200;
const BOUND: Duration = Duration::from_secs(5);

fn seeded(db: &Database) -> Session {
    let mut session = db.connect().unwrap();
    session.begin_transaction().unwrap();
    session
        .insert_many(
            COLL,
            (0..SEEDED).map(|i| Document::new().with("_id", i).with("n", i % 97)),
        )
        .unwrap();
    session.commit_transaction().unwrap();
    session
}

fn next(i: i64) -> Document {
    Document::new().with("_id", SEEDED + i).with("n", -1)
}

#[test]
fn auto_commit_inserts_do_not_copy_the_collection() {
    let db = Database::open_in_memory();
    let mut session = seeded(&db);
    let _reader = db.connect().unwrap();

    let started = Instant::now();
    for i in 0..WRITES {
        session.insert(COLL, next(i)).unwrap();
    }
    let elapsed = started.elapsed();

    assert!(elapsed < BOUND, "{WRITES} inserts took {elapsed:?}");
    assert_eq!(session.count(COLL).unwrap(), (SEEDED + WRITES) as usize);
}

#[test]
fn transaction_inserts_and_reads_do_not_copy_the_collection() {
    let db = Database::open_in_memory();
    let mut session = seeded(&db);

    let started = Instant::now();
    session.begin_transaction().unwrap();
    for i in 0..WRITES {
        session.insert(COLL, next(i)).unwrap();
        let own = session
            .find(COLL, &Filter::eq("_id", SEEDED + i))
            .unwrap();
        assert_eq!(own.len(), 1);
    }
    session.commit_transaction().unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < BOUND, "{WRITES} buffered inserts took {elapsed:?}");
    assert_eq!(
        session.count_matching(COLL, &Filter::eq("n", -1)).unwrap(),
        WRITES as usize
    );
}

#[test]
fn pinned_transaction_does_not_slow_other_writers() {
    let db = Database::open_in_memory();
    let mut writer = seeded(&db);
    let mut pinned = db.connect().unwrap();
    pinned.begin_transaction().unwrap();
    assert_eq!(pinned.count(COLL).unwrap(), SEEDED as usize);

    let started = Instant::now();
    for i in 0..WRITES {
        writer.insert(COLL, next(i)).unwrap();
    }
    writer.delete_many(COLL, Filter::eq("n", 0)).unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < BOUND, "writes beside a pinned snapshot took {elapsed:?}");
    assert_eq!(pinned.count(COLL).unwrap(), SEEDED as usize);
    pinned.rollback_transaction().unwrap();
}

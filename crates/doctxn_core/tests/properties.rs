//! Property tests for rollback and ordering.

use doctxn_core::{Database, Document, Filter, Value};
use proptest::prelude::*;

const COLL: &str = "props";

#[derive(Debug, Clone)]
enum Op {
    Insert(i64),
    DeleteOne(i64),
    DeleteAll(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..5i64).prop_map(Op::Insert),
        1 => (0..5i64).prop_map(Op::DeleteOne),
        1 => (0..5i64).prop_map(Op::DeleteAll),
    ]
}

fn values(docs: &[Document]) -> Vec<i64> {
    docs.iter()
        .filter_map(|d| d.get("v").and_then(Value::as_integer))
        .collect()
}

/// Applies ops to a plain vector the way the store should.
fn model(start: &[i64], ops: &[Op]) -> Vec<i64> {
    let mut out = start.to_vec();
    for op in ops {
        match op {
            Op::Insert(v) => out.push(*v),
            Op::DeleteOne(v) => {
                if let Some(pos) = out.iter().position(|x| x == v) {
                    out.remove(pos);
                }
            }
            Op::DeleteAll(v) => out.retain(|x| x != v),
        }
    }
    out
}

fn run(session: &mut doctxn_core::Session, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Insert(v) => {
                session.insert(COLL, Document::new().with("v", *v)).unwrap();
            }
            Op::DeleteOne(v) => {
                session.delete_one(COLL, Filter::eq("v", *v)).unwrap();
            }
            Op::DeleteAll(v) => {
                session.delete_many(COLL, Filter::eq("v", *v)).unwrap();
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rollback_restores_committed_state(
        seed in prop::collection::vec(0..5i64, 0..10),
        ops in prop::collection::vec(op_strategy(), 0..20),
    ) {
        let db = Database::open_in_memory();
        let mut session = db.connect().unwrap();
        run(&mut session, &seed.iter().map(|v| Op::Insert(*v)).collect::<Vec<_>>());
        let before = values(&session.find_all(COLL).unwrap());

        session.begin_transaction().unwrap();
        run(&mut session, &ops);
        session.rollback_transaction().unwrap();

        prop_assert_eq!(values(&session.find_all(COLL).unwrap()), before);
    }

    #[test]
    fn in_transaction_view_matches_committed_result(
        seed in prop::collection::vec(0..5i64, 0..10),
        ops in prop::collection::vec(op_strategy(), 0..20),
    ) {
        let db = Database::open_in_memory();
        let mut session = db.connect().unwrap();
        run(&mut session, &seed.iter().map(|v| Op::Insert(*v)).collect::<Vec<_>>());

        session.begin_transaction().unwrap();
        run(&mut session, &ops);
        let inside = values(&session.find_all(COLL).unwrap());
        session.commit_transaction().unwrap();
        let after = values(&session.find_all(COLL).unwrap());

        prop_assert_eq!(&inside, &model(&seed, &ops));
        prop_assert_eq!(inside, after);
    }
}

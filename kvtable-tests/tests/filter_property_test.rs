/// Property tests for query evaluation through a table
///
/// Pruning with Index Blobs must never change a result set, only the number of
/// records read.

use kvtable_api::{RecordBuilder, Table, TableConfig};
use kvtable_core::{MemoryEngine, Op, Record, Value, Q};
use proptest::prelude::*;
use std::sync::Arc;

const PATHS: [&str; 7] = ["a", "b", "c", "m.x", "m.y", "h", "missing"];

fn table() -> Table {
    let config = TableConfig::new("Prop", "code")
        .with_indexes(["a", "b", "m.x"])
        .with_heavy_fields(["h"])
        .with_fetch_batch_size(3);
    Table::with_engine(Arc::new(MemoryEngine::new()), config).unwrap()
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-3i64..4).prop_map(Value::Int),
        (-6i32..7).prop_map(|n| Value::Float(n as f64 / 2.0)),
        "[a-cA-C]{0,3}".prop_map(Value::Str),
        (0i64..3).prop_map(|n| Value::Ts(1_600_000_000_000 + n)),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => arb_scalar(),
        1 => prop::collection::vec(arb_scalar(), 0..3).prop_map(Value::List),
    ]
}

fn arb_record(code: usize) -> impl Strategy<Value = Record> {
    (
        arb_value(),
        arb_value(),
        arb_value(),
        arb_value(),
        arb_value(),
        prop::collection::vec(arb_scalar(), 0..3),
    )
        .prop_map(move |(a, b, c, mx, my, h)| {
            RecordBuilder::new()
                .string("code", format!("r{:02}", code))
                .value("a", a)
                .value("b", b)
                .value("c", c)
                .path("m.x", mx)
                .path("m.y", my)
                .value("h", h)
                .build()
        })
}

fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    (0usize..12).prop_flat_map(|n| (0..n).map(arb_record).collect::<Vec<_>>())
}

fn arb_leaf() -> impl Strategy<Value = Q> {
    (
        prop::sample::select(PATHS.to_vec()),
        prop::sample::select(Op::PRECEDENCE.to_vec()),
        arb_value(),
    )
        .prop_map(|(path, op, value)| {
            if op.is_unary() {
                Q::leaf(op, path, Value::Null)
            } else {
                Q::leaf(op, path, value)
            }
        })
}

fn arb_query() -> impl Strategy<Value = Q> {
    prop_oneof![1 => Just(Q::empty()), 6 => arb_leaf()].prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l & r),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l | r),
            inner.prop_map(|q| !q),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn filter_equals_post_filter(records in arb_records(), q in arb_query()) {
        let table = table();
        for record in &records {
            table.save(record).unwrap();
        }

        let all = table.all().list().unwrap();
        let expected: Vec<Record> = all.into_iter().filter(|r| q.matches(r)).collect();
        let found = table.filter(q.clone()).list().unwrap();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn shallow_filter_equals_stripped_post_filter(records in arb_records(), q in arb_query()) {
        let table = table();
        for record in &records {
            table.save(record).unwrap();
        }

        let expected: Vec<Record> = records
            .iter()
            .filter(|r| q.matches(r))
            .map(|r| {
                let mut r = r.clone();
                r.remove("h");
                r
            })
            .collect();
        let found = table.filter(q.clone()).shallow(true).list().unwrap();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn pruning_never_drops_a_match(records in arb_records(), q in arb_query()) {
        let table = table();
        for record in &records {
            table.save(record).unwrap();
        }

        let candidates = table.prune_pks(&q).unwrap();
        for record in records.iter().filter(|r| q.matches(r)) {
            let pk = record["code"].as_str().unwrap().to_string();
            prop_assert!(candidates.contains(&pk), "{} pruned by {}", pk, q);
        }
    }

    #[test]
    fn boolean_algebra(record in arb_record(0), q1 in arb_query(), q2 in arb_query()) {
        let m1 = q1.matches(&record);
        let m2 = q2.matches(&record);
        prop_assert_eq!((q1.clone() & q2.clone()).matches(&record), m1 && m2);
        prop_assert_eq!((q1.clone() | q2.clone()).matches(&record), m1 || m2);
        prop_assert_eq!((!q1.clone()).matches(&record), !m1);
        prop_assert_eq!(Q::empty() & q1.clone(), q1.clone());
        prop_assert_eq!(Q::empty() | q1.clone(), q1.clone());
        prop_assert_eq!(q2.clone() & Q::empty(), q2.clone());
    }

    #[test]
    fn list_field_equals_projection(records in arb_records()) {
        let table = table();
        for record in &records {
            table.save(record).unwrap();
        }

        let full = table.all().list().unwrap();
        for name in ["a", "c", "m"] {
            let projected: Vec<Value> = full
                .iter()
                .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
                .collect();
            prop_assert_eq!(table.list_field(name).unwrap(), projected);
        }
    }
}

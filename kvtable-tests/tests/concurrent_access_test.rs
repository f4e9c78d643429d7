/// Concurrent access tests for kvtable
///
/// A table is shared through `Arc` between reader threads and a single writer.
/// Readers must always observe complete records and a result set consistent
/// with the query they ran.

use kvtable_api::{field, RecordBuilder, Table};
use kvtable_core::{KvEngine, Value};
use kvtable_test_utils::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_concurrent_reads() {
    let t = TestTable::new(index_config());
    let mut gen = MockDataGenerator::new();
    for _ in 0..200 {
        t.table.save(&gen.index()).unwrap();
    }
    let table = Arc::new(t.table);

    let mut handles = vec![];
    for thread_id in 0..8 {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let pk = format!("H{:05}", (thread_id * 50 + i) % 200);
                let record = table.get_by_pk(&pk, false).unwrap();
                assert!(record.is_some(), "Read failed: {}", pk);
            }
            table.filter(field("ror").ge(0.05)).count().unwrap()
        }));
    }

    let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(counts.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_readers_during_writes() {
    init_tracing();
    let table = Arc::new(
        Table::open("memory:", "Counter", "code", ["n", "group"], ["payload"]).unwrap(),
    );
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let table = Arc::clone(&table);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for n in 0..300i64 {
                let record = RecordBuilder::new()
                    .string("code", format!("c{:03}", n % 50))
                    .int("n", n)
                    .string("group", if n % 2 == 0 { "even" } else { "odd" })
                    .value("payload", vec![n; 4])
                    .build();
                table.save(&record).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut readers = vec![];
    for _ in 0..4 {
        let table = Arc::clone(&table);
        let done = Arc::clone(&done);
        readers.push(thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                for record in table.filter_str("group==even").unwrap().list().unwrap() {
                    // A record is never observed half-written
                    let n = record["n"].as_f64().unwrap() as i64;
                    assert_eq!(n % 2, 0);
                    assert_eq!(record["payload"], Value::list(vec![n; 4]));
                }
                let pks = table.list_pk().unwrap();
                assert!(pks.len() <= 50);
            }
        }));
    }

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(table.list_pk().unwrap().len(), 50);
    // The last write per pk has n in 250..300
    for n in table.list_field("n").unwrap() {
        assert!(n.as_f64().unwrap() >= 250.0);
    }
}

#[test]
fn test_concurrent_writers_disjoint_pks() {
    let t = TestTable::new(fund_config());
    let table = Arc::new(t.table);

    let mut handles = vec![];
    for thread_id in 0..4 {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                let record = RecordBuilder::new()
                    .string("code", format!("t{}-{:02}", thread_id, i))
                    .string("name", format!("writer {}", thread_id))
                    .int("days", i)
                    .build();
                table.save(&record).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every record is stored even if concurrent blob updates raced
    let pks = table.list_pk().unwrap();
    let records = table.bulk_get_by_pk(&pks, true).unwrap();
    assert_eq!(table.engine().scan_keys(b"d0_").unwrap().len(), 100);

    table.ensure_index().unwrap();
    assert_eq!(table.list_pk().unwrap().len(), 100);
    assert_eq!(table.filter_str("name~writer 2").unwrap().count().unwrap(), 25);
    assert!(records.len() <= 100);
}

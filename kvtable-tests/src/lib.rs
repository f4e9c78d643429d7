//! Test utilities and helpers for kvtable
//!
//! Fixtures mirror the two table shapes the store was built for: a `Fund` table
//! with many indexed fields and a few heavy ones, and a small `Index` table
//! whose only heavy field is its history.

use anyhow::Context;
use kvtable_api::{RecordBuilder, Table, TableConfig};
use kvtable_core::{EngineConfig, Record, Value};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process (`RUST_LOG` controls the level).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn fund_config() -> TableConfig {
    TableConfig::new("Fund", "code")
        .with_indexes([
            "code",
            "name",
            "kind",
            "days",
            "managers",
            "aror",
            "mdd",
            "fees",
            "update_time",
        ])
        .with_heavy_fields(["raw", "navs", "adjnavs", "7d_aror"])
}

pub fn index_config() -> TableConfig {
    TableConfig::new("Index", "code")
        .with_indexes(["code", "name", "update_time", "ror"])
        .with_heavy_fields(["history"])
}

/// Table wrapper that manages the temporary directory lifecycle
pub struct TestTable {
    pub table: Table,
    pub path: PathBuf,
    config: TableConfig,
    _temp_dir: Option<TempDir>,
}

impl TestTable {
    /// File-backed table in a fresh temporary directory
    pub fn new(config: TableConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("table.kvt");
        let table = open_at(&path, config.clone()).expect("Failed to open table");

        Self {
            table,
            path,
            config,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Open a table at a specific file path (the caller owns the directory)
    pub fn at_path(path: PathBuf, config: TableConfig) -> Self {
        let table = open_at(&path, config.clone()).expect("Failed to open table");

        Self {
            table,
            path,
            config,
            _temp_dir: None,
        }
    }

    pub fn in_memory(config: TableConfig) -> Self {
        let table = Table::open_with_config("memory:", config.clone(), EngineConfig::default())
            .expect("Failed to open in-memory table");

        Self {
            table,
            path: PathBuf::from(":memory:"),
            config,
            _temp_dir: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close and reopen the table (for testing persistence)
    pub fn reopen(self) -> Self {
        let TestTable {
            table,
            path,
            config,
            _temp_dir,
        } = self;
        drop(table);
        let table = open_at(&path, config.clone()).expect("Failed to reopen table");

        Self {
            table,
            path,
            config,
            _temp_dir,
        }
    }
}

/// Open a file-backed table without fsync per write.
pub fn open_at(path: &Path, config: TableConfig) -> anyhow::Result<Table> {
    let uri = format!("file://{}", path.display());
    Table::open_with_config(&uri, config, EngineConfig::default().with_sync_writes(false))
        .with_context(|| format!("opening {}", uri))
}

/// Deterministic record generator
pub struct MockDataGenerator {
    counter: u64,
}

impl MockDataGenerator {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Next fund record; every field is a function of the counter.
    pub fn fund(&mut self) -> Record {
        let idx = self.counter;
        self.counter += 1;

        let kinds = ["stock", "bond", "mixed", "index"];
        let managers: Vec<Value> = (0..(idx % 3))
            .map(|m| Value::string(format!("manager{}", (idx + m) % 5)))
            .collect();

        let mut builder = RecordBuilder::new()
            .string("code", format!("{:06}", idx))
            .string("name", format!("Fund {} {}", kinds[(idx % 4) as usize], idx))
            .string("kind", kinds[(idx % 4) as usize])
            .int("days", (idx * 97 % 3000) as i64)
            .value("managers", managers)
            .path("aror.1y", (idx % 20) as f64 / 100.0 - 0.05)
            .path("aror.3y", (idx % 7) as f64 / 50.0)
            .path("mdd.2020", -((idx % 9) as f64) / 30.0)
            .path("fees.sale_service", if idx % 2 == 0 { 0.0 } else { 0.004 })
            .timestamp("update_time", 1_600_000_000_000 + idx as i64 * 86_400_000)
            .value("navs", (0..5).map(|d| 1.0 + (idx + d) as f64 / 1000.0).collect::<Vec<f64>>())
            .value("raw", format!("<html>{}</html>", idx));
        if idx % 5 == 0 {
            builder = builder.bool("closed", true);
        }
        builder.build()
    }

    /// Next index record with a heavy history series
    pub fn index(&mut self) -> Record {
        let idx = self.counter;
        self.counter += 1;

        RecordBuilder::new()
            .string("code", format!("H{:05}", idx))
            .string("name", format!("Index {}", idx))
            .float("ror", (idx % 11) as f64 / 100.0)
            .timestamp("update_time", 1_600_000_000_000 + idx as i64)
            .value("history", (0..10).map(|d| (idx * 10 + d) as i64).collect::<Vec<i64>>())
            .build()
    }
}

impl Default for MockDataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Save `count` generated funds one by one, returning them.
pub fn write_funds(table: &Table, count: usize) -> Vec<Record> {
    let mut gen = MockDataGenerator::new();
    let records: Vec<Record> = (0..count).map(|_| gen.fund()).collect();
    for record in &records {
        table.save(record).expect("Failed to save");
    }
    records
}

/// Assert that a value is a string with the expected contents
pub fn assert_string_eq(value: &Value, expected: &str) {
    match value {
        Value::Str(s) => assert_eq!(s, expected),
        _ => panic!("Expected string, got {:?}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_helper() {
        let test_table = TestTable::new(fund_config());
        let mut gen = MockDataGenerator::new();
        let record = gen.fund();

        test_table.table.save(&record).unwrap();
        let found = test_table.table.get_by_pk("000000", false).unwrap();
        assert_eq!(found, Some(record));
    }

    #[test]
    fn test_mock_generator() {
        let mut gen = MockDataGenerator::new();
        let a = gen.fund();
        let b = gen.fund();
        assert_ne!(a, b);
        assert_string_eq(&a["code"], "000000");
        assert_string_eq(&b["code"], "000001");
        assert_eq!(a.get("closed"), Some(&Value::Bool(true)));
        assert_eq!(b.get("closed"), None);
    }

    #[test]
    fn test_reopen() {
        let test_table = TestTable::new(index_config());
        let mut gen = MockDataGenerator::new();
        for _ in 0..20 {
            test_table.table.save(&gen.index()).unwrap();
        }
        test_table.table.flush().unwrap();

        let test_table = test_table.reopen();
        assert_eq!(test_table.table.list_pk().unwrap().len(), 20);
        let found = test_table.table.get_by_pk("H00007", false).unwrap().unwrap();
        assert_string_eq(&found["name"], "Index 7");
    }
}

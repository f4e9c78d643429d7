use kvtable_core::types::put_path;
use kvtable_core::{Record, Value};

pub use kvtable_core::{
    field, EngineConfig, Error as KvTableError, KvEngine, LogEngine, MemoryEngine, Op, Result,
    TableConfig, Value as KvTableValue, F, Q,
};

pub mod index;
pub mod keys;
pub mod partition;

pub mod table;
pub use table::Table;

pub mod queryset;
pub use queryset::{QueryIter, QuerySet};

/// Helper to build records
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self {
            record: Record::new(),
        }
    }

    pub fn string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.insert(key.into(), Value::string(value));
        self
    }

    pub fn int(mut self, key: impl Into<String>, value: i64) -> Self {
        self.record.insert(key.into(), Value::Int(value));
        self
    }

    pub fn float(mut self, key: impl Into<String>, value: f64) -> Self {
        self.record.insert(key.into(), Value::Float(value));
        self
    }

    pub fn bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.record.insert(key.into(), Value::Bool(value));
        self
    }

    /// Timestamp in milliseconds since the Unix epoch
    pub fn timestamp(mut self, key: impl Into<String>, millis: i64) -> Self {
        self.record.insert(key.into(), Value::Ts(millis));
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.record.insert(key.into(), value.into());
        self
    }

    /// Set a nested field by dot-path, creating intermediate maps.
    pub fn path(mut self, path: &str, value: impl Into<Value>) -> Self {
        put_path(&mut self.record, path, value.into());
        self
    }

    pub fn build(self) -> Record {
        self.record
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

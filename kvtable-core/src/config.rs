use crate::{Error, Result};
use std::path::PathBuf;

/// Default number of primary keys fetched per bulk read while filtering.
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 200;

/// Engine configuration for durability and log compaction
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// fsync the log after every write batch
    pub sync_writes: bool,

    /// Minimum number of logged operations before automatic compaction is considered
    pub compact_min_ops: u64,

    /// Fraction of obsolete logged operations (0.0-1.0) that triggers compaction
    pub compact_garbage_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_writes: true,
            compact_min_ops: 10_000,
            compact_garbage_ratio: 0.5,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn with_compact_min_ops(mut self, ops: u64) -> Self {
        self.compact_min_ops = ops;
        self
    }

    pub fn with_compact_garbage_ratio(mut self, ratio: f64) -> Self {
        self.compact_garbage_ratio = ratio;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.compact_garbage_ratio > 0.0 && self.compact_garbage_ratio < 1.0) {
            return Err("compact_garbage_ratio must be between 0 and 1 (exclusive)".to_string());
        }
        Ok(())
    }
}

/// Table definition: primary key, indexed fields and heavy fields
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Display name
    pub name: String,

    /// Primary key field name
    pub pk: String,

    /// Fields with a maintained Index Blob (dot-paths allowed)
    pub indexes: Vec<String>,

    /// Top-level fields stored in the heavy partition
    pub heavy_fields: Vec<String>,

    /// Primary keys fetched per bulk read while filtering
    pub fetch_batch_size: usize,
}

impl TableConfig {
    pub fn new(name: impl Into<String>, pk: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pk: pk.into(),
            indexes: Vec::new(),
            heavy_fields: Vec::new(),
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
        }
    }

    pub fn with_indexes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_heavy_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.heavy_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fetch_batch_size(mut self, size: usize) -> Self {
        self.fetch_batch_size = size;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("table name must not be empty".to_string());
        }

        if self.pk.is_empty() {
            return Err("pk field must not be empty".to_string());
        }

        if self.fetch_batch_size == 0 {
            return Err("fetch_batch_size must be greater than 0".to_string());
        }

        if let Some(field) = self.indexes.iter().find(|f| f.is_empty()) {
            return Err(format!("indexed field name must not be empty: {:?}", field));
        }

        if self.heavy_fields.iter().any(|f| f == &self.pk) {
            return Err("pk field cannot be a heavy field".to_string());
        }

        Ok(())
    }
}

/// Where a table's data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    /// `memory:` or `memory://`
    Memory,
    /// `file://<path>` or a bare path
    File(PathBuf),
}

impl StorageUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(Error::InvalidArgument("empty storage uri".to_string()));
        }

        if uri == "memory:" || uri == "memory://" || uri == ":memory:" {
            return Ok(StorageUri::Memory);
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        if path.is_empty() {
            return Err(Error::InvalidArgument(format!("storage uri has no path: {}", uri)));
        }
        Ok(StorageUri::File(PathBuf::from(path)))
    }
}

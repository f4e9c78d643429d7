//! Index Blobs
//!
//! One engine entry per indexed field mapping every live primary key to that
//! record's (non-null) value for the field. Filtering loads the blobs a query
//! touches and prunes candidate keys before any record is read.

use kvtable_core::types::put_path;
use kvtable_core::{codec, Record, Result, Value};
use bytes::Bytes;

/// Decoded Index Blob for one field
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexBlob {
    field: String,
    entries: Record,
}

impl IndexBlob {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            entries: Record::new(),
        }
    }

    /// Decode a stored blob. A blob that was never written is empty.
    pub fn load(field: impl Into<String>, data: Option<&Bytes>) -> Result<Self> {
        let field = field.into();
        let entries = match data {
            Some(bytes) => codec::decode(bytes).map_err(|e| e.with_context(&field))?,
            None => Record::new(),
        };
        Ok(Self { field, entries })
    }

    pub fn encode(&self) -> Result<Bytes> {
        codec::encode(&self.entries)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn get(&self, pk: &str) -> Option<&Value> {
        self.entries.get(pk)
    }

    pub fn contains(&self, pk: &str) -> bool {
        self.entries.contains_key(pk)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Primary keys in ascending order
    pub fn pks(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Point the entry for `pk` at `value`; a null value removes it.
    /// Returns whether the blob changed.
    pub fn set(&mut self, pk: &str, value: Value) -> bool {
        if value.is_null() {
            return self.remove(pk);
        }
        if self.entries.get(pk) == Some(&value) {
            return false;
        }
        self.entries.insert(pk.to_string(), value);
        true
    }

    /// Returns whether an entry was removed.
    pub fn remove(&mut self, pk: &str) -> bool {
        self.entries.remove(pk).is_some()
    }
}

/// Whether a query path is answered by one of the loaded fields: it names the
/// field or descends from it.
pub fn covers(fields: &[String], path: &str) -> bool {
    fields.iter().any(|f| {
        path == f
            || (path.len() > f.len() && path.starts_with(f.as_str()) && path.as_bytes()[f.len()] == b'.')
    })
}

/// Per-pk partial record assembled from several blobs.
pub fn composite(blobs: &[IndexBlob], pk: &str) -> Record {
    let mut record = Record::new();
    for blob in blobs {
        if let Some(value) = blob.get(pk) {
            put_path(&mut record, blob.field(), value.clone());
        }
    }
    record
}

//! Ordered byte-string key-value engine contract
//!
//! Tables only need point reads/writes, bulk reads/writes and key enumeration by
//! prefix. Two engines ship with the crate: [`MemoryEngine`](crate::memory_engine::MemoryEngine)
//! and the durable [`LogEngine`](crate::log_engine::LogEngine).

use crate::config::{EngineConfig, StorageUri};
use crate::log_engine::LogEngine;
use crate::memory_engine::MemoryEngine;
use crate::Result;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Staged writes for one bulk put, ordered by key.
pub type WriteBatch = BTreeMap<Vec<u8>, Bytes>;

/// Ordered byte-string store.
///
/// Implementations must be safe to share between threads. Every call is
/// request/response; no cursor outlives a single `scan_keys` call.
pub trait KvEngine: Send + Sync {
    /// Point lookup. A missing key is `Ok(None)`, never an error.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn put(&self, key: &[u8], value: Bytes) -> Result<()>;

    /// Delete a key. Deleting a missing key is a no-op.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Bulk lookup. Missing keys are omitted from the result.
    fn multi_get(&self, keys: &[Vec<u8>]) -> Result<HashMap<Vec<u8>, Bytes>>;

    /// Bulk write applied as one unit.
    fn multi_put(&self, batch: WriteBatch) -> Result<()>;

    /// All keys starting with `prefix`, in ascending order.
    ///
    /// Seeks to the first key `>= prefix` and walks forward until a key no longer
    /// carries the prefix.
    fn scan_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Make previous writes durable. No-op for volatile engines.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Open the engine a storage URI points at.
pub fn open_engine(uri: &str, config: EngineConfig) -> Result<Arc<dyn KvEngine>> {
    match StorageUri::parse(uri)? {
        StorageUri::Memory => Ok(Arc::new(MemoryEngine::new())),
        StorageUri::File(path) => Ok(Arc::new(LogEngine::open_with_config(path, config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(engine: &dyn KvEngine) {
        engine.put(b"d0_a", Bytes::from_static(b"1")).unwrap();
        let mut batch = WriteBatch::new();
        batch.insert(b"d0_b".to_vec(), Bytes::from_static(b"2"));
        batch.insert(b"d1_a".to_vec(), Bytes::from_static(b"3"));
        engine.multi_put(batch).unwrap();

        assert_eq!(engine.get(b"d0_a").unwrap(), Some(Bytes::from_static(b"1")));
        assert_eq!(engine.scan_keys(b"d0_").unwrap(), vec![b"d0_a".to_vec(), b"d0_b".to_vec()]);

        engine.delete(b"d0_a").unwrap();
        engine.delete(b"missing").unwrap();
        let found = engine
            .multi_get(&[b"d0_a".to_vec(), b"d0_b".to_vec()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(b"d0_b".as_slice()));
    }

    #[test]
    fn test_open_memory_engine() {
        let engine = open_engine("memory:", EngineConfig::default()).unwrap();
        exercise(engine.as_ref());
    }

    #[test]
    fn test_open_file_engine() {
        let dir = TempDir::new().unwrap();
        let uri = format!("file://{}", dir.path().join("table.kvt").display());
        let engine = open_engine(&uri, EngineConfig::default()).unwrap();
        exercise(engine.as_ref());
    }
}

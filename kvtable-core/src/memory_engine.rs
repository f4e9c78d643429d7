//! In-memory engine for tests and temporary tables
//!
//! All data is lost when the last handle is dropped.

use crate::engine::{KvEngine, WriteBatch};
use crate::Result;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// In-memory ordered engine
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Bytes) -> Result<()> {
        self.inner.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn multi_get(&self, keys: &[Vec<u8>]) -> Result<HashMap<Vec<u8>, Bytes>> {
        let inner = self.inner.read();
        Ok(keys
            .iter()
            .filter_map(|k| inner.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    fn multi_put(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.write();
        inner.extend(batch);
        Ok(())
    }

    fn scan_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.read();
        Ok(inner
            .range(prefix.to_vec()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_stops_at_prefix_boundary() {
        let engine = MemoryEngine::new();
        for key in ["d0_a", "d0_b", "d1_a", "i_code", "c"] {
            engine.put(key.as_bytes(), Bytes::from_static(b"x")).unwrap();
        }

        let keys = engine.scan_keys(b"d0_").unwrap();
        assert_eq!(keys, vec![b"d0_a".to_vec(), b"d0_b".to_vec()]);
        assert!(engine.scan_keys(b"zz").unwrap().is_empty());
        assert_eq!(engine.scan_keys(b"").unwrap().len(), 5);
    }

    #[test]
    fn test_clones_share_state() {
        let engine = MemoryEngine::new();
        let other = engine.clone();
        engine.put(b"k", Bytes::from_static(b"v")).unwrap();
        assert_eq!(other.get(b"k").unwrap(), Some(Bytes::from_static(b"v")));
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_multi_put_overwrites() {
        let engine = MemoryEngine::new();
        engine.put(b"k", Bytes::from_static(b"old")).unwrap();
        let mut batch = WriteBatch::new();
        batch.insert(b"k".to_vec(), Bytes::from_static(b"new"));
        engine.multi_put(batch).unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(Bytes::from_static(b"new")));
    }
}

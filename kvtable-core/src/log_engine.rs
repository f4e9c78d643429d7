//! Durable single-file engine
//!
//! Every write batch is appended as one checksummed frame and replayed into an
//! ordered in-memory map on open.
//!
//! Format: `[magic(4) | version(4) | reserved(8)] [frame...]`
//! Frame: `[len(4) | crc32c(4) | bincode(LogFrame)]`
//!
//! A frame is the unit of atomicity: a crash while appending leaves a short
//! trailing frame, which is cut off on the next open.

use crate::config::EngineConfig;
use crate::engine::{KvEngine, WriteBatch};
use crate::types::checksum;
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOG_HEADER_SIZE: usize = 16;
const LOG_MAGIC: u32 = 0x4B56_5400; // "KVT\0"
const LOG_VERSION: u32 = 1;
const FRAME_HEADER_SIZE: usize = 8; // len(4) + crc(4)
const COMPACT_FRAME_OPS: usize = 1024;

#[derive(Debug, Serialize, Deserialize)]
enum LogOp {
    Put { key: Vec<u8>, value: Bytes },
    Delete { key: Vec<u8> },
}

#[derive(Debug, Serialize, Deserialize)]
struct LogFrame {
    seq: u64,
    ops: Vec<LogOp>,
}

/// Append-log engine backed by one file
pub struct LogEngine {
    path: PathBuf,
    config: EngineConfig,
    inner: RwLock<LogInner>,
}

struct LogInner {
    file: File,
    map: BTreeMap<Vec<u8>, Bytes>,
    next_seq: u64,
    /// Operations currently stored in the file, live or obsolete
    logged_ops: u64,
}

impl LogEngine {
    /// Open the log at `path`, creating it when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, EngineConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidArgument)?;
        let path = path.as_ref().to_path_buf();

        let inner = if path.exists() {
            Self::replay(&path)?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = Self::create_file(&path)?;
            LogInner {
                file,
                map: BTreeMap::new(),
                next_seq: 1,
                logged_ops: 0,
            }
        };

        info!(
            path = %path.display(),
            keys = inner.map.len(),
            logged_ops = inner.logged_ops,
            "opened log engine"
        );

        Ok(Self {
            path,
            config,
            inner: RwLock::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operations stored in the file, including obsolete ones
    pub fn logged_ops(&self) -> u64 {
        self.inner.read().logged_ops
    }

    /// Rewrite the log with only live entries.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.inner.write();
        self.compact_locked(&mut inner)
    }

    fn create_file(path: &Path) -> Result<File> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut header = BytesMut::with_capacity(LOG_HEADER_SIZE);
        header.put_u32(LOG_MAGIC); // big-endian for magic
        header.put_u32_le(LOG_VERSION);
        header.put_u64_le(0); // reserved
        file.write_all(&header)?;
        file.sync_all()?;
        Ok(file)
    }

    fn replay(path: &Path) -> Result<LogInner> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.len() < LOG_HEADER_SIZE {
            return Err(Error::Corruption("log header truncated".to_string()));
        }
        let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if magic != LOG_MAGIC {
            return Err(Error::Corruption("Invalid log magic".to_string()));
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != LOG_VERSION {
            return Err(Error::Corruption(format!("unsupported log version {}", version)));
        }

        let mut map = BTreeMap::new();
        let mut max_seq = 0u64;
        let mut logged_ops = 0u64;
        let mut pos = LOG_HEADER_SIZE;

        while pos < data.len() {
            if data.len() - pos < FRAME_HEADER_SIZE {
                break;
            }
            let len = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
                as usize;
            let crc = u32::from_le_bytes([
                data[pos + 4],
                data[pos + 5],
                data[pos + 6],
                data[pos + 7],
            ]);
            let start = pos + FRAME_HEADER_SIZE;
            if data.len() - start < len {
                break;
            }

            let payload = &data[start..start + len];
            if !checksum::verify(payload, crc) {
                return Err(Error::ChecksumMismatch);
            }
            let frame: LogFrame = bincode::deserialize(payload)
                .map_err(|e| Error::Corruption(format!("Deserialize error: {}", e)))?;

            max_seq = max_seq.max(frame.seq);
            logged_ops += frame.ops.len() as u64;
            for op in frame.ops {
                apply_op(&mut map, op);
            }
            pos = start + len;
        }

        if pos < data.len() {
            warn!(
                path = %path.display(),
                offset = pos,
                dropped_bytes = data.len() - pos,
                "truncating incomplete trailing frame"
            );
            file.set_len(pos as u64)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        Ok(LogInner {
            file,
            map,
            next_seq: max_seq + 1,
            logged_ops,
        })
    }

    fn append(&self, inner: &mut LogInner, ops: Vec<LogOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let frame = LogFrame {
            seq: inner.next_seq,
            ops,
        };
        let buf = encode_frame(&frame)?;
        append_frame(&mut inner.file, &buf, self.config.sync_writes)?;

        inner.next_seq += 1;
        inner.logged_ops += frame.ops.len() as u64;
        for op in frame.ops {
            apply_op(&mut inner.map, op);
        }

        if self.should_compact(inner) {
            self.compact_locked(inner)?;
        }
        Ok(())
    }

    fn should_compact(&self, inner: &LogInner) -> bool {
        if inner.logged_ops < self.config.compact_min_ops {
            return false;
        }
        let garbage = inner.logged_ops.saturating_sub(inner.map.len() as u64);
        garbage as f64 / inner.logged_ops as f64 >= self.config.compact_garbage_ratio
    }

    fn compact_locked(&self, inner: &mut LogInner) -> Result<()> {
        let tmp_path = self.path.with_extension("compact");
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let mut tmp = Self::create_file(&tmp_path)?;
        let entries: Vec<(&Vec<u8>, &Bytes)> = inner.map.iter().collect();
        let mut seq = 1u64;
        for chunk in entries.chunks(COMPACT_FRAME_OPS) {
            let frame = LogFrame {
                seq,
                ops: chunk
                    .iter()
                    .map(|(k, v)| LogOp::Put {
                        key: (*k).clone(),
                        value: (*v).clone(),
                    })
                    .collect(),
            };
            tmp.write_all(&encode_frame(&frame)?)?;
            seq += 1;
        }
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.seek(SeekFrom::End(0))?;

        let before = inner.logged_ops;
        inner.file = file;
        inner.next_seq = seq;
        inner.logged_ops = inner.map.len() as u64;

        info!(
            path = %self.path.display(),
            before_ops = before,
            after_ops = inner.logged_ops,
            "compacted log"
        );
        Ok(())
    }
}

fn encode_frame(frame: &LogFrame) -> Result<BytesMut> {
    let data = bincode::serialize(frame)
        .map_err(|e| Error::Internal(format!("Serialize error: {}", e)))?;
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + data.len());
    buf.put_u32_le(data.len() as u32);
    buf.put_u32_le(checksum::compute(&data));
    buf.put_slice(&data);
    Ok(buf)
}

/// File operations used by `append_frame`
trait LogFile: Write + Seek {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append one encoded frame at the end of the log.
///
/// On a failed write or sync the file is cut back to where the frame began,
/// so later frames never follow a partial one.
fn append_frame<F: LogFile>(file: &mut F, buf: &[u8], sync: bool) -> Result<()> {
    let offset = file.seek(SeekFrom::End(0))?;
    let mut written = file.write_all(buf);
    if written.is_ok() && sync {
        written = file.sync();
    }

    if let Err(e) = written {
        warn!(offset, error = %e, "rolling back partial frame");
        file.truncate_to(offset)?;
        file.seek(SeekFrom::Start(offset))?;
        return Err(e.into());
    }
    Ok(())
}

fn apply_op(map: &mut BTreeMap<Vec<u8>, Bytes>, op: LogOp) {
    match op {
        LogOp::Put { key, value } => {
            map.insert(key, value);
        }
        LogOp::Delete { key } => {
            map.remove(&key);
        }
    }
}

impl KvEngine for LogEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.inner.read().map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Bytes) -> Result<()> {
        let mut inner = self.inner.write();
        self.append(
            &mut inner,
            vec![LogOp::Put {
                key: key.to_vec(),
                value,
            }],
        )
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.map.contains_key(key) {
            return Ok(());
        }
        self.append(&mut inner, vec![LogOp::Delete { key: key.to_vec() }])
    }

    fn multi_get(&self, keys: &[Vec<u8>]) -> Result<HashMap<Vec<u8>, Bytes>> {
        let inner = self.inner.read();
        Ok(keys
            .iter()
            .filter_map(|k| inner.map.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    fn multi_put(&self, batch: WriteBatch) -> Result<()> {
        debug!(entries = batch.len(), "log multi_put");
        let ops = batch
            .into_iter()
            .map(|(key, value)| LogOp::Put { key, value })
            .collect();
        let mut inner = self.inner.write();
        self.append(&mut inner, ops)
    }

    fn scan_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.read();
        Ok(inner
            .map
            .range(prefix.to_vec()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn flush(&self) -> Result<()> {
        self.inner.read().file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(engine: &LogEngine, key: &str, value: &str) {
        engine
            .put(key.as_bytes(), Bytes::copy_from_slice(value.as_bytes()))
            .unwrap();
    }

    #[test]
    fn test_log_create_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.kvt");

        {
            let engine = LogEngine::open(&path).unwrap();
            put(&engine, "d0_a", "1");
            put(&engine, "d0_b", "2");
            engine.delete(b"d0_a").unwrap();
        }

        let engine = LogEngine::open(&path).unwrap();
        assert_eq!(engine.get(b"d0_a").unwrap(), None);
        assert_eq!(engine.get(b"d0_b").unwrap(), Some(Bytes::from_static(b"2")));
        assert_eq!(engine.logged_ops(), 3);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.kvt");

        {
            let engine = LogEngine::open(&path).unwrap();
            put(&engine, "k1", "v1");
            put(&engine, "k2", "v2");
        }

        // Simulate a crash halfway through the last frame
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();
        drop(file);

        let engine = LogEngine::open(&path).unwrap();
        assert_eq!(engine.get(b"k1").unwrap(), Some(Bytes::from_static(b"v1")));
        assert_eq!(engine.get(b"k2").unwrap(), None);

        // The log stays appendable after truncation
        put(&engine, "k3", "v3");
        drop(engine);
        let engine = LogEngine::open(&path).unwrap();
        assert_eq!(engine.len(), 2);
    }

    /// Log file whose writes fail once `budget` bytes have gone through
    struct FailingFile {
        file: File,
        budget: usize,
    }

    impl Write for FailingFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.file.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl Seek for FailingFile {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.file.seek(pos)
        }
    }

    impl LogFile for FailingFile {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.file.set_len(len)
        }

        fn sync(&mut self) -> io::Result<()> {
            self.file.sync_data()
        }
    }

    #[test]
    fn test_failed_append_leaves_no_partial_frame() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.kvt");

        let engine = LogEngine::open(&path).unwrap();
        put(&engine, "k1", "v1");
        let good_len = fs::metadata(&path).unwrap().len();

        // Half a frame reaches the disk before the write fails
        let frame = LogFrame {
            seq: 99,
            ops: vec![LogOp::Put {
                key: b"lost".to_vec(),
                value: Bytes::from_static(b"never-stored"),
            }],
        };
        let buf = encode_frame(&frame).unwrap();
        let mut failing = FailingFile {
            file: OpenOptions::new().read(true).write(true).open(&path).unwrap(),
            budget: buf.len() / 2,
        };
        let err = append_frame(&mut failing, &buf, true).unwrap_err();
        assert_eq!(err.code(), "IO_ERROR");
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        // Later frames land right after the last good one
        put(&engine, "k2", "v2");
        drop(engine);

        let engine = LogEngine::open(&path).unwrap();
        assert_eq!(engine.get(b"k1").unwrap(), Some(Bytes::from_static(b"v1")));
        assert_eq!(engine.get(b"k2").unwrap(), Some(Bytes::from_static(b"v2")));
        assert_eq!(engine.get(b"lost").unwrap(), None);
        assert_eq!(engine.logged_ops(), 2);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.kvt");

        {
            let engine = LogEngine::open(&path).unwrap();
            put(&engine, "key", "value-value-value");
        }

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 2;
        data[last] ^= 0xFF;
        fs::write(&path, data).unwrap();

        assert!(matches!(LogEngine::open(&path), Err(Error::ChecksumMismatch)));
    }

    #[test]
    fn test_bad_magic() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.kvt");
        fs::write(&path, vec![0u8; 32]).unwrap();
        assert!(matches!(LogEngine::open(&path), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_manual_compaction() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.kvt");

        let engine = LogEngine::open(&path).unwrap();
        for i in 0..50 {
            put(&engine, "i_name", &format!("v{}", i));
        }
        put(&engine, "d0_a", "a");
        assert_eq!(engine.logged_ops(), 51);

        engine.compact().unwrap();
        assert_eq!(engine.logged_ops(), 2);
        put(&engine, "d0_b", "b");
        drop(engine);

        let engine = LogEngine::open(&path).unwrap();
        assert_eq!(engine.get(b"i_name").unwrap(), Some(Bytes::from_static(b"v49")));
        assert_eq!(engine.scan_keys(b"d0_").unwrap().len(), 2);
        assert!(!path.with_extension("compact").exists());
    }

    #[test]
    fn test_automatic_compaction() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("table.kvt");
        let config = EngineConfig::new()
            .with_sync_writes(false)
            .with_compact_min_ops(20)
            .with_compact_garbage_ratio(0.5);

        let engine = LogEngine::open_with_config(&path, config).unwrap();
        for i in 0..40 {
            put(&engine, "hot", &i.to_string());
        }
        assert!(engine.logged_ops() < 20);
        assert_eq!(engine.get(b"hot").unwrap(), Some(Bytes::from_static(b"39")));
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let engine = LogEngine::open(tmp.path().join("table.kvt")).unwrap();
        engine.multi_put(WriteBatch::new()).unwrap();
        engine.delete(b"missing").unwrap();
        assert_eq!(engine.logged_ops(), 0);
    }
}

//! Indexed document tables
//!
//! A [`Table`] stores records keyed by a string primary key over any
//! [`KvEngine`]. Each record is split into a meta partition and a heavy
//! partition so that filters and projections can skip large fields. Every
//! indexed field has an [`IndexBlob`] kept in step by `save` and `delete`.

use crate::index::{self, IndexBlob};
use crate::keys::{data_key, index_key, meta_key, pk_from_meta_key, META_PREFIX};
use crate::partition;
use crate::queryset::QuerySet;
use bytes::Bytes;
use kvtable_core::types::{get_path, root_segment};
use kvtable_core::{
    codec, open_engine, EngineConfig, Error, KvEngine, Q, Record, Result, TableConfig, Value,
    WriteBatch,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Document table over an ordered key-value engine
pub struct Table {
    engine: Arc<dyn KvEngine>,
    config: TableConfig,
    /// Indexed fields, primary key first, without duplicates
    indexes: Vec<String>,
    heavy: BTreeSet<String>,
}

impl Table {
    /// Open a table on the engine named by `uri` (`memory:`, `file://path` or a bare path).
    pub fn open<I, S, H, T>(
        uri: &str,
        name: impl Into<String>,
        pk: impl Into<String>,
        indexes: I,
        heavy_fields: H,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        H: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let config = TableConfig::new(name, pk)
            .with_indexes(indexes)
            .with_heavy_fields(heavy_fields);
        Self::open_with_config(uri, config, EngineConfig::default())
    }

    pub fn open_with_config(uri: &str, config: TableConfig, engine_config: EngineConfig) -> Result<Self> {
        let engine = open_engine(uri, engine_config)?;
        info!("Opened table {} at {}", config.name, uri);
        Self::with_engine(engine, config)
    }

    /// Build a table over an existing engine handle.
    pub fn with_engine(engine: Arc<dyn KvEngine>, config: TableConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidArgument)?;

        let mut indexes = vec![config.pk.clone()];
        for field in &config.indexes {
            if !indexes.contains(field) {
                indexes.push(field.clone());
            }
        }
        let heavy = config.heavy_fields.iter().cloned().collect();

        Ok(Self {
            engine,
            config,
            indexes,
            heavy,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn pk_field(&self) -> &str {
        &self.config.pk
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn KvEngine> {
        &self.engine
    }

    /// Indexed fields, primary key first
    pub fn indexed_fields(&self) -> &[String] {
        &self.indexes
    }

    pub fn heavy_fields(&self) -> &BTreeSet<String> {
        &self.heavy
    }

    /// Whether a dot-path lives in the heavy partition
    pub fn is_heavy(&self, path: &str) -> bool {
        self.heavy.contains(root_segment(path))
    }

    pub fn flush(&self) -> Result<()> {
        self.engine.flush()
    }

    fn pk_of(&self, record: &Record) -> Result<String> {
        match record.get(&self.config.pk) {
            Some(Value::Str(pk)) if !pk.is_empty() => Ok(pk.clone()),
            Some(Value::Str(_)) => Err(Error::InvalidRecord(format!(
                "{}: primary key {:?} is empty",
                self, self.config.pk
            ))),
            Some(other) => Err(Error::InvalidRecord(format!(
                "{}: primary key {:?} must be a string, got {}",
                self, self.config.pk, other
            ))),
            None => Err(Error::InvalidRecord(format!(
                "{}: primary key {:?} is missing",
                self, self.config.pk
            ))),
        }
    }

    /// Bulk-read the blobs of `fields`, in the same order.
    pub(crate) fn load_blobs(&self, fields: &[String]) -> Result<Vec<IndexBlob>> {
        let keys: Vec<Vec<u8>> = fields.iter().map(|f| index_key(f)).collect();
        let found = self.engine.multi_get(&keys)?;
        fields
            .iter()
            .zip(keys.iter())
            .map(|(field, key)| IndexBlob::load(field.as_str(), found.get(key)))
            .collect()
    }

    /// Live primary keys from the key space itself
    fn scan_pks(&self) -> Result<Vec<String>> {
        self.engine
            .scan_keys(META_PREFIX.as_bytes())?
            .iter()
            .map(|key| {
                pk_from_meta_key(key)
                    .map(str::to_string)
                    .ok_or_else(|| Error::Corruption(format!("{}: non UTF-8 meta key", self)))
            })
            .collect()
    }

    /// Rebuild every Index Blob from the stored records.
    ///
    /// Safe to run at any time; this is the repair step after a crash or after
    /// `save_with(.., true)`.
    pub fn ensure_index(&self) -> Result<()> {
        let pks = self.scan_pks()?;

        let mut pk_blob = IndexBlob::new(self.config.pk.as_str());
        for pk in &pks {
            pk_blob.set(pk, Value::string(pk.as_str()));
        }

        let mut blobs: Vec<IndexBlob> = self.indexes[1..]
            .iter()
            .map(|f| IndexBlob::new(f.as_str()))
            .collect();

        if !blobs.is_empty() {
            let with_heavy = self.indexes.iter().any(|f| self.is_heavy(f));
            for chunk in pks.chunks(self.config.fetch_batch_size) {
                for (pk, record) in self.fetch(chunk, with_heavy)? {
                    for blob in blobs.iter_mut() {
                        if let Some(value) = get_path(&record, blob.field()) {
                            blob.set(&pk, value.clone());
                        }
                    }
                }
            }
        }

        let mut batch = WriteBatch::new();
        for blob in std::iter::once(&pk_blob).chain(blobs.iter()) {
            batch.insert(index_key(blob.field()), blob.encode()?);
        }
        let written = batch.len();
        self.engine.multi_put(batch)?;

        info!(
            "Rebuilt {} index blobs for {} ({} records)",
            written,
            self.name(),
            pks.len()
        );
        Ok(())
    }

    /// Bulk-fetch records for `pks`, skipping keys with no meta partition.
    pub(crate) fn fetch(&self, pks: &[String], with_heavy: bool) -> Result<Vec<(String, Record)>> {
        let mut keys: Vec<Vec<u8>> = pks.iter().map(|pk| meta_key(pk)).collect();
        if with_heavy {
            keys.extend(pks.iter().map(|pk| data_key(pk)));
        }
        let found: HashMap<Vec<u8>, Bytes> = self.engine.multi_get(&keys)?;

        let mut records = Vec::with_capacity(pks.len());
        for pk in pks {
            let meta = match found.get(&meta_key(pk)) {
                Some(bytes) => codec::decode(bytes)?,
                None => continue,
            };
            let record = match found.get(&data_key(pk)) {
                Some(bytes) if with_heavy => partition::merge(meta, codec::decode(bytes)?),
                _ => meta,
            };
            records.push((pk.clone(), record));
        }
        Ok(records)
    }

    /// Point read. `shallow` skips the heavy partition.
    pub fn get_by_pk(&self, pk: &str, shallow: bool) -> Result<Option<Record>> {
        let mut found = self.fetch(&[pk.to_string()], !shallow)?;
        Ok(found.pop().map(|(_, record)| record))
    }

    /// Records for `pks` in the given order; missing keys are skipped.
    pub fn bulk_get_by_pk(&self, pks: &[String], shallow: bool) -> Result<Vec<Record>> {
        Ok(self
            .fetch(pks, !shallow)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// All live primary keys in ascending order.
    pub fn list_pk(&self) -> Result<Vec<String>> {
        match self.engine.get(&index_key(&self.config.pk))? {
            Some(bytes) => {
                let blob = IndexBlob::load(self.config.pk.as_str(), Some(&bytes))?;
                Ok(blob.pks().map(str::to_string).collect())
            }
            None => self.scan_pks(),
        }
    }

    /// Insert or fully replace a record, keeping the Index Blobs current.
    pub fn save(&self, record: &Record) -> Result<()> {
        self.save_with(record, false)
    }

    /// Like [`save`](Self::save). With `skip_index_update` the blobs are left
    /// stale until the next [`ensure_index`](Self::ensure_index).
    pub fn save_with(&self, record: &Record, skip_index_update: bool) -> Result<()> {
        let pk = self.pk_of(record)?;
        let mut batch = WriteBatch::new();

        if !skip_index_update {
            for mut blob in self.load_blobs(&self.indexes)? {
                let value = get_path(record, blob.field()).cloned().unwrap_or(Value::Null);
                if blob.set(&pk, value) {
                    batch.insert(index_key(blob.field()), blob.encode()?);
                }
            }
        }

        let (meta, heavy) = partition::split(record, &self.heavy);
        batch.insert(meta_key(&pk), codec::encode(&meta)?);
        batch.insert(data_key(&pk), codec::encode(&heavy)?);

        self.engine.multi_put(batch)?;
        debug!("Saved {} into {}", pk, self.name());
        Ok(())
    }

    /// Save many records, then rebuild the blobs once.
    pub fn bulk_save<'r, I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        let mut saved = 0usize;
        for record in records {
            self.save_with(record, true)?;
            saved += 1;
        }
        debug!("Bulk saved {} records into {}", saved, self.name());
        self.ensure_index()
    }

    /// Remove a record and its blob entries. Missing keys are a no-op.
    pub fn delete(&self, pk: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        for mut blob in self.load_blobs(&self.indexes)? {
            if blob.remove(pk) {
                batch.insert(index_key(blob.field()), blob.encode()?);
            }
        }
        if !batch.is_empty() {
            self.engine.multi_put(batch)?;
        }

        self.engine.delete(&meta_key(pk))?;
        self.engine.delete(&data_key(pk))?;
        debug!("Deleted {} from {}", pk, self.name());
        Ok(())
    }

    /// Candidate keys for `query` after pruning against the Index Blobs.
    ///
    /// Never drops a key whose record could match; the result is a superset of
    /// the final matches.
    pub fn prune_pks(&self, query: &Q) -> Result<Vec<String>> {
        let pks = self.list_pk()?;
        if query.is_empty() {
            return Ok(pks);
        }

        let mut fields: Vec<String> = Vec::new();
        for path in query.fields() {
            let field = if self.indexes.contains(&path) {
                path
            } else if self.indexes.iter().any(|f| f == root_segment(&path)) {
                root_segment(&path).to_string()
            } else {
                continue;
            };
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        if fields.is_empty() {
            return Ok(pks);
        }

        let blobs = self.load_blobs(&fields)?;
        let covered = |path: &str| index::covers(&fields, path);
        let total = pks.len();
        let kept: Vec<String> = pks
            .into_iter()
            .filter(|pk| query.prune_match(&index::composite(&blobs, pk), &covered))
            .collect();

        debug!(
            "Pruned {} to {} of {} keys using {:?}",
            self.name(),
            kept.len(),
            total,
            fields
        );
        Ok(kept)
    }

    pub fn all(&self) -> QuerySet<'_> {
        QuerySet::new(self, Q::Empty)
    }

    pub fn filter(&self, query: Q) -> QuerySet<'_> {
        QuerySet::new(self, query)
    }

    /// Filter with the textual syntax, e.g. `name~alpha, days>=365`.
    pub fn filter_str(&self, text: &str) -> Result<QuerySet<'_>> {
        Ok(self.filter(Q::parse(text)?))
    }

    /// Filter on exact field values.
    pub fn filter_by<I, K, V>(&self, pairs: I) -> QuerySet<'_>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.filter(Q::from_pairs(pairs))
    }

    /// First matching record
    pub fn get(&self, query: Q) -> Result<Option<Record>> {
        self.filter(query).first()
    }

    pub fn list(&self, query: Q) -> Result<Vec<Record>> {
        self.filter(query).list()
    }

    /// One field of every record
    pub fn list_field(&self, name: &str) -> Result<Vec<Value>> {
        self.all().list_field(name)
    }

    pub fn list_fields(&self, names: &[&str]) -> Result<Vec<Vec<Value>>> {
        self.all().list_fields(names)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Table #{}>", self.config.name)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.config.name)
            .field("pk", &self.config.pk)
            .field("indexes", &self.indexes)
            .field("heavy", &self.heavy)
            .finish()
    }
}

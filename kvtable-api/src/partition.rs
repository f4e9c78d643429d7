use kvtable_core::Record;
use std::collections::BTreeSet;

/// Split a record into its meta and heavy partitions.
///
/// Heavy fields are matched on top-level names only.
pub fn split(record: &Record, heavy: &BTreeSet<String>) -> (Record, Record) {
    record
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(k, _)| !heavy.contains(k))
}

/// Overlay the heavy partition onto the meta partition.
pub fn merge(mut meta: Record, heavy: Record) -> Record {
    meta.extend(heavy);
    meta
}

/// Drop heavy fields from a full record.
pub fn strip_heavy(record: &mut Record, heavy: &BTreeSet<String>) {
    record.retain(|k, _| !heavy.contains(k));
}

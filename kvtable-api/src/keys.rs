//! Engine key layout
//!
//! ```text
//! i_{field}   Index Blob for an indexed field
//! d0_{pk}     meta partition (every non-heavy field)
//! d1_{pk}     heavy partition
//! ```

pub const INDEX_PREFIX: &str = "i_";
pub const META_PREFIX: &str = "d0_";
pub const DATA_PREFIX: &str = "d1_";

fn prefixed(prefix: &str, s: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + s.len());
    key.extend_from_slice(prefix.as_bytes());
    key.extend_from_slice(s.as_bytes());
    key
}

pub fn meta_key(pk: &str) -> Vec<u8> {
    prefixed(META_PREFIX, pk)
}

pub fn data_key(pk: &str) -> Vec<u8> {
    prefixed(DATA_PREFIX, pk)
}

pub fn index_key(field: &str) -> Vec<u8> {
    prefixed(INDEX_PREFIX, field)
}

/// Recover the primary key from a meta key. `None` if the key is not a meta key
/// or the remainder is not UTF-8.
pub fn pk_from_meta_key(key: &[u8]) -> Option<&str> {
    key.strip_prefix(META_PREFIX.as_bytes())
        .and_then(|rest| std::str::from_utf8(rest).ok())
}

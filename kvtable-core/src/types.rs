use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Document value
///
/// `Int` and `Float` are two encodings of one "number" tag: they compare and
/// test equal numerically.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Timestamp (i64 milliseconds since epoch)
    Ts(i64),
}

/// Record - a map of field names to values
pub type Record = BTreeMap<String, Value>;

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map(m: BTreeMap<String, Value>) -> Self {
        Value::Map(m)
    }

    pub fn timestamp(millis: i64) -> Self {
        Value::Ts(millis)
    }

    /// Current wall-clock time as a timestamp value.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Value::Ts(millis)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Ts(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Truthiness: null, false, zero, and empty strings/lists/maps are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Ts(_) => true,
        }
    }

    /// Order two values of a comparable tag. Returns None across tags.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(l), Value::Int(r)) => Some(l.cmp(r)),
            (Value::Str(l), Value::Str(r)) => Some(l.cmp(r)),
            (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
            (Value::Ts(l), Value::Ts(r)) => Some(l.cmp(r)),
            (Value::List(l), Value::List(r)) => {
                for (a, b) in l.iter().zip(r.iter()) {
                    match a.compare(b)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(l.len().cmp(&r.len()))
            }
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Int(l), Value::Int(r)) => l == r,
            (Value::Str(l), Value::Str(r)) => l == r,
            (Value::List(l), Value::List(r)) => l == r,
            (Value::Map(l), Value::Map(r)) => l == r,
            (Value::Ts(l), Value::Ts(r)) => l == r,
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Renders the value in the textual filter literal syntax.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write_quoted(f, s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_quoted(f, k)?;
                    write!(f, ": {}", v)?;
                }
                write!(f, "}}")
            }
            Value::Ts(ms) => write!(f, "Ts({})", ms),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\r' => write!(f, "\\r")?,
            '\t' => write!(f, "\\t")?,
            c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

/// Resolve a dot-separated path against a record.
///
/// Descends only through maps. A missing segment, a non-map intermediate, or an
/// explicit `Null` all resolve to `None`.
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?;
    for segment in segments {
        current = current.as_map()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Store `value` at a dot-separated path, creating intermediate maps.
pub fn put_path(record: &mut Record, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = match segments.pop() {
        Some(last) => last,
        None => return,
    };

    let mut node = record;
    for segment in segments {
        let slot = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if !matches!(slot, Value::Map(_)) {
            *slot = Value::Map(BTreeMap::new());
        }
        node = match slot {
            Value::Map(m) => m,
            _ => unreachable!("slot was just replaced with a map"),
        };
    }
    node.insert(last.to_string(), value);
}

/// First segment of a dot-separated path.
pub fn root_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// CRC32C checksum helpers (hardware-accelerated when available)
pub mod checksum {
    /// Compute CRC32C checksum of data
    pub fn compute(data: &[u8]) -> u32 {
        crc32c::crc32c(data)
    }

    /// Verify CRC32C checksum
    pub fn verify(data: &[u8], expected: u32) -> bool {
        crc32c::crc32c(data) == expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Record {
        let mut fees = BTreeMap::new();
        fees.insert("sale_service".to_string(), Value::Float(0.25));
        fees.insert("none".to_string(), Value::Null);

        let mut record = Record::new();
        record.insert("code".to_string(), Value::string("000001"));
        record.insert("fees".to_string(), Value::Map(fees));
        record
    }

    #[test]
    fn test_get_path() {
        let record = nested();
        assert_eq!(get_path(&record, "code"), Some(&Value::string("000001")));
        assert_eq!(get_path(&record, "fees.sale_service"), Some(&Value::Float(0.25)));
        assert_eq!(get_path(&record, "fees.missing"), None);
        assert_eq!(get_path(&record, "fees.none"), None);
        assert_eq!(get_path(&record, "code.inner"), None);
    }

    #[test]
    fn test_put_path_creates_maps() {
        let mut record = Record::new();
        put_path(&mut record, "aror.1y", Value::Float(0.12));
        put_path(&mut record, "aror.2y", Value::Float(0.3));
        put_path(&mut record, "name", Value::string("Alpha"));

        assert_eq!(get_path(&record, "aror.1y"), Some(&Value::Float(0.12)));
        assert_eq!(record["aror"].as_map().map(|m| m.len()), Some(2));
        assert_eq!(get_path(&record, "name"), Some(&Value::string("Alpha")));
    }

    #[test]
    fn test_put_path_replaces_scalar_intermediate() {
        let mut record = Record::new();
        record.insert("a".to_string(), Value::Int(1));
        put_path(&mut record, "a.b", Value::Bool(true));
        assert_eq!(get_path(&record, "a.b"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_numeric_equality_across_encodings() {
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_ne!(Value::Int(3), Value::string("3"));
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::string("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_list_ordering_is_lexicographic() {
        let a = Value::list(vec![1, 2]);
        let b = Value::list(vec![1, 3]);
        let c = Value::list(vec![1]);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(c.compare(&a), Some(Ordering::Less));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Float(0.1).is_truthy());
        assert!(Value::Ts(0).is_truthy());
    }

    #[test]
    fn test_display_literal_syntax() {
        assert_eq!(Value::string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::list(vec![Value::Int(1), Value::string("x")]).to_string(), "[1, \"x\"]");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_checksum() {
        let data = b"d0_000001";
        let crc = checksum::compute(data);
        assert!(checksum::verify(data, crc));
        assert!(!checksum::verify(b"d0_000002", crc));
    }
}

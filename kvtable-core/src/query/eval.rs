//! Matching records against expressions
//!
//! Two modes:
//! - authoritative: against a complete record, with two-valued logic;
//! - pruning: against a composite built from Index Blobs, with three-valued
//!   logic so that a missing or uncovered field can never exclude a record.

use super::{Condition, Op, Q};
use crate::types::get_path;
use crate::{Record, Value};
use std::cmp::Ordering;

/// Knobs for authoritative matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Result of a leaf whose field is null, for operators without a fixed
    /// answer on null (`===`, `$e`, `$true`, `$false` always fail, `$ne` always
    /// holds).
    pub none_as_match: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            none_as_match: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn negate(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }
}

impl From<bool> for Truth {
    fn from(b: bool) -> Self {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }
}

impl Q {
    /// Authoritative match with default options.
    pub fn matches(&self, record: &Record) -> bool {
        self.match_with(record, MatchOptions::default())
    }

    pub fn match_with(&self, record: &Record, opts: MatchOptions) -> bool {
        match self {
            Q::Empty => true,
            Q::Leaf(c) => c.matches(record, opts),
            Q::And(a, b) => a.match_with(record, opts) && b.match_with(record, opts),
            Q::Or(a, b) => a.match_with(record, opts) || b.match_with(record, opts),
            Q::Not(inner) => !inner.match_with(record, opts),
        }
    }

    /// Pruning match against a partial record.
    ///
    /// `covered(path)` tells whether the composite holds trustworthy data for a
    /// path. Leaves on uncovered or null paths are unknown; the record is kept
    /// unless the expression is definitely false.
    pub fn prune_match<F>(&self, composite: &Record, covered: &F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        self.eval_partial(composite, covered) != Truth::False
    }

    fn eval_partial<F>(&self, composite: &Record, covered: &F) -> Truth
    where
        F: Fn(&str) -> bool,
    {
        match self {
            Q::Empty => Truth::True,
            Q::Leaf(c) => {
                if !covered(&c.path) {
                    return Truth::Unknown;
                }
                match get_path(composite, &c.path) {
                    Some(left) => c.test(left).into(),
                    None => Truth::Unknown,
                }
            }
            Q::And(a, b) => match a.eval_partial(composite, covered) {
                Truth::False => Truth::False,
                left => match (left, b.eval_partial(composite, covered)) {
                    (_, Truth::False) => Truth::False,
                    (Truth::True, Truth::True) => Truth::True,
                    _ => Truth::Unknown,
                },
            },
            Q::Or(a, b) => match a.eval_partial(composite, covered) {
                Truth::True => Truth::True,
                left => match (left, b.eval_partial(composite, covered)) {
                    (_, Truth::True) => Truth::True,
                    (Truth::False, Truth::False) => Truth::False,
                    _ => Truth::Unknown,
                },
            },
            Q::Not(inner) => inner.eval_partial(composite, covered).negate(),
        }
    }
}

impl Condition {
    pub fn matches(&self, record: &Record, opts: MatchOptions) -> bool {
        match get_path(record, &self.path) {
            Some(left) => self.test(left),
            None => match self.op {
                Op::NotExists => true,
                Op::StrictEq | Op::Exists | Op::True | Op::False => false,
                _ => opts.none_as_match,
            },
        }
    }

    /// Apply the operator to a non-null left value.
    pub fn test(&self, left: &Value) -> bool {
        let right = &self.value;
        match self.op {
            Op::StrictEq | Op::Eq => left == right,
            Op::Ne => left != right,
            Op::Lt => ordered(left, right, |o| o == Ordering::Less),
            Op::Le => ordered(left, right, |o| o != Ordering::Greater),
            Op::Gt => ordered(left, right, |o| o == Ordering::Greater),
            Op::Ge => ordered(left, right, |o| o != Ordering::Less),
            Op::Contains => contains(left, right),
            Op::NotContains => !contains(left, right),
            Op::In => member_of(left, right),
            Op::Exists => true,
            Op::NotExists => false,
            Op::True => left.is_truthy(),
            Op::False => !left.is_truthy(),
        }
    }
}

/// Lists and maps must be non-empty with every element/value satisfying the
/// comparison.
fn ordered(left: &Value, right: &Value, accept: fn(Ordering) -> bool) -> bool {
    let holds = |v: &Value| v.compare(right).map(accept).unwrap_or(false);
    match left {
        Value::List(items) => !items.is_empty() && items.iter().all(holds),
        Value::Map(m) => !m.is_empty() && m.values().all(holds),
        other => holds(other),
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => l.to_lowercase().contains(&r.to_lowercase()),
        (Value::List(items), r) => items.contains(r),
        _ => false,
    }
}

fn member_of(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (l, Value::List(items)) => items.contains(l),
        (Value::Str(l), Value::Str(r)) => r.contains(l.as_str()),
        (Value::Str(l), Value::Map(m)) => m.contains_key(l),
        _ => false,
    }
}

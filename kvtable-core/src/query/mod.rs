//! Boolean filter expressions over records
//!
//! A [`Q`] is an immutable expression tree. Leaves test one dot-path against a
//! literal; `&`, `|` and `!` compose them. `Q::empty()` matches everything and is
//! the identity element of both `&` and `|`.
//!
//! ```
//! use kvtable_core::query::{field, Q};
//!
//! let q = Q::parse("kind==\"bond\", aror.1y>0.05").unwrap() | field("name").contains("index");
//! assert_eq!(q.fields(), vec!["aror.1y", "kind", "name"]);
//! ```

mod eval;
mod field;
mod parser;

pub use eval::MatchOptions;
pub use field::{field, F};
pub use parser::{parse_filter, parse_literal};

use crate::{Result, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Leaf operators, in parser precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `===` (equality; a null field never matches)
    StrictEq,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<=`
    Le,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `!~`
    NotContains,
    /// `~` (case-insensitive substring or list membership)
    Contains,
    /// `$in`
    In,
    /// `$e` (exists)
    Exists,
    /// `$ne` (does not exist)
    NotExists,
    /// `$true`
    True,
    /// `$false`
    False,
}

impl Op {
    /// Operators in the order the parser tries them. Tokens that contain another
    /// token (`===` contains `==`) come first.
    pub const PRECEDENCE: [Op; 14] = [
        Op::StrictEq,
        Op::Eq,
        Op::Ne,
        Op::Le,
        Op::Lt,
        Op::Ge,
        Op::Gt,
        Op::NotContains,
        Op::Contains,
        Op::In,
        Op::Exists,
        Op::NotExists,
        Op::True,
        Op::False,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Op::StrictEq => "===",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Le => "<=",
            Op::Lt => "<",
            Op::Ge => ">=",
            Op::Gt => ">",
            Op::NotContains => "!~",
            Op::Contains => "~",
            Op::In => "$in",
            Op::Exists => "$e",
            Op::NotExists => "$ne",
            Op::True => "$true",
            Op::False => "$false",
        }
    }

    pub fn from_token(token: &str) -> Option<Op> {
        Op::PRECEDENCE.iter().copied().find(|op| op.token() == token)
    }

    /// Unary operators take no right-hand literal.
    pub fn is_unary(self) -> bool {
        matches!(self, Op::Exists | Op::NotExists | Op::True | Op::False)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One predicate: `path op value`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub op: Op,
    pub path: String,
    pub value: Value,
}

/// Filter expression
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Q {
    /// Matches everything
    #[default]
    Empty,
    Leaf(Condition),
    And(Box<Q>, Box<Q>),
    Or(Box<Q>, Box<Q>),
    Not(Box<Q>),
}

impl Q {
    pub fn empty() -> Self {
        Q::Empty
    }

    pub fn leaf(op: Op, path: impl Into<String>, value: impl Into<Value>) -> Self {
        Q::Leaf(Condition {
            op,
            path: path.into(),
            value: value.into(),
        })
    }

    /// Parse the compact textual syntax, e.g. `name~alpha, days>=365`.
    pub fn parse(input: &str) -> Result<Self> {
        parse_filter(input)
    }

    /// AND of `===` leaves, one per `(field, value)` pair.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        pairs
            .into_iter()
            .fold(Q::Empty, |acc, (k, v)| acc & Q::leaf(Op::StrictEq, k, v))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Q::Empty)
    }

    /// Every dot-path the expression reads, sorted and deduplicated.
    pub fn fields(&self) -> Vec<String> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out.into_iter().collect()
    }

    fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Q::Empty => {}
            Q::Leaf(c) => {
                out.insert(c.path.clone());
            }
            Q::And(a, b) | Q::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Q::Not(inner) => inner.collect_fields(out),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Q::And(..) | Q::Or(..) | Q::Not(..))
    }

    fn is_all_and(&self) -> bool {
        match self {
            Q::And(a, b) => a.is_all_and() && b.is_all_and(),
            Q::Or(..) | Q::Not(..) => false,
            Q::Empty | Q::Leaf(_) => true,
        }
    }

    fn is_all_or(&self) -> bool {
        match self {
            Q::Or(a, b) => a.is_all_or() && b.is_all_or(),
            Q::And(..) | Q::Not(..) => false,
            Q::Empty | Q::Leaf(_) => true,
        }
    }
}

impl BitAnd for Q {
    type Output = Q;

    fn bitand(self, rhs: Q) -> Q {
        match (self, rhs) {
            (Q::Empty, q) | (q, Q::Empty) => q,
            (l, r) => Q::And(Box::new(l), Box::new(r)),
        }
    }
}

impl BitOr for Q {
    type Output = Q;

    fn bitor(self, rhs: Q) -> Q {
        match (self, rhs) {
            (Q::Empty, q) | (q, Q::Empty) => q,
            (l, r) => Q::Or(Box::new(l), Box::new(r)),
        }
    }
}

impl Not for Q {
    type Output = Q;

    fn not(self) -> Q {
        Q::Not(Box::new(self))
    }
}

impl fmt::Display for Q {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Q::Empty => write!(f, "Q()"),
            Q::Leaf(c) if c.op.is_unary() => write!(f, "Q({} {})", c.path, c.op),
            Q::Leaf(c) => write!(f, "Q({} {} {})", c.path, c.op, c.value),
            Q::Not(inner) if inner.is_compound() => write!(f, "~({})", inner),
            Q::Not(inner) => write!(f, "~{}", inner),
            Q::And(a, b) => {
                write_side(f, a, a.is_all_and())?;
                write!(f, " & ")?;
                write_side(f, b, b.is_all_and())
            }
            Q::Or(a, b) => {
                write_side(f, a, a.is_all_or())?;
                write!(f, " | ")?;
                write_side(f, b, b.is_all_or())
            }
        }
    }
}

fn write_side(f: &mut fmt::Formatter<'_>, q: &Q, same_connective: bool) -> fmt::Result {
    if q.is_compound() && !same_connective {
        write!(f, "({})", q)
    } else {
        write!(f, "{}", q)
    }
}

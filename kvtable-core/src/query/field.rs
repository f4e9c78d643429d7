use super::{Op, Q};
use crate::Value;

/// Leaf builder for one field path
///
/// ```
/// use kvtable_core::query::field;
///
/// let q = field("aror.1y").gt(0.05) & field("managers").exists();
/// assert_eq!(q.to_string(), "Q(aror.1y > 0.05) & Q(managers $e)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct F {
    path: String,
}

/// Shorthand for [`F::new`]
pub fn field(path: impl Into<String>) -> F {
    F::new(path)
}

impl F {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn binary(&self, op: Op, value: impl Into<Value>) -> Q {
        Q::leaf(op, self.path.clone(), value)
    }

    fn unary(&self, op: Op) -> Q {
        Q::leaf(op, self.path.clone(), Value::Null)
    }

    /// `===`
    pub fn strict_eq(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::StrictEq, value)
    }

    pub fn eq(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::Eq, value)
    }

    pub fn ne(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::Ne, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::Lt, value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::Le, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::Ge, value)
    }

    /// `~`
    pub fn contains(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::Contains, value)
    }

    /// `!~`
    pub fn not_contains(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::NotContains, value)
    }

    /// `$in`
    pub fn is_in(&self, value: impl Into<Value>) -> Q {
        self.binary(Op::In, value)
    }

    pub fn exists(&self) -> Q {
        self.unary(Op::Exists)
    }

    pub fn not_exists(&self) -> Q {
        self.unary(Op::NotExists)
    }

    pub fn is_true(&self) -> Q {
        self.unary(Op::True)
    }

    pub fn is_false(&self) -> Q {
        self.unary(Op::False)
    }
}

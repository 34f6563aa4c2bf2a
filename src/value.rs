//! # Value Type System
//!
//! Closed, typed value enum for row cells plus the declared `DataType` of a
//! column. Rows are type-erased `Value` tuples rather than one generic
//! struct per arity — see `src/macros.rs` for how the arity-specific
//! factory API is generated on top of this single representation.

use std::sync::Arc;

use smallvec::SmallVec;

/// Maximum supported predicate arity.
pub const MAX_ARITY: usize = 8;

/// A row is a small, arity-erased tuple of values. Rows of arity <= 8 never
/// heap-allocate.
pub type Row = SmallVec<[Value; MAX_ARITY]>;

/// The declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Float,
    Bool,
    Text,
    /// An interned-style enum column (compares the same as `Text` but
    /// documents authoring intent — e.g. month names in an aggregation key).
    Sym,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Int => "Int",
            DataType::Float => "Float",
            DataType::Bool => "Bool",
            DataType::Text => "Text",
            DataType::Sym => "Sym",
        };
        f.write_str(s)
    }
}

/// A single cell value. `Eq`/`Hash` are implemented with bit-pattern
/// equality on `Float` (no NaN tolerance is needed for the workloads this
/// engine targets: index keys and join columns).
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(Arc<str>),
    Sym(Arc<str>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Bool(_) => DataType::Bool,
            Value::Text(_) => DataType::Text,
            Value::Sym(_) => DataType::Sym,
        }
    }

    pub fn text(s: impl Into<Arc<str>>) -> Value {
        Value::Text(s.into())
    }

    pub fn sym(s: impl Into<Arc<str>>) -> Value {
        Value::Sym(s.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Sym(a), Value::Sym(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Bool(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
            Value::Sym(v) => v.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Sym(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(Arc::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(Value::Float(1.5), Value::Float(1.5));
        assert_ne!(Value::Float(f64::NAN), Value::Float(1.0));
    }

    #[test]
    fn row_of_arity_eight_is_inline() {
        let row: Row = (0..8).map(Value::Int).collect();
        assert!(!row.spilled());
    }

    #[test]
    fn text_and_sym_do_not_compare_equal_cross_variant() {
        assert_ne!(Value::text("jan"), Value::sym("jan"));
    }
}

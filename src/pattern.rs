//! Pattern / Match Operation — the per-column binding directive compiled
//! for one goal by the Mode Analyzer.

use crate::cell::ValueCell;
use crate::value::{Row, Value};

/// One column's binding directive within a [`Pattern`].
#[derive(Debug, Clone)]
pub enum MatchOp {
    /// Succeed iff the literal equals the row's value at this column.
    Constant(Value),
    /// Succeed iff the cell's current value equals the row's value at this column.
    Read(ValueCell),
    /// Capture the row's value at this column into the cell; always succeeds.
    Write(ValueCell),
    /// Always succeeds; the column is not examined.
    Ignore,
}

impl MatchOp {
    /// Match this operation against one row value, applying any side effect
    /// (a `Write` sets the cell) and reporting success/failure.
    pub fn matches(&self, x: &Value) -> bool {
        match self {
            MatchOp::Constant(v) => v == x,
            MatchOp::Read(cell) => cell.get().as_ref() == Some(x),
            MatchOp::Write(cell) => {
                cell.set(x.clone());
                true
            }
            MatchOp::Ignore => true,
        }
    }

    pub fn is_instantiated(&self) -> bool {
        matches!(self, MatchOp::Constant(_) | MatchOp::Read(_))
    }
}

/// An ordered sequence of [`MatchOp`]s matching a predicate's arity.
/// Immutable after construction; the cells it references are shared with
/// other goals later in the same rule body.
#[derive(Debug, Clone)]
pub struct Pattern(Vec<MatchOp>);

impl Pattern {
    pub fn new(ops: Vec<MatchOp>) -> Self {
        Pattern(ops)
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn ops(&self) -> &[MatchOp] {
        &self.0
    }

    /// Every operation is `Constant` or `Read` — no `Write`s. Such a
    /// pattern can be probed (all values already known) rather than
    /// searched.
    pub fn is_instantiated(&self) -> bool {
        self.0.iter().all(MatchOp::is_instantiated)
    }

    /// Match this pattern against a full row, short-circuiting (and
    /// leaving earlier `Write`s applied — callers that need atomicity on
    /// failure should not rely on partial state) on the first failing
    /// column.
    pub fn matches_row(&self, row: &Row) -> bool {
        debug_assert_eq!(self.0.len(), row.len());
        self.0.iter().zip(row.iter()).all(|(op, v)| op.matches(v))
    }

    /// Assemble a row from this pattern assuming every op is instantiated
    /// (used by the RowSet-probe strategy, which requires it).
    pub fn assemble(&self) -> Row {
        self.0
            .iter()
            .map(|op| match op {
                MatchOp::Constant(v) => v.clone(),
                MatchOp::Read(cell) => cell.get().expect("assemble called on unbound Read"),
                MatchOp::Write(_) | MatchOp::Ignore => {
                    unreachable!("assemble requires an instantiated pattern")
                }
            })
            .collect()
    }
}

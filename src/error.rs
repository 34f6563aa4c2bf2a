//! Crate-wide error taxonomy.
//!
//! Every fatal condition named in the engine's error handling design is a
//! variant here, returned from the fallible construction APIs (predicate
//! declaration, rule compilation, accessor construction) instead of raised
//! as an exception. Per-tick scheduler failures are wrapped in [`TickError`]
//! and surfaced to the caller rather than silently retried.

use thiserror::Error;

use crate::value::DataType;

/// Errors produced while declaring predicates, rules, and accessors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TedError {
    /// An argument's declared/inferred type does not match the column it binds to.
    #[error("type mismatch in column {column} of '{predicate}': expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        predicate: String,
        column: usize,
        expected: DataType,
        actual: DataType,
    },

    /// A goal or head pattern supplied the wrong number of arguments.
    #[error("arity mismatch for '{predicate}': expected {expected}, got {actual}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        actual: usize,
    },

    /// Only arities 1..=8 are supported by the predicate factory.
    #[error("unsupported arity {0}: predicates support 1..=8 columns")]
    UnsupportedArity(usize),

    /// Inserting a row into a key-indexed column would duplicate an existing key.
    #[error("duplicate key violation on '{predicate}' column {column}")]
    DuplicateKey { predicate: String, column: usize },

    /// `.If`/`.Fact` was called on a table that already has directly-inserted rows.
    #[error("cannot add rules to '{0}': table already has directly-inserted rows")]
    RuleOnExtensionalTable(String),

    /// A direct insert was attempted on a Rules- or Operator-mode predicate.
    #[error("cannot insert directly into '{0}': predicate is derived by rules/operator")]
    InsertOnIntensionalTable(String),

    /// A rule's head pattern writes a variable the body never binds.
    #[error("uninstantiated head in rule for '{predicate}': variable '{variable}' is never bound by the body")]
    UninstantiatedHead { predicate: String, variable: String },

    /// An accessor was constructed for a column with no key index.
    #[error("no key index on column {column} of '{predicate}'; accessor requires one")]
    MissingKeyIndex { predicate: String, column: usize },

    /// A predicate name was declared twice.
    #[error("predicate '{0}' is already declared")]
    DuplicatePredicate(String),

    /// A goal referenced a predicate that was never declared.
    #[error("unknown predicate '{0}'")]
    UnknownPredicate(String),

    /// A goal referenced a variable that is read before any goal writes it,
    /// and it is not a constant and not a head input.
    #[error("variable '{0}' is read before being bound anywhere in the rule body")]
    UnboundVariable(String),

    /// Toggling `unique` on a table that is not freshly constructed is undefined
    /// behavior per the source design; rejected outright.
    #[error("cannot change uniqueness of '{0}' after construction")]
    UniqueToggleRejected(String),

    /// Wraps a failure that occurred during a scheduler tick.
    #[error(transparent)]
    Tick(#[from] TickError),
}

/// Errors surfaced from [`crate::program::Program::tick`].
///
/// By design (see the engine's concurrency model) a tick failure aborts the
/// remainder of that tick and leaves tables in a partially-updated state;
/// the caller is expected to re-run `tick` (or reconstruct the `Program`) on
/// retry rather than assume partial progress is salvageable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TickError {
    /// A dependency cycle among intensional predicates was not pre-stratified
    /// and the core's single topological pass could not order it.
    #[error("dependency cycle involving '{0}' is not stratifiable by this scheduler")]
    UnstratifiableCycle(String),

    /// An operator-mode predicate's update procedure returned an error.
    #[error("operator update for '{predicate}' failed: {message}")]
    OperatorFailed { predicate: String, message: String },

    /// A rule's own compiled call chain failed during execution (e.g. a
    /// duplicate key was produced by a rule head that should be unique).
    #[error("rule execution for '{predicate}' failed: {message}")]
    RuleFailed { predicate: String, message: String },

    /// `Program::tick`'s concurrent scheduler was asked to run with zero
    /// concurrent tasks, which could never make progress.
    #[error("tick_concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),
}

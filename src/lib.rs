//! # TED — Typed Embedded Deductive database
//!
//! TED is an embedded, strongly-typed Datalog-style engine for simulation
//! and rules workloads: table predicates hold ground rows, rules derive new
//! rows from other predicates (with negation, aggregation, argmax/argmin
//! optimization, and arithmetic/comparison expressions), and a per-tick
//! update scheduler keeps derived relations current as base facts change.
//!
//! ## Architecture
//!
//! ```text
//! Program (predicate arena)
//!   |-- TablePredicate  -- RowTable + attached Index(es)
//!   |-- Rule            -- compiled Call chain + ValueCell frame
//!   `-- Definition       -- pure macro, expanded at every call site
//!
//! Program::tick() / tick_blocking()
//!   |-- topological_order()   Kahn's algorithm over predicate dependencies
//!   `-- per predicate, by UpdateMode:
//!         BaseTable  -- merge `initially`/`accumulates`/`set_updater` sources
//!         Rules      -- clear + re-run every CompiledRule to fixpoint
//!                       (unique tables only; non-unique tables get one pass)
//!         Operator   -- call the registered updater closure
//! ```
//!
//! Query execution inside a rule body is a left-to-right chain of [`Call`]s,
//! each a tagged access strategy chosen once at compile time by
//! [`mode_analyzer`] in strict priority order: row-set probe, key-index
//! lookup, general-index walk, full scan.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ted::{ColumnSpec, DataType, EngineConfig, Goal, IndexMode, Program, Term, Value};
//!
//! let mut program = Program::new(EngineConfig::default());
//! let edge = program.declare_table(
//!     "edge",
//!     vec![
//!         ColumnSpec::new("from", DataType::Sym, IndexMode::NonKey),
//!         ColumnSpec::new("to", DataType::Sym, IndexMode::None),
//!     ],
//!     false,
//! )?;
//! program.add_row(&edge, vec![Value::Sym("a".into()), Value::Sym("b".into())])?;
//!
//! let path = program.declare_table(
//!     "path",
//!     vec![
//!         ColumnSpec::new("from", DataType::Sym, IndexMode::None),
//!         ColumnSpec::new("to", DataType::Sym, IndexMode::None),
//!     ],
//!     false,
//! )?;
//! program.rule(&path, vec![Term::Var("x".into()), Term::Var("y".into())], vec![
//!     edge.apply(vec![Term::Var("x".into()), Term::Var("y".into())]),
//! ])?;
//!
//! program.tick_blocking()?;
//! assert_eq!(program.rows(&path).len(), 1);
//! # Ok::<(), ted::TedError>(())
//! ```
//!
//! ## Non-goals
//!
//! Persistence, cross-tick transactions, distribution, semi-naive
//! incremental evaluation (fixpoint within a tick re-runs full rules, not
//! deltas), arbitrary user-defined join planners, and SQL compatibility
//! are all out of scope — see `SPEC_FULL.md` for the full rationale.

pub mod accessor;
pub mod ast;
pub mod call;
pub mod cell;
pub mod config;
pub mod error;
pub mod hash_slots;
pub mod index;
mod macros;
pub mod mode_analyzer;
pub mod pattern;
pub mod predicate;
pub mod program;
pub mod rule_executor;
pub mod scheduler;
pub mod table;
pub mod value;

pub use accessor::ColumnAccessor;
pub use ast::{Definition, Expr, FoldKind, Goal, Rule, Term};
pub use config::{EngineConfig, LoggingConfig};
pub use error::{TedError, TickError};
pub use predicate::{ColumnSpec, IndexMode, PredicateId};
pub use program::{Program, TablePredicateHandle};
pub use scheduler::{PredicateTickStats, TickReport};
pub use value::{DataType, Row, Value, MAX_ARITY};

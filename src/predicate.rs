//! Predicate — a named relation, in one of three kinds: table, primitive,
//! or (pure-macro) definition.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::Definition;
use crate::rule_executor::CompiledRule;
use crate::table::RowTable;
use crate::value::DataType;

/// Index mode requested for one column at predicate-declaration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    None,
    Key,
    NonKey,
}

/// One column's declared name, type, and index request.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: Arc<str>,
    pub data_type: DataType,
    pub index: IndexMode,
}

impl ColumnSpec {
    pub fn new(name: impl Into<Arc<str>>, data_type: DataType, index: IndexMode) -> Self {
        ColumnSpec {
            name: name.into(),
            data_type,
            index,
        }
    }
}

/// Opaque handle into a `Program`'s predicate arena. Rules hold these
/// instead of owning references, so predicates can reference each other
/// (and themselves, for recursive rules) without a cyclic ownership graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateId(pub(crate) u32);

/// How a table predicate's contents are refreshed every tick.
#[derive(Debug, Clone)]
pub enum UpdateMode {
    /// Contents come from explicit inserts, an `Initially` seed, per-tick
    /// `Add`/`Accumulates` inputs, and per-column `Set` updaters.
    BaseTable(BaseTableSources),
    /// Contents are recomputed from scratch per tick by running every rule
    /// to exhaustion, in declaration order.
    Rules(Vec<CompiledRule>),
    /// Contents are recomputed per tick by invoking a user-supplied update
    /// procedure.
    Operator(Rc<dyn Fn(&mut RowTable) -> Result<(), String>>),
}

/// The base-table input sources named in `spec.md` §4.6.
#[derive(Debug, Clone, Default)]
pub struct BaseTableSources {
    /// Seed rows merged once, the first time this predicate's table is
    /// materialized (not re-applied on later ticks).
    pub initially: Vec<crate::value::Row>,
    pub initially_applied: bool,
    /// Relations whose current contents are appended to this table every
    /// tick (`Add`/`Accumulates` in `spec.md` terms).
    pub accumulates: Vec<PredicateId>,
    /// `(key_column, data_column, source)` triples: every tick, each row of
    /// `source` drives one `ColumnAccessor::set` call against this table.
    pub set_updaters: Vec<(usize, usize, PredicateId)>,
}

/// A table predicate: owns a row table and whatever rules/updaters keep it
/// current.
pub struct TableEntry {
    pub name: Arc<str>,
    pub columns: Vec<ColumnSpec>,
    pub table: Rc<RefCell<RowTable>>,
    pub update_mode: UpdateMode,
    pub has_direct_inserts: bool,
    pub dependencies: HashSet<PredicateId>,
}

impl TableEntry {
    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}

/// The small built-in comparison primitives (`spec.md` explicitly scopes
/// trig/string/random built-ins out; these five are the minimum the worked
/// examples and general rule bodies need).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// One arena slot.
pub enum PredicateKind {
    Table(TableEntry),
    Primitive(PrimitiveOp),
    Definition(Definition),
}

impl PredicateKind {
    pub fn name(&self) -> &str {
        match self {
            PredicateKind::Table(t) => &t.name,
            PredicateKind::Primitive(op) => match op {
                PrimitiveOp::Lt => "lt",
                PrimitiveOp::Le => "le",
                PrimitiveOp::Gt => "gt",
                PrimitiveOp::Ge => "ge",
                PrimitiveOp::Eq => "eq",
                PrimitiveOp::Ne => "ne",
            },
            PredicateKind::Definition(d) => &d.name,
        }
    }

    pub fn as_table(&self) -> Option<&TableEntry> {
        match self {
            PredicateKind::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut TableEntry> {
        match self {
            PredicateKind::Table(t) => Some(t),
            _ => None,
        }
    }
}

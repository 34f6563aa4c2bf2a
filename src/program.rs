//! Program — the predicate arena context object. Replaces the source
//! design's process-wide global predicate list: every table, primitive, and
//! definition lives here, referenced by [`PredicateId`] rather than by
//! owning pointer, so rule bodies can reference (and self-reference) other
//! predicates without a cyclic ownership graph.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{Definition, Goal, Term};
use crate::config::EngineConfig;
use crate::error::TedError;
use crate::index::{GeneralIndex, IndexKind, KeyIndex};
use crate::mode_analyzer;
use crate::predicate::{
    BaseTableSources, ColumnSpec, IndexMode, PredicateId, PredicateKind, PrimitiveOp, TableEntry, UpdateMode,
};
use crate::scheduler::{self, TickReport};
use crate::table::RowTable;
use crate::value::{DataType, Row, Value};

/// A handle to a declared table predicate. Cheap to clone and copy around;
/// it carries just enough to build [`Goal::Apply`] terms and to address the
/// predicate back into its owning [`Program`].
#[derive(Debug, Clone)]
pub struct TablePredicateHandle {
    id: PredicateId,
    name: Arc<str>,
    arity: usize,
}

impl TablePredicateHandle {
    pub fn id(&self) -> PredicateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Build a `predicate(args...)` goal referencing this table, for use in
    /// another rule's body.
    pub fn apply(&self, args: Vec<Term>) -> Goal {
        Goal::Apply {
            predicate: self.name.clone(),
            args,
        }
    }
}

/// The predicate arena and tick driver.
pub struct Program {
    predicates: Vec<PredicateKind>,
    by_name: HashMap<Arc<str>, PredicateId>,
    config: EngineConfig,
}

impl Program {
    pub fn new(config: EngineConfig) -> Self {
        Program {
            predicates: Vec::new(),
            by_name: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn predicate_id(&self, name: &str) -> Option<PredicateId> {
        self.by_name.get(name).copied()
    }

    pub fn kind(&self, id: PredicateId) -> &PredicateKind {
        &self.predicates[id.0 as usize]
    }

    pub fn kind_mut(&mut self, id: PredicateId) -> &mut PredicateKind {
        &mut self.predicates[id.0 as usize]
    }

    fn insert(&mut self, name: Arc<str>, kind: PredicateKind) -> Result<PredicateId, TedError> {
        if self.by_name.contains_key(&name) {
            return Err(TedError::DuplicatePredicate(name.to_string()));
        }
        let id = PredicateId(self.predicates.len() as u32);
        self.predicates.push(kind);
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Register the five built-in comparison primitives. Idempotent callers
    /// should only do this once per `Program`; it is not done automatically
    /// so a `Program` with no use for them pays no arena slots.
    pub fn register_primitives(&mut self) -> Result<(), TedError> {
        for (name, op) in [
            ("lt", PrimitiveOp::Lt),
            ("le", PrimitiveOp::Le),
            ("gt", PrimitiveOp::Gt),
            ("ge", PrimitiveOp::Ge),
            ("eq", PrimitiveOp::Eq),
            ("ne", PrimitiveOp::Ne),
        ] {
            self.insert(Arc::from(name), PredicateKind::Primitive(op))?;
        }
        Ok(())
    }

    /// Declare a table predicate. `unique` enforces row distinctness (and
    /// enables the RowSet-probe access strategy); columns declare name,
    /// type, and index mode.
    pub fn declare_table(&mut self, name: impl Into<Arc<str>>, columns: Vec<ColumnSpec>, unique: bool) -> Result<TablePredicateHandle, TedError> {
        let name = name.into();
        let arity = columns.len();
        if arity == 0 || arity > crate::value::MAX_ARITY {
            return Err(TedError::UnsupportedArity(arity));
        }

        let mut table = RowTable::with_capacity(arity, unique, self.config.initial_table_capacity);
        for (column, spec) in columns.iter().enumerate() {
            match spec.index {
                IndexMode::None => {}
                IndexMode::Key => table.attach_index(IndexKind::Key(KeyIndex::new(column))),
                IndexMode::NonKey => table.attach_index(IndexKind::General(GeneralIndex::new(column))),
            }
        }

        let entry = TableEntry {
            name: name.clone(),
            columns,
            table: Rc::new(RefCell::new(table)),
            update_mode: UpdateMode::BaseTable(BaseTableSources::default()),
            has_direct_inserts: false,
            dependencies: Default::default(),
        };
        let id = self.insert(name.clone(), PredicateKind::Table(entry))?;
        tracing::debug!(predicate = %name, arity, unique, "table_declared");
        Ok(TablePredicateHandle { id, name, arity })
    }

    /// Declare a pure-macro definition: textually expanded at every call
    /// site by the Mode Analyzer, never materialized as a table.
    pub fn declare_definition(&mut self, name: impl Into<Arc<str>>, params: Vec<Arc<str>>, body: Vec<Goal>) -> Result<(), TedError> {
        let name = name.into();
        let definition = Definition {
            name: name.clone(),
            params,
            body,
        };
        self.insert(name, PredicateKind::Definition(definition))?;
        Ok(())
    }

    fn table_entry(&self, id: PredicateId) -> Option<&TableEntry> {
        self.kind(id).as_table()
    }

    fn table_entry_mut(&mut self, id: PredicateId) -> Option<&mut TableEntry> {
        self.kind_mut(id).as_table_mut()
    }

    /// Append a rule to `head`'s table: `head(head_args...) :- body`. An
    /// empty `body` is `spec.md`'s `.Fact()`.
    pub fn rule(&mut self, head: &TablePredicateHandle, head_args: Vec<Term>, body: Vec<Goal>) -> Result<(), TedError> {
        if head_args.len() != head.arity {
            return Err(TedError::ArityMismatch {
                predicate: head.name.to_string(),
                expected: head.arity,
                actual: head_args.len(),
            });
        }

        let compiled = mode_analyzer::compile_body(self, &body)?;
        let columns = self.table_entry(head.id).expect("handle always names a table").columns.clone();
        let head_pattern = mode_analyzer::compile_head_pattern(&head.name, &columns, &head_args, &compiled.cells, &compiled.bound)?;

        let body_len = compiled.calls.len();
        let entry = self.table_entry_mut(head.id).expect("handle always names a table");
        if entry.has_direct_inserts {
            return Err(TedError::RuleOnExtensionalTable(head.name.to_string()));
        }
        match &mut entry.update_mode {
            UpdateMode::Rules(rules) => rules.push(crate::rule_executor::CompiledRule::new(
                head.name.clone(),
                head_pattern,
                compiled.calls,
                compiled.cells.into_values().collect(),
            )),
            UpdateMode::BaseTable(sources) if sources.initially.is_empty() && sources.accumulates.is_empty() && sources.set_updaters.is_empty() => {
                entry.update_mode = UpdateMode::Rules(vec![crate::rule_executor::CompiledRule::new(
                    head.name.clone(),
                    head_pattern,
                    compiled.calls,
                    compiled.cells.into_values().collect(),
                )]);
            }
            UpdateMode::BaseTable(_) | UpdateMode::Operator(_) => {
                return Err(TedError::RuleOnExtensionalTable(head.name.to_string()));
            }
        }
        // A rule whose body refers back to its own head (transitive closure,
        // `step(x) :- step(x)`-shaped recursion) is not a scheduling
        // dependency: `CompiledRule::run` already tolerates reading the
        // head table while appending to it (see `rule_executor`'s
        // self-referential test), and a self-edge here would make every
        // recursive predicate look like an unstratifiable one-node cycle.
        entry.dependencies.extend(compiled.dependencies.into_iter().filter(|&dep| dep != head.id));
        tracing::debug!(predicate = %head.name, calls = body_len, "rule_compiled");
        Ok(())
    }

    pub fn fact(&mut self, head: &TablePredicateHandle, head_args: Vec<Term>) -> Result<(), TedError> {
        self.rule(head, head_args, Vec::new())
    }

    /// Insert a row directly (the CSV-loader / imperative-insert entry
    /// point). Errors if `head` is a Rules/Operator-mode predicate.
    pub fn add_row(&mut self, head: &TablePredicateHandle, values: Vec<Value>) -> Result<(), TedError> {
        if values.len() != head.arity {
            return Err(TedError::ArityMismatch {
                predicate: head.name.to_string(),
                expected: head.arity,
                actual: values.len(),
            });
        }
        let entry = self.table_entry_mut(head.id).expect("handle always names a table");
        if !matches!(entry.update_mode, UpdateMode::BaseTable(_)) {
            return Err(TedError::InsertOnIntensionalTable(head.name.to_string()));
        }
        for (column, (value, spec)) in values.iter().zip(entry.columns.iter()).enumerate() {
            if value.data_type() != spec.data_type {
                return Err(TedError::TypeMismatch {
                    predicate: head.name.to_string(),
                    column,
                    expected: spec.data_type,
                    actual: value.data_type(),
                });
            }
        }
        entry.has_direct_inserts = true;
        let row: Row = values.into_iter().collect();
        entry
            .table
            .borrow_mut()
            .add(row)
            .map_err(|()| TedError::DuplicateKey {
                predicate: head.name.to_string(),
                column: entry.columns.iter().position(|c| c.index == IndexMode::Key).unwrap_or(0),
            })?;
        Ok(())
    }

    /// Seed rows merged once, the first time `head`'s table materializes.
    pub fn initially(&mut self, head: &TablePredicateHandle, rows: Vec<Vec<Value>>) -> Result<(), TedError> {
        let entry = self.base_table_sources_mut(head)?;
        entry.initially = rows.into_iter().map(|r| r.into_iter().collect()).collect();
        Ok(())
    }

    /// Declare that `head` accumulates (appends) `source`'s current
    /// contents every tick.
    pub fn accumulates(&mut self, head: &TablePredicateHandle, source: &TablePredicateHandle) -> Result<(), TedError> {
        self.base_table_sources_mut(head)?.accumulates.push(source.id);
        self.table_entry_mut(head.id).unwrap().dependencies.insert(source.id);
        Ok(())
    }

    /// Declare a `Set(key_column, data_column)` updater driven by `source`'s
    /// rows (each a `(key, value)` pair), applied every tick via a
    /// [`crate::accessor::ColumnAccessor`].
    pub fn set_updater(
        &mut self,
        head: &TablePredicateHandle,
        key_column: usize,
        data_column: usize,
        source: &TablePredicateHandle,
    ) -> Result<(), TedError> {
        {
            let table = self.table_entry(head.id).ok_or_else(|| TedError::UnknownPredicate(head.name.to_string()))?.table.clone();
            let table_ref = table.borrow();
            if table_ref.key_index(key_column).is_none() {
                return Err(TedError::MissingKeyIndex {
                    predicate: head.name.to_string(),
                    column: key_column,
                });
            }
        }
        self.base_table_sources_mut(head)?.set_updaters.push((key_column, data_column, source.id));
        self.table_entry_mut(head.id).unwrap().dependencies.insert(source.id);
        Ok(())
    }

    fn base_table_sources_mut(&mut self, head: &TablePredicateHandle) -> Result<&mut BaseTableSources, TedError> {
        let entry = self.table_entry_mut(head.id).ok_or_else(|| TedError::UnknownPredicate(head.name.to_string()))?;
        match &mut entry.update_mode {
            UpdateMode::BaseTable(sources) => Ok(sources),
            _ => Err(TedError::RuleOnExtensionalTable(head.name.to_string())),
        }
    }

    /// Declare `head` as Operator mode: recomputed every tick by calling
    /// `updater` after every predicate in `dependencies` is current.
    pub fn operator(
        &mut self,
        head: &TablePredicateHandle,
        dependencies: Vec<PredicateId>,
        updater: Rc<dyn Fn(&mut RowTable) -> Result<(), String>>,
    ) -> Result<(), TedError> {
        let entry = self.table_entry_mut(head.id).ok_or_else(|| TedError::UnknownPredicate(head.name.to_string()))?;
        entry.update_mode = UpdateMode::Operator(updater);
        entry.dependencies = dependencies.into_iter().collect();
        Ok(())
    }

    /// A snapshot of `head`'s current rows, for reading query results.
    pub fn rows(&self, head: &TablePredicateHandle) -> Vec<Row> {
        self.table_entry(head.id).map(|t| t.table.borrow().rows().to_vec()).unwrap_or_default()
    }

    /// Run one tick synchronously: topologically order every table
    /// predicate by its prerequisites, then recompute each in turn.
    pub fn tick_blocking(&mut self) -> Result<TickReport, TedError> {
        let report = scheduler::run_tick_sequential(&mut self.predicates).map_err(TedError::from)?;
        tracing::info!(predicates = report.predicates.len(), "tick_complete");
        Ok(report)
    }

    /// Run one tick, recomputing independent predicates concurrently on a
    /// single-threaded `tokio` `LocalSet` (the row tables and value cells
    /// are `Rc`-based and not `Send`, so this stays on one OS thread but
    /// still overlaps the update *tasks* of sibling predicates with no
    /// mutual dependency, per `spec.md` §5).
    pub async fn tick(&mut self) -> Result<TickReport, TedError> {
        let report = scheduler::run_tick_concurrent(&mut self.predicates, self.config.tick_concurrency)
            .await
            .map_err(TedError::from)?;
        tracing::info!(predicates = report.predicates.len(), concurrency = self.config.tick_concurrency, "tick_complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TickError;
    use crate::predicate::IndexMode;

    fn program() -> Program {
        Program::new(EngineConfig::default())
    }

    #[test]
    fn declaring_the_same_name_twice_is_an_error() {
        let mut p = program();
        p.declare_table("p", vec![ColumnSpec::new("x", DataType::Int, IndexMode::None)], false).unwrap();
        let err = p
            .declare_table("p", vec![ColumnSpec::new("x", DataType::Int, IndexMode::None)], false)
            .unwrap_err();
        assert!(matches!(err, TedError::DuplicatePredicate(_)));
    }

    #[test]
    fn fact_then_rule_on_same_table_is_allowed_and_both_run() {
        let mut p = program();
        let parent = p
            .declare_table(
                "parent",
                vec![
                    ColumnSpec::new("x", DataType::Sym, IndexMode::None),
                    ColumnSpec::new("y", DataType::Sym, IndexMode::None),
                ],
                false,
            )
            .unwrap();
        p.fact(&parent, vec![Term::Const(Value::sym("alice")), Term::Const(Value::sym("bob"))]).unwrap();
        p.fact(&parent, vec![Term::Const(Value::sym("bob")), Term::Const(Value::sym("carol"))]).unwrap();
        p.tick_blocking().unwrap();
        assert_eq!(p.rows(&parent).len(), 2);
    }

    #[test]
    fn direct_insert_then_rule_declaration_is_rejected() {
        let mut p = program();
        let t = p.declare_table("t", vec![ColumnSpec::new("x", DataType::Int, IndexMode::None)], false).unwrap();
        p.add_row(&t, vec![Value::Int(1)]).unwrap();
        let err = p.fact(&t, vec![Term::Const(Value::Int(2))]).unwrap_err();
        assert!(matches!(err, TedError::RuleOnExtensionalTable(_)));
    }

    #[test]
    fn insert_on_rules_table_is_rejected() {
        let mut p = program();
        let t = p.declare_table("t", vec![ColumnSpec::new("x", DataType::Int, IndexMode::None)], false).unwrap();
        p.fact(&t, vec![Term::Const(Value::Int(1))]).unwrap();
        let err = p.add_row(&t, vec![Value::Int(2)]).unwrap_err();
        assert!(matches!(err, TedError::InsertOnIntensionalTable(_)));
    }

    #[tokio::test]
    async fn tick_rejects_a_configured_zero_concurrency() {
        let mut config = EngineConfig::default();
        config.tick_concurrency = 0;
        let mut p = Program::new(config);
        p.declare_table("t", vec![ColumnSpec::new("x", DataType::Int, IndexMode::None)], false).unwrap();
        let err = p.tick().await.unwrap_err();
        assert!(matches!(err, TedError::Tick(TickError::InvalidConcurrency(0))));
    }
}

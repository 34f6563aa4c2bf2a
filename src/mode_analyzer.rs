//! Mode Analyzer — compiles a goal body into a chain of [`Call`]s, deciding
//! per argument whether a variable is first-bound (`Write`) or already
//! bound (`Read`), and choosing the cheapest access strategy for each
//! table goal.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ast::{Definition, Expr, FoldKind, Goal, Term};
use crate::call::{Call, CompiledExpr, ResolvedArg};
use crate::cell::ValueCell;
use crate::error::TedError;
use crate::pattern::{MatchOp, Pattern};
use crate::predicate::{ColumnSpec, PredicateId, PredicateKind, PrimitiveOp};
use crate::program::Program;
use crate::value::DataType;

/// The result of compiling a rule body: the call chain to drive, the set of
/// table predicates it reads (for scheduler dependency ordering), and the
/// final cell/binding state (needed by the caller to compile the rule's
/// head pattern against the same cells).
pub struct CompiledBody {
    pub calls: Vec<Call>,
    pub dependencies: HashSet<PredicateId>,
    pub cells: HashMap<Arc<str>, ValueCell>,
    pub bound: HashSet<Arc<str>>,
}

pub fn compile_body(program: &Program, goals: &[Goal]) -> Result<CompiledBody, TedError> {
    let mut scope = Scope {
        program,
        cells: HashMap::new(),
        bound: HashSet::new(),
        dependencies: HashSet::new(),
        next_alpha: 0,
    };
    let mut calls = Vec::new();
    for goal in goals {
        calls.extend(scope.compile_goal(goal)?);
    }
    Ok(CompiledBody {
        calls,
        dependencies: scope.dependencies,
        cells: scope.cells,
        bound: scope.bound,
    })
}

/// Build the head `Pattern` for a rule, reusing the cells/bound-state left
/// by compiling its body. Every head argument must already be bound by the
/// body (or be a constant) — an unbound head variable is `spec.md` §7's
/// "uninstantiated head" error.
pub fn compile_head_pattern(
    predicate_name: &str,
    columns: &[ColumnSpec],
    args: &[Term],
    cells: &HashMap<Arc<str>, ValueCell>,
    bound: &HashSet<Arc<str>>,
) -> Result<Pattern, TedError> {
    if args.len() != columns.len() {
        return Err(TedError::ArityMismatch {
            predicate: predicate_name.to_string(),
            expected: columns.len(),
            actual: args.len(),
        });
    }
    let mut ops = Vec::with_capacity(args.len());
    for (column, (arg, spec)) in args.iter().zip(columns.iter()).enumerate() {
        match arg {
            Term::Const(v) => {
                if v.data_type() != spec.data_type {
                    return Err(TedError::TypeMismatch {
                        predicate: predicate_name.to_string(),
                        column,
                        expected: spec.data_type,
                        actual: v.data_type(),
                    });
                }
                ops.push(MatchOp::Constant(v.clone()));
            }
            Term::Var(name) => {
                if !bound.contains(name) {
                    return Err(TedError::UninstantiatedHead {
                        predicate: predicate_name.to_string(),
                        variable: name.to_string(),
                    });
                }
                let cell = cells.get(name).expect("bound variable always has a cell").clone();
                ops.push(MatchOp::Read(cell));
            }
        }
    }
    Ok(Pattern::new(ops))
}

struct Scope<'a> {
    program: &'a Program,
    cells: HashMap<Arc<str>, ValueCell>,
    bound: HashSet<Arc<str>>,
    dependencies: HashSet<PredicateId>,
    next_alpha: u64,
}

impl<'a> Scope<'a> {
    fn child(&self) -> Scope<'a> {
        Scope {
            program: self.program,
            cells: self.cells.clone(),
            bound: self.bound.clone(),
            dependencies: HashSet::new(),
            next_alpha: self.next_alpha,
        }
    }

    fn cell_for(&mut self, name: &Arc<str>) -> ValueCell {
        self.cells.entry(name.clone()).or_insert_with(ValueCell::new).clone()
    }

    fn term_to_matchop(&mut self, term: &Term, expected: Option<(&str, usize, DataType)>) -> Result<MatchOp, TedError> {
        match term {
            Term::Const(v) => {
                if let Some((predicate, column, expected_type)) = expected {
                    if v.data_type() != expected_type {
                        return Err(TedError::TypeMismatch {
                            predicate: predicate.to_string(),
                            column,
                            expected: expected_type,
                            actual: v.data_type(),
                        });
                    }
                }
                Ok(MatchOp::Constant(v.clone()))
            }
            Term::Var(name) => {
                if self.bound.contains(name) {
                    Ok(MatchOp::Read(self.cell_for(name)))
                } else {
                    self.bound.insert(name.clone());
                    Ok(MatchOp::Write(self.cell_for(name)))
                }
            }
        }
    }

    /// Compile one goal into zero or more calls. Most goals compile to
    /// exactly one call; a `Definition` application splices its (alpha-
    /// renamed) body in place, which may be any number of goals.
    fn compile_goal(&mut self, goal: &Goal) -> Result<Vec<Call>, TedError> {
        match goal {
            Goal::Apply { predicate, args } => self.compile_apply(predicate, args),
            Goal::Not(inner) => {
                let mut child = self.child();
                let calls = child.compile_goal(inner)?;
                self.dependencies.extend(child.dependencies);
                self.next_alpha = child.next_alpha;
                Ok(vec![Call::Negation {
                    inner: Box::new(crate::call::Chain::new(calls)),
                    primed: std::cell::Cell::new(false),
                }])
            }
            Goal::Or(left, right) => {
                // Pre-seed cells for every variable either branch might
                // introduce, so both branches write into the *same* cell
                // regardless of which one the executor actually takes.
                let mut names = Vec::new();
                for g in left.iter().chain(right.iter()) {
                    collect_goal_vars(g, &mut names);
                }
                for name in &names {
                    if !self.cells.contains_key(name) {
                        self.cell_for(name);
                    }
                }

                let mut left_child = self.child();
                let mut left_calls = Vec::new();
                for g in left {
                    left_calls.extend(left_child.compile_goal(g)?);
                }
                let mut right_child = self.child();
                let mut right_calls = Vec::new();
                for g in right {
                    right_calls.extend(right_child.compile_goal(g)?);
                }

                self.dependencies.extend(left_child.dependencies);
                self.dependencies.extend(right_child.dependencies);
                self.bound.extend(left_child.bound.iter().cloned());
                self.bound.extend(right_child.bound.iter().cloned());
                self.next_alpha = self.next_alpha.max(left_child.next_alpha).max(right_child.next_alpha);

                Ok(vec![Call::Disjunction {
                    left: Box::new(crate::call::Chain::new(left_calls)),
                    right: Box::new(crate::call::Chain::new(right_calls)),
                    in_right: Cell::new(false),
                }])
            }
            Goal::Eval { target, expr } => {
                let compiled_expr = self.compile_expr(expr)?;
                let target_op = self.term_to_matchop(target, None)?;
                Ok(vec![Call::Eval {
                    target: target_op,
                    expr: compiled_expr,
                    primed: Cell::new(false),
                }])
            }
            Goal::Aggregate { target, var, inner, fold } => {
                let mut child = self.child();
                let inner_calls = child.compile_goal_seq(inner)?;
                let var_cell = child
                    .cells
                    .get(var)
                    .cloned()
                    .ok_or_else(|| TedError::UnboundVariable(var.to_string()))?;
                self.dependencies.extend(child.dependencies);
                self.next_alpha = child.next_alpha;

                let target_op = self.term_to_matchop(target, None)?;
                Ok(vec![Call::Aggregate {
                    target: target_op,
                    var_cell,
                    inner: Box::new(crate::call::Chain::new(inner_calls)),
                    fold: fold.clone(),
                    primed: Cell::new(false),
                }])
            }
            Goal::Optimize { targets, reported, utility, inner, descending } => {
                if targets.len() != reported.len() + 1 {
                    return Err(TedError::ArityMismatch {
                        predicate: "Optimize".to_string(),
                        expected: reported.len() + 1,
                        actual: targets.len(),
                    });
                }
                let mut child = self.child();
                let inner_calls = child.compile_goal_seq(inner)?;
                let utility_cell = child
                    .cells
                    .get(utility)
                    .cloned()
                    .ok_or_else(|| TedError::UnboundVariable(utility.to_string()))?;
                let reported_cells = reported
                    .iter()
                    .map(|name| child.cells.get(name).cloned().ok_or_else(|| TedError::UnboundVariable(name.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                self.dependencies.extend(child.dependencies);
                self.next_alpha = child.next_alpha;

                let target_ops = targets.iter().map(|t| self.term_to_matchop(t, None)).collect::<Result<Vec<_>, _>>()?;
                Ok(vec![Call::Optimize {
                    targets: target_ops,
                    reported_cells,
                    utility_cell,
                    inner: Box::new(crate::call::Chain::new(inner_calls)),
                    descending: *descending,
                    primed: Cell::new(false),
                }])
            }
        }
    }

    fn compile_goal_seq(&mut self, goals: &[Goal]) -> Result<Vec<Call>, TedError> {
        let mut calls = Vec::new();
        for g in goals {
            calls.extend(self.compile_goal(g)?);
        }
        Ok(calls)
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<CompiledExpr, TedError> {
        Ok(match expr {
            Expr::Const(v) => CompiledExpr::Const(v.clone()),
            Expr::Var(name) => {
                if !self.bound.contains(name) {
                    return Err(TedError::UnboundVariable(name.to_string()));
                }
                CompiledExpr::Cell(self.cell_for(name))
            }
            Expr::Neg(a) => CompiledExpr::Neg(Box::new(self.compile_expr(a)?)),
            Expr::Add(a, b) => CompiledExpr::Add(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::Sub(a, b) => CompiledExpr::Sub(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::Mul(a, b) => CompiledExpr::Mul(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::Div(a, b) => CompiledExpr::Div(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::Lt(a, b) => CompiledExpr::Lt(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::Le(a, b) => CompiledExpr::Le(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::Gt(a, b) => CompiledExpr::Gt(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::Ge(a, b) => CompiledExpr::Ge(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::EqOp(a, b) => CompiledExpr::EqOp(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
            Expr::Ne(a, b) => CompiledExpr::Ne(Box::new(self.compile_expr(a)?), Box::new(self.compile_expr(b)?)),
        })
    }

    fn compile_apply(&mut self, predicate: &Arc<str>, args: &[Term]) -> Result<Vec<Call>, TedError> {
        let id = self
            .program
            .predicate_id(predicate)
            .ok_or_else(|| TedError::UnknownPredicate(predicate.to_string()))?;

        match self.program.kind(id) {
            PredicateKind::Table(table_entry) => {
                if args.len() != table_entry.arity() {
                    return Err(TedError::ArityMismatch {
                        predicate: predicate.to_string(),
                        expected: table_entry.arity(),
                        actual: args.len(),
                    });
                }
                self.dependencies.insert(id);

                let mut ops = Vec::with_capacity(args.len());
                for (column, (arg, spec)) in args.iter().zip(table_entry.columns.iter()).enumerate() {
                    ops.push(self.term_to_matchop(arg, Some((predicate.as_ref(), column, spec.data_type)))?);
                }
                let pattern = Pattern::new(ops);
                let table = table_entry.table.clone();
                let unique = table_entry.table.borrow().is_unique();

                if unique && pattern.is_instantiated() {
                    return Ok(vec![Call::RowSetProbe {
                        table,
                        pattern,
                        primed: Cell::new(false),
                    }]);
                }

                let instantiated_columns: Vec<usize> = pattern
                    .ops()
                    .iter()
                    .enumerate()
                    .filter(|(_, op)| op.is_instantiated())
                    .map(|(column, _)| column)
                    .collect();

                let snapshot = table.borrow();
                for &column in &instantiated_columns {
                    if snapshot.key_index(column).is_some() {
                        let key = pattern.ops()[column].clone();
                        drop(snapshot);
                        return Ok(vec![Call::KeyIndexLookup {
                            table,
                            column,
                            key,
                            pattern,
                            primed: Cell::new(false),
                        }]);
                    }
                }
                for &column in &instantiated_columns {
                    if snapshot.general_index(column).is_some() {
                        let key = pattern.ops()[column].clone();
                        drop(snapshot);
                        return Ok(vec![Call::GeneralIndexWalk {
                            table,
                            column,
                            key,
                            pattern,
                            rows: std::cell::RefCell::new(Vec::new()),
                            pos: Cell::new(0),
                        }]);
                    }
                }
                drop(snapshot);
                Ok(vec![Call::FullScan {
                    table,
                    pattern,
                    cursor: Cell::new(0),
                }])
            }
            PredicateKind::Primitive(op) => {
                let op = *op;
                if args.len() != 2 {
                    return Err(TedError::ArityMismatch {
                        predicate: predicate.to_string(),
                        expected: 2,
                        actual: args.len(),
                    });
                }
                let left = self.resolve_primitive_arg(&args[0])?;
                let right = self.resolve_primitive_arg(&args[1])?;
                Ok(vec![Call::Primitive {
                    op,
                    left,
                    right,
                    primed: Cell::new(false),
                }])
            }
            PredicateKind::Definition(definition) => self.expand_definition(definition.clone(), args),
        }
    }

    fn resolve_primitive_arg(&mut self, term: &Term) -> Result<ResolvedArg, TedError> {
        match term {
            Term::Const(v) => Ok(ResolvedArg::Const(v.clone())),
            Term::Var(name) => {
                if !self.bound.contains(name) {
                    return Err(TedError::UnboundVariable(name.to_string()));
                }
                Ok(ResolvedArg::Cell(self.cell_for(name)))
            }
        }
    }

    fn expand_definition(&mut self, definition: Definition, args: &[Term]) -> Result<Vec<Call>, TedError> {
        if args.len() != definition.params.len() {
            return Err(TedError::ArityMismatch {
                predicate: definition.name.to_string(),
                expected: definition.params.len(),
                actual: args.len(),
            });
        }
        let alpha = self.next_alpha;
        self.next_alpha += 1;

        let mapping: HashMap<Arc<str>, Term> = definition.params.iter().cloned().zip(args.iter().cloned()).collect();
        let expanded: Vec<Goal> = definition.body.iter().map(|g| rename_goal(g, &mapping, alpha)).collect();
        self.compile_goal_seq(&expanded)
    }
}

fn alpha_name(name: &Arc<str>, alpha: u64) -> Arc<str> {
    Arc::from(format!("{name}#{alpha}"))
}

fn rename_term(term: &Term, mapping: &HashMap<Arc<str>, Term>, alpha: u64) -> Term {
    match term {
        Term::Const(v) => Term::Const(v.clone()),
        Term::Var(name) => mapping.get(name).cloned().unwrap_or_else(|| Term::Var(alpha_name(name, alpha))),
    }
}

fn rename_expr(expr: &Expr, mapping: &HashMap<Arc<str>, Term>, alpha: u64) -> Expr {
    let rename_var = |name: &Arc<str>| -> Expr {
        match mapping.get(name) {
            Some(Term::Const(v)) => Expr::Const(v.clone()),
            Some(Term::Var(renamed)) => Expr::Var(renamed.clone()),
            None => Expr::Var(alpha_name(name, alpha)),
        }
    };
    match expr {
        Expr::Const(v) => Expr::Const(v.clone()),
        Expr::Var(name) => rename_var(name),
        Expr::Neg(a) => Expr::Neg(Box::new(rename_expr(a, mapping, alpha))),
        Expr::Add(a, b) => Expr::Add(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::Sub(a, b) => Expr::Sub(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::Mul(a, b) => Expr::Mul(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::Div(a, b) => Expr::Div(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::Lt(a, b) => Expr::Lt(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::Le(a, b) => Expr::Le(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::Gt(a, b) => Expr::Gt(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::Ge(a, b) => Expr::Ge(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::EqOp(a, b) => Expr::EqOp(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
        Expr::Ne(a, b) => Expr::Ne(Box::new(rename_expr(a, mapping, alpha)), Box::new(rename_expr(b, mapping, alpha))),
    }
}

fn rename_goal(goal: &Goal, mapping: &HashMap<Arc<str>, Term>, alpha: u64) -> Goal {
    match goal {
        Goal::Apply { predicate, args } => Goal::Apply {
            predicate: predicate.clone(),
            args: args.iter().map(|t| rename_term(t, mapping, alpha)).collect(),
        },
        Goal::Not(inner) => Goal::Not(Box::new(rename_goal(inner, mapping, alpha))),
        Goal::Or(l, r) => Goal::Or(
            l.iter().map(|g| rename_goal(g, mapping, alpha)).collect(),
            r.iter().map(|g| rename_goal(g, mapping, alpha)).collect(),
        ),
        Goal::Eval { target, expr } => Goal::Eval {
            target: rename_term(target, mapping, alpha),
            expr: rename_expr(expr, mapping, alpha),
        },
        Goal::Aggregate { target, var, inner, fold } => Goal::Aggregate {
            target: rename_term(target, mapping, alpha),
            var: match mapping.get(var) {
                Some(Term::Var(renamed)) => renamed.clone(),
                _ => alpha_name(var, alpha),
            },
            inner: inner.iter().map(|g| rename_goal(g, mapping, alpha)).collect(),
            fold: fold.clone(),
        },
        Goal::Optimize { targets, reported, utility, inner, descending } => Goal::Optimize {
            targets: targets.iter().map(|t| rename_term(t, mapping, alpha)).collect(),
            reported: reported
                .iter()
                .map(|v| match mapping.get(v) {
                    Some(Term::Var(renamed)) => renamed.clone(),
                    _ => alpha_name(v, alpha),
                })
                .collect(),
            utility: match mapping.get(utility) {
                Some(Term::Var(renamed)) => renamed.clone(),
                _ => alpha_name(utility, alpha),
            },
            inner: inner.iter().map(|g| rename_goal(g, mapping, alpha)).collect(),
            descending: *descending,
        },
    }
}

fn collect_goal_vars(goal: &Goal, out: &mut Vec<Arc<str>>) {
    fn push_term(term: &Term, out: &mut Vec<Arc<str>>) {
        if let Term::Var(name) = term {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
    }
    match goal {
        Goal::Apply { args, .. } => args.iter().for_each(|t| push_term(t, out)),
        Goal::Not(inner) => collect_goal_vars(inner, out),
        Goal::Or(l, r) => {
            l.iter().for_each(|g| collect_goal_vars(g, out));
            r.iter().for_each(|g| collect_goal_vars(g, out));
        }
        Goal::Eval { target, expr } => {
            push_term(target, out);
            for v in expr.variables() {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        Goal::Aggregate { target, var, inner, .. } => {
            push_term(target, out);
            if !out.contains(var) {
                out.push(var.clone());
            }
            inner.iter().for_each(|g| collect_goal_vars(g, out));
        }
        Goal::Optimize { targets, reported, utility, inner, .. } => {
            targets.iter().for_each(|t| push_term(t, out));
            for v in reported {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            if !out.contains(utility) {
                out.push(utility.clone());
            }
            inner.iter().for_each(|g| collect_goal_vars(g, out));
        }
    }
}

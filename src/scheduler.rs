//! Update Scheduler — recomputes every table predicate once per tick, in
//! dependency order, following `spec.md` §4.6's three update modes
//! (`BaseTable`, `Rules`, `Operator`).

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::LocalSet;

use crate::accessor::ColumnAccessor;
use crate::error::TickError;
use crate::predicate::{BaseTableSources, PredicateId, PredicateKind, UpdateMode};
use crate::rule_executor::CompiledRule;
use crate::table::RowTable;

/// Per-predicate statistics recorded for one tick.
#[derive(Debug, Clone)]
pub struct PredicateTickStats {
    pub predicate: String,
    pub rows_before: usize,
    pub rows_after: usize,
    pub elapsed: Duration,
}

/// The result of one `Program::tick`/`tick_blocking` call, one entry per
/// table predicate in dependency order.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub predicates: Vec<PredicateTickStats>,
}

fn table_rc(predicates: &[PredicateKind], id: PredicateId) -> Rc<RefCell<RowTable>> {
    predicates[id.0 as usize]
        .as_table()
        .expect("dependency id always names a table")
        .table
        .clone()
}

/// Kahn's algorithm over every table predicate's `dependencies` set.
/// Non-table predicates (primitives, definitions) are never scheduled and
/// never appear in anyone's dependency set.
fn topological_order(predicates: &[PredicateKind]) -> Result<Vec<usize>, TickError> {
    let mut in_degree: HashMap<usize, usize> = HashMap::new();
    let mut successors: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut table_indices = Vec::new();

    for (idx, kind) in predicates.iter().enumerate() {
        if let PredicateKind::Table(entry) = kind {
            table_indices.push(idx);
            in_degree.insert(idx, entry.dependencies.len());
            for dep in &entry.dependencies {
                successors.entry(dep.0 as usize).or_default().push(idx);
            }
        }
    }

    let mut queue: VecDeque<usize> = table_indices.iter().copied().filter(|idx| in_degree[idx] == 0).collect();
    let mut order = Vec::with_capacity(table_indices.len());

    while let Some(idx) = queue.pop_front() {
        order.push(idx);
        if let Some(succs) = successors.get(&idx) {
            for &succ in succs {
                let degree = in_degree.get_mut(&succ).expect("successor is always a scheduled table predicate");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    if order.len() != table_indices.len() {
        let stuck = table_indices
            .into_iter()
            .find(|idx| !order.contains(idx))
            .expect("fewer ordered than total implies a stuck predicate exists");
        return Err(TickError::UnstratifiableCycle(predicates[stuck].name().to_string()));
    }
    Ok(order)
}

/// Everything one predicate's recompute needs, gathered up front so the
/// actual work can run without touching any other slot of `predicates`.
enum TaskWork {
    BaseTable {
        sources: BaseTableSources,
        accumulate_tables: Vec<Rc<RefCell<RowTable>>>,
        set_update_tables: Vec<(usize, usize, Rc<RefCell<RowTable>>)>,
    },
    Rules(Vec<CompiledRule>),
    Operator(Rc<dyn Fn(&mut RowTable) -> Result<(), String>>),
}

enum TaskOutcome {
    BaseTableApplied,
    Rules(Vec<CompiledRule>),
    OperatorApplied,
}

fn gather_work(predicates: &mut [PredicateKind], idx: usize) -> TaskWork {
    let kind_tag = match &predicates[idx].as_table().expect("scheduled index always names a table").update_mode {
        UpdateMode::BaseTable(_) => 0u8,
        UpdateMode::Rules(_) => 1,
        UpdateMode::Operator(_) => 2,
    };
    match kind_tag {
        0 => {
            let sources = match &predicates[idx].as_table().expect("table entry").update_mode {
                UpdateMode::BaseTable(sources) => sources.clone(),
                _ => unreachable!("kind_tag already matched BaseTable"),
            };
            let accumulate_tables = sources.accumulates.iter().map(|id| table_rc(predicates, *id)).collect();
            let set_update_tables = sources
                .set_updaters
                .iter()
                .map(|(key_column, data_column, id)| (*key_column, *data_column, table_rc(predicates, *id)))
                .collect();
            TaskWork::BaseTable { sources, accumulate_tables, set_update_tables }
        }
        1 => {
            let rules = match &mut predicates[idx].as_table_mut().expect("table entry").update_mode {
                UpdateMode::Rules(rules) => std::mem::take(rules),
                _ => unreachable!("kind_tag already matched Rules"),
            };
            TaskWork::Rules(rules)
        }
        2 => {
            let updater = match &predicates[idx].as_table().expect("table entry").update_mode {
                UpdateMode::Operator(updater) => updater.clone(),
                _ => unreachable!("kind_tag already matched Operator"),
            };
            TaskWork::Operator(updater)
        }
        _ => unreachable!(),
    }
}

/// Apply an `initially` seed (first tick only), then every `accumulates`
/// source's current rows, then every `Set` updater's current rows, in that
/// order, per `spec.md` §4.6's "Set then Accumulates" note (updaters touch
/// existing rows; accumulation only ever appends, so applying updaters
/// first does not affect which rows end up accumulated).
fn apply_base_table(
    table: &Rc<RefCell<RowTable>>,
    name: &str,
    sources: &BaseTableSources,
    accumulate_tables: &[Rc<RefCell<RowTable>>],
    set_update_tables: &[(usize, usize, Rc<RefCell<RowTable>>)],
) -> Result<(), TickError> {
    if !sources.initially_applied {
        let mut t = table.borrow_mut();
        for row in &sources.initially {
            t.add(row.clone()).map_err(|()| TickError::RuleFailed {
                predicate: name.to_string(),
                message: "initially seed violated a key index".to_string(),
            })?;
        }
    }

    for (key_column, data_column, source) in set_update_tables {
        let rows: Vec<_> = source.borrow().rows().to_vec();
        let accessor = {
            let t = table.borrow();
            ColumnAccessor::new(&t, name, *key_column, *data_column)
        }
        .map_err(|e| TickError::OperatorFailed { predicate: name.to_string(), message: e.to_string() })?;
        let mut t = table.borrow_mut();
        for row in rows {
            let key = row.first().cloned().expect("set-updater source row has a key column");
            let value = row.get(1).cloned().expect("set-updater source row has a value column");
            accessor.set(&mut t, &key, value);
        }
    }

    for source in accumulate_tables {
        let rows: Vec<_> = source.borrow().rows().to_vec();
        let mut t = table.borrow_mut();
        for row in rows {
            t.add(row).map_err(|()| TickError::RuleFailed {
                predicate: name.to_string(),
                message: "accumulated row violated a key index".to_string(),
            })?;
        }
    }
    Ok(())
}

fn apply_work(table: &Rc<RefCell<RowTable>>, name: &str, work: TaskWork) -> Result<TaskOutcome, TickError> {
    match work {
        TaskWork::BaseTable { sources, accumulate_tables, set_update_tables } => {
            apply_base_table(table, name, &sources, &accumulate_tables, &set_update_tables)?;
            Ok(TaskOutcome::BaseTableApplied)
        }
        TaskWork::Rules(mut rules) => {
            table.borrow_mut().clear();
            // Naive evaluation to fixpoint within this one tick: a single
            // left-to-right pass over `rules` is not enough once a rule
            // refers back to its own head predicate (transitive closure and
            // the like) — an earlier rule in the list may need rows a later
            // rule has not derived yet. Re-running the full rule list until
            // a pass adds no rows converges to the same result a bottom-up
            // fixpoint evaluator would reach, for any rule set whose rules
            // are monotonic (which a validly-stratified rule set is, within
            // one stratum). This still clears and recomputes from scratch
            // only once per tick; it does not carry state across ticks.
            //
            // This re-run-to-convergence only terminates for a `unique`
            // table: `RowTable::add`'s no-op-on-duplicate contract is what
            // makes `before == after` ever hold. A non-unique table keeps
            // `spec.md` §4.1's documented bag semantics (re-adding an
            // identical row "succeeds and produces a second row number"),
            // so re-running the same rules against their own prior output
            // would append a fresh duplicate copy of every already-derived
            // row on every iteration and never converge — for those tables
            // fall back to exactly one pass, as `spec.md` §9 describes.
            if table.borrow().is_unique() {
                loop {
                    let before = table.borrow().len();
                    for rule in rules.iter_mut() {
                        rule.run(table)?;
                    }
                    let after = table.borrow().len();
                    if after == before {
                        break;
                    }
                }
            } else {
                for rule in rules.iter_mut() {
                    rule.run(table)?;
                }
            }
            Ok(TaskOutcome::Rules(rules))
        }
        TaskWork::Operator(updater) => {
            updater(&mut table.borrow_mut()).map_err(|message| TickError::OperatorFailed {
                predicate: name.to_string(),
                message,
            })?;
            Ok(TaskOutcome::OperatorApplied)
        }
    }
}

fn restore_work(predicates: &mut [PredicateKind], idx: usize, outcome: TaskOutcome) {
    let entry = predicates[idx].as_table_mut().expect("scheduled index always names a table");
    match outcome {
        TaskOutcome::Rules(rules) => {
            if let UpdateMode::Rules(slot) = &mut entry.update_mode {
                *slot = rules;
            }
        }
        TaskOutcome::BaseTableApplied => {
            if let UpdateMode::BaseTable(sources) = &mut entry.update_mode {
                sources.initially_applied = true;
            }
        }
        TaskOutcome::OperatorApplied => {}
    }
}

fn recompute_one(predicates: &mut [PredicateKind], idx: usize) -> Result<PredicateTickStats, TickError> {
    let name = predicates[idx].name().to_string();
    let table = predicates[idx].as_table().expect("scheduled index always names a table").table.clone();
    let rows_before = table.borrow().len();
    let start = Instant::now();

    let work = gather_work(predicates, idx);
    let outcome = apply_work(&table, &name, work)?;
    restore_work(predicates, idx, outcome);

    let rows_after = table.borrow().len();
    Ok(PredicateTickStats { predicate: name, rows_before, rows_after, elapsed: start.elapsed() })
}

/// Run one tick on the current thread, recomputing every table predicate in
/// topological order.
pub fn run_tick_sequential(predicates: &mut [PredicateKind]) -> Result<TickReport, TickError> {
    let order = topological_order(predicates)?;
    let mut stats = Vec::with_capacity(order.len());
    for idx in order {
        stats.push(recompute_one(predicates, idx)?);
    }
    Ok(TickReport { predicates: stats })
}

struct TaskInput {
    idx: usize,
    name: String,
    table: Rc<RefCell<RowTable>>,
    wait_on: Vec<Rc<Notify>>,
    own_notify: Rc<Notify>,
    work: TaskWork,
}

/// Run one tick on a single-threaded `LocalSet`: every table predicate gets
/// its own `spawn_local` task, gated on a `Notify` per dependency, so
/// independent branches of the dependency graph overlap instead of running
/// strictly one at a time. Row tables and value cells are `Rc`-based and
/// not `Send`, hence `spawn_local` over `tokio::spawn` — callers must drive
/// this from a current-thread (or otherwise single-OS-thread) runtime.
pub async fn run_tick_concurrent(predicates: &mut [PredicateKind], concurrency: usize) -> Result<TickReport, TickError> {
    if concurrency == 0 {
        return Err(TickError::InvalidConcurrency(concurrency));
    }
    let order = topological_order(predicates)?;
    // Beyond rejecting 0, concurrency is naturally bounded by the
    // dependency graph's width; `concurrency` is accepted for forward
    // compatibility with a future semaphore-based cap on how many
    // independent branches run at once, but does not yet impose one.

    let mut notifies: HashMap<usize, Rc<Notify>> = HashMap::new();
    for &idx in &order {
        notifies.insert(idx, Rc::new(Notify::new()));
    }

    let mut inputs = Vec::with_capacity(order.len());
    for &idx in &order {
        let name = predicates[idx].name().to_string();
        let table = predicates[idx].as_table().expect("scheduled index always names a table").table.clone();
        let dependency_ids: Vec<PredicateId> =
            predicates[idx].as_table().expect("scheduled index always names a table").dependencies.iter().copied().collect();
        let wait_on = dependency_ids.iter().map(|dep| notifies[&(dep.0 as usize)].clone()).collect();
        let own_notify = notifies[&idx].clone();
        let work = gather_work(predicates, idx);
        inputs.push(TaskInput { idx, name, table, wait_on, own_notify, work });
    }

    let local = LocalSet::new();
    let results = local
        .run_until(async move {
            let mut handles = Vec::with_capacity(inputs.len());
            for input in inputs {
                handles.push(tokio::task::spawn_local(async move {
                    for notify in &input.wait_on {
                        notify.notified().await;
                    }
                    let rows_before = input.table.borrow().len();
                    let start = Instant::now();
                    let outcome = apply_work(&input.table, &input.name, input.work)?;
                    let rows_after = input.table.borrow().len();
                    input.own_notify.notify_waiters();
                    Ok::<_, TickError>((
                        input.idx,
                        outcome,
                        PredicateTickStats {
                            predicate: input.name,
                            rows_before,
                            rows_after,
                            elapsed: start.elapsed(),
                        },
                    ))
                }));
            }
            let mut out = Vec::with_capacity(handles.len());
            for handle in handles {
                out.push(handle.await.expect("scheduler task panicked"));
            }
            out
        })
        .await;

    let mut stats_by_idx: HashMap<usize, PredicateTickStats> = HashMap::new();
    for result in results {
        let (idx, outcome, stat) = result?;
        restore_work(predicates, idx, outcome);
        stats_by_idx.insert(idx, stat);
    }

    let stats = order.into_iter().map(|idx| stats_by_idx.remove(&idx).expect("every scheduled predicate produced stats")).collect();
    Ok(TickReport { predicates: stats })
}

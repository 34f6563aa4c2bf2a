//! Scenarios covering argmax optimization, per-tick accumulation, and
//! key-column `Set` updaters on base tables.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use ted::table::RowTable;
use ted::{ColumnSpec, DataType, EngineConfig, Goal, IndexMode, Program, Term, Value};

#[test]
fn maximal_keeps_the_first_seen_winner_on_a_tie() {
    let mut p = Program::new(EngineConfig::default());
    let score = p
        .declare_table(
            "score",
            vec![
                ColumnSpec::new("p", DataType::Sym, IndexMode::None),
                ColumnSpec::new("s", DataType::Int, IndexMode::None),
            ],
            false,
        )
        .unwrap();
    // Insertion order matters: b is the first row to reach the high score.
    p.add_row(&score, vec![Value::sym("a"), Value::Int(3)]).unwrap();
    p.add_row(&score, vec![Value::sym("b"), Value::Int(7)]).unwrap();
    p.add_row(&score, vec![Value::sym("c"), Value::Int(7)]).unwrap();

    let best = p.declare_table("best", vec![ColumnSpec::new("p", DataType::Sym, IndexMode::None)], false).unwrap();
    // Best(p) :- Maximal(p, s, Score(p, s)).
    p.rule(
        &best,
        vec![Term::var("p")],
        vec![Goal::Optimize {
            targets: vec![Term::var("p"), Term::var("s")],
            reported: vec![Arc::from("p")],
            utility: Arc::from("s"),
            inner: vec![score.apply(vec![Term::var("p"), Term::var("s")])],
            descending: true,
        }],
    )
    .unwrap();

    p.tick_blocking().unwrap();

    let rows = p.rows(&best);
    assert_eq!(rows.len(), 1);
    assert!(matches!(&rows[0][0], Value::Sym(s) if s.as_ref() == "b"));
}

#[test]
fn minimal_reported_value_is_unique_across_repeated_ticks() {
    // Testable Property: re-deriving the winner on a second, unchanged
    // tick must not produce a second (duplicate) winning row.
    let mut p = Program::new(EngineConfig::default());
    let score = p
        .declare_table(
            "score",
            vec![
                ColumnSpec::new("p", DataType::Sym, IndexMode::None),
                ColumnSpec::new("s", DataType::Int, IndexMode::None),
            ],
            false,
        )
        .unwrap();
    p.add_row(&score, vec![Value::sym("a"), Value::Int(3)]).unwrap();
    p.add_row(&score, vec![Value::sym("b"), Value::Int(1)]).unwrap();

    let worst = p.declare_table("worst", vec![ColumnSpec::new("p", DataType::Sym, IndexMode::None)], true).unwrap();
    p.rule(
        &worst,
        vec![Term::var("p")],
        vec![Goal::Optimize {
            targets: vec![Term::var("p"), Term::var("s")],
            reported: vec![Arc::from("p")],
            utility: Arc::from("s"),
            inner: vec![score.apply(vec![Term::var("p"), Term::var("s")])],
            descending: false,
        }],
    )
    .unwrap();

    p.tick_blocking().unwrap();
    p.tick_blocking().unwrap();
    assert_eq!(p.rows(&worst).len(), 1);
    assert!(matches!(&p.rows(&worst)[0][0], Value::Sym(s) if s.as_ref() == "b"));
}

#[test]
fn accumulates_appends_each_ticks_operator_output_to_a_growing_log() {
    let mut p = Program::new(EngineConfig::default());
    let new_entries = p
        .declare_table("new_entries", vec![ColumnSpec::new("msg", DataType::Text, IndexMode::None)], false)
        .unwrap();

    let tick_count = Rc::new(RefCell::new(0usize));
    let tick_count_for_closure = tick_count.clone();
    p.operator(
        &new_entries,
        vec![],
        Rc::new(move |table: &mut RowTable| {
            let mut count = tick_count_for_closure.borrow_mut();
            *count += 1;
            let msg = if *count == 1 { "x" } else { "y" };
            table.add(vec![Value::text(msg)].into_iter().collect()).map_err(|()| "duplicate row".to_string())?;
            Ok(())
        }),
    )
    .unwrap();

    let log = p.declare_table("log", vec![ColumnSpec::new("msg", DataType::Text, IndexMode::None)], false).unwrap();
    p.accumulates(&log, &new_entries).unwrap();

    p.tick_blocking().unwrap();
    let after_first: HashSet<String> = p
        .rows(&log)
        .iter()
        .map(|row| match &row[0] {
            Value::Text(t) => t.to_string(),
            other => panic!("expected text, got {other:?}"),
        })
        .collect();
    assert_eq!(after_first, HashSet::from(["x".to_string()]));

    p.tick_blocking().unwrap();
    let after_second: HashSet<String> = p
        .rows(&log)
        .iter()
        .map(|row| match &row[0] {
            Value::Text(t) => t.to_string(),
            other => panic!("expected text, got {other:?}"),
        })
        .collect();
    assert_eq!(after_second, HashSet::from(["x".to_string(), "y".to_string()]));
}

#[test]
fn set_updater_overwrites_the_data_column_of_every_keyed_row() {
    let mut p = Program::new(EngineConfig::default());
    let pos = p
        .declare_table(
            "pos",
            vec![
                ColumnSpec::new("id", DataType::Int, IndexMode::Key),
                ColumnSpec::new("x", DataType::Int, IndexMode::None),
            ],
            true,
        )
        .unwrap();
    p.initially(&pos, vec![vec![Value::Int(1), Value::Int(0)], vec![Value::Int(2), Value::Int(0)]]).unwrap();

    let pos_updates = p
        .declare_table(
            "pos_updates",
            vec![
                ColumnSpec::new("id", DataType::Int, IndexMode::None),
                ColumnSpec::new("x", DataType::Int, IndexMode::None),
            ],
            false,
        )
        .unwrap();
    p.add_row(&pos_updates, vec![Value::Int(1), Value::Int(5)]).unwrap();
    p.add_row(&pos_updates, vec![Value::Int(2), Value::Int(9)]).unwrap();
    p.set_updater(&pos, 0, 1, &pos_updates).unwrap();

    p.tick_blocking().unwrap();

    let got: HashSet<(i64, i64)> = p.rows(&pos).iter().map(|row| (row[0].as_int().unwrap(), row[1].as_int().unwrap())).collect();
    assert_eq!(got, HashSet::from([(1, 5), (2, 9)]));
}

//! Rule Executor — runs one compiled rule to exhaustion against its
//! already-materialized dependency tables, emitting a head row per full
//! solution of the body.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::call::Call;
use crate::cell::ValueCell;
use crate::error::TickError;
use crate::pattern::Pattern;
use crate::table::RowTable;

/// One rule, compiled once at declaration time and re-run every tick its
/// owning predicate recomputes. The backtracking loop itself lives on
/// [`crate::call::Chain`] — `spec.md` §4.5's `i/n` index walk and this
/// type's `next_solution` loop are the same algorithm, since a `Chain`
/// already "stays" at the last call and keeps offering solutions after a
/// full match the way the executor's pseudocode does.
pub struct CompiledRule {
    head_predicate_name: Arc<str>,
    head_pattern: Pattern,
    body: crate::call::Chain,
    cells: Vec<ValueCell>,
}

impl CompiledRule {
    pub fn new(
        head_predicate_name: impl Into<Arc<str>>,
        head_pattern: Pattern,
        calls: Vec<Call>,
        cells: Vec<ValueCell>,
    ) -> Self {
        CompiledRule {
            head_predicate_name: head_predicate_name.into(),
            head_pattern,
            body: crate::call::Chain::new(calls),
            cells,
        }
    }

    /// Run this rule to exhaustion, appending one row to `head_table` per
    /// full solution. Returns the number of rows emitted (duplicates into a
    /// unique table are not counted twice, matching `RowTable::add`'s
    /// no-op-on-duplicate contract).
    ///
    /// Takes `head_table` by `Rc<RefCell<_>>` rather than `&mut RowTable` and
    /// only borrows it mutably for the instant of each `add` — a
    /// self-referential rule (the head predicate also appears in its own
    /// body, as in a transitive-closure rule) has body calls that borrow
    /// this same table immutably between solutions, and those borrows must
    /// not overlap a held `&mut`.
    ///
    /// Per `spec.md` §4.5, all of this rule's cells are left in an
    /// unspecified state once this returns; the next call clears them
    /// before doing anything else.
    pub fn run(&mut self, head_table: &Rc<RefCell<RowTable>>) -> Result<usize, TickError> {
        for cell in &self.cells {
            cell.clear();
        }
        self.body.reset();
        let mut emitted = 0;
        while self.body.next_solution() {
            let row = self.head_pattern.assemble();
            head_table.borrow_mut().add(row).map_err(|()| TickError::RuleFailed {
                predicate: self.head_predicate_name.to_string(),
                message: "rule head produced a duplicate key on a key-indexed column".to_string(),
            })?;
            emitted += 1;
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexKind, KeyIndex};
    use crate::pattern::MatchOp;
    use crate::value::{Row, Value};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn row(vals: &[i64]) -> Row {
        vals.iter().map(|v| Value::Int(*v)).collect()
    }

    #[test]
    fn fact_rule_emits_exactly_one_row() {
        let head = Rc::new(RefCell::new(RowTable::new(1, true)));
        let mut rule = CompiledRule::new(
            "p",
            Pattern::new(vec![MatchOp::Constant(Value::Int(42))]),
            Vec::new(),
            Vec::new(),
        );
        let emitted = rule.run(&head).unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(head.borrow().rows(), &[row(&[42])]);
    }

    #[test]
    fn rule_with_body_emits_once_per_solution_and_continues_searching() {
        let mut source = RowTable::new(1, false);
        source.add(row(&[1])).unwrap();
        source.add(row(&[2])).unwrap();
        source.add(row(&[3])).unwrap();
        let source = Rc::new(RefCell::new(source));

        let out_cell = ValueCell::new();
        let calls = vec![Call::FullScan {
            table: source,
            pattern: Pattern::new(vec![MatchOp::Write(out_cell.clone())]),
            cursor: Cell::new(0),
        }];

        let head = Rc::new(RefCell::new(RowTable::new(1, false)));
        let mut rule = CompiledRule::new(
            "doubled",
            Pattern::new(vec![MatchOp::Read(out_cell.clone())]),
            calls,
            vec![out_cell],
        );
        let emitted = rule.run(&head).unwrap();
        assert_eq!(emitted, 3);
        assert_eq!(head.borrow().rows(), &[row(&[1]), row(&[2]), row(&[3])]);
    }

    #[test]
    fn duplicate_key_from_rule_head_surfaces_as_tick_error() {
        // Two rows sharing key 5 but with different data columns: a key
        // index on column 0 of the head table makes the second emit a
        // genuine duplicate-key violation rather than a silent no-op.
        let mut source = RowTable::new(2, false);
        source.add(row(&[5, 1])).unwrap();
        source.add(row(&[5, 2])).unwrap();
        let source = Rc::new(RefCell::new(source));

        let key_cell = ValueCell::new();
        let data_cell = ValueCell::new();
        let calls = vec![Call::FullScan {
            table: source,
            pattern: Pattern::new(vec![MatchOp::Write(key_cell.clone()), MatchOp::Write(data_cell.clone())]),
            cursor: Cell::new(0),
        }];

        let mut head_table = RowTable::new(2, false);
        head_table.attach_index(IndexKind::Key(KeyIndex::new(0)));
        let head = Rc::new(RefCell::new(head_table));

        let mut rule = CompiledRule::new(
            "bad",
            Pattern::new(vec![MatchOp::Read(key_cell.clone()), MatchOp::Read(data_cell.clone())]),
            calls,
            vec![key_cell, data_cell],
        );
        assert!(rule.run(&head).is_err());
    }

    #[test]
    fn self_referential_rule_scans_its_own_head_table_while_emitting() {
        // `step(x) :- step(x)` extended with a seed row, compiled by hand:
        // the body's FullScan holds the same Rc as the head it writes into.
        // If `run` ever held a `&mut RowTable` across the solution loop this
        // would panic on the first `nextSolution` borrow.
        let table = Rc::new(RefCell::new(RowTable::new(1, true)));
        table.borrow_mut().add(row(&[1])).unwrap();

        let out_cell = ValueCell::new();
        let calls = vec![Call::FullScan {
            table: table.clone(),
            pattern: Pattern::new(vec![MatchOp::Write(out_cell.clone())]),
            cursor: Cell::new(0),
        }];
        let mut rule = CompiledRule::new(
            "step",
            Pattern::new(vec![MatchOp::Read(out_cell.clone())]),
            calls,
            vec![out_cell],
        );
        let emitted = rule.run(&table).unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(table.borrow().rows(), &[row(&[1])]);
    }
}

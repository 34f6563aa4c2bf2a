//! Row Table — the heterogeneous-typed row store for one relation.

use crate::hash_slots::HashSlots;
use crate::index::IndexKind;
use crate::value::{Row, Value};

const MIN_CAPACITY: usize = 16;

/// A growable, columnar-in-spirit (but row-major in representation) store
/// for one relation's rows.
///
/// Invariants (see `spec.md` §3): capacity is always a power of two and at
/// least 16; if `unique` then no two rows at distinct row numbers are
/// equal; every index in `indexes` references only row numbers in
/// `[0, len)`.
#[derive(Debug)]
pub struct RowTable {
    arity: usize,
    rows: Vec<Row>,
    capacity: usize,
    unique: bool,
    row_set: Option<HashSlots<Row, ()>>,
    indexes: Vec<IndexKind>,
}

impl RowTable {
    pub fn new(arity: usize, unique: bool) -> Self {
        Self::with_capacity(arity, unique, MIN_CAPACITY)
    }

    /// Like [`RowTable::new`] but takes the caller's preferred starting
    /// capacity (e.g. `EngineConfig::initial_table_capacity`), rounded up to
    /// the next power of two and floored at [`MIN_CAPACITY`].
    pub fn with_capacity(arity: usize, unique: bool, capacity_hint: usize) -> Self {
        let capacity = capacity_hint.max(MIN_CAPACITY).next_power_of_two();
        RowTable {
            arity,
            rows: Vec::with_capacity(capacity),
            capacity,
            unique,
            row_set: unique.then(HashSlots::new),
            indexes: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn attach_index(&mut self, index: IndexKind) {
        self.indexes.push(index);
    }

    pub fn indexes(&self) -> &[IndexKind] {
        &self.indexes
    }

    pub fn key_index(&self, column: usize) -> Option<&crate::index::KeyIndex> {
        self.indexes.iter().find_map(|i| match i {
            IndexKind::Key(k) if k.column() == column => Some(k),
            _ => None,
        })
    }

    pub fn general_index(&self, column: usize) -> Option<&crate::index::GeneralIndex> {
        self.indexes.iter().find_map(|i| match i {
            IndexKind::General(g) if g.column() == column => Some(g),
            _ => None,
        })
    }

    /// By-reference access to row `i` — the rule executor reads and writes
    /// rows in place, no copies on hot paths.
    pub fn position_ref(&self, i: u32) -> &Row {
        &self.rows[i as usize]
    }

    /// Requires `unique`. Probes the row-set for membership.
    pub fn contains_row(&self, row: &Row) -> bool {
        match &self.row_set {
            Some(set) => set.find(row).is_some(),
            None => self.rows.iter().any(|r| r == row),
        }
    }

    fn grow_if_needed(&mut self) {
        if self.rows.len() < self.capacity {
            return;
        }
        self.capacity *= 2;
        self.rows.reserve(self.capacity - self.rows.len());
    }

    /// Append `row`. If `unique` and an equal row already exists, this is a
    /// no-op (row count and row numbers are unaffected). Otherwise every
    /// index is checked against `row` first; only once none of them would
    /// reject does the row get a number, get pushed through every index,
    /// and get appended to `rows`. This all-or-nothing ordering matters
    /// when a table carries more than one `Key` index: committing an
    /// earlier index's `on_append` before a later index rejects the row
    /// would leave that earlier index pointing at a row number that is
    /// never pushed, corrupting it for every row added afterward.
    ///
    /// Returns the new row's number, or the existing row's number if the
    /// insert was a unique-duplicate no-op, or an error if a key index
    /// would be violated.
    pub fn add(&mut self, row: Row) -> Result<u32, ()> {
        debug_assert_eq!(row.len(), self.arity);

        if self.unique {
            if let Some(existing) = self.row_set.as_ref().and_then(|s| s.find(&row)).copied() {
                return Ok(existing);
            }
        }

        for index in &self.indexes {
            if index.would_reject(&row[index.column()]) {
                return Err(());
            }
        }

        self.grow_if_needed();
        let row_number = self.rows.len() as u32;

        for index in &mut self.indexes {
            let key = row[index.column()].clone();
            index.on_append(row_number, &key).expect("would_reject already confirmed every index accepts this row");
        }

        if let Some(set) = &mut self.row_set {
            set.insert(row.clone(), row_number);
        }
        self.rows.push(row);
        Ok(row_number)
    }

    /// Reset to empty: `len = 0`, row-set cleared, every index cleared.
    /// Does not shrink `capacity` — the next growth phase starts from the
    /// high-water mark rather than re-doubling from scratch.
    pub fn clear(&mut self) {
        self.rows.clear();
        if let Some(set) = &mut self.row_set {
            set.clear();
        }
        for index in &mut self.indexes {
            index.clear();
        }
    }

    /// Overwrite one column of one row in place without touching any index.
    /// Callers (the Column Accessor) are responsible for repairing any
    /// index built over the overwritten column.
    pub fn set_column_unchecked(&mut self, row_number: u32, column: usize, value: Value) {
        self.rows[row_number as usize][column] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows.iter().enumerate().map(|(i, r)| (i as u32, r))
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

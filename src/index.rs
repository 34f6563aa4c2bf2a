//! Index — per-column hash structures over a `RowTable`'s rows.
//!
//! Two variants, matching `spec.md` §4.2 exactly:
//! - [`KeyIndex`]: the projected column uniquely identifies the row.
//! - [`GeneralIndex`]: a multimap via a per-bucket row-number chain, newest
//!   row first (callers must not rely on chain order).

use crate::hash_slots::{HashSlots, ROW_NONE};
use crate::value::Value;

/// Tagged enum over the two index strategies, attached to a `RowTable`.
#[derive(Debug, Clone)]
pub enum IndexKind {
    Key(KeyIndex),
    General(GeneralIndex),
}

impl IndexKind {
    pub fn column(&self) -> usize {
        match self {
            IndexKind::Key(i) => i.column,
            IndexKind::General(i) => i.column,
        }
    }

    pub fn clear(&mut self) {
        match self {
            IndexKind::Key(i) => i.clear(),
            IndexKind::General(i) => i.clear(),
        }
    }

    /// Incorporate a newly-appended row (`row` is its row number; `key` is
    /// the value projected from this index's column). Returns an error
    /// message on a key-index duplicate-key violation.
    pub fn on_append(&mut self, row: u32, key: &Value) -> Result<(), ()> {
        match self {
            IndexKind::Key(i) => i.on_append(row, key.clone()),
            IndexKind::General(i) => {
                i.on_append(row, key.clone());
                Ok(())
            }
        }
    }

    /// Non-mutating precheck: would `on_append(_, key)` reject this key?
    /// Only a `Key` index can ever reject; a `General` index never does.
    pub fn would_reject(&self, key: &Value) -> bool {
        match self {
            IndexKind::Key(i) => i.would_reject(key),
            IndexKind::General(_) => false,
        }
    }
}

/// Unique-valued index: `rowWithKey(k) -> rowNumber | NoRow`.
#[derive(Debug, Clone)]
pub struct KeyIndex {
    column: usize,
    slots: HashSlots<Value, u32>,
}

impl KeyIndex {
    pub fn new(column: usize) -> Self {
        KeyIndex {
            column,
            slots: HashSlots::new(),
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Probe for the row carrying this key.
    pub fn row_with_key(&self, key: &Value) -> Option<u32> {
        self.slots.find(key).copied().filter(|&r| r != ROW_NONE)
    }

    /// Record a newly-appended row. Fails if the key already maps to a
    /// different row — the uniqueness invariant the user declared for this
    /// column would break.
    pub fn on_append(&mut self, row: u32, key: Value) -> Result<(), ()> {
        match self.slots.insert(key, row) {
            None => Ok(()),
            Some(existing) if existing == row => Ok(()),
            Some(_existing) => Err(()),
        }
    }

    /// Non-mutating precheck for `on_append`: true if `key` already maps to
    /// some row (necessarily a different one, since the row number a
    /// pending `add` would use has never been inserted yet).
    pub fn would_reject(&self, key: &Value) -> bool {
        self.slots.find(key).is_some()
    }
}

/// Multi-valued index: `rowsWithKey(k) -> iterator<rowNumber>` via a
/// per-bucket chain head plus a parallel `next_row` array, LIFO order.
#[derive(Debug, Clone)]
pub struct GeneralIndex {
    column: usize,
    buckets: HashSlots<Value, u32>,
    next_row: Vec<u32>,
}

impl GeneralIndex {
    pub fn new(column: usize) -> Self {
        GeneralIndex {
            column,
            buckets: HashSlots::new(),
            next_row: Vec::new(),
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.next_row.clear();
    }

    /// Record a newly-appended row, pushing it to the front of its key's
    /// chain.
    pub fn on_append(&mut self, row: u32, key: Value) {
        if self.next_row.len() <= row as usize {
            self.next_row.resize(row as usize + 1, ROW_NONE);
        }
        match self.buckets.find(&key).copied() {
            Some(head) => {
                self.next_row[row as usize] = head;
                self.buckets.insert(key, row);
            }
            None => {
                self.next_row[row as usize] = ROW_NONE;
                self.buckets.insert(key, row);
            }
        }
    }

    /// Iterate every row whose projected column equals `key`, newest first.
    pub fn rows_with_key<'a>(&'a self, key: &Value) -> GeneralIndexWalk<'a> {
        let current = self.buckets.find(key).copied().unwrap_or(ROW_NONE);
        GeneralIndexWalk {
            next_row: &self.next_row,
            current,
        }
    }
}

/// Iterator walking a `GeneralIndex` chain.
pub struct GeneralIndexWalk<'a> {
    next_row: &'a [u32],
    current: u32,
}

impl<'a> Iterator for GeneralIndexWalk<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.current == ROW_NONE {
            return None;
        }
        let row = self.current;
        self.current = self.next_row[row as usize];
        Some(row)
    }
}

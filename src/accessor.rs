//! Column Accessor — key-indexed get/set helpers for base-table imperative
//! updates, and the mechanism backing the `Set(key, column)` update-table
//! feature described in `spec.md` §4.7.

use crate::error::TedError;
use crate::index::IndexKind;
use crate::table::RowTable;
use crate::value::Value;

/// A typed accessor over one `(key_column, data_column)` pair of a
/// base-table predicate. Construction fails fatally if `key_column` has no
/// key index, per `spec.md` §7's "Missing key index".
pub struct ColumnAccessor {
    predicate_name: String,
    key_column: usize,
    data_column: usize,
}

impl ColumnAccessor {
    pub fn new(
        table: &RowTable,
        predicate_name: impl Into<String>,
        key_column: usize,
        data_column: usize,
    ) -> Result<Self, TedError> {
        let predicate_name = predicate_name.into();
        if table.key_index(key_column).is_none() {
            return Err(TedError::MissingKeyIndex {
                predicate: predicate_name,
                column: key_column,
            });
        }
        Ok(ColumnAccessor {
            predicate_name,
            key_column,
            data_column,
        })
    }

    /// Look up the data column's value for `key`. A miss returns `None`
    /// rather than erroring — per `spec.md` §7 the accessor contract
    /// chooses the sentinel-return option; a caller wanting a hard failure
    /// maps the `None` itself.
    pub fn get(&self, table: &RowTable, key: &Value) -> Option<Value> {
        let row_number = table.key_index(self.key_column)?.row_with_key(key)?;
        table.position_ref(row_number).get(self.data_column).cloned()
    }

    /// Find the row for `key` and mutate its data column in place, then
    /// repair any general index attached to the data column by removing
    /// the row from its old key-bucket and inserting it under the new one.
    pub fn set(&self, table: &mut RowTable, key: &Value, value: Value) -> Option<()> {
        let row_number = table.key_index(self.key_column)?.row_with_key(key)?;
        self.overwrite_column(table, row_number, value);
        Some(())
    }

    fn overwrite_column(&self, table: &mut RowTable, row_number: u32, value: Value) {
        // Rebuild affected general indexes on the data column by clearing
        // and replaying, since `RowTable` stores rows in a flat `Vec` and
        // does not expose raw mutable row access across its index list
        // simultaneously. This keeps the accessor simple and correct; a
        // future revision could special-case the common single-general-index
        // case without a full replay if profiling shows it matters.
        let has_general_index_on_data_column = table
            .indexes()
            .iter()
            .any(|i| matches!(i, IndexKind::General(g) if g.column() == self.data_column));

        if !has_general_index_on_data_column {
            table.set_column_unchecked(row_number, self.data_column, value);
            return;
        }

        let arity = table.arity();
        let unique = table.is_unique();
        table.set_column_unchecked(row_number, self.data_column, value);

        let mut fresh = RowTable::new(arity, unique);
        for index in table.indexes() {
            fresh.attach_index(clone_empty_index(index));
        }
        let rows: Vec<_> = table.rows().to_vec();
        for row in rows {
            let _ = fresh.add(row);
        }
        *table = fresh;
    }
}

fn clone_empty_index(index: &IndexKind) -> IndexKind {
    match index {
        IndexKind::Key(k) => IndexKind::Key(crate::index::KeyIndex::new(k.column())),
        IndexKind::General(g) => IndexKind::General(crate::index::GeneralIndex::new(g.column())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyIndex;
    use crate::value::Row;

    fn row(vals: &[i64]) -> Row {
        vals.iter().map(|v| Value::Int(*v)).collect()
    }

    #[test]
    fn missing_key_index_is_fatal_at_construction() {
        let t = RowTable::new(2, false);
        let err = ColumnAccessor::new(&t, "pos", 0, 1).unwrap_err();
        assert!(matches!(err, TedError::MissingKeyIndex { .. }));
    }

    #[test]
    fn get_and_set_round_trip_through_key_index() {
        let mut t = RowTable::new(2, false);
        t.attach_index(IndexKind::Key(KeyIndex::new(0)));
        t.add(row(&[1, 0])).unwrap();
        t.add(row(&[2, 0])).unwrap();

        let accessor = ColumnAccessor::new(&t, "pos", 0, 1).unwrap();
        accessor.set(&mut t, &Value::Int(1), Value::Int(5)).unwrap();
        accessor.set(&mut t, &Value::Int(2), Value::Int(9)).unwrap();

        assert_eq!(accessor.get(&t, &Value::Int(1)), Some(Value::Int(5)));
        assert_eq!(accessor.get(&t, &Value::Int(2)), Some(Value::Int(9)));
    }

    #[test]
    fn get_on_missing_key_returns_none() {
        let mut t = RowTable::new(2, false);
        t.attach_index(IndexKind::Key(KeyIndex::new(0)));
        t.add(row(&[1, 0])).unwrap();
        let accessor = ColumnAccessor::new(&t, "pos", 0, 1).unwrap();
        assert_eq!(accessor.get(&t, &Value::Int(99)), None);
    }
}

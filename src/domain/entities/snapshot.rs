use std::collections::{BTreeMap, BTreeSet};

use crate::domain::entities::value::Value;
use crate::domain::error::ReconcileError;

/// Table contents at one point in time: named columns plus rows of values in
/// column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Snapshot {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, ReconcileError> {
        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(ReconcileError::InvalidInput(format!(
                    "duplicate column '{column}'"
                )));
            }
        }

        let snapshot = Self {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        rows.into_iter().try_fold(snapshot, |mut snapshot, row| {
            snapshot.push_row(row)?;
            Ok(snapshot)
        })
    }

    pub fn empty(columns: Vec<String>) -> Result<Self, ReconcileError> {
        Self::new(columns, Vec::new())
    }

    /// Builds a snapshot from records given as column/value pairs.
    ///
    /// The column order of the first record wins; later records may list
    /// their pairs in any order but must name the same columns.
    pub fn from_records<I, R, K, V>(records: I) -> Result<Self, ReconcileError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        for record in records {
            let pairs: Vec<(String, Value)> = record
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect();
            let columns = columns
                .get_or_insert_with(|| pairs.iter().map(|(name, _)| name.clone()).collect());
            let mut by_name: BTreeMap<String, Value> = pairs.into_iter().collect();
            if by_name.len() != columns.len() {
                return Err(ReconcileError::InvalidInput(format!(
                    "record {} has {} columns, expected {}",
                    rows.len(),
                    by_name.len(),
                    columns.len()
                )));
            }
            let row = columns
                .iter()
                .map(|name| {
                    by_name
                        .remove(name)
                        .ok_or_else(|| ReconcileError::UnknownColumn(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
        Self::new(columns.unwrap_or_default(), rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let col_idx = self.column_index(column)?;
        self.rows.get(row).and_then(|values| values.get(col_idx))
    }

    /// One row as a column-name keyed record.
    pub fn record(&self, row: usize) -> Option<BTreeMap<String, Value>> {
        let values = self.rows.get(row)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
        )
    }

    /// Replaces one cell and returns the value it held.
    pub fn set(&mut self, row: usize, column: &str, value: Value) -> Result<Value, ReconcileError> {
        let col_idx = self
            .column_index(column)
            .ok_or_else(|| ReconcileError::UnknownColumn(column.to_string()))?;
        let len = self.rows.len();
        let cell = self
            .rows
            .get_mut(row)
            .and_then(|values| values.get_mut(col_idx))
            .ok_or(ReconcileError::RowOutOfRange { row, len })?;
        Ok(std::mem::replace(cell, value))
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), ReconcileError> {
        if row.len() != self.columns.len() {
            return Err(ReconcileError::InvalidInput(format!(
                "row {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn remove_row(&mut self, row: usize) -> Result<Vec<Value>, ReconcileError> {
        if row >= self.rows.len() {
            return Err(ReconcileError::RowOutOfRange {
                row,
                len: self.rows.len(),
            });
        }
        Ok(self.rows.remove(row))
    }

    /// Keeps the first `len` rows. No effect when there are fewer.
    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// A new snapshot with the same columns holding only the rows `keep`
    /// accepts.
    pub fn filtered<F>(&self, mut keep: F) -> Snapshot
    where
        F: FnMut(&[Value]) -> bool,
    {
        Snapshot {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row))
                .cloned()
                .collect(),
        }
    }

    /// The same rows with columns rearranged into `order`, which must name
    /// exactly this snapshot's columns.
    pub fn reordered(&self, order: &[String]) -> Result<Snapshot, ReconcileError> {
        if !self.has_same_columns(order) {
            return Err(column_mismatch(&self.columns, order));
        }
        let indices: Vec<usize> = order
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        Ok(Snapshot {
            columns: order.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&idx| row[idx].clone()).collect())
                .collect(),
        })
    }

    /// True when `other` names the same set of columns, in any order.
    pub fn has_same_columns(&self, other: &[String]) -> bool {
        let mine: BTreeSet<&str> = self.columns.iter().map(String::as_str).collect();
        let theirs: BTreeSet<&str> = other.iter().map(String::as_str).collect();
        mine == theirs && other.len() == self.columns.len()
    }
}

pub(crate) fn column_mismatch(expected: &[String], actual: &[String]) -> ReconcileError {
    let actual_set: BTreeSet<&String> = actual.iter().collect();
    let expected_set: BTreeSet<&String> = expected.iter().collect();
    ReconcileError::ColumnMismatch {
        missing: expected
            .iter()
            .filter(|name| !actual_set.contains(name))
            .cloned()
            .collect(),
        unexpected: actual
            .iter()
            .filter(|name| !expected_set.contains(name))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot::from_records([
            vec![("id", Value::Int(1)), ("val", Value::from("a"))],
            vec![("val", Value::from("b")), ("id", Value::Int(2))],
        ])
        .expect("valid records")
    }

    #[test]
    fn from_records_keeps_first_record_column_order() {
        let snapshot = sample();
        assert_eq!(snapshot.columns(), ["id".to_string(), "val".to_string()]);
        assert_eq!(snapshot.rows()[1], vec![Value::Int(2), Value::from("b")]);
    }

    #[test]
    fn from_records_rejects_inconsistent_columns() {
        let result = Snapshot::from_records([
            vec![("id", Value::Int(1)), ("val", Value::from("a"))],
            vec![("id", Value::Int(2)), ("other", Value::from("b"))],
        ]);
        assert_eq!(result, Err(ReconcileError::UnknownColumn("val".to_string())));
    }

    #[test]
    fn new_rejects_duplicate_columns_and_ragged_rows() {
        let duplicate = Snapshot::new(vec!["a".into(), "a".into()], Vec::new());
        assert!(matches!(duplicate, Err(ReconcileError::InvalidInput(_))));

        let ragged = Snapshot::new(vec!["a".into(), "b".into()], vec![vec![Value::Int(1)]]);
        assert!(matches!(ragged, Err(ReconcileError::InvalidInput(_))));
    }

    #[test]
    fn set_returns_previous_value() {
        let mut snapshot = sample();
        let previous = snapshot
            .set(1, "val", Value::from("c"))
            .expect("cell exists");
        assert_eq!(previous, Value::from("b"));
        assert_eq!(snapshot.get(1, "val"), Some(&Value::from("c")));

        assert_eq!(
            snapshot.set(5, "val", Value::Null),
            Err(ReconcileError::RowOutOfRange { row: 5, len: 2 })
        );
        assert_eq!(
            snapshot.set(0, "nope", Value::Null),
            Err(ReconcileError::UnknownColumn("nope".to_string()))
        );
    }

    #[test]
    fn reordered_moves_values_with_their_columns() {
        let snapshot = sample();
        let swapped = snapshot
            .reordered(&["val".to_string(), "id".to_string()])
            .expect("same columns");
        assert_eq!(swapped.rows()[0], vec![Value::from("a"), Value::Int(1)]);
        assert_eq!(swapped.record(0), snapshot.record(0));

        let err = snapshot
            .reordered(&["val".to_string()])
            .expect_err("column missing");
        assert_eq!(
            err,
            ReconcileError::ColumnMismatch {
                missing: vec!["id".to_string()],
                unexpected: Vec::new(),
            }
        );
    }
}

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::entities::value::Value;

pub type ColumnValues = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Modified,
    Inserted,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Modified => "modified",
            ChangeKind::Inserted => "inserted",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One changed row.
///
/// `key` holds the identifying columns as they were in the original snapshot
/// (for inserts, as they are in the modified one). `values` holds the new
/// values of the non-key columns being written and `previous` the values those
/// same columns held before, which the store checks before it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub row_index: usize,
    pub key: ColumnValues,
    pub values: ColumnValues,
    pub previous: ColumnValues,
    pub changed: Vec<String>,
}

impl ChangeRecord {
    /// The row as it should look after the write: key columns plus new values.
    pub fn row(&self) -> ColumnValues {
        let mut row = self.values.clone();
        row.extend(self.key.iter().map(|(k, v)| (k.clone(), v.clone())));
        row
    }

    /// `col=value` pairs of the key, for messages.
    pub fn key_label(&self) -> String {
        if self.key.is_empty() {
            return format!("#{}", self.row_index);
        }
        self.key
            .iter()
            .map(|(column, value)| format!("{column}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Ordered output of one reconciliation pass. Read-only once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    records: Vec<ChangeRecord>,
}

impl ChangeSet {
    pub(crate) fn from_records(records: Vec<ChangeRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.records.iter()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.kind == kind)
            .count()
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeRecord;
    type IntoIter = std::vec::IntoIter<ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

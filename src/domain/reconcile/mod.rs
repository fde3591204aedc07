//! Change detection between an original snapshot and an edited one.
//!
//! Pure computation: two borrowed snapshots in, a fresh [`ChangeSet`] out.
//! Neither input is touched and no state survives a call.

pub mod align;
pub mod compare;

use std::fmt;

use log::{debug, warn};
use serde::Deserialize;

use crate::domain::entities::change::{ChangeKind, ChangeRecord, ChangeSet, ColumnValues};
use crate::domain::entities::snapshot::{column_mismatch, Snapshot};
use crate::domain::entities::value::Value;
use crate::domain::error::ReconcileError;

use self::align::align_by_key;
pub use self::compare::{ComparePolicy, Comparator, TextualEquality, TypedEquality};

/// What a `Modified` record carries in `values`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Every non-key column of the modified row.
    #[default]
    FullRow,
    /// Only the columns whose value changed.
    ChangedOnly,
}

/// How rows of the two snapshots are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Row *i* pairs with row *i*. Only reports modifications.
    #[default]
    Positional,
    /// Outer join on the key columns. Reports modifications, inserts and
    /// deletes.
    Keyed,
}

/// Positional alignment only: what to do when the row counts differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowCountPolicy {
    /// Ignore the rows past the end of the shorter snapshot.
    #[default]
    Truncate,
    /// Refuse to compare.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    pub compare: ComparePolicy,
    pub output: OutputMode,
    pub alignment: Alignment,
    pub row_count: RowCountPolicy,
}

/// Compares with the default options: textual equality, full rows,
/// positional pairing, truncation on row-count mismatch.
pub fn reconcile<S: AsRef<str>>(
    original: &Snapshot,
    modified: &Snapshot,
    key_columns: &[S],
) -> Result<ChangeSet, ReconcileError> {
    Reconciler::new().reconcile(original, modified, key_columns)
}

pub struct Reconciler {
    options: ReconcileOptions,
    comparator: Box<dyn Comparator>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

struct ColumnPlan<'a> {
    name: &'a str,
    left: usize,
    right: usize,
    is_key: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::with_options(ReconcileOptions::default())
    }

    pub fn with_options(options: ReconcileOptions) -> Self {
        Self {
            comparator: options.compare.comparator(),
            options,
        }
    }

    /// Swaps in a caller-supplied equality policy, overriding `compare`.
    pub fn with_comparator<C: Comparator + 'static>(mut self, comparator: C) -> Self {
        self.comparator = Box::new(comparator);
        self
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    pub fn reconcile<S: AsRef<str>>(
        &self,
        original: &Snapshot,
        modified: &Snapshot,
        key_columns: &[S],
    ) -> Result<ChangeSet, ReconcileError> {
        let keys = dedup_keys(key_columns);
        let plan = plan_columns(original, modified, &keys)?;

        let records = match self.options.alignment {
            Alignment::Positional => self.positional(original, modified, &plan)?,
            Alignment::Keyed => {
                if keys.is_empty() {
                    return Err(ReconcileError::InvalidInput(
                        "keyed alignment requires at least one key column".to_string(),
                    ));
                }
                self.keyed(original, modified, &plan)?
            }
        };

        debug!(
            "reconciled {} original row(s) against {} modified row(s): {} change(s)",
            original.len(),
            modified.len(),
            records.len()
        );
        Ok(ChangeSet::from_records(records))
    }

    fn positional(
        &self,
        original: &Snapshot,
        modified: &Snapshot,
        plan: &[ColumnPlan<'_>],
    ) -> Result<Vec<ChangeRecord>, ReconcileError> {
        if self.options.row_count == RowCountPolicy::Strict && original.len() != modified.len() {
            return Err(ReconcileError::RowCountMismatch {
                original: original.len(),
                modified: modified.len(),
            });
        }
        if original.is_empty() || modified.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for (row_index, (before, after)) in original.rows().iter().zip(modified.rows()).enumerate()
        {
            for column in plan.iter().filter(|column| column.is_key) {
                if !self
                    .comparator
                    .equal(&before[column.left], &after[column.right])
                {
                    warn!(
                        "row {row_index}: key column '{}' differs between snapshots and is not reported",
                        column.name
                    );
                }
            }
            if let Some(record) = self.modified_record(row_index, plan, before, after) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn keyed(
        &self,
        original: &Snapshot,
        modified: &Snapshot,
        plan: &[ColumnPlan<'_>],
    ) -> Result<Vec<ChangeRecord>, ReconcileError> {
        let left_keys: Vec<usize> = plan.iter().filter(|c| c.is_key).map(|c| c.left).collect();
        let right_keys: Vec<usize> = plan.iter().filter(|c| c.is_key).map(|c| c.right).collect();
        let alignment = align_by_key(original, &left_keys, modified, &right_keys)?;

        let mut records: Vec<ChangeRecord> = alignment
            .matched
            .iter()
            .filter_map(|&(left, right)| {
                self.modified_record(left, plan, &original.rows()[left], &modified.rows()[right])
            })
            .collect();

        records.extend(alignment.original_only.iter().map(|&row_index| {
            let before = &original.rows()[row_index];
            ChangeRecord {
                kind: ChangeKind::Deleted,
                row_index,
                key: collect(plan.iter().filter(|c| c.is_key), before, |c| c.left),
                values: ColumnValues::new(),
                previous: collect(plan.iter().filter(|c| !c.is_key), before, |c| c.left),
                changed: Vec::new(),
            }
        }));
        records.sort_by_key(|record| record.row_index);

        records.extend(alignment.modified_only.iter().map(|&row_index| {
            let after = &modified.rows()[row_index];
            let values: Vec<&ColumnPlan<'_>> = plan.iter().filter(|c| !c.is_key).collect();
            ChangeRecord {
                kind: ChangeKind::Inserted,
                row_index,
                key: collect(plan.iter().filter(|c| c.is_key), after, |c| c.right),
                values: collect(values.iter().copied(), after, |c| c.right),
                previous: ColumnValues::new(),
                changed: column_names(&values),
            }
        }));
        Ok(records)
    }

    fn modified_record(
        &self,
        row_index: usize,
        plan: &[ColumnPlan<'_>],
        before: &[Value],
        after: &[Value],
    ) -> Option<ChangeRecord> {
        let changed: Vec<&ColumnPlan<'_>> = plan
            .iter()
            .filter(|c| !c.is_key && !self.comparator.equal(&before[c.left], &after[c.right]))
            .collect();
        if changed.is_empty() {
            return None;
        }

        let reported: Vec<&ColumnPlan<'_>> = match self.options.output {
            OutputMode::FullRow => plan.iter().filter(|c| !c.is_key).collect(),
            OutputMode::ChangedOnly => changed.clone(),
        };

        Some(ChangeRecord {
            kind: ChangeKind::Modified,
            row_index,
            key: collect(plan.iter().filter(|c| c.is_key), before, |c| c.left),
            values: collect(reported.iter().copied(), after, |c| c.right),
            previous: collect(reported.iter().copied(), before, |c| c.left),
            changed: column_names(&changed),
        })
    }
}

fn collect<'p, 'a: 'p, I, F>(columns: I, row: &[Value], index: F) -> ColumnValues
where
    I: Iterator<Item = &'p ColumnPlan<'a>>,
    F: Fn(&ColumnPlan<'a>) -> usize,
{
    columns
        .map(|column| (column.name.to_string(), row[index(column)].clone()))
        .collect()
}

/// Sorted by name so the result does not depend on column order.
fn column_names(columns: &[&ColumnPlan<'_>]) -> Vec<String> {
    let mut names: Vec<String> = columns.iter().map(|c| c.name.to_string()).collect();
    names.sort();
    names
}

fn dedup_keys<S: AsRef<str>>(key_columns: &[S]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(key_columns.len());
    for key in key_columns {
        let key = key.as_ref();
        if !keys.iter().any(|existing| existing == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

fn plan_columns<'a>(
    original: &'a Snapshot,
    modified: &Snapshot,
    keys: &[String],
) -> Result<Vec<ColumnPlan<'a>>, ReconcileError> {
    if !original.has_same_columns(modified.columns()) {
        return Err(column_mismatch(original.columns(), modified.columns()));
    }
    if let Some(unknown) = keys.iter().find(|key| !original.has_column(key)) {
        return Err(ReconcileError::UnknownColumn(unknown.clone()));
    }

    original
        .columns()
        .iter()
        .enumerate()
        .map(|(left, name)| {
            let right = modified
                .column_index(name)
                .ok_or_else(|| ReconcileError::UnknownColumn(name.clone()))?;
            Ok(ColumnPlan {
                name,
                left,
                right,
                is_key: keys.contains(name),
            })
        })
        .collect()
}

use std::collections::HashMap;

use crate::domain::entities::snapshot::Snapshot;
use crate::domain::entities::value::Value;
use crate::domain::error::{ReconcileError, Side};

/// Outer join of two snapshots on their key columns, in row indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct KeyedAlignment {
    /// (original row, modified row), in original row order.
    pub matched: Vec<(usize, usize)>,
    pub original_only: Vec<usize>,
    pub modified_only: Vec<usize>,
}

/// Key values compare on canonical text so `Int(7)` and `Text("7")` join.
pub(crate) fn key_of(row: &[Value], key_indices: &[usize]) -> Vec<String> {
    key_indices.iter().map(|&idx| row[idx].to_string()).collect()
}

fn index_rows(
    snapshot: &Snapshot,
    key_indices: &[usize],
    side: Side,
) -> Result<HashMap<Vec<String>, usize>, ReconcileError> {
    let mut index = HashMap::with_capacity(snapshot.len());
    for (row_idx, row) in snapshot.rows().iter().enumerate() {
        let key = key_of(row, key_indices);
        if index.contains_key(&key) {
            return Err(ReconcileError::DuplicateKey {
                side,
                key: key.join(", "),
            });
        }
        index.insert(key, row_idx);
    }
    Ok(index)
}

pub(crate) fn align_by_key(
    original: &Snapshot,
    original_keys: &[usize],
    modified: &Snapshot,
    modified_keys: &[usize],
) -> Result<KeyedAlignment, ReconcileError> {
    let left = index_rows(original, original_keys, Side::Original)?;
    let right = index_rows(modified, modified_keys, Side::Modified)?;

    let mut alignment = KeyedAlignment::default();
    for (row_idx, row) in original.rows().iter().enumerate() {
        match right.get(&key_of(row, original_keys)) {
            Some(&other) => alignment.matched.push((row_idx, other)),
            None => alignment.original_only.push(row_idx),
        }
    }
    for (row_idx, row) in modified.rows().iter().enumerate() {
        if !left.contains_key(&key_of(row, modified_keys)) {
            alignment.modified_only.push(row_idx);
        }
    }
    Ok(alignment)
}

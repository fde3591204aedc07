use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::domain::entities::change::{ChangeKind, ChangeRecord, ChangeSet, ColumnValues};
use crate::domain::entities::snapshot::Snapshot;
use crate::domain::entities::value::{Value, ValueKind};
use crate::domain::reconcile::align::key_of;
use crate::infra::sqlite::schema::{init_db, open_connection};
use crate::usecase::ports::repo::TableMeta;

/// A write refused before anything was committed. Carried inside
/// `anyhow::Error` so the repo can turn it back into a typed port error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRejected {
    Conflict { key: String, reason: String },
    TableExists(String),
    MissingKeyColumns,
    MissingKey(String),
    UnknownColumn(String),
    DuplicateKey(String),
    SchemaMismatch(String),
}

impl fmt::Display for WriteRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteRejected::Conflict { key, reason } => write!(f, "row [{key}]: {reason}"),
            WriteRejected::TableExists(name) => write!(f, "table '{name}' already exists"),
            WriteRejected::MissingKeyColumns => write!(f, "table has no key columns"),
            WriteRejected::MissingKey(column) => {
                write!(f, "change record lacks key column '{column}'")
            }
            WriteRejected::UnknownColumn(column) => write!(f, "unknown column '{column}'"),
            WriteRejected::DuplicateKey(key) => write!(f, "duplicate key [{key}]"),
            WriteRejected::SchemaMismatch(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for WriteRejected {}

pub fn encode_value(value: &Value) -> (&'static str, Option<String>) {
    let text = if value.is_null() {
        None
    } else {
        Some(value.to_string())
    };
    (value.kind().as_str(), text)
}

pub fn decode_value(kind: &str, raw: Option<&str>) -> Result<Value> {
    ValueKind::parse(kind)
        .and_then(|kind| Value::decode(kind, raw))
        .ok_or_else(|| anyhow!("corrupt cell: kind '{kind}' with value {raw:?}"))
}

pub fn insert_columns(
    tx: &rusqlite::Transaction<'_>,
    dataset_id: i64,
    columns: &[String],
    key_columns: &[String],
) -> Result<()> {
    let mut insert_column = tx
        .prepare("INSERT INTO column_name(dataset_id, col_idx, name, is_key) VALUES (?1, ?2, ?3, ?4)")
        .context("failed to prepare column insert")?;

    for (col_idx, name) in columns.iter().enumerate() {
        let is_key = key_columns.contains(name);
        insert_column
            .execute(params![dataset_id, col_idx as i64, name, is_key])
            .context("failed to insert column")?;
    }

    Ok(())
}

fn insert_rows(
    tx: &rusqlite::Transaction<'_>,
    dataset_id: i64,
    first_row_idx: i64,
    rows: &[Vec<Value>],
) -> Result<()> {
    let mut insert_cell = tx
        .prepare(
            "INSERT INTO cell(dataset_id, row_idx, col_idx, kind, value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .context("failed to prepare cell insert")?;
    for (offset, row) in rows.iter().enumerate() {
        let row_idx = first_row_idx + offset as i64;
        for (col_idx, value) in row.iter().enumerate() {
            let (kind, text) = encode_value(value);
            insert_cell
                .execute(params![dataset_id, row_idx, col_idx as i64, kind, text])
                .context("failed to insert cell")?;
        }
    }
    Ok(())
}

/// Column names in order, and the subset flagged as keys.
fn load_columns(conn: &Connection, dataset_id: i64) -> Result<(Vec<String>, Vec<String>)> {
    let mut stmt = conn
        .prepare(
            "SELECT name, is_key
             FROM column_name
             WHERE dataset_id = ?1
             ORDER BY col_idx ASC",
        )
        .context("failed to prepare columns query")?;
    let pairs = stmt
        .query_map([dataset_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
        })
        .context("failed to query columns")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect columns")?;

    let key_columns = pairs
        .iter()
        .filter(|(_, is_key)| *is_key)
        .map(|(name, _)| name.clone())
        .collect();
    let columns = pairs.into_iter().map(|(name, _)| name).collect();
    Ok((columns, key_columns))
}

/// Every stored row as `(row_idx, values)`, in row order. Cells that were
/// never written read as null.
fn load_rows(conn: &Connection, dataset_id: i64, width: usize) -> Result<Vec<(i64, Vec<Value>)>> {
    let mut stmt = conn
        .prepare(
            "SELECT row_idx, col_idx, kind, value
             FROM cell
             WHERE dataset_id = ?1
             ORDER BY row_idx ASC, col_idx ASC",
        )
        .context("failed to prepare row hydration query")?;
    let mut cells = stmt
        .query([dataset_id])
        .context("failed to run row hydration query")?;

    let mut rows: Vec<(i64, Vec<Value>)> = Vec::new();
    while let Some(cell) = cells.next().context("failed to read hydrated cell")? {
        let row_idx: i64 = cell.get(0).context("failed to read row_idx")?;
        let col_idx: i64 = cell.get(1).context("failed to read col_idx")?;
        let kind: String = cell.get(2).context("failed to read kind")?;
        let raw: Option<String> = cell.get(3).context("failed to read value")?;

        if rows.last().map(|(last, _)| *last) != Some(row_idx) {
            rows.push((row_idx, vec![Value::Null; width]));
        }
        let value = decode_value(&kind, raw.as_deref())?;
        if let Some(dest) = rows
            .last_mut()
            .and_then(|(_, row)| row.get_mut(col_idx as usize))
        {
            *dest = value;
        }
    }
    Ok(rows)
}

fn read_meta(
    conn: &Connection,
    dataset_id: i64,
    name: String,
    row_count: i64,
    created_at: String,
) -> Result<TableMeta> {
    let (columns, key_columns) = load_columns(conn, dataset_id)?;
    Ok(TableMeta {
        id: dataset_id.into(),
        name,
        columns,
        key_columns,
        row_count,
        created_at,
    })
}

pub fn find_table(db_path: &Path, name: &str) -> Result<Option<TableMeta>> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let found = conn
        .query_row(
            "SELECT id, name, row_count, created_at FROM dataset WHERE name = ?1",
            [name],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("failed to look up table '{name}'"))?;

    found
        .map(|(id, name, row_count, created_at)| read_meta(&conn, id, name, row_count, created_at))
        .transpose()
}

pub fn list_tables(db_path: &Path) -> Result<Vec<TableMeta>> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, row_count, created_at
             FROM dataset
             ORDER BY name ASC",
        )
        .context("failed to prepare tables query")?;

    let headers = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .context("failed to query tables")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect tables")?;

    headers
        .into_iter()
        .map(|(id, name, row_count, created_at)| read_meta(&conn, id, name, row_count, created_at))
        .collect()
}

pub fn load_snapshot(db_path: &Path, dataset_id: i64) -> Result<Snapshot> {
    let conn = open_connection(db_path)?;
    let (columns, _) = load_columns(&conn, dataset_id)?;
    let rows = load_rows(&conn, dataset_id, columns.len())?
        .into_iter()
        .map(|(_, row)| row)
        .collect();
    Snapshot::new(columns, rows)
        .with_context(|| format!("stored table #{dataset_id} does not form a valid snapshot"))
}

fn check_keys(snapshot: &Snapshot, key_columns: &[String]) -> Result<(), WriteRejected> {
    let key_idx = key_columns
        .iter()
        .map(|name| {
            snapshot
                .column_index(name)
                .ok_or_else(|| WriteRejected::UnknownColumn(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if key_idx.is_empty() {
        return Ok(());
    }

    let mut seen = HashSet::with_capacity(snapshot.len());
    for row in snapshot.rows() {
        let key = key_of(row, &key_idx);
        if !seen.insert(key.clone()) {
            return Err(WriteRejected::DuplicateKey(key.join(", ")));
        }
    }
    Ok(())
}

pub fn create_table_from_snapshot(
    db_path: &Path,
    name: &str,
    key_columns: &[String],
    snapshot: &Snapshot,
) -> Result<i64> {
    init_db(db_path)?;
    check_keys(snapshot, key_columns)?;

    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to start table create transaction")?;

    let exists: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM dataset WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )
        .context("failed to check table name")?;
    if exists {
        return Err(WriteRejected::TableExists(name.to_string()).into());
    }

    tx.execute(
        "INSERT INTO dataset(name, row_count) VALUES (?1, ?2)",
        params![name, snapshot.len() as i64],
    )
    .context("failed to insert dataset")?;
    let dataset_id = tx.last_insert_rowid();

    insert_columns(&tx, dataset_id, snapshot.columns(), key_columns)?;
    insert_rows(&tx, dataset_id, 0, snapshot.rows())?;

    tx.commit().context("failed to commit table create")?;
    Ok(dataset_id)
}

/// Whole-table replacement. `snapshot` may list the columns in any order but
/// must name exactly the stored ones.
pub fn overwrite_table(db_path: &Path, dataset_id: i64, snapshot: &Snapshot) -> Result<usize> {
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to start overwrite transaction")?;

    let (columns, key_columns) = load_columns(&tx, dataset_id)?;
    let ordered = snapshot
        .reordered(&columns)
        .map_err(|err| WriteRejected::SchemaMismatch(err.to_string()))?;
    check_keys(&ordered, &key_columns)?;

    tx.execute("DELETE FROM cell WHERE dataset_id = ?1", params![dataset_id])
        .context("failed to clear existing cells")?;
    insert_rows(&tx, dataset_id, 0, ordered.rows())?;
    tx.execute(
        "UPDATE dataset SET row_count = ?1 WHERE id = ?2",
        params![ordered.len() as i64, dataset_id],
    )
    .context("failed to update dataset row_count")?;

    tx.commit().context("failed to commit overwrite")?;
    Ok(ordered.len())
}

fn conflict(record: &ChangeRecord, reason: impl Into<String>) -> WriteRejected {
    WriteRejected::Conflict {
        key: record.key_label(),
        reason: reason.into(),
    }
}

fn column_position(positions: &HashMap<&str, usize>, column: &str) -> Result<usize, WriteRejected> {
    positions
        .get(column)
        .copied()
        .ok_or_else(|| WriteRejected::UnknownColumn(column.to_string()))
}

/// Stored values must still read the same as when the change-set was built.
fn check_previous(
    record: &ChangeRecord,
    stored: &[Value],
    positions: &HashMap<&str, usize>,
) -> Result<(), WriteRejected> {
    for (column, expected) in &record.previous {
        let idx = column_position(positions, column)?;
        if stored[idx].to_string() != expected.to_string() {
            return Err(conflict(
                record,
                format!("column '{column}' is now '{}', expected '{expected}'", stored[idx]),
            ));
        }
    }
    Ok(())
}

fn place(
    row: &mut [Value],
    values: &ColumnValues,
    positions: &HashMap<&str, usize>,
) -> Result<Vec<usize>, WriteRejected> {
    let mut touched = Vec::with_capacity(values.len());
    for (column, value) in values {
        let idx = column_position(positions, column)?;
        row[idx] = value.clone();
        touched.push(idx);
    }
    Ok(touched)
}

/// Keyed partial update inside one immediate transaction. Any conflict rolls
/// the whole change-set back.
pub fn apply_change_set(db_path: &Path, dataset_id: i64, changes: &ChangeSet) -> Result<usize> {
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to start change-set transaction")?;

    let (columns, key_columns) = load_columns(&tx, dataset_id)?;
    if key_columns.is_empty() {
        return Err(WriteRejected::MissingKeyColumns.into());
    }
    let positions: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    let key_idx: Vec<usize> = key_columns
        .iter()
        .map(|name| column_position(&positions, name))
        .collect::<Result<_, _>>()?;

    let mut stored: HashMap<Vec<String>, (i64, Vec<Value>)> =
        load_rows(&tx, dataset_id, columns.len())?
            .into_iter()
            .map(|(row_idx, row)| (key_of(&row, &key_idx), (row_idx, row)))
            .collect();
    let mut next_row_idx = stored
        .values()
        .map(|(row_idx, _)| *row_idx + 1)
        .max()
        .unwrap_or(0);

    let mut upsert_cell = tx
        .prepare(
            "INSERT INTO cell(dataset_id, row_idx, col_idx, kind, value)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(dataset_id, row_idx, col_idx)
             DO UPDATE SET kind = excluded.kind, value = excluded.value",
        )
        .context("failed to prepare cell upsert")?;
    let mut delete_row = tx
        .prepare("DELETE FROM cell WHERE dataset_id = ?1 AND row_idx = ?2")
        .context("failed to prepare row delete")?;

    for record in changes {
        let key = key_columns
            .iter()
            .map(|name| {
                record
                    .key
                    .get(name)
                    .map(ToString::to_string)
                    .ok_or_else(|| WriteRejected::MissingKey(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match record.kind {
            ChangeKind::Modified => {
                let (row_idx, row) = stored
                    .get_mut(&key)
                    .ok_or_else(|| conflict(record, "row no longer exists"))?;
                check_previous(record, row, &positions)?;
                for idx in place(row, &record.values, &positions)? {
                    let (kind, text) = encode_value(&row[idx]);
                    upsert_cell
                        .execute(params![dataset_id, *row_idx, idx as i64, kind, text])
                        .context("failed to update cell")?;
                }
            }
            ChangeKind::Inserted => {
                if stored.contains_key(&key) {
                    return Err(conflict(record, "a row with this key already exists").into());
                }
                let mut row = vec![Value::Null; columns.len()];
                place(&mut row, &record.key, &positions)?;
                place(&mut row, &record.values, &positions)?;
                for (idx, value) in row.iter().enumerate() {
                    let (kind, text) = encode_value(value);
                    upsert_cell
                        .execute(params![dataset_id, next_row_idx, idx as i64, kind, text])
                        .context("failed to insert cell")?;
                }
                stored.insert(key, (next_row_idx, row));
                next_row_idx += 1;
            }
            ChangeKind::Deleted => {
                let (row_idx, row) = stored
                    .get(&key)
                    .ok_or_else(|| conflict(record, "row no longer exists"))?;
                check_previous(record, row, &positions)?;
                delete_row
                    .execute(params![dataset_id, *row_idx])
                    .context("failed to delete row")?;
                stored.remove(&key);
            }
        }
    }
    drop(upsert_cell);
    drop(delete_row);

    tx.execute(
        "UPDATE dataset SET row_count = ?1 WHERE id = ?2",
        params![stored.len() as i64, dataset_id],
    )
    .context("failed to update dataset row_count")?;

    tx.commit().context("failed to commit change-set")?;
    Ok(changes.len())
}

pub fn drop_table(db_path: &Path, dataset_id: i64) -> Result<()> {
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction()
        .context("failed to start drop transaction")?;
    tx.execute("DELETE FROM cell WHERE dataset_id = ?1", params![dataset_id])
        .with_context(|| format!("failed to delete cells for table #{dataset_id}"))?;
    tx.execute(
        "DELETE FROM column_name WHERE dataset_id = ?1",
        params![dataset_id],
    )
    .with_context(|| format!("failed to delete columns for table #{dataset_id}"))?;
    tx.execute("DELETE FROM dataset WHERE id = ?1", params![dataset_id])
        .with_context(|| format!("failed to delete table #{dataset_id}"))?;
    tx.commit().context("failed to commit drop transaction")?;
    Ok(())
}

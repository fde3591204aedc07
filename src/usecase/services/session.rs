use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::domain::entities::change::ChangeSet;
use crate::domain::entities::snapshot::Snapshot;
use crate::domain::entities::value::Value;
use crate::domain::error::ReconcileError;
use crate::domain::filter::DateFilter;
use crate::domain::reconcile::{Alignment, ReconcileOptions, Reconciler};
use crate::usecase::ports::repo::{RepoError, TableMeta, TableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Keyed partial update that refuses to clobber concurrent changes.
    #[default]
    Upsert,
    /// Replace the whole table. Last writer wins.
    Overwrite,
}

impl WriteStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStrategy::Upsert => "upsert",
            WriteStrategy::Overwrite => "overwrite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    NoChanges,
    Saved { strategy: WriteStrategy, rows: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    Reconcile(ReconcileError),
    Repo(RepoError),
    /// Overwriting from a filtered or limited load would drop every row
    /// that was not loaded.
    FilteredOverwrite { table: String },
}

impl SessionError {
    pub fn is_invalid_input(&self) -> bool {
        match self {
            SessionError::Reconcile(_) | SessionError::FilteredOverwrite { .. } => true,
            SessionError::Repo(err) => matches!(err, RepoError::InvalidInput(_)),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Reconcile(err) => write!(f, "{err}"),
            SessionError::Repo(err) => write!(f, "{err}"),
            SessionError::FilteredOverwrite { table } => write!(
                f,
                "refusing to overwrite '{table}' from a filtered or limited load; save with upsert or reload everything"
            ),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ReconcileError> for SessionError {
    fn from(err: ReconcileError) -> Self {
        SessionError::Reconcile(err)
    }
}

impl From<RepoError> for SessionError {
    fn from(err: RepoError) -> Self {
        SessionError::Repo(err)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadRequest {
    pub filter: Option<DateFilter>,
    /// Row cap, applied after the filter.
    pub limit: Option<usize>,
}

impl LoadRequest {
    /// True when the loaded rows may be a subset of the table.
    pub fn is_partial(&self) -> bool {
        self.filter.is_some() || self.limit.is_some()
    }

    fn fetch(&self, store: &dyn TableStore, table: &str) -> Result<Snapshot, RepoError> {
        let mut snapshot = store.load(table, self.filter.as_ref())?;
        if let Some(limit) = self.limit {
            snapshot.truncate(limit);
        }
        Ok(snapshot)
    }
}

/// One table loaded for editing: the snapshot as it was read (`original`)
/// and the working copy the caller edits (`current`).
pub struct EditSession {
    store: Arc<dyn TableStore>,
    meta: TableMeta,
    request: LoadRequest,
    options: ReconcileOptions,
    original: Snapshot,
    current: Snapshot,
}

impl EditSession {
    pub fn load(
        store: Arc<dyn TableStore>,
        table: &str,
        request: LoadRequest,
    ) -> Result<Self, SessionError> {
        let meta = store.table_meta(table)?;
        let original = request.fetch(store.as_ref(), table)?;
        log::debug!(
            "loaded '{}': {} rows{}",
            meta.name,
            original.len(),
            if request.is_partial() { " (partial)" } else { "" }
        );
        Ok(Self {
            store,
            meta,
            request,
            options: ReconcileOptions::default(),
            current: original.clone(),
            original,
        })
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Re-reads the table with the same request. Unsaved edits are lost.
    pub fn reload(&mut self) -> Result<(), SessionError> {
        let meta = self.store.table_meta(&self.meta.name)?;
        let fresh = self.request.fetch(self.store.as_ref(), &meta.name)?;
        self.meta = meta;
        self.current = fresh.clone();
        self.original = fresh;
        Ok(())
    }

    pub fn table(&self) -> &TableMeta {
        &self.meta
    }

    pub fn is_filtered(&self) -> bool {
        self.request.is_partial()
    }

    pub fn original(&self) -> &Snapshot {
        &self.original
    }

    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    pub fn set_cell(
        &mut self,
        row: usize,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Value, SessionError> {
        Ok(self.current.set(row, column, value.into())?)
    }

    pub fn append_row(&mut self, values: Vec<Value>) -> Result<usize, SessionError> {
        self.current.push_row(values)?;
        Ok(self.current.len() - 1)
    }

    pub fn remove_row(&mut self, row: usize) -> Result<Vec<Value>, SessionError> {
        Ok(self.current.remove_row(row)?)
    }

    pub fn find_rows(&self, column: &str, value: &Value) -> Result<Vec<usize>, SessionError> {
        let col_idx = self
            .current
            .column_index(column)
            .ok_or_else(|| ReconcileError::UnknownColumn(column.to_string()))?;
        let wanted = value.to_string();
        Ok(self
            .current
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| row[col_idx].to_string() == wanted)
            .map(|(idx, _)| idx)
            .collect())
    }

    /// Options used to build the change-set. A keyed table is always aligned
    /// by key so appended and removed rows show up as inserts and deletes.
    fn effective_options(&self) -> ReconcileOptions {
        let mut options = self.options;
        if !self.meta.key_columns.is_empty() {
            options.alignment = Alignment::Keyed;
        }
        options
    }

    pub fn pending_changes(&self) -> Result<ChangeSet, SessionError> {
        let reconciler = Reconciler::with_options(self.effective_options());
        let keys = self.meta.key_columns.as_slice();
        Ok(reconciler.reconcile(&self.original, &self.current, keys)?)
    }

    pub fn has_changes(&self) -> Result<bool, SessionError> {
        if self.current.len() != self.original.len() {
            return Ok(true);
        }
        Ok(!self.pending_changes()?.is_empty())
    }

    pub fn discard(&mut self) {
        self.current = self.original.clone();
    }

    /// Writes pending edits. On success the working copy becomes the new
    /// baseline; on failure both snapshots are left as they were.
    pub fn save(&mut self, strategy: WriteStrategy) -> Result<SaveOutcome, SessionError> {
        let table = self.meta.name.clone();
        let rows = match strategy {
            WriteStrategy::Upsert => {
                if self.meta.key_columns.is_empty() {
                    return Err(RepoError::MissingKeyColumns(table).into());
                }
                let changes = self.pending_changes()?;
                if changes.is_empty() {
                    return Ok(SaveOutcome::NoChanges);
                }
                self.store.apply_changes(&table, changes)?
            }
            WriteStrategy::Overwrite => {
                if self.is_filtered() {
                    return Err(SessionError::FilteredOverwrite { table });
                }
                if !self.has_changes()? {
                    return Ok(SaveOutcome::NoChanges);
                }
                self.store.overwrite(&table, &self.current)?
            }
        };

        self.original = self.current.clone();
        log::info!(
            "saved '{table}' with {}: {rows} rows written",
            strategy.as_str()
        );
        Ok(SaveOutcome::Saved { strategy, rows })
    }
}

impl fmt::Debug for EditSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("table", &self.meta.name)
            .field("request", &self.request)
            .field("options", &self.options)
            .field("rows", &self.current.len())
            .finish()
    }
}

use std::path::PathBuf;

use crate::domain::entities::change::ChangeSet;
use crate::domain::entities::snapshot::Snapshot;
use crate::domain::entities::table::TableId;
use crate::domain::filter::DateFilter;
use crate::infra::sqlite::queries::{
    apply_change_set, create_table_from_snapshot, drop_table, find_table, list_tables,
    load_snapshot, overwrite_table, WriteRejected,
};
use crate::infra::sqlite::schema::init_db;
use crate::usecase::ports::repo::{NewTable, RepoError, TableMeta, TableStore};

pub struct SqliteStore {
    pub db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn require(&self, name: &str) -> Result<TableMeta, RepoError> {
        find_table(&self.db_path, name)
            .map_err(storage)?
            .ok_or_else(|| RepoError::TableNotFound(name.to_string()))
    }
}

fn storage(err: anyhow::Error) -> RepoError {
    RepoError::Storage(format!("{err:#}"))
}

/// Turns a rejected write back into the port error it stands for. Anything
/// else is a storage failure.
fn write_error(table: &str, err: anyhow::Error) -> RepoError {
    match err.downcast::<WriteRejected>() {
        Ok(WriteRejected::Conflict { key, reason }) => {
            log::warn!("rejected write to '{table}' at [{key}]: {reason}");
            RepoError::ConcurrentModification {
                table: table.to_string(),
                key,
            }
        }
        Ok(WriteRejected::TableExists(name)) => RepoError::TableExists(name),
        Ok(WriteRejected::MissingKeyColumns) => RepoError::MissingKeyColumns(table.to_string()),
        Ok(other) => RepoError::InvalidInput(other.to_string()),
        Err(err) => storage(err),
    }
}

impl TableStore for SqliteStore {
    fn init(&self) -> Result<(), RepoError> {
        init_db(&self.db_path).map_err(storage)
    }

    fn list_tables(&self) -> Result<Vec<TableMeta>, RepoError> {
        list_tables(&self.db_path).map_err(storage)
    }

    fn table_meta(&self, name: &str) -> Result<TableMeta, RepoError> {
        self.require(name)
    }

    fn create_table(&self, meta: NewTable, data: &Snapshot) -> Result<TableId, RepoError> {
        if meta.name.trim().is_empty() {
            return Err(RepoError::InvalidInput("table name is empty".to_string()));
        }
        let id = create_table_from_snapshot(&self.db_path, &meta.name, &meta.key_columns, data)
            .map_err(|err| write_error(&meta.name, err))?;
        log::info!(
            "created table '{}' with {} rows, key [{}]",
            meta.name,
            data.len(),
            meta.key_columns.join(", ")
        );
        Ok(TableId(id))
    }

    fn load(&self, name: &str, filter: Option<&DateFilter>) -> Result<Snapshot, RepoError> {
        let meta = self.require(name)?;
        let snapshot = load_snapshot(&self.db_path, meta.id.0).map_err(storage)?;
        match filter {
            Some(filter) => filter
                .apply(&snapshot)
                .map_err(|err| RepoError::InvalidInput(err.to_string())),
            None => Ok(snapshot),
        }
    }

    fn overwrite(&self, name: &str, data: &Snapshot) -> Result<usize, RepoError> {
        let meta = self.require(name)?;
        let rows = overwrite_table(&self.db_path, meta.id.0, data)
            .map_err(|err| write_error(name, err))?;
        log::info!("overwrote table '{name}' with {rows} rows");
        Ok(rows)
    }

    fn apply_changes(&self, name: &str, changes: ChangeSet) -> Result<usize, RepoError> {
        let meta = self.require(name)?;
        if meta.key_columns.is_empty() {
            return Err(RepoError::MissingKeyColumns(name.to_string()));
        }
        let applied = apply_change_set(&self.db_path, meta.id.0, &changes)
            .map_err(|err| write_error(name, err))?;
        log::info!("applied {applied} changes to table '{name}'");
        Ok(applied)
    }

    fn drop_table(&self, name: &str) -> Result<(), RepoError> {
        let meta = self.require(name)?;
        drop_table(&self.db_path, meta.id.0).map_err(storage)?;
        log::info!("dropped table '{name}'");
        Ok(())
    }
}

use crate::domain::entities::change::ChangeSet;
use crate::domain::entities::snapshot::Snapshot;
use crate::domain::entities::table::TableId;
use crate::domain::filter::DateFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    TableNotFound(String),
    TableExists(String),
    MissingKeyColumns(String),
    /// The stored row no longer matches what the change-set was computed
    /// against. Nothing from the change-set was written.
    ConcurrentModification {
        table: String,
        key: String,
    },
    InvalidInput(String),
    Storage(String),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::TableNotFound(table) => write!(f, "table '{table}' not found"),
            RepoError::TableExists(table) => write!(f, "table '{table}' already exists"),
            RepoError::MissingKeyColumns(table) => {
                write!(f, "table '{table}' has no key columns; keyed updates need one")
            }
            RepoError::ConcurrentModification { table, key } => write!(
                f,
                "row [{key}] in table '{table}' was changed by another writer since it was loaded"
            ),
            RepoError::InvalidInput(message) => write!(f, "invalid input: {message}"),
            RepoError::Storage(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RepoError {}

/// Durable home of the tables a session loads and saves.
pub trait TableStore: Send + Sync {
    fn init(&self) -> Result<(), RepoError>;

    fn list_tables(&self) -> Result<Vec<TableMeta>, RepoError>;
    fn table_meta(&self, name: &str) -> Result<TableMeta, RepoError>;
    fn create_table(&self, meta: NewTable, data: &Snapshot) -> Result<TableId, RepoError>;
    fn load(&self, name: &str, filter: Option<&DateFilter>) -> Result<Snapshot, RepoError>;

    /// Replaces every row of the table with `data`. Last writer wins.
    fn overwrite(&self, name: &str, data: &Snapshot) -> Result<usize, RepoError>;

    /// Applies a change-set row by row, matched on the table's key columns,
    /// all or nothing. Returns the number of records applied.
    ///
    /// A stored row is stale when any `previous` value differs from it in
    /// canonical text. That check ignores whichever comparator built the
    /// change-set, so `Text("7.0")` in the store conflicts with
    /// `Float(7.0)` even under typed equality.
    fn apply_changes(&self, name: &str, changes: ChangeSet) -> Result<usize, RepoError>;

    fn drop_table(&self, name: &str) -> Result<(), RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<String>,
    pub key_columns: Vec<String>,
    pub row_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTable {
    pub name: String,
    pub key_columns: Vec<String>,
}

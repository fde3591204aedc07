//! Detects row-level changes between a loaded table and its edited copy and
//! writes them back to a SQLite-backed table store.

pub mod config;
pub mod domain;
pub mod infra;
pub mod usecase;

pub use crate::config::Settings;
pub use crate::domain::entities::change::{ChangeKind, ChangeRecord, ChangeSet, ColumnValues};
pub use crate::domain::entities::snapshot::Snapshot;
pub use crate::domain::entities::table::TableId;
pub use crate::domain::entities::value::{Value, ValueKind};
pub use crate::domain::error::{ReconcileError, Side};
pub use crate::domain::filter::{date_columns, filter_by_date, DateFilter, DateRange};
pub use crate::domain::reconcile::{
    reconcile, Alignment, ComparePolicy, Comparator, OutputMode, ReconcileOptions, Reconciler,
    RowCountPolicy, TextualEquality, TypedEquality,
};
pub use crate::infra::sqlite::repo::SqliteStore;
pub use crate::usecase::ports::repo::{NewTable, RepoError, TableMeta, TableStore};
pub use crate::usecase::services::session::{
    EditSession, LoadRequest, SaveOutcome, SessionError, WriteStrategy,
};

use std::fmt;

/// Which snapshot a row-level problem was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Original,
    Modified,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Original => "original",
            Side::Modified => "modified",
        }
    }
}

/// Malformed input to the snapshot model, the date filter or the reconciler.
///
/// Every variant is an invalid-input condition: the caller handed over data
/// that cannot be compared. Nothing is partially computed when one is raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    InvalidInput(String),
    UnknownColumn(String),
    ColumnMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    DuplicateKey {
        side: Side,
        key: String,
    },
    RowCountMismatch {
        original: usize,
        modified: usize,
    },
    RowOutOfRange {
        row: usize,
        len: usize,
    },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::UnknownColumn(column) => write!(f, "unknown column '{column}'"),
            Self::ColumnMismatch {
                missing,
                unexpected,
            } => {
                write!(f, "snapshots have different columns")?;
                if !missing.is_empty() {
                    write!(f, "; missing from modified: {}", missing.join(", "))?;
                }
                if !unexpected.is_empty() {
                    write!(f, "; not in original: {}", unexpected.join(", "))?;
                }
                Ok(())
            }
            Self::DuplicateKey { side, key } => {
                write!(f, "duplicate key [{key}] in {} snapshot", side.as_str())
            }
            Self::RowCountMismatch { original, modified } => write!(
                f,
                "row counts differ: original has {original}, modified has {modified}"
            ),
            Self::RowOutOfRange { row, len } => {
                write!(f, "row {row} out of range (snapshot has {len} rows)")
            }
        }
    }
}

impl std::error::Error for ReconcileError {}

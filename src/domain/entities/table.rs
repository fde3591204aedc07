#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub i64);

impl From<i64> for TableId {
    fn from(value: i64) -> Self {
        TableId(value)
    }
}

impl From<TableId> for i64 {
    fn from(value: TableId) -> Self {
        value.0
    }
}

pub mod change;
pub mod snapshot;
pub mod table;
pub mod value;

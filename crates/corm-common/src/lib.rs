pub mod error;
pub mod types;
pub mod value;

pub use error::{CormError, ErrorKind};
pub use types::{FieldFlags, FieldType, OnDelete, SyncMode};
pub use value::{ColumnValue, Value};

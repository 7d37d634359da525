//! Backend driver contract.
//!
//! The engine talks to a database only through three traits:
//!
//! - [`Driver`]: opens connections and answers dialect questions (column
//!   type names, placeholder syntax, auto-increment keyword, LIMIT syntax)
//! - [`Connection`]: one open session (execute, prepare, transactions,
//!   table existence, foreign-key enforcement)
//! - [`Statement`]: one prepared statement (typed binds, stepping, column
//!   introspection)
//!
//! Bind indices are 1-based, column indices 0-based. Errors are the
//! backend's own message text; the engine classifies them.

use std::borrow::Cow;

use corm_common::FieldType;

pub mod pg;
pub mod sqlite;

/// Outcome of [`Statement::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Row,
    Done,
}

/// Storage class of a result column in the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Null,
    Integer,
    Float,
    Text,
    Blob,
}

/// A prepared statement borrowed from its connection.
pub trait Statement {
    fn bind_int(&mut self, index: usize, value: i32) -> Result<(), String>;
    fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), String>;
    fn bind_double(&mut self, index: usize, value: f64) -> Result<(), String>;
    fn bind_text(&mut self, index: usize, value: &str) -> Result<(), String>;
    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<(), String>;
    fn bind_null(&mut self, index: usize) -> Result<(), String>;

    /// Advance to the next row. The first call executes the statement.
    fn step(&mut self) -> Result<Step, String>;

    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> Option<&str>;
    fn column_type(&self, index: usize) -> ColumnType;
    fn column_int(&self, index: usize) -> i32;
    fn column_int64(&self, index: usize) -> i64;
    fn column_double(&self, index: usize) -> f64;
    fn column_text(&self, index: usize) -> Option<&str>;
    fn column_blob(&self, index: usize) -> Cow<'_, [u8]>;
    /// Byte length of a text or blob column.
    fn column_bytes(&self, index: usize) -> usize;
}

/// An open database session. Dropping it disconnects.
pub trait Connection {
    /// Run SQL that returns no rows.
    fn execute(&mut self, sql: &str) -> Result<(), String>;

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn Statement + 'c>, String>;

    /// Key generated by the most recent auto-increment insert.
    fn last_insert_id(&mut self) -> Result<i64, String>;

    /// Rows changed by the most recently completed statement.
    fn changes(&self) -> u64;

    fn begin(&mut self) -> Result<(), String>;
    fn commit(&mut self) -> Result<(), String>;
    fn rollback(&mut self) -> Result<(), String>;

    fn table_exists(&mut self, name: &str) -> Result<bool, String>;

    fn set_foreign_keys(&mut self, enabled: bool) -> Result<(), String>;
}

/// A database engine: connection factory plus dialect.
pub trait Driver {
    /// Short engine name used in logs.
    fn name(&self) -> &'static str;

    fn connect(&self, conn_str: &str) -> Result<Box<dyn Connection>, String>;

    /// Column type for a field. `max_length` only matters for strings.
    fn type_name(&self, kind: FieldType, max_length: Option<usize>) -> Cow<'static, str>;

    /// Keyword appended to an auto-increment primary key, or "".
    fn auto_increment(&self) -> &'static str;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> Cow<'static, str>;

    /// Whether INSERT ... RETURNING can report generated keys.
    fn supports_returning(&self) -> bool;

    /// LIMIT/OFFSET clause with a leading space, or "" when both are unset.
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String;
}

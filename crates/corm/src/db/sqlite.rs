//! SQLite backend over the C API (`libsqlite3-sys`, bundled).
//!
//! - [`SqliteDriver`]: opens a database file (or `:memory:`) and supplies
//!   the SQLite dialect: `?` placeholders, `AUTOINCREMENT`, and
//!   `LIMIT n OFFSET m`
//! - `SqliteConn`: owns the `sqlite3*` handle and closes it on drop
//! - `SqliteStatement`: owns a `sqlite3_stmt*` and finalizes it on drop,
//!   even when an error causes an early return

use std::borrow::Cow;
use std::ffi::{c_void, CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int};

use corm_common::FieldType;
use libsqlite3_sys::*;

use super::{ColumnType, Connection, Driver, Statement, Step};

/// The SQLite engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

/// SQLITE_TRANSIENT tells SQLite to copy bound parameter data immediately.
/// It is defined as ((void(*)(void*))-1) in the C API, which is -1 cast to
/// a destructor function pointer.
const SQLITE_TRANSIENT_VALUE: isize = -1;

fn transient() -> Option<unsafe extern "C" fn(*mut c_void)> {
    unsafe {
        std::mem::transmute::<isize, Option<unsafe extern "C" fn(*mut c_void)>>(
            SQLITE_TRANSIENT_VALUE,
        )
    }
}

/// Read the most recent error message of a connection.
///
/// # Safety
///
/// `db` must be a valid (possibly failed-open) connection pointer or null.
unsafe fn errmsg(db: *mut sqlite3) -> String {
    if db.is_null() {
        return "unknown SQLite error".to_string();
    }
    let c_msg = sqlite3_errmsg(db);
    if c_msg.is_null() {
        "unknown SQLite error".to_string()
    } else {
        CStr::from_ptr(c_msg).to_string_lossy().into_owned()
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(&self, conn_str: &str) -> Result<Box<dyn Connection>, String> {
        let c_path = CString::new(conn_str).map_err(|_| "path contains null byte".to_string())?;
        let mut db: *mut sqlite3 = std::ptr::null_mut();
        unsafe {
            let rc = sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE,
                std::ptr::null(),
            );
            if rc != SQLITE_OK {
                let msg = errmsg(db);
                if !db.is_null() {
                    sqlite3_close(db);
                }
                return Err(msg);
            }
        }
        Ok(Box::new(SqliteConn { db }))
    }

    fn type_name(&self, kind: FieldType, _max_length: Option<usize>) -> Cow<'static, str> {
        Cow::Borrowed(match kind {
            FieldType::Int | FieldType::Bool | FieldType::Int64 => "INTEGER",
            FieldType::Float | FieldType::Double => "REAL",
            FieldType::String => "TEXT",
            FieldType::Blob => "BLOB",
            FieldType::BelongsTo | FieldType::HasMany => "",
        })
    }

    fn auto_increment(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    fn placeholder(&self, _index: usize) -> Cow<'static, str> {
        Cow::Borrowed("?")
    }

    fn supports_returning(&self) -> bool {
        false
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let offset = offset.filter(|&o| o > 0);
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!(" LIMIT {}", l),
            (None, Some(o)) => format!(" LIMIT -1 OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

// ── Connection ─────────────────────────────────────────────────────────

/// Wrapper around a raw SQLite database pointer.
struct SqliteConn {
    db: *mut sqlite3,
}

impl Drop for SqliteConn {
    fn drop(&mut self) {
        if !self.db.is_null() {
            unsafe {
                sqlite3_close(self.db);
            }
        }
    }
}

impl Connection for SqliteConn {
    fn execute(&mut self, sql: &str) -> Result<(), String> {
        let c_sql = CString::new(sql).map_err(|_| "SQL contains null byte".to_string())?;
        unsafe {
            let mut err: *mut c_char = std::ptr::null_mut();
            let rc = sqlite3_exec(self.db, c_sql.as_ptr(), None, std::ptr::null_mut(), &mut err);
            if rc != SQLITE_OK {
                let msg = if err.is_null() {
                    errmsg(self.db)
                } else {
                    let msg = CStr::from_ptr(err).to_string_lossy().into_owned();
                    sqlite3_free(err as *mut c_void);
                    msg
                };
                return Err(msg);
            }
        }
        Ok(())
    }

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn Statement + 'c>, String> {
        let len = c_int::try_from(sql.len()).map_err(|_| "SQL text too long".to_string())?;
        let mut stmt: *mut sqlite3_stmt = std::ptr::null_mut();
        unsafe {
            let rc = sqlite3_prepare_v2(
                self.db,
                sql.as_ptr() as *const c_char,
                len,
                &mut stmt,
                std::ptr::null_mut(),
            );
            if rc != SQLITE_OK {
                if !stmt.is_null() {
                    sqlite3_finalize(stmt);
                }
                return Err(errmsg(self.db));
            }
        }
        if stmt.is_null() {
            return Err("empty SQL statement".to_string());
        }
        Ok(Box::new(SqliteStatement {
            db: self.db,
            stmt,
            _conn: PhantomData,
        }))
    }

    fn last_insert_id(&mut self) -> Result<i64, String> {
        Ok(unsafe { sqlite3_last_insert_rowid(self.db) })
    }

    fn changes(&self) -> u64 {
        unsafe { sqlite3_changes(self.db).max(0) as u64 }
    }

    fn begin(&mut self) -> Result<(), String> {
        self.execute("BEGIN TRANSACTION;")
    }

    fn commit(&mut self) -> Result<(), String> {
        self.execute("COMMIT;")
    }

    fn rollback(&mut self) -> Result<(), String> {
        self.execute("ROLLBACK;")
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, String> {
        let mut stmt =
            self.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?;")?;
        stmt.bind_text(1, name)?;
        Ok(stmt.step()? == Step::Row)
    }

    fn set_foreign_keys(&mut self, enabled: bool) -> Result<(), String> {
        if enabled {
            self.execute("PRAGMA foreign_keys = ON;")
        } else {
            self.execute("PRAGMA foreign_keys = OFF;")
        }
    }
}

// ── Statement ──────────────────────────────────────────────────────────

/// A prepared statement. Finalized on drop.
struct SqliteStatement<'c> {
    db: *mut sqlite3,
    stmt: *mut sqlite3_stmt,
    _conn: PhantomData<&'c mut SqliteConn>,
}

impl Drop for SqliteStatement<'_> {
    fn drop(&mut self) {
        unsafe {
            sqlite3_finalize(self.stmt);
        }
    }
}

impl SqliteStatement<'_> {
    fn check(&self, rc: c_int) -> Result<(), String> {
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(unsafe { errmsg(self.db) })
        }
    }

    fn col(index: usize) -> c_int {
        c_int::try_from(index).unwrap_or(c_int::MAX)
    }
}

impl Statement for SqliteStatement<'_> {
    fn bind_int(&mut self, index: usize, value: i32) -> Result<(), String> {
        let rc = unsafe { sqlite3_bind_int(self.stmt, Self::col(index), value) };
        self.check(rc)
    }

    fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), String> {
        let rc = unsafe { sqlite3_bind_int64(self.stmt, Self::col(index), value) };
        self.check(rc)
    }

    fn bind_double(&mut self, index: usize, value: f64) -> Result<(), String> {
        let rc = unsafe { sqlite3_bind_double(self.stmt, Self::col(index), value) };
        self.check(rc)
    }

    fn bind_text(&mut self, index: usize, value: &str) -> Result<(), String> {
        let len = c_int::try_from(value.len()).map_err(|_| "string too long".to_string())?;
        let rc = unsafe {
            sqlite3_bind_text(
                self.stmt,
                Self::col(index),
                value.as_ptr() as *const c_char,
                len,
                transient(),
            )
        };
        self.check(rc)
    }

    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<(), String> {
        let len = c_int::try_from(value.len()).map_err(|_| "blob too long".to_string())?;
        let rc = unsafe {
            sqlite3_bind_blob(
                self.stmt,
                Self::col(index),
                value.as_ptr() as *const c_void,
                len,
                transient(),
            )
        };
        self.check(rc)
    }

    fn bind_null(&mut self, index: usize) -> Result<(), String> {
        let rc = unsafe { sqlite3_bind_null(self.stmt, Self::col(index)) };
        self.check(rc)
    }

    fn step(&mut self) -> Result<Step, String> {
        match unsafe { sqlite3_step(self.stmt) } {
            SQLITE_ROW => Ok(Step::Row),
            SQLITE_DONE => Ok(Step::Done),
            _ => Err(unsafe { errmsg(self.db) }),
        }
    }

    fn column_count(&self) -> usize {
        unsafe { sqlite3_column_count(self.stmt).max(0) as usize }
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        unsafe {
            let ptr = sqlite3_column_name(self.stmt, Self::col(index));
            if ptr.is_null() {
                None
            } else {
                CStr::from_ptr(ptr).to_str().ok()
            }
        }
    }

    fn column_type(&self, index: usize) -> ColumnType {
        match unsafe { sqlite3_column_type(self.stmt, Self::col(index)) } {
            SQLITE_INTEGER => ColumnType::Integer,
            SQLITE_FLOAT => ColumnType::Float,
            SQLITE_TEXT => ColumnType::Text,
            SQLITE_BLOB => ColumnType::Blob,
            _ => ColumnType::Null,
        }
    }

    fn column_int(&self, index: usize) -> i32 {
        unsafe { sqlite3_column_int(self.stmt, Self::col(index)) }
    }

    fn column_int64(&self, index: usize) -> i64 {
        unsafe { sqlite3_column_int64(self.stmt, Self::col(index)) }
    }

    fn column_double(&self, index: usize) -> f64 {
        unsafe { sqlite3_column_double(self.stmt, Self::col(index)) }
    }

    fn column_text(&self, index: usize) -> Option<&str> {
        unsafe {
            let ptr = sqlite3_column_text(self.stmt, Self::col(index));
            if ptr.is_null() {
                return None;
            }
            let len = sqlite3_column_bytes(self.stmt, Self::col(index)).max(0) as usize;
            std::str::from_utf8(std::slice::from_raw_parts(ptr, len)).ok()
        }
    }

    fn column_blob(&self, index: usize) -> Cow<'_, [u8]> {
        unsafe {
            let ptr = sqlite3_column_blob(self.stmt, Self::col(index));
            let len = sqlite3_column_bytes(self.stmt, Self::col(index)).max(0) as usize;
            if ptr.is_null() || len == 0 {
                Cow::Borrowed(&[])
            } else {
                Cow::Borrowed(std::slice::from_raw_parts(ptr as *const u8, len))
            }
        }
    }

    fn column_bytes(&self, index: usize) -> usize {
        unsafe { sqlite3_column_bytes(self.stmt, Self::col(index)).max(0) as usize }
    }
}

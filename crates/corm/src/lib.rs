//! corm: a reflection-driven ORM engine.
//!
//! Models describe themselves once through [`Model::describe`]; the engine
//! then generates DDL and DML for them, binds values through a backend
//! driver, and materializes rows into freshly constructed instances.
//!
//! ## Modules
//!
//! - [`model`]: entity and field descriptors with typed get/set closures
//! - [`registry`]: per-handle model registry and relationship resolution
//! - [`db`]: the backend contract plus SQLite and PostgreSQL drivers
//! - [`sql`]: statement text generation for both dialects
//! - [`arena`]: scoped buffer that holds SQL text for one operation
//! - [`alloc`], [`result`]: allocator override and tracked result sets
//! - [`database`]: the handle and its operations (`sync`, `save`, `find`,
//!   `find_all`, `where_raw`, `delete`, `query`, `load_relation`)
//!
//! ## Example
//!
//! ```ignore
//! let mut db = Database::init(":memory:")?;
//! db.register::<User>()?;
//! db.sync(SyncMode::Safe)?;
//!
//! let mut alice = User { name: "Alice".into(), ..Default::default() };
//! db.save(&mut alice)?;
//!
//! if let Some(users) = db.find_all::<User>()? {
//!     for user in &users {
//!         println!("{}", user.name);
//!     }
//!     db.free_result(users);
//! }
//! ```

pub mod alloc;
pub mod arena;
pub mod config;
pub mod database;
pub mod db;
mod materialize;
pub mod model;
mod persist;
pub mod query;
pub mod registry;
pub mod relation;
pub mod result;
mod schema;
pub mod sql;

pub use alloc::{Allocator, BudgetAllocator, SystemAllocator};
pub use arena::SqlArena;
pub use config::Config;
pub use database::Database;
pub use db::pg::PgDriver;
pub use db::sqlite::SqliteDriver;
pub use db::{Connection, Driver, Statement};
pub use model::{Entity, Field, Model};
pub use query::Query;
pub use registry::Registry;
pub use relation::RelationLoad;
pub use result::{AllocKind, AllocationTracker, ResultSet};

pub use corm_common::{ColumnValue, CormError, ErrorKind, FieldFlags, FieldType, OnDelete, SyncMode, Value};

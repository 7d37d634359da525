//! The database handle.
//!
//! [`Database`] owns the backend connection, the dialect driver, the model
//! registry, the SQL arena and the allocator override. Every public
//! operation returns `Result<_, CormError>`; failures are also recorded as
//! the handle's [`last_error`](Database::last_error) and logged.
//!
//! Operations are spread over several modules as separate `impl Database`
//! blocks:
//!
//! - `schema`: `sync`
//! - `persist`: `save`, `delete`, `find`, `find_all`, `where_raw`
//! - `query`: `query`
//! - `relation`: `load_relation`

use std::sync::Arc;

use corm_common::CormError;

use crate::alloc::{Allocator, SystemAllocator};
use crate::arena::SqlArena;
use crate::config::Config;
use crate::db::sqlite::SqliteDriver;
use crate::db::{Connection, Driver};
use crate::model::Model;
use crate::registry::Registry;
use crate::result::ResultSet;

pub struct Database {
    pub(crate) conn: Box<dyn Connection>,
    pub(crate) driver: Box<dyn Driver>,
    pub(crate) allocator: Arc<dyn Allocator>,
    pub(crate) arena: SqlArena,
    pub(crate) registry: Registry,
    pub(crate) config: Config,
    last_error: Option<String>,
}

impl Database {
    /// Open a SQLite database file (or `:memory:`) with default settings.
    pub fn init(path: &str) -> Result<Database, CormError> {
        Self::init_with_config(path, Config::default())
    }

    pub fn init_with_config(path: &str, config: Config) -> Result<Database, CormError> {
        Self::init_with_backend_and_config(Box::new(SqliteDriver), path, config)
    }

    /// Connect through any backend driver with default settings.
    pub fn init_with_backend(driver: Box<dyn Driver>, conn_str: &str) -> Result<Database, CormError> {
        Self::init_with_backend_and_config(driver, conn_str, Config::default())
    }

    pub fn init_with_backend_and_config(
        driver: Box<dyn Driver>,
        conn_str: &str,
        config: Config,
    ) -> Result<Database, CormError> {
        let mut conn = driver.connect(conn_str).map_err(|e| {
            tracing::error!(backend = driver.name(), error = %e, "connect failed");
            CormError::connect(e)
        })?;
        conn.set_foreign_keys(config.foreign_keys)
            .map_err(CormError::exec)?;
        tracing::info!(backend = driver.name(), "database opened");

        Ok(Database {
            conn,
            driver,
            allocator: Arc::new(SystemAllocator),
            arena: SqlArena::with_capacity(config.arena_capacity),
            registry: Registry::new(config.max_models),
            config,
            last_error: None,
        })
    }

    /// Disconnect and release the registry and arena.
    pub fn close(self) {
        tracing::info!(backend = self.driver.name(), "database closed");
    }

    /// Charge results created from now on to `allocator`. Results that
    /// already exist keep the allocator they were charged against.
    pub fn set_allocator(&mut self, allocator: Arc<dyn Allocator>) {
        self.allocator = allocator;
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    /// Register `T`'s entity. Registering a type again is a no-op.
    pub fn register<T: Model>(&mut self) -> Result<(), CormError> {
        let result = self.registry.register(T::describe()).map(|_| ());
        self.record("register", result)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Name of the backend in use.
    pub fn backend(&self) -> &'static str {
        self.driver.name()
    }

    /// Release a result and everything charged to it.
    pub fn free_result<T>(&mut self, result: ResultSet<T>) {
        drop(result);
    }

    pub fn begin(&mut self) -> Result<(), CormError> {
        let result = self.conn.begin().map_err(CormError::exec);
        self.record("begin", result)
    }

    pub fn commit(&mut self) -> Result<(), CormError> {
        let result = self.conn.commit().map_err(CormError::exec);
        self.record("commit", result)
    }

    pub fn rollback(&mut self) -> Result<(), CormError> {
        let result = self.conn.rollback().map_err(CormError::exec);
        self.record("rollback", result)
    }

    /// Key generated by the most recent auto-increment insert.
    pub fn last_insert_id(&mut self) -> Result<i64, CormError> {
        let result = self.conn.last_insert_id().map_err(CormError::exec);
        self.record("last_insert_id", result)
    }

    /// Message of the most recent failed operation.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Remember and log a failure before handing it back.
    pub(crate) fn record<T>(&mut self, op: &str, result: Result<T, CormError>) -> Result<T, CormError> {
        if let Err(err) = &result {
            tracing::error!(op, kind = %err.kind, "{}", err.message);
            self.last_error = Some(err.message.clone());
        }
        result
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.driver.name())
            .field("models", &self.registry.len())
            .field("config", &self.config)
            .field("last_error", &self.last_error)
            .finish()
    }
}

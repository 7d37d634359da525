//! Schema synchronization.
//!
//! `Safe` creates every registered table that does not exist yet. `Drop`
//! first drops every registered table, newest registration first, with
//! foreign-key enforcement suspended, then recreates them all. `Migrate`
//! is rejected.

use corm_common::{CormError, SyncMode};

use crate::database::Database;
use crate::sql;

impl Database {
    /// Bring the database schema in line with the registered models.
    pub fn sync(&mut self, mode: SyncMode) -> Result<(), CormError> {
        let result = self.sync_inner(mode);
        self.record("sync", result)
    }

    fn sync_inner(&mut self, mode: SyncMode) -> Result<(), CormError> {
        if mode == SyncMode::Migrate {
            return Err(CormError::unsupported("SyncMode::Migrate is not supported"));
        }
        self.registry.resolve_relationships()?;

        if mode == SyncMode::Drop {
            self.conn.set_foreign_keys(false).map_err(CormError::exec)?;
            let dropped = self.drop_tables();
            let restored = self
                .conn
                .set_foreign_keys(self.config.foreign_keys)
                .map_err(CormError::exec);
            dropped?;
            restored?;
        }

        self.create_missing_tables()
    }

    fn drop_tables(&mut self) -> Result<(), CormError> {
        let Database { conn, arena, registry, .. } = self;
        for entity in registry.entities().iter().rev() {
            let mut sql = arena.scope();
            sql::drop_table(&mut sql, entity.table());
            tracing::debug!(sql = sql.as_str(), "execute");
            conn.execute(sql.as_str()).map_err(CormError::exec)?;
            tracing::info!(table = entity.table(), "dropped table");
        }
        Ok(())
    }

    fn create_missing_tables(&mut self) -> Result<(), CormError> {
        let Database { conn, driver, arena, registry, .. } = self;
        for entity in registry.entities() {
            if conn.table_exists(entity.table()).map_err(CormError::exec)? {
                continue;
            }
            let mut sql = arena.scope();
            sql::create_table(&mut sql, driver.as_ref(), registry, entity);
            tracing::debug!(sql = sql.as_str(), "execute");
            conn.execute(sql.as_str()).map_err(CormError::exec)?;
            tracing::info!(table = entity.table(), "created table");
        }
        Ok(())
    }
}

//! Persistence: save, delete and the primary-key lookups.
//!
//! `save` decides between INSERT and UPDATE by counting rows with the
//! instance's key. Validators run before any SQL is built; a rejection
//! leaves the database untouched. After an auto-increment INSERT the
//! generated key is written back into the instance, which is the only
//! mutation `save` makes.

use std::any::Any;

use corm_common::{CormError, FieldType, Value};

use crate::arena::ArenaScope;
use crate::database::Database;
use crate::db::{Connection, Driver, Statement, Step};
use crate::materialize::collect_rows;
use crate::model::{Entity, Field, Model};
use crate::result::ResultSet;
use crate::sql;

// ── Statement Helpers ──────────────────────────────────────────────────

pub(crate) fn prepare<'c>(conn: &'c mut dyn Connection, sql: &str) -> Result<Box<dyn Statement + 'c>, CormError> {
    tracing::debug!(sql, "prepare");
    conn.prepare(sql).map_err(CormError::prepare)
}

/// Bind `params` to placeholders 1..=n by value type.
pub(crate) fn bind_values(stmt: &mut dyn Statement, params: &[Value]) -> Result<(), CormError> {
    for (i, value) in params.iter().enumerate() {
        let index = i + 1;
        let bound = match value {
            Value::Null => stmt.bind_null(index),
            Value::Int(v) => stmt.bind_int(index, *v),
            Value::Bool(b) => stmt.bind_int(index, i32::from(*b)),
            Value::Int64(v) => stmt.bind_int64(index, *v),
            Value::Float(v) => stmt.bind_double(index, f64::from(*v)),
            Value::Double(v) => stmt.bind_double(index, *v),
            Value::Text(s) => stmt.bind_text(index, s),
            Value::Blob(b) if b.is_empty() => stmt.bind_null(index),
            Value::Blob(b) => stmt.bind_blob(index, b),
        };
        bound.map_err(CormError::bind)?;
    }
    Ok(())
}

/// Read the bindable values of `fields` from an instance.
fn field_values(fields: &[&Field], instance: &dyn Any) -> Result<Vec<Value>, CormError> {
    fields
        .iter()
        .map(|field| {
            if field.is_relation() {
                return Err(CormError::bind(format!(
                    "field '{}' is a relationship and has no column value",
                    field.name()
                )));
            }
            Ok(field.get(instance))
        })
        .collect()
}

/// Run a statement to completion and return the rows it changed.
pub(crate) fn execute(conn: &mut dyn Connection, sql: &str, params: &[Value]) -> Result<u64, CormError> {
    {
        let mut stmt = prepare(&mut *conn, sql)?;
        bind_values(stmt.as_mut(), params)?;
        while stmt.step().map_err(CormError::exec)? == Step::Row {}
    }
    Ok(conn.changes())
}

/// Run a statement and read column 0 of its first row as an integer.
pub(crate) fn query_scalar(conn: &mut dyn Connection, sql: &str, params: &[Value]) -> Result<Option<i64>, CormError> {
    let mut stmt = prepare(conn, sql)?;
    bind_values(stmt.as_mut(), params)?;
    let value = match stmt.step().map_err(CormError::exec)? {
        Step::Row => Some(stmt.column_int64(0)),
        Step::Done => None,
    };
    while stmt.step().map_err(CormError::exec)? == Step::Row {}
    Ok(value)
}

fn pk_field(entity: &Entity) -> Result<&Field, CormError> {
    entity.primary_key().ok_or_else(|| {
        CormError::schema(format!(
            "Model '{}' must have exactly one PRIMARY_KEY field",
            entity.table()
        ))
    })
}

/// A generated key in the primary key's own type.
fn key_value(kind: FieldType, id: i64) -> Result<Value, CormError> {
    match kind {
        FieldType::Int => i32::try_from(id)
            .map(Value::Int)
            .map_err(|_| CormError::exec(format!("generated key {} does not fit a 32-bit primary key", id))),
        _ => Ok(Value::Int64(id)),
    }
}

impl Database {
    /// Run one SELECT built by `build` against entity `entity_idx` and
    /// materialize its rows with their concrete type erased.
    pub(crate) fn fetch_erased(
        &mut self,
        entity_idx: usize,
        params: &[Value],
        build: impl FnOnce(&mut ArenaScope<'_>, &dyn Driver, &Entity),
    ) -> Result<Option<ResultSet<Box<dyn Any>>>, CormError> {
        let Database { conn, driver, allocator, arena, registry, config, .. } = self;
        let entity = registry
            .get(entity_idx)
            .ok_or_else(|| CormError::schema(format!("no model registered at index {}", entity_idx)))?;

        let mut sql = arena.scope();
        build(&mut sql, driver.as_ref(), entity);
        let mut stmt = prepare(conn.as_mut(), sql.as_str())?;
        bind_values(stmt.as_mut(), params)?;
        collect_rows(stmt.as_mut(), entity, allocator, config.result_capacity)
    }

    /// Typed form of [`fetch_erased`](Self::fetch_erased).
    pub(crate) fn fetch<T: Model>(
        &mut self,
        params: &[Value],
        build: impl FnOnce(&mut ArenaScope<'_>, &dyn Driver, &Entity),
    ) -> Result<Option<ResultSet<T>>, CormError> {
        let idx = self.registry.index_of::<T>()?;
        self.fetch_erased(idx, params, build)?
            .map(|rows| rows.downcast::<T>())
            .transpose()
    }

    /// Insert or update `instance`.
    ///
    /// A row with the instance's key means UPDATE of every non-key column;
    /// otherwise INSERT, writing a generated key back into the instance.
    pub fn save<T: Model>(&mut self, instance: &mut T) -> Result<(), CormError> {
        let result = self.save_inner(instance);
        self.record("save", result)
    }

    fn save_inner<T: Model>(&mut self, instance: &mut T) -> Result<(), CormError> {
        let idx = self.registry.index_of::<T>()?;
        let Database { conn, driver, arena, registry, .. } = self;
        let Some(entity) = registry.get(idx) else {
            return Err(CormError::schema("model vanished from registry"));
        };
        let pk = pk_field(entity)?;

        {
            let any: &dyn Any = &*instance;
            for field in entity.columns() {
                field
                    .run_validator(&field.get(any))
                    .map_err(|msg| CormError::validation(field.name(), msg))?;
            }
        }

        let pk_value = pk.get(&*instance);
        let exists = {
            let mut sql = arena.scope();
            sql::count_by_pk(&mut sql, driver.as_ref(), entity);
            query_scalar(conn.as_mut(), sql.as_str(), std::slice::from_ref(&pk_value))?.unwrap_or(0) > 0
        };

        if exists {
            let fields = sql::update_fields(entity);
            if fields.is_empty() {
                return Ok(());
            }
            let mut params = field_values(&fields, &*instance)?;
            params.push(pk_value);
            let mut sql = arena.scope();
            sql::update(&mut sql, driver.as_ref(), entity);
            execute(conn.as_mut(), sql.as_str(), &params)?;
            tracing::debug!(table = entity.table(), "updated row");
            return Ok(());
        }

        let params = field_values(&sql::insert_fields(entity), &*instance)?;
        let mut sql = arena.scope();
        let returning = sql::insert(&mut sql, driver.as_ref(), entity);
        if returning {
            let id = query_scalar(conn.as_mut(), sql.as_str(), &params)?
                .ok_or_else(|| CormError::exec("INSERT ... RETURNING produced no row"))?;
            pk.set(instance, key_value(pk.kind(), id)?);
        } else {
            execute(conn.as_mut(), sql.as_str(), &params)?;
            if pk.is_auto_increment() {
                let id = conn.last_insert_id().map_err(CormError::exec)?;
                pk.set(instance, key_value(pk.kind(), id)?);
            }
        }
        tracing::debug!(table = entity.table(), "inserted row");
        Ok(())
    }

    /// Delete the `T` row with primary key `pk`. Fails with NotFound when
    /// no row matched.
    pub fn delete<T: Model>(&mut self, pk: impl Into<Value>) -> Result<(), CormError> {
        let pk = pk.into();
        let result = self.delete_inner::<T>(&pk);
        self.record("delete", result)
    }

    fn delete_inner<T: Model>(&mut self, pk: &Value) -> Result<(), CormError> {
        let idx = self.registry.index_of::<T>()?;
        let Database { conn, driver, arena, registry, .. } = self;
        let Some(entity) = registry.get(idx) else {
            return Err(CormError::schema("model vanished from registry"));
        };
        let pk_name = pk_field(entity)?.name();

        let mut sql = arena.scope();
        sql::delete_by_pk(&mut sql, driver.as_ref(), entity);
        let changed = execute(conn.as_mut(), sql.as_str(), std::slice::from_ref(pk))?;
        if changed == 0 {
            return Err(CormError::not_found(format!(
                "No row in '{}' with {} = {}",
                entity.table(),
                pk_name,
                pk
            )));
        }
        Ok(())
    }

    /// Load the `T` row with primary key `pk`, or `None`.
    pub fn find<T: Model>(&mut self, pk: impl Into<Value>) -> Result<Option<ResultSet<T>>, CormError> {
        let pk = pk.into();
        let result = self.fetch::<T>(std::slice::from_ref(&pk), |scope, driver, entity| {
            sql::select_by_pk(scope, driver, entity)
        });
        self.record("find", result)
    }

    /// Load every `T` row, or `None` for an empty table.
    pub fn find_all<T: Model>(&mut self) -> Result<Option<ResultSet<T>>, CormError> {
        let result = self.fetch::<T>(&[], |scope, driver, entity| {
            sql::select(scope, driver, entity.table(), sql::SelectParts::default());
        });
        self.record("find_all", result)
    }

    /// One-shot filtered load: `SELECT * FROM "t" WHERE <clause>;` with
    /// `?` markers bound to `params` in order.
    pub fn where_raw<T: Model>(
        &mut self,
        clause: &str,
        params: &[Value],
    ) -> Result<Option<ResultSet<T>>, CormError> {
        self.query::<T>().where_clause(clause, params.to_vec()).exec(self)
    }
}

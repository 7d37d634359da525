//! Query builder.
//!
//! A [`Query`] collects a WHERE fragment with `?` markers and its
//! parameters, an ORDER BY fragment, and LIMIT/OFFSET. Nothing runs until
//! [`Query::exec`], which lowers the request to one SELECT in the handle's
//! dialect and materializes the rows.
//!
//! ```ignore
//! let adults = db
//!     .query::<User>()
//!     .where_clause("age > ? AND is_active = ?", vec![20.into(), true.into()])
//!     .order_by("age DESC")
//!     .limit(2)
//!     .exec(&mut db)?;
//! ```

use std::fmt;
use std::marker::PhantomData;

use corm_common::{CormError, Value};

use crate::database::Database;
use crate::model::Model;
use crate::result::ResultSet;
use crate::sql::{self, SelectParts};

/// A reusable SELECT request for model `T`.
pub struct Query<T> {
    where_clause: Option<String>,
    params: Vec<Value>,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    _model: PhantomData<fn() -> T>,
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Query {
            where_clause: None,
            params: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
            _model: PhantomData,
        }
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Query {
            where_clause: self.where_clause.clone(),
            params: self.params.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
            _model: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &std::any::type_name::<T>())
            .field("where_clause", &self.where_clause)
            .field("params", &self.params)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<T: Model> Query<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with raw SQL. Each `?` outside a string literal is bound to
    /// the next entry of `params`. Replaces any earlier filter.
    pub fn where_clause(mut self, clause: &str, params: Vec<Value>) -> Self {
        self.where_clause = Some(clause.to_string());
        self.params = params;
        self
    }

    /// Raw ORDER BY text, e.g. `"age DESC, name"`.
    pub fn order_by(mut self, order: &str) -> Self {
        self.order_by = Some(order.to_string());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Run the query. `None` means no row matched.
    pub fn exec(&self, db: &mut Database) -> Result<Option<ResultSet<T>>, CormError> {
        let result = self.exec_inner(db);
        db.record("query", result)
    }

    fn exec_inner(&self, db: &mut Database) -> Result<Option<ResultSet<T>>, CormError> {
        let markers = self.where_clause.as_deref().map_or(0, sql::count_markers);
        if markers != self.params.len() {
            return Err(CormError::bind(format!(
                "WHERE clause has {} placeholders but {} parameters were given",
                markers,
                self.params.len()
            )));
        }

        let parts = SelectParts {
            where_clause: self.where_clause.as_deref(),
            order_by: self.order_by.as_deref(),
            limit: self.limit,
            offset: self.offset,
        };
        db.fetch::<T>(&self.params, |scope, driver, entity| {
            sql::select(scope, driver, entity.table(), parts);
        })
    }
}

impl Database {
    /// Start a query over `T`'s table.
    pub fn query<T: Model>(&self) -> Query<T> {
        Query::new()
    }
}

//! Relationship loading.
//!
//! Relationships are never loaded implicitly. [`Database::load_relation`]
//! fills one relationship field of one row of a result:
//!
//! - belongs-to: reads the local foreign key and fetches the target row by
//!   primary key. A zero, false, empty or NULL key means "no relation" and
//!   issues no query.
//! - has-many: fetches every target row whose foreign-key column equals
//!   the owner's primary key and stores the collection and its count.
//!
//! The rows of the sub-result move into the owner instance; its allocation
//! ledger (including its instance buffer charge) is merged into the
//! owner's result so one `free_result` releases everything.

use std::any::Any;

use corm_common::{CormError, FieldType, Value};

use crate::database::Database;
use crate::model::{Field, Model};
use crate::result::ResultSet;
use crate::sql;

/// What [`Database::load_relation`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationLoad {
    /// Belongs-to with an unset foreign key; nothing was queried.
    Absent,
    /// Belongs-to whose foreign key matched no row.
    Missing,
    /// Belongs-to target loaded.
    One,
    /// Has-many collection loaded with this many rows.
    Many(usize),
}

/// Everything needed from the owner's field once the registry borrow ends.
struct Plan {
    field_idx: usize,
    kind: FieldType,
    target: usize,
    /// Local foreign-key value (belongs-to) or owner key (has-many).
    key: Value,
    /// Foreign-key column on the target table (has-many).
    foreign_key: String,
}

fn clear(field: &Field, instance: &mut dyn Any) {
    match field.kind() {
        FieldType::BelongsTo => {
            field.set_related(instance, None);
        }
        FieldType::HasMany => {
            field.set_collection(instance, Vec::new());
        }
        _ => {}
    }
}

impl Database {
    /// Load relationship `field` of row `row` of `result`.
    ///
    /// On failure the relationship is left empty (`None`, or an empty
    /// collection with count 0).
    pub fn load_relation<T: Model>(
        &mut self,
        result: &mut ResultSet<T>,
        row: usize,
        field: &str,
    ) -> Result<RelationLoad, CormError> {
        let outcome = self.load_relation_inner(result, row, field);
        if outcome.is_err() {
            self.clear_relation(result, row, field);
        }
        self.record("load_relation", outcome)
    }

    fn clear_relation<T: Model>(&self, result: &mut ResultSet<T>, row: usize, field: &str) {
        let Ok(owner) = self.registry.index_of::<T>() else {
            return;
        };
        let Some(field) = self.registry.get(owner).and_then(|e| e.field_named(field)) else {
            return;
        };
        if let Some(instance) = result.get_mut(row) {
            clear(field, instance);
        }
    }

    fn plan<T: Model>(&mut self, result: &ResultSet<T>, row: usize, field: &str) -> Result<Plan, CormError> {
        self.registry.resolve_relationships()?;
        let owner = self.registry.index_of::<T>()?;
        let entity = self
            .registry
            .get(owner)
            .ok_or_else(|| CormError::schema("model vanished from registry"))?;

        let field_idx = entity
            .fields()
            .iter()
            .position(|f| f.name() == field)
            .ok_or_else(|| {
                CormError::schema(format!("Model '{}' has no field '{}'", entity.table(), field))
            })?;
        let descriptor = &entity.fields()[field_idx];
        let Some(rel) = descriptor.relation_info() else {
            return Err(CormError::schema(format!(
                "Field '{}' of model '{}' is not a relationship",
                field,
                entity.table()
            )));
        };
        let target = rel.resolved().ok_or_else(|| {
            CormError::schema(format!(
                "Model '{}' field '{}': unresolved relationship target '{}'",
                entity.table(),
                field,
                rel.target
            ))
        })?;

        let instance = result.get(row).ok_or_else(|| {
            CormError::not_found(format!(
                "row {} out of range for a result of {} rows",
                row,
                result.len()
            ))
        })?;

        let key = match descriptor.kind() {
            FieldType::BelongsTo => {
                let fk = entity
                    .field_named(&rel.foreign_key)
                    .filter(|f| !f.is_relation())
                    .ok_or_else(|| {
                        CormError::schema(format!(
                            "Model '{}' has no foreign-key column '{}'",
                            entity.table(),
                            rel.foreign_key
                        ))
                    })?;
                fk.get(instance)
            }
            _ => {
                let pk = entity.primary_key().ok_or_else(|| {
                    CormError::schema(format!(
                        "Model '{}' must have exactly one PRIMARY_KEY field",
                        entity.table()
                    ))
                })?;
                pk.get(instance)
            }
        };

        Ok(Plan {
            field_idx,
            kind: descriptor.kind(),
            target,
            key,
            foreign_key: rel.foreign_key.clone(),
        })
    }

    fn load_relation_inner<T: Model>(
        &mut self,
        result: &mut ResultSet<T>,
        row: usize,
        field: &str,
    ) -> Result<RelationLoad, CormError> {
        let plan = self.plan(result, row, field)?;

        if plan.kind == FieldType::BelongsTo && plan.key.is_unset_key() {
            self.with_field::<T>(plan.field_idx, |f| match result.get_mut(row) {
                Some(instance) => f.set_related(instance, None),
                None => false,
            });
            return Ok(RelationLoad::Absent);
        }

        let params = std::slice::from_ref(&plan.key);
        let fetched = match plan.kind {
            FieldType::BelongsTo => self.fetch_erased(plan.target, params, |scope, driver, entity| {
                sql::select_by_pk(scope, driver, entity)
            })?,
            _ => {
                let foreign_key = plan.foreign_key.as_str();
                self.fetch_erased(plan.target, params, |scope, driver, entity| {
                    sql::select_by_column(scope, driver, entity.table(), foreign_key)
                })?
            }
        };

        let rows = match fetched {
            Some(sub) => {
                let (rows, ledger) = sub.into_parts()?;
                result.tracker_mut().absorb(ledger)?;
                rows
            }
            None => Vec::new(),
        };

        let kind = plan.kind;
        let count = rows.len();
        let stored = self.with_field::<T>(plan.field_idx, |f| {
            let Some(instance) = result.get_mut(row) else {
                return false;
            };
            match kind {
                FieldType::BelongsTo => f.set_related(instance, rows.into_iter().next()),
                _ => f.set_collection(instance, rows),
            }
        });
        if !stored.unwrap_or(false) {
            return Err(CormError::schema(format!(
                "relationship '{}' does not accept rows of the loaded model",
                field
            )));
        }

        Ok(match kind {
            FieldType::BelongsTo if count == 0 => RelationLoad::Missing,
            FieldType::BelongsTo => RelationLoad::One,
            _ => RelationLoad::Many(count),
        })
    }

    fn with_field<T: Model>(&self, field_idx: usize, f: impl FnOnce(&Field) -> bool) -> Option<bool> {
        let owner = self.registry.index_of::<T>().ok()?;
        let field = self.registry.get(owner)?.fields().get(field_idx)?;
        Some(f(field))
    }
}

//! Row-to-struct materialization.
//!
//! Result columns are matched to entity fields by name once per statement.
//! Each row then becomes a fresh instance: values are read with the getter
//! matching the field's semantic type, and every string or blob copy is
//! charged to the result's [`AllocationTracker`] before it is stored.

use std::any::Any;
use std::sync::Arc;

use corm_common::{CormError, FieldType, Value};

use crate::alloc::Allocator;
use crate::db::{ColumnType, Statement, Step};
use crate::model::Entity;
use crate::result::{AllocKind, AllocationTracker, ResultSet};

/// Result column index for each entity field, `None` for relationship
/// fields and for columns the statement does not return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnMap {
    slots: Vec<Option<usize>>,
}

impl ColumnMap {
    pub(crate) fn build(stmt: &dyn Statement, entity: &Entity) -> ColumnMap {
        let names: Vec<&str> = (0..stmt.column_count())
            .map(|i| stmt.column_name(i).unwrap_or(""))
            .collect();
        let slots = entity
            .fields()
            .iter()
            .map(|field| {
                if field.is_relation() {
                    return None;
                }
                let slot = names.iter().position(|n| *n == field.name());
                if slot.is_none() {
                    tracing::warn!(table = entity.table(), "Column '{}' not found in result set", field.name());
                }
                slot
            })
            .collect();
        ColumnMap { slots }
    }
}

/// Read one column as the field's semantic type. NULL reads as [`Value::Null`].
pub(crate) fn read_value(stmt: &dyn Statement, col: usize, kind: FieldType) -> Value {
    if stmt.column_type(col) == ColumnType::Null {
        return Value::Null;
    }
    match kind {
        FieldType::Int => Value::Int(stmt.column_int(col)),
        FieldType::Int64 => Value::Int64(stmt.column_int64(col)),
        FieldType::Float => Value::Float(stmt.column_double(col) as f32),
        FieldType::Double => Value::Double(stmt.column_double(col)),
        FieldType::Bool => Value::Bool(stmt.column_int64(col) != 0),
        FieldType::String => Value::Text(stmt.column_text(col).unwrap_or_default().to_string()),
        FieldType::Blob => Value::Blob(stmt.column_blob(col).into_owned()),
        FieldType::BelongsTo | FieldType::HasMany => Value::Null,
    }
}

/// Build one instance from the current row.
///
/// NULL columns leave the field at its default. A refused string or blob
/// charge aborts the row; charges already made stay in `tracker`.
pub(crate) fn materialize_row(
    stmt: &dyn Statement,
    entity: &Entity,
    map: &ColumnMap,
    tracker: &mut AllocationTracker,
) -> Result<Box<dyn Any>, CormError> {
    let mut instance = entity.instantiate();
    for (field, slot) in entity.fields().iter().zip(&map.slots) {
        let Some(col) = *slot else {
            continue;
        };
        let value = read_value(stmt, col, field.kind());
        match &value {
            Value::Null => continue,
            Value::Text(_) => tracker.alloc(AllocKind::String, value.heap_size() + 1)?,
            Value::Blob(b) if !b.is_empty() => tracker.alloc(AllocKind::Blob, value.heap_size())?,
            _ => {}
        }
        field.set(instance.as_mut(), value);
    }
    Ok(instance)
}

/// Step an executed-on-first-step statement to completion, materializing
/// every row into a new result charged to `allocator`.
///
/// Returns `None` when the statement yields no rows.
pub(crate) fn collect_rows(
    stmt: &mut dyn Statement,
    entity: &Entity,
    allocator: &Arc<dyn Allocator>,
    ledger_capacity: usize,
) -> Result<Option<ResultSet<Box<dyn Any>>>, CormError> {
    let tracker = AllocationTracker::create(Arc::clone(allocator), ledger_capacity);
    let mut result: ResultSet<Box<dyn Any>> = ResultSet::new(entity.table(), entity.struct_size(), tracker);
    let mut map = None;

    loop {
        match stmt.step().map_err(CormError::exec)? {
            Step::Done => break,
            Step::Row => {}
        }
        let map = map.get_or_insert_with(|| ColumnMap::build(stmt, entity));
        let instance = materialize_row(stmt, entity, map, result.tracker_mut())?;
        result.push(instance)?;
    }

    if result.is_empty() {
        return Ok(None);
    }
    Ok(Some(result))
}

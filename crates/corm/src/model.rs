//! Model declarations: entity and field descriptors.
//!
//! A model is any `Default + 'static` struct that implements [`Model`].
//! Its [`Entity`] lists one [`Field`] per column or relationship. Each
//! column field carries a typed get/set closure pair, so the engine reads
//! and writes struct members through `&dyn Any` without knowing the
//! concrete type.
//!
//! ```ignore
//! #[derive(Default)]
//! struct User { id: i32, name: String }
//!
//! impl Model for User {
//!     fn describe() -> Entity {
//!         Entity::new::<User>("User")
//!             .field(Field::new("id", |u: &User| u.id, |u: &mut User, v| u.id = v)
//!                 .primary_key()
//!                 .auto_increment())
//!             .field(Field::new("name", |u: &User| u.name.clone(), |u: &mut User, v| u.name = v)
//!                 .max_length(50))
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;

use corm_common::{ColumnValue, FieldFlags, FieldType, OnDelete, Value};

/// A type the engine can persist.
pub trait Model: Any + Default {
    /// Build the entity descriptor for this type.
    fn describe() -> Entity;
}

/// Field validator: inspects the value about to be written and returns
/// an error message to reject it.
pub type Validator = Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

type Getter = Box<dyn Fn(&dyn Any) -> Value + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Any, Value) + Send + Sync>;
type OneSetter = Box<dyn Fn(&mut dyn Any, Option<Box<dyn Any>>) -> bool + Send + Sync>;
type ManySetter = Box<dyn Fn(&mut dyn Any, Vec<Box<dyn Any>>) -> bool + Send + Sync>;
type CountSetter = Box<dyn Fn(&mut dyn Any, i32) + Send + Sync>;

enum Access {
    Column { get: Getter, set: Setter },
    BelongsTo { set: OneSetter },
    HasMany { set: ManySetter, set_count: CountSetter },
}

/// Relationship metadata of a `BelongsTo` or `HasMany` field.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Table name of the related entity.
    pub target: String,
    /// Belongs-to: the local column holding the key.
    /// Has-many: the column on the target that points back here.
    pub foreign_key: String,
    pub on_delete: OnDelete,
    pub(crate) target_type: TypeId,
    /// Registry index of the target, set by relationship resolution.
    pub(crate) resolved: Option<usize>,
}

impl Relation {
    pub fn resolved(&self) -> Option<usize> {
        self.resolved
    }
}

// ── Field ──────────────────────────────────────────────────────────────

/// One column or relationship of an entity.
pub struct Field {
    name: String,
    kind: FieldType,
    flags: FieldFlags,
    max_length: Option<usize>,
    validator: Option<Validator>,
    relation: Option<Relation>,
    access: Access,
}

impl Field {
    /// A column backed by a struct member. The SQL type follows the Rust
    /// type of the member (`i32`, `i64`, `f32`, `f64`, `bool`, `String`,
    /// `Vec<u8>`, or an `Option` of one of them).
    pub fn new<T, V, G, S>(name: &str, get: G, set: S) -> Field
    where
        T: Any,
        V: ColumnValue + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let getter: Getter = Box::new(move |instance: &dyn Any| {
            match instance.downcast_ref::<T>() {
                Some(t) => get(t).into_value(),
                None => Value::Null,
            }
        });
        let setter: Setter = Box::new(move |instance: &mut dyn Any, value: Value| {
            if let (Some(t), Some(v)) = (instance.downcast_mut::<T>(), V::from_value(value)) {
                set(t, v);
            }
        });
        Field {
            name: name.to_string(),
            kind: V::FIELD_TYPE,
            flags: FieldFlags::NONE,
            max_length: None,
            validator: None,
            relation: None,
            access: Access::Column {
                get: getter,
                set: setter,
            },
        }
    }

    /// Many-to-one reference loaded through the local `foreign_key`
    /// column.
    pub fn belongs_to<T, U, S>(name: &str, target: &str, foreign_key: &str, set: S) -> Field
    where
        T: Any,
        U: Any,
        S: Fn(&mut T, Option<U>) + Send + Sync + 'static,
    {
        let setter: OneSetter = Box::new(move |instance: &mut dyn Any, related: Option<Box<dyn Any>>| {
            let Some(t) = instance.downcast_mut::<T>() else {
                return false;
            };
            match related.map(|r| r.downcast::<U>()) {
                None => {
                    set(t, None);
                    true
                }
                Some(Ok(u)) => {
                    set(t, Some(*u));
                    true
                }
                Some(Err(_)) => {
                    set(t, None);
                    false
                }
            }
        });
        Field::relation(
            name,
            FieldType::BelongsTo,
            Relation {
                target: target.to_string(),
                foreign_key: foreign_key.to_string(),
                on_delete: OnDelete::NoAction,
                target_type: TypeId::of::<U>(),
                resolved: None,
            },
            Access::BelongsTo { set: setter },
        )
    }

    /// One-to-many collection of `target` rows whose `foreign_key` column
    /// equals this entity's primary key. `set_count` receives the number
    /// of loaded rows.
    pub fn has_many<T, U, S, C>(
        name: &str,
        target: &str,
        foreign_key: &str,
        set: S,
        set_count: C,
    ) -> Field
    where
        T: Any,
        U: Any,
        S: Fn(&mut T, Vec<U>) + Send + Sync + 'static,
        C: Fn(&mut T, i32) + Send + Sync + 'static,
    {
        let setter: ManySetter = Box::new(move |instance: &mut dyn Any, related: Vec<Box<dyn Any>>| {
            let Some(t) = instance.downcast_mut::<T>() else {
                return false;
            };
            let mut items = Vec::with_capacity(related.len());
            for row in related {
                match row.downcast::<U>() {
                    Ok(u) => items.push(*u),
                    Err(_) => {
                        set(t, Vec::new());
                        return false;
                    }
                }
            }
            set(t, items);
            true
        });
        let count: CountSetter = Box::new(move |instance: &mut dyn Any, n: i32| {
            if let Some(t) = instance.downcast_mut::<T>() {
                set_count(t, n);
            }
        });
        Field::relation(
            name,
            FieldType::HasMany,
            Relation {
                target: target.to_string(),
                foreign_key: foreign_key.to_string(),
                on_delete: OnDelete::NoAction,
                target_type: TypeId::of::<U>(),
                resolved: None,
            },
            Access::HasMany {
                set: setter,
                set_count: count,
            },
        )
    }

    fn relation(name: &str, kind: FieldType, relation: Relation, access: Access) -> Field {
        Field {
            name: name.to_string(),
            kind,
            flags: FieldFlags::NONE,
            max_length: None,
            validator: None,
            relation: Some(relation),
            access,
        }
    }

    pub fn primary_key(self) -> Self {
        self.flags(FieldFlags::PRIMARY_KEY)
    }

    pub fn auto_increment(self) -> Self {
        self.flags(FieldFlags::AUTO_INCREMENT)
    }

    pub fn not_null(self) -> Self {
        self.flags(FieldFlags::NOT_NULL)
    }

    pub fn unique(self) -> Self {
        self.flags(FieldFlags::UNIQUE)
    }

    pub fn flags(mut self, flags: FieldFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Bound a string column. Only affects the generated column type.
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Delete action of a belongs-to foreign key. Ignored elsewhere.
    pub fn on_delete(mut self, action: OnDelete) -> Self {
        if let Some(rel) = self.relation.as_mut() {
            rel.on_delete = action;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldType {
        self.kind
    }

    pub fn field_flags(&self) -> FieldFlags {
        self.flags
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_length
    }

    pub fn relation_info(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }

    pub(crate) fn relation_mut(&mut self) -> Option<&mut Relation> {
        self.relation.as_mut()
    }

    pub fn is_primary_key(&self) -> bool {
        self.flags.contains(FieldFlags::PRIMARY_KEY)
    }

    pub fn is_auto_increment(&self) -> bool {
        self.flags.contains(FieldFlags::AUTO_INCREMENT)
    }

    pub fn is_relation(&self) -> bool {
        self.kind.is_relation()
    }

    /// Read the column value out of an instance. Relationships read as NULL.
    pub(crate) fn get(&self, instance: &dyn Any) -> Value {
        match &self.access {
            Access::Column { get, .. } => get(instance),
            _ => Value::Null,
        }
    }

    /// Write a materialized value into an instance.
    pub(crate) fn set(&self, instance: &mut dyn Any, value: Value) {
        if let Access::Column { set, .. } = &self.access {
            set(instance, value);
        }
    }

    /// Store (or clear) the target of a belongs-to field.
    pub(crate) fn set_related(&self, instance: &mut dyn Any, related: Option<Box<dyn Any>>) -> bool {
        match &self.access {
            Access::BelongsTo { set } => set(instance, related),
            _ => false,
        }
    }

    /// Store a has-many collection together with its count.
    pub(crate) fn set_collection(&self, instance: &mut dyn Any, related: Vec<Box<dyn Any>>) -> bool {
        match &self.access {
            Access::HasMany { set, set_count } => {
                let count = i32::try_from(related.len()).unwrap_or(i32::MAX);
                if set(&mut *instance, related) {
                    set_count(instance, count);
                    true
                } else {
                    set_count(instance, 0);
                    false
                }
            }
            _ => false,
        }
    }

    pub(crate) fn run_validator(&self, value: &Value) -> Result<(), String> {
        match &self.validator {
            Some(v) => v(value),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("max_length", &self.max_length)
            .field("validator", &self.validator.is_some())
            .field("relation", &self.relation)
            .finish()
    }
}

// ── Entity ─────────────────────────────────────────────────────────────

fn construct<T: Any + Default>() -> Box<dyn Any> {
    Box::new(T::default())
}

/// Table-level description of a model.
pub struct Entity {
    table: String,
    type_id: TypeId,
    type_name: &'static str,
    struct_size: usize,
    construct: fn() -> Box<dyn Any>,
    fields: Vec<Field>,
    /// Index of the primary-key field, set at registration.
    pub(crate) primary_key: Option<usize>,
}

impl Entity {
    pub fn new<T: Any + Default>(table: &str) -> Entity {
        Entity {
            table: table.to_string(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            struct_size: std::mem::size_of::<T>(),
            construct: construct::<T>,
            fields: Vec::new(),
            primary_key: None,
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn struct_size(&self) -> usize {
        self.struct_size
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column fields, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_relation())
    }

    /// The resolved primary-key field. `None` before registration.
    pub fn primary_key(&self) -> Option<&Field> {
        self.primary_key.map(|i| &self.fields[i])
    }

    /// Number of fields flagged as primary key.
    pub(crate) fn primary_key_count(&self) -> usize {
        self.fields.iter().filter(|f| f.is_primary_key()).count()
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Any> {
        (self.construct)()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.table)
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Item {
        id: i64,
        label: Option<String>,
        weight: f32,
        payload: Vec<u8>,
        owner: Option<Box<Owner>>,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Owner {
        id: i32,
        items: Vec<Item>,
        item_count: i32,
    }

    fn item_entity() -> Entity {
        Entity::new::<Item>("Item")
            .field(Field::new("id", |i: &Item| i.id, |i: &mut Item, v| i.id = v).primary_key())
            .field(Field::new("label", |i: &Item| i.label.clone(), |i: &mut Item, v| i.label = v))
            .field(Field::new("weight", |i: &Item| i.weight, |i: &mut Item, v| i.weight = v))
            .field(Field::new("payload", |i: &Item| i.payload.clone(), |i: &mut Item, v| i.payload = v))
            .field(
                Field::belongs_to("owner", "Owner", "owner_id", |i: &mut Item, o: Option<Owner>| {
                    i.owner = o.map(Box::new)
                })
                .on_delete(OnDelete::Cascade),
            )
    }

    #[test]
    fn test_field_types_follow_rust_types() {
        let entity = item_entity();
        let kinds: Vec<FieldType> = entity.fields().iter().map(|f| f.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                FieldType::Int64,
                FieldType::String,
                FieldType::Float,
                FieldType::Blob,
                FieldType::BelongsTo,
            ]
        );
        assert_eq!(entity.columns().count(), 4);
        assert_eq!(entity.primary_key_count(), 1);
    }

    #[test]
    fn test_get_and_set_through_any() {
        let entity = item_entity();
        let mut boxed = entity.instantiate();
        let label = entity.field_named("label").unwrap();
        assert_eq!(label.get(boxed.as_ref()), Value::Null);
        label.set(boxed.as_mut(), Value::Text("bolt".into()));
        entity
            .field_named("id")
            .unwrap()
            .set(boxed.as_mut(), Value::Int64(9));
        let item = boxed.downcast::<Item>().unwrap();
        assert_eq!(item.id, 9);
        assert_eq!(item.label.as_deref(), Some("bolt"));
    }

    #[test]
    fn test_set_ignores_mismatched_value() {
        let entity = item_entity();
        let mut boxed = entity.instantiate();
        let weight = entity.field_named("weight").unwrap();
        weight.set(boxed.as_mut(), Value::Text("heavy".into()));
        assert_eq!(weight.get(boxed.as_ref()), Value::Float(0.0));
    }

    #[test]
    fn test_belongs_to_setter() {
        let entity = item_entity();
        let field = entity.field_named("owner").unwrap();
        assert_eq!(field.relation_info().unwrap().on_delete, OnDelete::Cascade);

        let mut item = Item::default();
        let owner: Box<dyn Any> = Box::new(Owner { id: 3, ..Default::default() });
        assert!(field.set_related(&mut item, Some(owner)));
        assert_eq!(item.owner.as_ref().map(|o| o.id), Some(3));

        // wrong type clears the relation
        assert!(!field.set_related(&mut item, Some(Box::new(5u8))));
        assert!(item.owner.is_none());
    }

    #[test]
    fn test_has_many_writes_count() {
        let field = Field::has_many(
            "items",
            "Item",
            "owner_id",
            |o: &mut Owner, items: Vec<Item>| o.items = items,
            |o: &mut Owner, n| o.item_count = n,
        );
        let mut owner = Owner::default();
        let rows: Vec<Box<dyn Any>> = vec![Box::new(Item::default()), Box::new(Item::default())];
        assert!(field.set_collection(&mut owner, rows));
        assert_eq!(owner.items.len(), 2);
        assert_eq!(owner.item_count, 2);
    }

    #[test]
    fn test_validator_runs_on_value() {
        let field = Field::new("id", |i: &Item| i.id, |i: &mut Item, v| i.id = v).validate(|v| match v {
            Value::Int64(n) if *n >= 0 => Ok(()),
            _ => Err("must be non-negative".to_string()),
        });
        assert!(field.run_validator(&Value::Int64(1)).is_ok());
        assert_eq!(
            field.run_validator(&Value::Int64(-1)),
            Err("must be non-negative".to_string())
        );
    }
}

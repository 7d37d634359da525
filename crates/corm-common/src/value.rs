//! Runtime values exchanged between model fields, the binder, and the
//! materializer.

use std::fmt;

use crate::types::FieldType;

/// A single field or parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
}

impl Value {
    /// Whether this value is the "no relation" sentinel of a foreign key:
    /// NULL or the zero value of its type.
    pub fn is_unset_key(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Int(v) => *v == 0,
            Value::Int64(v) => *v == 0,
            Value::Bool(v) => !*v,
            Value::Text(s) => s.is_empty(),
            Value::Blob(b) => b.is_empty(),
            Value::Float(_) | Value::Double(_) => false,
        }
    }

    /// Bytes of heap payload owned by this value.
    pub fn heap_size(&self) -> usize {
        match self {
            Value::Text(s) => s.len(),
            Value::Blob(b) => b.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A Rust type that can back a model column.
///
/// The associated `FIELD_TYPE` decides the SQL column type and the binder
/// used on save. `Option<T>` maps `None` to SQL NULL.
pub trait ColumnValue: Sized {
    const FIELD_TYPE: FieldType;

    fn into_value(self) -> Value;

    /// Convert back from a materialized value. `None` leaves the field
    /// untouched.
    fn from_value(value: Value) -> Option<Self>;
}

impl ColumnValue for i32 {
    const FIELD_TYPE: FieldType = FieldType::Int;

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(v),
            Value::Int64(v) => i32::try_from(v).ok(),
            _ => None,
        }
    }
}

impl ColumnValue for i64 {
    const FIELD_TYPE: FieldType = FieldType::Int64;

    fn into_value(self) -> Value {
        Value::Int64(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int64(v) => Some(v),
            Value::Int(v) => Some(v as i64),
            _ => None,
        }
    }
}

impl ColumnValue for f32 {
    const FIELD_TYPE: FieldType = FieldType::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(v),
            Value::Double(v) => Some(v as f32),
            _ => None,
        }
    }
}

impl ColumnValue for f64 {
    const FIELD_TYPE: FieldType = FieldType::Double;

    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(v),
            Value::Float(v) => Some(v as f64),
            _ => None,
        }
    }
}

impl ColumnValue for bool {
    const FIELD_TYPE: FieldType = FieldType::Bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(v),
            Value::Int(v) => Some(v != 0),
            _ => None,
        }
    }
}

impl ColumnValue for String {
    const FIELD_TYPE: FieldType = FieldType::String;

    fn into_value(self) -> Value {
        Value::Text(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl ColumnValue for Vec<u8> {
    const FIELD_TYPE: FieldType = FieldType::Blob;

    fn into_value(self) -> Value {
        Value::Blob(self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const FIELD_TYPE: FieldType = T::FIELD_TYPE;

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

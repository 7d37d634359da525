//! Semantic field types, constraint flags, and the small enums shared by
//! the model layer and the backends.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// The semantic type of a model field.
///
/// Column types map one-to-one onto SQL columns; `BelongsTo` and `HasMany`
/// describe relationships and never produce a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldType {
    Int,
    Int64,
    Float,
    Double,
    String,
    Bool,
    Blob,
    BelongsTo,
    HasMany,
}

impl FieldType {
    /// True for `BelongsTo` and `HasMany`.
    pub fn is_relation(self) -> bool {
        matches!(self, FieldType::BelongsTo | FieldType::HasMany)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int => "int",
            FieldType::Int64 => "int64",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Bool => "bool",
            FieldType::Blob => "blob",
            FieldType::BelongsTo => "belongs_to",
            FieldType::HasMany => "has_many",
        };
        f.write_str(name)
    }
}

/// Column constraint flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldFlags(u8);

impl FieldFlags {
    pub const NONE: FieldFlags = FieldFlags(0);
    pub const PRIMARY_KEY: FieldFlags = FieldFlags(1 << 0);
    pub const NOT_NULL: FieldFlags = FieldFlags(1 << 1);
    pub const UNIQUE: FieldFlags = FieldFlags(1 << 2);
    pub const AUTO_INCREMENT: FieldFlags = FieldFlags(1 << 3);

    pub fn contains(self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FieldFlags {
    fn bitor_assign(&mut self, rhs: FieldFlags) {
        self.0 |= rhs.0;
    }
}

/// Referential action attached to a belongs-to foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

impl OnDelete {
    /// The clause appended after `REFERENCES ...`, empty for `NoAction`.
    pub fn sql_suffix(self) -> &'static str {
        match self {
            OnDelete::NoAction => "",
            OnDelete::Cascade => " ON DELETE CASCADE",
            OnDelete::SetNull => " ON DELETE SET NULL",
            OnDelete::Restrict => " ON DELETE RESTRICT",
        }
    }
}

/// How `sync` treats existing tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Create missing tables, leave existing ones alone.
    Safe,
    /// Drop every managed table and recreate it.
    Drop,
    /// Schema diffing. Not supported.
    Migrate,
}

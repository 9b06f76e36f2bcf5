//! Column types and the type registry.
//!
//! The engine never interprets native type names itself. It asks a
//! [`TypeRegistry`] for the column type of a logical [`ValueType`] and for
//! the literal used to backfill rows when a column becomes NOT NULL.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::Literal;

/// Logical value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Double,
    Text,
    Varchar,
    Blob,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
}

impl ValueType {
    /// Returns the lowercase name used in edit scripts.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::SmallInt => "small_int",
            Self::Integer => "integer",
            Self::BigInt => "big_int",
            Self::Decimal => "decimal",
            Self::Real => "real",
            Self::Double => "double",
            Self::Text => "text",
            Self::Varchar => "varchar",
            Self::Blob => "blob",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::Json => "json",
        }
    }
}

/// A dialect column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    /// Logical value type.
    pub value_type: ValueType,
    /// Native type name, without parameters.
    pub native: String,
    /// Character or byte length.
    pub length: Option<u32>,
    /// Numeric precision.
    pub precision: Option<u8>,
    /// Numeric scale.
    pub scale: Option<u8>,
}

impl ColumnType {
    /// Creates a column type without parameters.
    #[must_use]
    pub fn new(value_type: ValueType, native: impl Into<String>) -> Self {
        Self {
            value_type,
            native: native.into(),
            length: None,
            precision: None,
            scale: None,
        }
    }

    /// Sets the length.
    #[must_use]
    pub const fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets precision and scale.
    #[must_use]
    pub const fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Whether a foreign key may pair a column of this type with a column of
    /// `other`. Parameters such as length may differ.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.value_type == other.value_type && self.native.eq_ignore_ascii_case(&other.native)
    }

    /// Returns the native type with its parameters, e.g. `VARCHAR(255)`.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match (self.length, self.precision, self.scale) {
            (Some(length), _, _) => format!("{}({length})", self.native),
            (None, Some(p), Some(s)) => format!("{}({p}, {s})", self.native),
            (None, Some(p), None) => format!("{}({p})", self.native),
            _ => self.native.clone(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Maps logical value types to dialect column types.
pub trait TypeRegistry: fmt::Debug + Send + Sync {
    /// Dialect identifier, reported in validation errors.
    fn dialect(&self) -> &str;

    /// Returns the column type used for `value_type`.
    fn get_by_type(&self, value_type: ValueType) -> ColumnType;

    /// Returns the value written into existing rows when a column of this
    /// type becomes NOT NULL.
    fn get_default_value(&self, column_type: &ColumnType) -> Literal {
        standard_default_value(column_type.value_type)
    }

    /// Characters that may not appear in identifiers.
    fn identifier_delimiters(&self) -> &[char] {
        &['"']
    }

    /// Longest identifier the dialect accepts.
    fn max_identifier_length(&self) -> usize {
        64
    }
}

/// Zero value of a logical type.
#[must_use]
pub fn standard_default_value(value_type: ValueType) -> Literal {
    match value_type {
        ValueType::Boolean => Literal::Boolean(false),
        ValueType::SmallInt | ValueType::Integer | ValueType::BigInt | ValueType::Decimal => {
            Literal::Integer(0)
        }
        ValueType::Real | ValueType::Double => Literal::Float(0.0),
        ValueType::Text | ValueType::Varchar | ValueType::Blob => Literal::String(String::new()),
        ValueType::Date => Literal::String("1970-01-01".into()),
        ValueType::Time => Literal::String("00:00:00".into()),
        ValueType::Timestamp => Literal::String("1970-01-01 00:00:00".into()),
        ValueType::Uuid => Literal::String("00000000-0000-0000-0000-000000000000".into()),
        ValueType::Json => Literal::String("{}".into()),
    }
}

/// The built-in registry, using standard SQL type names.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTypes;

impl TypeRegistry for StandardTypes {
    fn dialect(&self) -> &str {
        "generic"
    }

    fn get_by_type(&self, value_type: ValueType) -> ColumnType {
        match value_type {
            ValueType::Boolean => ColumnType::new(value_type, "BOOLEAN"),
            ValueType::SmallInt => ColumnType::new(value_type, "SMALLINT"),
            ValueType::Integer => ColumnType::new(value_type, "INTEGER"),
            ValueType::BigInt => ColumnType::new(value_type, "BIGINT"),
            ValueType::Decimal => ColumnType::new(value_type, "DECIMAL").with_precision(18, 4),
            ValueType::Real => ColumnType::new(value_type, "REAL"),
            ValueType::Double => ColumnType::new(value_type, "DOUBLE PRECISION"),
            ValueType::Text => ColumnType::new(value_type, "TEXT"),
            ValueType::Varchar => ColumnType::new(value_type, "VARCHAR").with_length(255),
            ValueType::Blob => ColumnType::new(value_type, "BLOB"),
            ValueType::Date => ColumnType::new(value_type, "DATE"),
            ValueType::Time => ColumnType::new(value_type, "TIME"),
            ValueType::Timestamp => ColumnType::new(value_type, "TIMESTAMP"),
            ValueType::Uuid => ColumnType::new(value_type, "UUID"),
            ValueType::Json => ColumnType::new(value_type, "JSON"),
        }
    }
}

//! Typed values, column schemas, and assembled tables.
//!
//! The decoder produces neutral column streams: a [`Value`] vector plus a
//! [`SemanticType`] tag per column. Committing to a particular in-memory
//! tabular container is left to callers.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Semantic type of a column, as declared by the model catalog.
///
/// The tags mirror the AMO `ExplicitDataType` codes stored in the
/// relational catalog (2 string, 6 int64, 8 double, 9 datetime,
/// 10 decimal, 11 boolean, 17 bytes); anything else is `Object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    /// 64-bit signed integer.
    Int64,
    /// IEEE 754 double.
    Float64,
    /// UTF-8 string.
    String,
    /// Date/time carried as a raw numeric (see [`windows_ticks_to_datetime`]).
    DateTime,
    /// Fixed-point decimal, materialized as a scaled double.
    Decimal,
    /// Boolean.
    Boolean,
    /// Raw byte payload.
    Bytes,
    /// Untyped / unrecognized.
    Object,
}

impl SemanticType {
    /// Maps an AMO `ExplicitDataType` code to a semantic tag.
    pub fn from_amo_code(code: i64) -> SemanticType {
        match code {
            2 => SemanticType::String,
            6 => SemanticType::Int64,
            8 => SemanticType::Float64,
            9 => SemanticType::DateTime,
            10 => SemanticType::Decimal,
            11 => SemanticType::Boolean,
            17 => SemanticType::Bytes,
            _ => SemanticType::Object,
        }
    }

    /// Short lower-case name used in schema listings and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            SemanticType::Int64 => "int64",
            SemanticType::Float64 => "float64",
            SemanticType::String => "string",
            SemanticType::DateTime => "datetime",
            SemanticType::Decimal => "decimal",
            SemanticType::Boolean => "bool",
            SemanticType::Bytes => "bytes",
            SemanticType::Object => "object",
        }
    }
}

/// A single decoded cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value (null dictionary entry or substituted column).
    Null,
    /// Integer value.
    Int(i64),
    /// Floating-point value (also carries DateTime serials and scaled
    /// decimals).
    Double(f64),
    /// String value.
    Text(String),
    /// Boolean value.
    Bool(bool),
}

impl Value {
    /// Whether this value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Casts a decoded raw value to the column's declared semantic type.
    ///
    /// Dictionary lookups produce strings, longs, or reals; the scaled
    /// path produces reals. The cast narrows those to the catalog's
    /// declaration: longs become booleans for `Boolean` columns, numerics
    /// widen to doubles for `Float64`/`Decimal`/`DateTime`, and anything
    /// already matching passes through unchanged.
    pub fn cast(self, ty: SemanticType) -> Value {
        match (ty, self) {
            (_, Value::Null) => Value::Null,
            (SemanticType::Boolean, Value::Int(v)) => Value::Bool(v != 0),
            (SemanticType::Float64 | SemanticType::Decimal | SemanticType::DateTime, Value::Int(v)) => {
                Value::Double(v as f64)
            }
            (SemanticType::Int64, Value::Double(v)) if v.fract() == 0.0 => Value::Int(v as i64),
            (_, v) => v,
        }
    }
}

/// One decoded column: name, declared type, and materialized values.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name as declared by the catalog.
    pub name: String,
    /// Declared semantic type.
    pub semantic_type: SemanticType,
    /// Decoded values in segment emission order.
    pub values: Vec<Value>,
}

/// A decoded table: columns in catalog `storage_position` order, all of
/// equal length.
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Decoded columns.
    pub columns: Vec<Column>,
}

impl Table {
    /// Number of rows (length shared by every column).
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One row of the model schema listing.
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    /// Table name.
    pub table: String,
    /// Column name.
    pub column: String,
    /// Declared semantic type.
    pub semantic_type: SemanticType,
}

/// Converts a Windows-epoch timestamp (100-nanosecond ticks since
/// 1601-01-01T00:00:00Z) to a calendar date.
///
/// The decoder leaves DateTime columns as raw numerics; callers that know
/// a column carries ticks apply this at the edge.
pub fn windows_ticks_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    let epoch = Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).single()?;
    let micros = ticks / 10;
    epoch.checked_add_signed(Duration::microseconds(micros))
}

use std::fmt;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::SubsecRound;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Runtime tag of every scalar type the engine can persist.
///
/// Display names follow the relational store's own type names so log lines
/// and errors read the same as the table definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Uuid,
    Timestamp,
    Date,
    Bytes,
    Json,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 12] = [
        PrimitiveType::Bool,
        PrimitiveType::Int16,
        PrimitiveType::Int32,
        PrimitiveType::Int64,
        PrimitiveType::Float32,
        PrimitiveType::Float64,
        PrimitiveType::Text,
        PrimitiveType::Uuid,
        PrimitiveType::Timestamp,
        PrimitiveType::Date,
        PrimitiveType::Bytes,
        PrimitiveType::Json,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int16 => "int2",
            PrimitiveType::Int32 => "int4",
            PrimitiveType::Int64 => "int8",
            PrimitiveType::Float32 => "float4",
            PrimitiveType::Float64 => "float8",
            PrimitiveType::Text => "text",
            PrimitiveType::Uuid => "uuid",
            PrimitiveType::Timestamp => "timestamptz",
            PrimitiveType::Date => "date",
            PrimitiveType::Bytes => "bytea",
            PrimitiveType::Json => "jsonb",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded scalar value. Absence (SQL NULL, missing cache entry) is
/// modelled as `Option<Value>` at every call site, never as a variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Value::Bool(_) => PrimitiveType::Bool,
            Value::Int16(_) => PrimitiveType::Int16,
            Value::Int32(_) => PrimitiveType::Int32,
            Value::Int64(_) => PrimitiveType::Int64,
            Value::Float32(_) => PrimitiveType::Float32,
            Value::Float64(_) => PrimitiveType::Float64,
            Value::Text(_) => PrimitiveType::Text,
            Value::Uuid(_) => PrimitiveType::Uuid,
            Value::Timestamp(_) => PrimitiveType::Timestamp,
            Value::Date(_) => PrimitiveType::Date,
            Value::Bytes(_) => PrimitiveType::Bytes,
            Value::Json(_) => PrimitiveType::Json,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Rust types that map one-to-one onto a [`PrimitiveType`].
///
/// Typed field handles use this to convert between the cache's dynamic
/// [`Value`] and the caller's static type.
pub trait Primitive: Sized + Send + Sync + 'static {
    const TYPE: PrimitiveType;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_primitive {
    ($rust:ty, $variant:ident) => {
        impl Primitive for $rust {
            const TYPE: PrimitiveType = PrimitiveType::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$rust> for Value {
            fn from(v: $rust) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_primitive!(bool, Bool);
impl_primitive!(i16, Int16);
impl_primitive!(i32, Int32);
impl_primitive!(i64, Int64);
impl_primitive!(f32, Float32);
impl_primitive!(f64, Float64);
impl_primitive!(String, Text);
impl_primitive!(Uuid, Uuid);
impl_primitive!(NaiveDate, Date);
impl_primitive!(Vec<u8>, Bytes);
impl_primitive!(serde_json::Value, Json);

/// Timestamps are stored with microsecond precision, so conversion truncates
/// to what every process will decode back.
impl Primitive for DateTime<Utc> {
    const TYPE: PrimitiveType = PrimitiveType::Timestamp;

    fn into_value(self) -> Value {
        Value::Timestamp(self.trunc_subsecs(6))
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        v.into_value()
    }
}

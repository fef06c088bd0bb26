//! Canonical text codecs for every persisted scalar.
//!
//! The text produced by an encoder must match, byte for byte, what the
//! change-capture trigger emits for the same column (`json_each_text` over
//! `row_to_json`), because notification payloads are decoded with the same
//! functions and old/new columns are compared as raw text.

use std::collections::HashMap;
use std::fmt;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::Timelike;
use chrono::Utc;
use tracing::trace;
use uuid::Uuid;

use super::PrimitiveType;
use super::Value;
use crate::CodecError;
use crate::SchemaError;

pub type EncodeFn = fn(&Value) -> Result<String, CodecError>;
pub type DecodeFn = fn(&str) -> Result<Value, CodecError>;

/// Codec and nullability rules for one primitive type.
#[derive(Clone)]
pub struct PrimitiveDescriptor {
    pub ty: PrimitiveType,
    pub encode: EncodeFn,
    pub decode: DecodeFn,
    pub nullable: bool,
    /// Substituted when a non-nullable column or cache entry has no text.
    pub default_value: Option<Value>,
}

impl fmt::Debug for PrimitiveDescriptor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PrimitiveDescriptor")
            .field("ty", &self.ty)
            .field("nullable", &self.nullable)
            .field("default_value", &self.default_value)
            .finish_non_exhaustive()
    }
}

/// Explicit, constructor-injected registry of primitive codecs.
///
/// Built once at startup and shared behind an `Arc`; it is never mutated
/// after the engine starts.
#[derive(Debug, Default, Clone)]
pub struct PrimitiveRegistry {
    descriptors: HashMap<PrimitiveType, PrimitiveDescriptor>,
}

impl PrimitiveRegistry {
    /// An empty registry. Every field declared against it fails until the
    /// matching descriptor is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in descriptor of every
    /// [`PrimitiveType`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for ty in PrimitiveType::ALL {
            registry
                .descriptors
                .insert(ty, builtin_descriptor(ty));
        }
        registry
    }

    /// Registers a descriptor. Each primitive type may be registered once.
    pub fn register(
        &mut self,
        descriptor: PrimitiveDescriptor,
    ) -> Result<(), SchemaError> {
        if self.descriptors.contains_key(&descriptor.ty) {
            return Err(SchemaError::Duplicate(format!(
                "primitive {} already registered",
                descriptor.ty
            )));
        }
        trace!(ty = %descriptor.ty, nullable = descriptor.nullable, "primitive registered");
        self.descriptors.insert(descriptor.ty, descriptor);
        Ok(())
    }

    pub fn is_known(
        &self,
        ty: PrimitiveType,
    ) -> bool {
        self.descriptors.contains_key(&ty)
    }

    pub fn descriptor(
        &self,
        ty: PrimitiveType,
    ) -> Result<&PrimitiveDescriptor, CodecError> {
        self.descriptors.get(&ty).ok_or(CodecError::UnknownType(ty))
    }

    pub fn is_nullable(
        &self,
        ty: PrimitiveType,
    ) -> Result<bool, CodecError> {
        Ok(self.descriptor(ty)?.nullable)
    }

    pub fn default_value(
        &self,
        ty: PrimitiveType,
    ) -> Option<Value> {
        self.descriptors.get(&ty).and_then(|d| d.default_value.clone())
    }

    /// Encodes a value to its canonical text. `None` encodes to `None`.
    pub fn encode(
        &self,
        value: Option<&Value>,
    ) -> Result<Option<String>, CodecError> {
        match value {
            None => Ok(None),
            Some(v) => {
                let descriptor = self.descriptor(v.primitive_type())?;
                (descriptor.encode)(v).map(Some)
            }
        }
    }

    /// Encodes a value that must be of the declared type.
    pub fn encode_as(
        &self,
        ty: PrimitiveType,
        value: Option<&Value>,
    ) -> Result<Option<String>, CodecError> {
        match value {
            None => {
                if self.descriptor(ty)?.nullable {
                    Ok(None)
                } else {
                    Err(CodecError::NotNullable(ty))
                }
            }
            Some(v) if v.primitive_type() != ty => Err(CodecError::TypeMismatch {
                expected: ty,
                found: v.primitive_type(),
            }),
            Some(v) => self.encode(Some(v)),
        }
    }

    /// Decodes canonical text. Missing text yields `None` for nullable
    /// types and the descriptor default otherwise.
    pub fn decode(
        &self,
        ty: PrimitiveType,
        text: Option<&str>,
    ) -> Result<Option<Value>, CodecError> {
        let descriptor = self.descriptor(ty)?;
        match text {
            Some(t) => (descriptor.decode)(t).map(Some),
            None if descriptor.nullable => Ok(None),
            None => Ok(descriptor.default_value.clone()),
        }
    }
}

fn builtin_descriptor(ty: PrimitiveType) -> PrimitiveDescriptor {
    let (encode, decode, nullable, default_value): (EncodeFn, DecodeFn, bool, Option<Value>) =
        match ty {
            PrimitiveType::Bool => (encode_bool, decode_bool, false, Some(Value::Bool(false))),
            PrimitiveType::Int16 => (encode_int, decode_i16, false, Some(Value::Int16(0))),
            PrimitiveType::Int32 => (encode_int, decode_i32, false, Some(Value::Int32(0))),
            PrimitiveType::Int64 => (encode_int, decode_i64, false, Some(Value::Int64(0))),
            PrimitiveType::Float32 => (encode_float, decode_f32, false, Some(Value::Float32(0.0))),
            PrimitiveType::Float64 => (encode_float, decode_f64, false, Some(Value::Float64(0.0))),
            PrimitiveType::Text => (encode_text, decode_text, true, None),
            PrimitiveType::Uuid => (encode_uuid, decode_uuid, true, None),
            PrimitiveType::Timestamp => (encode_timestamp, decode_timestamp, true, None),
            PrimitiveType::Date => (encode_date, decode_date, true, None),
            PrimitiveType::Bytes => (encode_bytes, decode_bytes, true, None),
            PrimitiveType::Json => (encode_json, decode_json, true, None),
        };
    PrimitiveDescriptor {
        ty,
        encode,
        decode,
        nullable,
        default_value,
    }
}

fn malformed(
    ty: PrimitiveType,
    text: &str,
    reason: impl ToString,
) -> CodecError {
    CodecError::Malformed {
        ty,
        text: text.to_string(),
        reason: reason.to_string(),
    }
}

fn mismatch(
    expected: PrimitiveType,
    value: &Value,
) -> CodecError {
    CodecError::TypeMismatch {
        expected,
        found: value.primitive_type(),
    }
}

fn encode_bool(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        other => Err(mismatch(PrimitiveType::Bool, other)),
    }
}

// Plain SELECT text output renders booleans as t/f.
fn decode_bool(text: &str) -> Result<Value, CodecError> {
    match text {
        "true" | "t" => Ok(Value::Bool(true)),
        "false" | "f" => Ok(Value::Bool(false)),
        _ => Err(malformed(PrimitiveType::Bool, text, "expected true or false")),
    }
}

fn encode_int(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Int16(v) => Ok(v.to_string()),
        Value::Int32(v) => Ok(v.to_string()),
        Value::Int64(v) => Ok(v.to_string()),
        other => Err(mismatch(PrimitiveType::Int64, other)),
    }
}

fn decode_i16(text: &str) -> Result<Value, CodecError> {
    text.parse()
        .map(Value::Int16)
        .map_err(|e| malformed(PrimitiveType::Int16, text, e))
}

fn decode_i32(text: &str) -> Result<Value, CodecError> {
    text.parse()
        .map(Value::Int32)
        .map_err(|e| malformed(PrimitiveType::Int32, text, e))
}

fn decode_i64(text: &str) -> Result<Value, CodecError> {
    text.parse()
        .map(Value::Int64)
        .map_err(|e| malformed(PrimitiveType::Int64, text, e))
}

/// Shortest round-trip text in PostgreSQL's layout: fixed notation while
/// the decimal exponent lies in `-4..fixed_below`, otherwise `1.5e+20` style
/// with at least two exponent digits.
fn float_text<T>(
    v: T,
    fixed_below: i32,
) -> String
where
    T: Copy + Into<f64> + fmt::Display + fmt::LowerExp,
{
    let wide: f64 = v.into();
    if wide.is_nan() {
        return "NaN".to_string();
    }
    if wide.is_infinite() {
        return if wide > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if wide == 0.0 {
        return v.to_string();
    }
    let scientific = format!("{v:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return v.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return v.to_string();
    };
    if (-4..fixed_below).contains(&exponent) {
        return v.to_string();
    }
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.abs())
}

fn encode_float(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Float32(v) => Ok(float_text(*v, 6)),
        Value::Float64(v) => Ok(float_text(*v, 15)),
        other => Err(mismatch(PrimitiveType::Float64, other)),
    }
}

fn decode_f32(text: &str) -> Result<Value, CodecError> {
    text.parse()
        .map(Value::Float32)
        .map_err(|e| malformed(PrimitiveType::Float32, text, e))
}

fn decode_f64(text: &str) -> Result<Value, CodecError> {
    text.parse()
        .map(Value::Float64)
        .map_err(|e| malformed(PrimitiveType::Float64, text, e))
}

fn encode_text(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        other => Err(mismatch(PrimitiveType::Text, other)),
    }
}

fn decode_text(text: &str) -> Result<Value, CodecError> {
    Ok(Value::Text(text.to_string()))
}

fn encode_uuid(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Uuid(u) => Ok(u.hyphenated().to_string()),
        other => Err(mismatch(PrimitiveType::Uuid, other)),
    }
}

fn decode_uuid(text: &str) -> Result<Value, CodecError> {
    Uuid::parse_str(text)
        .map(Value::Uuid)
        .map_err(|e| malformed(PrimitiveType::Uuid, text, e))
}

/// `row_to_json` renders timestamptz with microsecond precision, trailing
/// fractional zeros trimmed, and an explicit `+00:00` offset for UTC.
/// Finer values are refused; the store would round them and every reader
/// would decode a different instant than the writer cached.
fn encode_timestamp(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Timestamp(ts) if ts.nanosecond() % 1_000 != 0 => Err(CodecError::Unrepresentable {
            ty: PrimitiveType::Timestamp,
            reason: format!("{ts:?} is finer than microsecond precision"),
        }),
        Value::Timestamp(ts) => {
            let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();
            let micros = ts.nanosecond() / 1_000;
            if micros != 0 {
                let fraction = format!("{micros:06}");
                out.push('.');
                out.push_str(fraction.trim_end_matches('0'));
            }
            out.push_str("+00:00");
            Ok(out)
        }
        other => Err(mismatch(PrimitiveType::Timestamp, other)),
    }
}

fn decode_timestamp(text: &str) -> Result<Value, CodecError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(Value::Timestamp(ts.with_timezone(&Utc)));
    }
    // Plain SELECT text output: `2024-01-02 03:04:05.12+00`
    if let Ok(ts) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(Value::Timestamp(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Value::Timestamp(naive.and_utc()))
        .map_err(|e| malformed(PrimitiveType::Timestamp, text, e))
}

fn encode_date(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Date(d) => Ok(d.format("%Y-%m-%d").to_string()),
        other => Err(mismatch(PrimitiveType::Date, other)),
    }
}

fn decode_date(text: &str) -> Result<Value, CodecError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|e| malformed(PrimitiveType::Date, text, e))
}

fn encode_bytes(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Bytes(b) => Ok(format!("\\x{}", hex::encode(b))),
        other => Err(mismatch(PrimitiveType::Bytes, other)),
    }
}

fn decode_bytes(text: &str) -> Result<Value, CodecError> {
    let digits = text
        .strip_prefix("\\x")
        .ok_or_else(|| malformed(PrimitiveType::Bytes, text, "missing \\x prefix"))?;
    hex::decode(digits)
        .map(Value::Bytes)
        .map_err(|e| malformed(PrimitiveType::Bytes, text, e))
}

fn encode_json(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Json(j) => {
            serde_json::to_string(j).map_err(|e| CodecError::Serializer(e.to_string()))
        }
        other => Err(mismatch(PrimitiveType::Json, other)),
    }
}

fn decode_json(text: &str) -> Result<Value, CodecError> {
    serde_json::from_str(text)
        .map(Value::Json)
        .map_err(|e| malformed(PrimitiveType::Json, text, e))
}

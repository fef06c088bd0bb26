use chrono::NaiveDate;
use chrono::TimeZone;
use chrono::Utc;
use uuid::Uuid;

use super::*;
use crate::CodecError;

fn roundtrip(
    registry: &PrimitiveRegistry,
    value: Value,
) {
    let ty = value.primitive_type();
    let text = registry.encode(Some(&value)).unwrap();
    let decoded = registry.decode(ty, text.as_deref()).unwrap();
    assert_eq!(decoded, Some(value), "round trip through {text:?}");
}

#[test]
fn test_roundtrip_every_builtin_primitive() {
    let registry = PrimitiveRegistry::with_defaults();
    let ts = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 1).unwrap()
        + chrono::Duration::microseconds(120_500);

    for value in [
        Value::Bool(true),
        Value::Int16(-7),
        Value::Int32(i32::MAX),
        Value::Int64(i64::MIN),
        Value::Float32(1.25),
        Value::Float64(-0.1),
        Value::Float64(f64::INFINITY),
        Value::Text("Ann, with a comma".to_string()),
        Value::Uuid(Uuid::new_v4()),
        Value::Timestamp(ts),
        Value::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
        Value::Bytes(vec![0, 1, 0xfe, 0xff]),
        Value::Json(serde_json::json!({"a": [1, 2, {"b": null}]})),
    ] {
        roundtrip(&registry, value);
    }
}

#[test]
fn test_encoding_matches_row_to_json_text() {
    let registry = PrimitiveRegistry::with_defaults();
    let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        + chrono::Duration::microseconds(120_000);

    let cases = [
        (Value::Bool(false), "false"),
        (Value::Int32(42), "42"),
        (Value::Float64(1.5), "1.5"),
        (Value::Float64(f64::NAN), "NaN"),
        (Value::Timestamp(ts), "2024-01-02T03:04:05.12+00:00"),
        (
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            "2024-01-02T03:04:05+00:00",
        ),
        (Value::Bytes(vec![0xde, 0xad]), "\\xdead"),
    ];
    for (value, expected) in cases {
        assert_eq!(registry.encode(Some(&value)).unwrap().as_deref(), Some(expected));
    }
}

#[test]
fn test_float_text_switches_to_exponent_like_the_store() {
    let registry = PrimitiveRegistry::with_defaults();
    let cases = [
        (Value::Float64(1e-7), "1e-07"),
        (Value::Float64(0.0001), "0.0001"),
        (Value::Float64(-2.5e-5), "-2.5e-05"),
        (Value::Float64(123456789012345.0), "123456789012345"),
        (Value::Float64(1e15), "1e+15"),
        (Value::Float64(1.5e300), "1.5e+300"),
        (Value::Float64(0.0), "0"),
        (Value::Float64(f64::NEG_INFINITY), "-Infinity"),
        (Value::Float32(123456.0), "123456"),
        (Value::Float32(1234567.0), "1.234567e+06"),
        (Value::Float32(f32::NAN), "NaN"),
    ];
    for (value, expected) in cases {
        let text = registry.encode(Some(&value)).unwrap();
        assert_eq!(text.as_deref(), Some(expected));
        if !matches!(value, Value::Float32(v) if v.is_nan()) {
            roundtrip(&registry, value);
        }
    }
}

#[test]
fn test_timestamps_keep_microsecond_precision() {
    let registry = PrimitiveRegistry::with_defaults();
    let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();

    assert!(matches!(
        registry.encode(Some(&Value::Timestamp(precise))),
        Err(CodecError::Unrepresentable {
            ty: PrimitiveType::Timestamp,
            ..
        })
    ));

    let value = precise.into_value();
    assert_eq!(
        value,
        Value::Timestamp(Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap())
    );
    assert_eq!(
        registry.encode(Some(&value)).unwrap().as_deref(),
        Some("2023-11-14T22:13:20.123456+00:00")
    );
    roundtrip(&registry, value);
    assert_eq!(Value::from(precise), precise.into_value());
}

#[test]
fn test_encode_null_is_null() {
    let registry = PrimitiveRegistry::with_defaults();
    assert_eq!(registry.encode(None).unwrap(), None);
}

#[test]
fn test_decode_missing_text_uses_default_for_non_nullable() {
    let registry = PrimitiveRegistry::with_defaults();

    assert_eq!(registry.decode(PrimitiveType::Int64, None).unwrap(), Some(Value::Int64(0)));
    assert_eq!(registry.decode(PrimitiveType::Bool, None).unwrap(), Some(Value::Bool(false)));
    assert_eq!(registry.decode(PrimitiveType::Text, None).unwrap(), None);
    assert_eq!(registry.decode(PrimitiveType::Timestamp, None).unwrap(), None);
}

#[test]
fn test_nullability_rules() {
    let registry = PrimitiveRegistry::with_defaults();
    for ty in [
        PrimitiveType::Bool,
        PrimitiveType::Int16,
        PrimitiveType::Int32,
        PrimitiveType::Int64,
        PrimitiveType::Float32,
        PrimitiveType::Float64,
    ] {
        assert!(!registry.is_nullable(ty).unwrap(), "{ty} must not be nullable");
        assert!(registry.default_value(ty).is_some());
    }
    for ty in [
        PrimitiveType::Text,
        PrimitiveType::Uuid,
        PrimitiveType::Timestamp,
        PrimitiveType::Date,
        PrimitiveType::Bytes,
        PrimitiveType::Json,
    ] {
        assert!(registry.is_nullable(ty).unwrap(), "{ty} must be nullable");
    }
}

#[test]
fn test_decode_foreign_text_fails_loudly() {
    let registry = PrimitiveRegistry::with_defaults();

    assert!(matches!(
        registry.decode(PrimitiveType::Int32, Some("4.5")),
        Err(CodecError::Malformed { .. })
    ));
    assert!(matches!(
        registry.decode(PrimitiveType::Bool, Some("yes")),
        Err(CodecError::Malformed { .. })
    ));
    assert!(matches!(
        registry.decode(PrimitiveType::Bytes, Some("dead")),
        Err(CodecError::Malformed { .. })
    ));
}

#[test]
fn test_decode_accepts_plain_select_text() {
    let registry = PrimitiveRegistry::with_defaults();

    assert_eq!(
        registry.decode(PrimitiveType::Bool, Some("t")).unwrap(),
        Some(Value::Bool(true))
    );
    let ts = registry
        .decode(PrimitiveType::Timestamp, Some("2024-01-02 03:04:05.5+00"))
        .unwrap();
    assert_eq!(
        ts,
        Some(Value::Timestamp(
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::milliseconds(500)
        ))
    );
}

#[test]
fn test_unknown_type_in_empty_registry() {
    let registry = PrimitiveRegistry::new();
    assert!(!registry.is_known(PrimitiveType::Text));
    assert!(matches!(
        registry.decode(PrimitiveType::Text, Some("x")),
        Err(CodecError::UnknownType(PrimitiveType::Text))
    ));
}

#[test]
fn test_register_twice_is_rejected() {
    let mut registry = PrimitiveRegistry::new();
    let descriptor = PrimitiveRegistry::with_defaults()
        .descriptor(PrimitiveType::Int32)
        .unwrap()
        .clone();

    assert!(registry.register(descriptor.clone()).is_ok());
    assert!(registry.is_known(PrimitiveType::Int32));
    assert!(registry.register(descriptor).is_err());
}

#[test]
fn test_encode_as_checks_declared_type() {
    let registry = PrimitiveRegistry::with_defaults();

    assert!(matches!(
        registry.encode_as(PrimitiveType::Int32, Some(&Value::Text("1".into()))),
        Err(CodecError::TypeMismatch { .. })
    ));
    assert!(matches!(
        registry.encode_as(PrimitiveType::Int32, None),
        Err(CodecError::NotNullable(PrimitiveType::Int32))
    ));
    assert_eq!(registry.encode_as(PrimitiveType::Text, None).unwrap(), None);
}

#[test]
fn test_primitive_trait_conversions() {
    assert_eq!(String::from_value(&"Ann".into()), Some("Ann".to_string()));
    assert_eq!(i64::from_value(&Value::Int32(1)), None);
    assert_eq!(42i32.into_value(), Value::Int32(42));
    assert_eq!(<Vec<u8> as Primitive>::TYPE, PrimitiveType::Bytes);
}

#[test]
fn test_json_serializer_roundtrip() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Settings {
        theme: String,
        volume: u8,
    }

    let serializer = JsonSerializer::<Settings>::default();
    let original = Settings {
        theme: "dark".to_string(),
        volume: 7,
    };
    let stored = serializer.serialize(&original).unwrap();
    assert_eq!(serializer.deserialize(stored).unwrap(), original);
}

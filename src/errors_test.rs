use std::time::Duration;

use super::*;

#[test]
fn test_error_fatal() {
    let err = Error::Fatal("listener gone".to_string());
    assert_eq!(err.to_string(), "Fatal error: listener gone");
}

#[test]
fn test_codec_error_malformed() {
    let err = CodecError::Malformed {
        ty: PrimitiveType::Int32,
        text: "abc".to_string(),
        reason: "invalid digit found in string".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("\"abc\""));
    assert!(msg.contains("int4"));
}

#[test]
fn test_codec_error_converts_into_model_error() {
    let err: Error = CodecError::UnknownType(PrimitiveType::Json).into();
    assert!(matches!(err, Error::Model(ModelError::Codec(CodecError::UnknownType(_)))));
}

#[test]
fn test_schema_error_unknown_field() {
    let err = SchemaError::UnknownField {
        entity: "user".to_string(),
        field: "nickname".to_string(),
    };
    assert_eq!(err.to_string(), "Entity type user has no field named nickname");
}

#[test]
fn test_key_error_converts_into_model_error() {
    let err: Error = KeyError::Malformed("a:b".to_string()).into();
    assert!(matches!(err, Error::Model(ModelError::Key(KeyError::Malformed(_)))));
}

#[test]
fn test_store_error_converts_into_system_error() {
    let err: Error = StoreError::Timeout(Duration::from_millis(250)).into();
    match err {
        Error::System(SystemError::Store(StoreError::Timeout(d))) => {
            assert_eq!(d, Duration::from_millis(250))
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_write_error_converts_into_system_error() {
    let err: Error = WriteError::Closed.into();
    assert_eq!(err.to_string(), "Write path error: Write path is closed");
}

#[test]
fn test_listener_error_connection_lost() {
    let err = ListenerError::ConnectionLost("cellsync_changes".to_string());
    assert_eq!(err.to_string(), "Subscription to cellsync_changes lost");
}

#[test]
fn test_serde_error_is_listener_row_diff() {
    let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: Error = parse_err.into();
    assert!(matches!(err, Error::Listener(ListenerError::RowDiff(_))));
}

use super::Primitive;
use crate::CodecError;

/// Pluggable codec for field types that are not primitives themselves.
///
/// The serializer maps the application type onto a primitive that the
/// registry knows how to persist; the engine only ever sees the primitive.
pub trait ValueSerializer: Send + Sync + 'static {
    type Target: Send + Sync + 'static;
    type Stored: Primitive;

    fn serialize(
        &self,
        value: &Self::Target,
    ) -> Result<Self::Stored, CodecError>;

    fn deserialize(
        &self,
        stored: Self::Stored,
    ) -> Result<Self::Target, CodecError>;
}

/// Stores any serde type as a json primitive.
#[derive(Debug)]
pub struct JsonSerializer<T>(std::marker::PhantomData<fn() -> T>);

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<T> ValueSerializer for JsonSerializer<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    type Target = T;
    type Stored = serde_json::Value;

    fn serialize(
        &self,
        value: &T,
    ) -> Result<serde_json::Value, CodecError> {
        serde_json::to_value(value).map_err(|e| CodecError::Serializer(e.to_string()))
    }

    fn deserialize(
        &self,
        stored: serde_json::Value,
    ) -> Result<T, CodecError> {
        serde_json::from_value(stored).map_err(|e| CodecError::Serializer(e.to_string()))
    }
}

//! Cache Coherence Engine Error Hierarchy
//!
//! Defines the error types for the synchronization engine, categorized by
//! the layer that produced them: the typed data model (codecs, keys, schema
//! declarations), the change listeners, and the infrastructure collaborators
//! (relational store, key/value store, write path).

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::primitives::PrimitiveType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (stores, write path, background tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Engine configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Typed data model violations (codecs, keys, entity declarations)
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Change-capture and key-space listener failures
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Primitive encode/decode failures
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Structured key parse failures
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Entity type declaration and field lookup failures
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The primitive type has no registered descriptor
    #[error("Unsupported primitive type: {0}")]
    UnknownType(PrimitiveType),

    /// Text that the paired encoder could never have produced
    #[error("Cannot decode {text:?} as {ty}: {reason}")]
    Malformed {
        ty: PrimitiveType,
        text: String,
        reason: String,
    },

    /// A value handed to an encoder of a different primitive type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: PrimitiveType,
        found: PrimitiveType,
    },

    /// A value the store cannot hold exactly
    #[error("Cannot store {ty} value exactly: {reason}")]
    Unrepresentable {
        ty: PrimitiveType,
        reason: String,
    },

    /// Null passed where the primitive does not allow it
    #[error("Primitive {0} is not nullable")]
    NotNullable(PrimitiveType),

    /// Pluggable serializer failure
    #[error("Serializer failed: {0}")]
    Serializer(String),
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Wire key without the reserved namespace prefix
    #[error("Key {key:?} is outside namespace {namespace:?}")]
    ForeignNamespace { key: String, namespace: String },

    /// Wire key that does not split into the expected components
    #[error("Malformed cache key {0:?}")]
    Malformed(String),

    /// Identifier component that cannot be carried on the wire
    #[error("Invalid key component {component:?}: {reason}")]
    InvalidComponent { component: String, reason: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Field name that the entity type does not declare
    #[error("Entity type {entity} has no field named {field}")]
    UnknownField { entity: String, field: String },

    /// Field accessed through the wrong capability
    #[error("Field {entity}.{field} is a {actual}, not a {requested}")]
    WrongFieldKind {
        entity: String,
        field: String,
        actual: &'static str,
        requested: &'static str,
    },

    /// Typed access with a Rust type that does not match the declaration
    #[error("Field {entity}.{field} holds {declared}, requested {requested}")]
    WrongFieldType {
        entity: String,
        field: String,
        declared: PrimitiveType,
        requested: PrimitiveType,
    },

    /// Two fields (or two entity types) sharing one name
    #[error("Duplicate declaration: {0}")]
    Duplicate(String),

    /// Entity type referenced before registration
    #[error("Entity type {0} is not registered")]
    UnknownEntityType(String),

    /// Relation given an entity of a type other than its declared target
    #[error("Field {field} links to {expected} entities, got a {found}")]
    WrongEntityType {
        field: String,
        expected: String,
        found: String,
    },

    /// Column missing from the live table definition
    #[error("Table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },

    /// Table not present in the relational store
    #[error("Table {0} does not exist")]
    UnknownTable(String),

    /// Malformed `localColumn=foreignColumn` link clause
    #[error("Invalid link clause {0:?}, expected localColumn=foreignColumn")]
    InvalidLink(String),

    /// SQL identifier that is empty or contains reserved characters
    #[error("Invalid identifier {0:?}")]
    InvalidIdentifier(String),

    /// A policy declared on a field kind that cannot honor it
    #[error("Field {field}: {reason}")]
    InvalidPolicy { field: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Change-capture payload without the fixed prefix
    #[error("Malformed notification payload: {0}")]
    MalformedPayload(String),

    /// Operation token outside INSERT/UPDATE/DELETE
    #[error("Unknown operation {0:?}")]
    UnknownOperation(String),

    /// JSON row diff that failed to parse
    #[error("Malformed row diff: {0}")]
    RowDiff(#[from] serde_json::Error),

    /// Timestamp prefix that failed to parse
    #[error("Malformed timestamp {0:?}")]
    Timestamp(String),

    /// The subscriber stream ended without a shutdown request
    #[error("Subscription to {0} lost")]
    ConnectionLost(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Relational store statement failure
    #[error("Relational store error: {0}")]
    Relational(String),

    /// Key/value store failure
    #[error("Cache store error: {0}")]
    Cache(String),

    /// Unique/primary key violation
    #[error("Constraint violation on {table}: {detail}")]
    Constraint { table: String, detail: String },

    /// Store did not answer in time
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Collaborator connection is gone
    #[error("Store connection closed")]
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Submit after the write path was shut down
    #[error("Write path is closed")]
    Closed,

    /// Worker dropped the task without reporting a result
    #[error("Write task was dropped before completion")]
    Dropped,

    /// Drain did not finish within the configured budget
    #[error("Write path drain timed out after {0:?}")]
    DrainTimeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Collaborators
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    // Write path
    #[error("Write path error: {0}")]
    Write(#[from] WriteError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    // Observability
    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

// ============== Conversion Implementations ============== //
impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::System(SystemError::Store(e))
    }
}

impl From<WriteError> for Error {
    fn from(e: WriteError) -> Self {
        Error::System(SystemError::Write(e))
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(e))
    }
}

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Error::System(SystemError::Metrics(e))
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Model(ModelError::Codec(e))
    }
}

impl From<KeyError> for Error {
    fn from(e: KeyError) -> Self {
        Error::Model(ModelError::Key(e))
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Self {
        Error::Model(ModelError::Schema(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Listener(ListenerError::RowDiff(e))
    }
}

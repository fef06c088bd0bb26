//! Collaborator interfaces for the two external sources of truth.
//!
//! The engine never talks to a driver directly. A [`RelationalStore`] runs the
//! small set of structured statements the engine produces and streams change
//! notifications; a [`CacheStore`] is the key/value store holding cache-backed
//! values and publishing key-space events.

mod statement;
pub use statement::*;
#[cfg(test)]
mod statement_test;

use std::collections::BTreeMap;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::key::TableRef;
use crate::Result;

/// One selected row: column name to its text rendering, `None` for NULL.
pub type Row = BTreeMap<String, Option<String>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RelationalStore: Send + Sync + 'static {
    /// Executes `statements` in one transaction and returns the affected row
    /// count of each.
    ///
    /// Implementations must set the origin session setting to `origin` for the
    /// duration of the transaction so the change trigger stamps it on every
    /// notification. An empty `origin` leaves the setting unset.
    async fn apply(
        &self,
        origin: &str,
        statements: Vec<Statement>,
    ) -> Result<Vec<u64>>;

    async fn select(
        &self,
        query: &Select,
    ) -> Result<Vec<Row>>;

    /// Runs schema DDL (trigger installation).
    async fn apply_ddl(
        &self,
        sql: &str,
    ) -> Result<()>;

    /// Live column names of `table`, in ordinal order.
    async fn table_columns(
        &self,
        table: &TableRef,
    ) -> Result<Vec<String>>;

    /// Starts listening on `channel`. Each item is one raw notification
    /// payload; the stream ending means the connection is gone.
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyspaceEventKind {
    Set,
    Del,
    Expired,
}

impl KeyspaceEventKind {
    /// Event name as published on the key-space channel.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "set" => Some(Self::Set),
            "del" => Some(Self::Del),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Del => "del",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceEvent {
    pub key: String,
    pub kind: KeyspaceEventKind,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>>;

    /// Writes `value`, replacing any previous TTL with `ttl`.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Returns whether a key was removed.
    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool>;

    /// Streams set/del/expired events for keys matching `pattern`. The stream
    /// ending means the connection is gone.
    async fn subscribe_keyspace(
        &self,
        pattern: &str,
    ) -> Result<mpsc::UnboundedReceiver<KeyspaceEvent>>;
}

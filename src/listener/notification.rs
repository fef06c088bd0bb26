use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::key::TableRef;
use crate::store::Row;
use crate::ListenerError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(ListenerError::UnknownOperation(other.to_string())),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RowDiff {
    #[serde(default)]
    old: Row,
    #[serde(default)]
    new: Row,
}

/// One row-level change captured by the trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub timestamp: DateTime<Utc>,
    pub table: TableRef,
    pub operation: Operation,
    /// Writer's origin tag, empty for external writers
    pub origin: String,
    pub old: Row,
    pub new: Row,
}

impl Notification {
    pub fn new(
        table: TableRef,
        operation: Operation,
        origin: impl Into<String>,
        old: Row,
        new: Row,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            table,
            operation,
            origin: origin.into(),
            old,
            new,
        }
    }

    /// Parses `timestamp,schema,table,OP,origin,{json}`. Only the first five
    /// commas delimit the prefix; the JSON diff may contain any text.
    pub fn parse(payload: &str) -> Result<Self, ListenerError> {
        let malformed = || ListenerError::MalformedPayload(truncate(payload));

        let mut parts = payload.splitn(6, ',');
        let timestamp = parts.next().ok_or_else(malformed)?;
        let schema = parts.next().ok_or_else(malformed)?;
        let table = parts.next().ok_or_else(malformed)?;
        let operation = parts.next().ok_or_else(malformed)?;
        let origin = parts.next().ok_or_else(malformed)?;
        let diff = parts.next().ok_or_else(malformed)?;

        if schema.is_empty() || table.is_empty() {
            return Err(malformed());
        }

        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|_| ListenerError::Timestamp(timestamp.to_string()))?
            .and_utc();
        let operation: Operation = operation.parse()?;
        let diff: RowDiff = serde_json::from_str(diff)?;

        Ok(Self {
            timestamp,
            table: TableRef::new(schema, table),
            operation,
            origin: origin.to_string(),
            old: diff.old,
            new: diff.new,
        })
    }

    /// Renders the payload exactly as the trigger would.
    pub fn encode_payload(&self) -> String {
        let diff = serde_json::json!({ "old": &self.old, "new": &self.new });
        format!(
            "{},{},{},{},{},{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.table.schema,
            self.table.table,
            self.operation,
            self.origin,
            diff
        )
    }

    /// Row image that is current after the change: `new`, or `old` for deletes.
    pub fn row(&self) -> &Row {
        match self.operation {
            Operation::Delete => &self.old,
            _ => &self.new,
        }
    }

    pub fn value(
        &self,
        column: &str,
    ) -> Option<&str> {
        self.row().get(column).and_then(|v| v.as_deref())
    }

    pub fn old_value(
        &self,
        column: &str,
    ) -> Option<&str> {
        self.old.get(column).and_then(|v| v.as_deref())
    }

    pub fn new_value(
        &self,
        column: &str,
    ) -> Option<&str> {
        self.new.get(column).and_then(|v| v.as_deref())
    }

    /// Columns whose text differs between the two images, in column order.
    /// A missing column and an explicit NULL compare equal.
    pub fn changed_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self
            .old
            .keys()
            .chain(self.new.keys())
            .map(String::as_str)
            .collect();
        columns.sort_unstable();
        columns.dedup();
        columns
            .into_iter()
            .filter(|c| self.old_value(c) != self.new_value(c))
            .collect()
    }
}

fn truncate(payload: &str) -> String {
    payload.chars().take(120).collect()
}

//! Structured keys addressing every piece of managed data.
//!
//! A [`Key`] uniquely addresses one entry of the value cache. Keys are pure
//! values: two keys are equal only when they are the same variant and every
//! component matches.
//!
//! Cache keys additionally have a wire form used as the key/value store key:
//!
//! ```text
//! <namespace>:<schema>:<table>:<idColumn>:<rootId>:<logicalName>
//! ```
//!
//! The namespace token lets the listener discard unrelated key-space events
//! with a prefix check. Root ids may contain `:`; every other component must
//! not.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::KeyError;
use crate::SchemaError;

/// Identifier of a relational table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Checks both components are plain identifiers safe to embed in trigger
    /// names, notification prefixes and wire keys.
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_identifier(&self.schema)?;
        validate_identifier(&self.table)
    }

    /// `"schema"."table"` with identifier quoting.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Identifiers are restricted to `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(ident: &str) -> Result<(), SchemaError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(ident.to_string()))
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One column value scoped to a root id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub table: TableRef,
    pub column: String,
    pub id_column: String,
    pub root_id: String,
}

/// Membership set of a collection owned by one root id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    pub table: TableRef,
    pub linking_column: String,
    pub data_column: String,
    pub root_id: String,
}

/// One entry of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionEntryKey {
    pub collection: CollectionKey,
    pub entry_id: String,
}

/// A cache-backed value living in the key/value store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub table: TableRef,
    pub id_column: String,
    pub root_id: String,
    pub logical_name: String,
}

impl CacheKey {
    /// Store key including the reserved namespace token.
    pub fn to_wire(
        &self,
        namespace: &str,
    ) -> String {
        format!("{namespace}:{self}")
    }

    /// Parses a store key. Fails when the key is outside `namespace`.
    pub fn from_wire(
        wire: &str,
        namespace: &str,
    ) -> Result<Self, KeyError> {
        let rest = wire
            .strip_prefix(namespace)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| KeyError::ForeignNamespace {
                key: wire.to_string(),
                namespace: namespace.to_string(),
            })?;
        rest.parse()
    }

    pub fn to_partial_key(&self) -> PartialKey {
        PartialKey::Cache {
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            logical_name: self.logical_name.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.table.schema, self.table.table, self.id_column, self.root_id, self.logical_name
        )
    }
}

impl std::str::FromStr for CacheKey {
    type Err = KeyError;

    /// Splits three components from the left and one from the right; what
    /// remains is the root id, which may itself contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || KeyError::Malformed(s.to_string());

        let mut head = s.splitn(4, ':');
        let schema = head.next().ok_or_else(malformed)?;
        let table = head.next().ok_or_else(malformed)?;
        let id_column = head.next().ok_or_else(malformed)?;
        let tail = head.next().ok_or_else(malformed)?;
        let (root_id, logical_name) = tail.rsplit_once(':').ok_or_else(malformed)?;

        if [schema, table, id_column, root_id, logical_name]
            .iter()
            .any(|c| c.is_empty())
        {
            return Err(malformed());
        }

        Ok(CacheKey {
            table: TableRef::new(schema, table),
            id_column: id_column.to_string(),
            root_id: root_id.to_string(),
            logical_name: logical_name.to_string(),
        })
    }
}

/// Unified key over every cached variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Cell(CellKey),
    Collection(CollectionKey),
    CollectionEntry(CollectionEntryKey),
    Cache(CacheKey),
}

impl Key {
    pub fn cell(
        table: &TableRef,
        column: &str,
        id_column: &str,
        root_id: &str,
    ) -> Self {
        Key::Cell(CellKey {
            table: table.clone(),
            column: column.to_string(),
            id_column: id_column.to_string(),
            root_id: root_id.to_string(),
        })
    }

    pub fn collection(
        table: &TableRef,
        linking_column: &str,
        data_column: &str,
        root_id: &str,
    ) -> Self {
        Key::Collection(CollectionKey {
            table: table.clone(),
            linking_column: linking_column.to_string(),
            data_column: data_column.to_string(),
            root_id: root_id.to_string(),
        })
    }

    pub fn cache(
        table: &TableRef,
        id_column: &str,
        root_id: &str,
        logical_name: &str,
    ) -> Self {
        Key::Cache(CacheKey {
            table: table.clone(),
            id_column: id_column.to_string(),
            root_id: root_id.to_string(),
            logical_name: logical_name.to_string(),
        })
    }

    pub fn table(&self) -> &TableRef {
        match self {
            Key::Cell(k) => &k.table,
            Key::Collection(k) => &k.table,
            Key::CollectionEntry(k) => &k.collection.table,
            Key::Cache(k) => &k.table,
        }
    }

    pub fn root_id(&self) -> &str {
        match self {
            Key::Cell(k) => &k.root_id,
            Key::Collection(k) => &k.root_id,
            Key::CollectionEntry(k) => &k.collection.root_id,
            Key::Cache(k) => &k.root_id,
        }
    }

    /// Key with the root id removed, shared by every entity of one field.
    pub fn to_partial_key(&self) -> PartialKey {
        match self {
            Key::Cell(k) => PartialKey::Cell {
                table: k.table.clone(),
                column: k.column.clone(),
                id_column: k.id_column.clone(),
            },
            Key::Collection(k) => PartialKey::Collection {
                table: k.table.clone(),
                linking_column: k.linking_column.clone(),
                data_column: k.data_column.clone(),
            },
            Key::CollectionEntry(k) => PartialKey::Collection {
                table: k.collection.table.clone(),
                linking_column: k.collection.linking_column.clone(),
                data_column: k.collection.data_column.clone(),
            },
            Key::Cache(k) => k.to_partial_key(),
        }
    }

    /// Whether this key belongs to the row `(table, id_column = root_id)`.
    pub fn is_scoped_to(
        &self,
        table: &TableRef,
        id_column: &str,
        root_id: &str,
    ) -> bool {
        match self {
            Key::Cell(k) => &k.table == table && k.id_column == id_column && k.root_id == root_id,
            Key::Cache(k) => &k.table == table && k.id_column == id_column && k.root_id == root_id,
            _ => false,
        }
    }
}

impl From<CacheKey> for Key {
    fn from(k: CacheKey) -> Self {
        Key::Cache(k)
    }
}

impl From<CellKey> for Key {
    fn from(k: CellKey) -> Self {
        Key::Cell(k)
    }
}

/// A key without its root id: the address of a field across all entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartialKey {
    Cell {
        table: TableRef,
        column: String,
        id_column: String,
    },
    Collection {
        table: TableRef,
        linking_column: String,
        data_column: String,
    },
    Cache {
        table: TableRef,
        id_column: String,
        logical_name: String,
    },
}

impl PartialKey {
    /// Glob matching every wire key of a cache-backed field, `None` for
    /// variants that never reach the key/value store.
    pub fn to_glob(
        &self,
        namespace: &str,
    ) -> Option<String> {
        match self {
            PartialKey::Cache {
                table,
                id_column,
                logical_name,
            } => Some(format!(
                "{namespace}:{}:{}:{id_column}:*:{logical_name}",
                table.schema, table.table
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod key_test;

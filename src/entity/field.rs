use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::cascade::DeleteStrategy;
use crate::cascade::InsertStrategy;
use crate::key::TableRef;
use crate::primitives::PrimitiveType;
use crate::primitives::Value;
use crate::write_path::UpdateInterval;
use crate::SchemaError;

/// A declared `localColumn=foreignColumn` pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub local_column: String,
    pub foreign_column: String,
}

impl Link {
    pub fn new(
        local_column: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            local_column: local_column.into(),
            foreign_column: foreign_column.into(),
        }
    }
}

impl FromStr for Link {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((local, foreign)) if !local.trim().is_empty() && !foreign.trim().is_empty() => {
                Ok(Link::new(local.trim(), foreign.trim()))
            }
            _ => Err(SchemaError::InvalidLink(s.to_string())),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}={}", self.local_column, self.foreign_column)
    }
}

/// Where a persisted scalar lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnLocation {
    /// A column of the root table, keyed by the root id
    Root,
    /// A column of a secondary table whose `link.foreign_column` holds the
    /// root's `link.local_column`
    Foreign { table: TableRef, link: Link },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionShape {
    /// Target rows whose `linking_column` holds the root id
    OneToMany { linking_column: String },
    /// Rows of `join_table` pairing the root id (`linking_column`) with a
    /// target id (`data_column`)
    ManyToMany {
        join_table: TableRef,
        linking_column: String,
        data_column: String,
    },
}

/// The closed set of field variants.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    ScalarColumn {
        ty: PrimitiveType,
        column: String,
        location: ColumnLocation,
    },
    ScalarCache {
        ty: PrimitiveType,
    },
    SingularRelation {
        target: String,
        link: Link,
    },
    CollectionRelation {
        target: String,
        shape: CollectionShape,
    },
}

impl FieldKind {
    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::ScalarColumn { .. } => "scalar column",
            FieldKind::ScalarCache { .. } => "cache-backed value",
            FieldKind::SingularRelation { .. } => "singular relation",
            FieldKind::CollectionRelation { .. } => "collection",
        }
    }

    /// Declared primitive type of scalar fields.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            FieldKind::ScalarColumn { ty, .. } | FieldKind::ScalarCache { ty } => Some(*ty),
            _ => None,
        }
    }
}

/// One declared field of an entity type, with its policies.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) update_interval: Option<UpdateInterval>,
    pub(crate) insert_strategy: InsertStrategy,
    pub(crate) delete_strategy: DeleteStrategy,
    pub(crate) expire_after: Option<Duration>,
    pub(crate) fallback: Option<Value>,
}

impl Field {
    fn with_kind(
        name: impl Into<String>,
        kind: FieldKind,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            update_interval: None,
            insert_strategy: InsertStrategy::default(),
            delete_strategy: DeleteStrategy::default(),
            expire_after: None,
            fallback: None,
        }
    }

    /// Column of the root table named after the field.
    pub fn column(
        name: impl Into<String>,
        ty: PrimitiveType,
    ) -> Self {
        let name = name.into();
        Self::with_kind(
            name.clone(),
            FieldKind::ScalarColumn {
                ty,
                column: name,
                location: ColumnLocation::Root,
            },
        )
    }

    /// Column named after the field in a secondary table joined through `link`.
    pub fn foreign_column(
        name: impl Into<String>,
        ty: PrimitiveType,
        table: TableRef,
        link: Link,
    ) -> Self {
        let name = name.into();
        Self::with_kind(
            name.clone(),
            FieldKind::ScalarColumn {
                ty,
                column: name,
                location: ColumnLocation::Foreign { table, link },
            },
        )
    }

    /// Value kept only in the key/value store.
    pub fn cached(
        name: impl Into<String>,
        ty: PrimitiveType,
    ) -> Self {
        Self::with_kind(name, FieldKind::ScalarCache { ty })
    }

    /// Link to one entity of type `target`.
    pub fn reference(
        name: impl Into<String>,
        target: impl Into<String>,
        link: Link,
    ) -> Self {
        Self::with_kind(
            name,
            FieldKind::SingularRelation {
                target: target.into(),
                link,
            },
        )
    }

    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        linking_column: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            name,
            FieldKind::CollectionRelation {
                target: target.into(),
                shape: CollectionShape::OneToMany {
                    linking_column: linking_column.into(),
                },
            },
        )
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        join_table: TableRef,
        linking_column: impl Into<String>,
        data_column: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            name,
            FieldKind::CollectionRelation {
                target: target.into(),
                shape: CollectionShape::ManyToMany {
                    join_table,
                    linking_column: linking_column.into(),
                    data_column: data_column.into(),
                },
            },
        )
    }

    /// Stores a scalar column under a column name different from the field name.
    pub fn column_name(
        mut self,
        column_name: impl Into<String>,
    ) -> Self {
        if let FieldKind::ScalarColumn { column, .. } = &mut self.kind {
            *column = column_name.into();
        }
        self
    }

    pub fn update_interval(
        mut self,
        interval: UpdateInterval,
    ) -> Self {
        self.update_interval = Some(interval);
        self
    }

    pub fn insert_strategy(
        mut self,
        strategy: InsertStrategy,
    ) -> Self {
        self.insert_strategy = strategy;
        self
    }

    pub fn delete_strategy(
        mut self,
        strategy: DeleteStrategy,
    ) -> Self {
        self.delete_strategy = strategy;
        self
    }

    pub fn expire_after(
        mut self,
        ttl: Duration,
    ) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    /// Returned by `get()` while the key/value store has no value.
    pub fn fallback(
        mut self,
        value: impl Into<Value>,
    ) -> Self {
        self.fallback = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn delete_policy(&self) -> DeleteStrategy {
        self.delete_strategy
    }

    pub fn insert_policy(&self) -> InsertStrategy {
        self.insert_strategy
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.expire_after
    }

    pub fn interval(&self) -> Option<UpdateInterval> {
        self.update_interval
    }

    pub fn fallback_value(&self) -> Option<&Value> {
        self.fallback.as_ref()
    }
}

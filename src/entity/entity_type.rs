use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use super::handlers::HandlerRegistry;
use super::ColumnLocation;
use super::CollectionShape;
use super::Entity;
use super::Field;
use super::FieldKind;
use super::HandlerResult;
use crate::cascade::DeleteStrategy;
use crate::cascade::InsertStrategy;
use crate::key::validate_identifier;
use crate::key::CacheKey;
use crate::key::CellKey;
use crate::key::Key;
use crate::key::TableRef;
use crate::primitives::Primitive;
use crate::primitives::PrimitiveRegistry;
use crate::primitives::PrimitiveType;
use crate::CodecError;
use crate::Result;
use crate::SchemaError;

/// Declaration of one entity type, turned into an [`EntityType`] by
/// [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct EntityTypeBuilder {
    name: String,
    table: TableRef,
    id_column: String,
    insert_strategy: InsertStrategy,
    fields: Vec<Field>,
}

impl EntityTypeBuilder {
    pub fn new(
        name: impl Into<String>,
        table: TableRef,
        id_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            id_column: id_column.into(),
            insert_strategy: InsertStrategy::default(),
            fields: Vec::new(),
        }
    }

    /// Policy for the root row when an insert finds it already present.
    pub fn insert_strategy(
        mut self,
        strategy: InsertStrategy,
    ) -> Self {
        self.insert_strategy = strategy;
        self
    }

    pub fn field(
        mut self,
        field: Field,
    ) -> Self {
        self.fields.push(field);
        self
    }

    /// Shorthand for a root table column named after the field.
    pub fn column(
        self,
        name: &str,
        ty: PrimitiveType,
    ) -> Self {
        self.field(Field::column(name, ty))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates every declaration. Unsupported primitive types, malformed
    /// identifiers and policies placed on fields that cannot honor them fail
    /// here rather than at first use.
    pub fn build(
        self,
        registry: &PrimitiveRegistry,
    ) -> Result<EntityType> {
        validate_identifier(&self.name)?;
        self.table.validate()?;
        validate_identifier(&self.id_column)?;

        let mut by_name = HashMap::with_capacity(self.fields.len());
        let mut columns = HashSet::new();
        for (index, field) in self.fields.iter().enumerate() {
            validate_identifier(&field.name)?;
            if field.name == self.id_column {
                return Err(SchemaError::Duplicate(format!(
                    "{}.{} shadows the id column",
                    self.name, field.name
                ))
                .into());
            }
            if by_name.insert(field.name.clone(), index).is_some() {
                return Err(
                    SchemaError::Duplicate(format!("{}.{}", self.name, field.name)).into(),
                );
            }
            self.validate_field(field, registry, &mut columns)?;
        }

        Ok(EntityType {
            name: self.name,
            table: self.table,
            id_column: self.id_column,
            insert_strategy: self.insert_strategy,
            fields: self.fields.into_iter().map(Arc::new).collect(),
            by_name,
            handlers: HandlerRegistry::default(),
        })
    }

    fn validate_field(
        &self,
        field: &Field,
        registry: &PrimitiveRegistry,
        columns: &mut HashSet<(TableRef, String)>,
    ) -> Result<()> {
        let policy = |reason: &str| -> crate::Error {
            SchemaError::InvalidPolicy {
                field: format!("{}.{}", self.name, field.name),
                reason: reason.to_string(),
            }
            .into()
        };

        if let Some(ty) = field.kind.primitive_type() {
            if !registry.is_known(ty) {
                return Err(CodecError::UnknownType(ty).into());
            }
        }

        match &field.kind {
            FieldKind::ScalarColumn {
                column, location, ..
            } => {
                validate_identifier(column)?;
                let table = match location {
                    ColumnLocation::Root => {
                        if field.insert_strategy != InsertStrategy::default() {
                            return Err(policy(
                                "root columns follow the entity insert strategy",
                            ));
                        }
                        if field.delete_strategy != DeleteStrategy::NoAction {
                            return Err(policy("root columns are deleted with their row"));
                        }
                        self.table.clone()
                    }
                    ColumnLocation::Foreign { table, link } => {
                        table.validate()?;
                        validate_identifier(&link.local_column)?;
                        validate_identifier(&link.foreign_column)?;
                        if link.local_column != self.id_column {
                            return Err(SchemaError::InvalidLink(format!(
                                "{link}: foreign values must link from the id column {}",
                                self.id_column
                            ))
                            .into());
                        }
                        if field.delete_strategy == DeleteStrategy::Unlink {
                            return Err(policy("UNLINK applies to collections only"));
                        }
                        table.clone()
                    }
                };
                if !columns.insert((table.clone(), column.clone())) {
                    return Err(SchemaError::Duplicate(format!("column {table}.{column}")).into());
                }
                if field.expire_after.is_some() || field.fallback.is_some() {
                    return Err(policy("expiry and fallback apply to cache-backed values only"));
                }
            }
            FieldKind::ScalarCache { ty } => {
                if field.update_interval.is_some() {
                    return Err(policy("update intervals apply to scalar columns only"));
                }
                if field.delete_strategy != DeleteStrategy::NoAction
                    || field.insert_strategy != InsertStrategy::default()
                {
                    return Err(policy("cache-backed values carry no cascade policy"));
                }
                if let Some(fallback) = &field.fallback {
                    if fallback.primitive_type() != *ty {
                        return Err(CodecError::TypeMismatch {
                            expected: *ty,
                            found: fallback.primitive_type(),
                        }
                        .into());
                    }
                }
            }
            FieldKind::SingularRelation { target, link } => {
                validate_identifier(target)?;
                validate_identifier(&link.local_column)?;
                validate_identifier(&link.foreign_column)?;
                if field.delete_strategy != DeleteStrategy::NoAction {
                    return Err(policy("singular relations never cascade"));
                }
                self.reject_scalar_policies(field, &policy)?;
            }
            FieldKind::CollectionRelation { target, shape } => {
                validate_identifier(target)?;
                match shape {
                    CollectionShape::OneToMany { linking_column } => {
                        validate_identifier(linking_column)?;
                    }
                    CollectionShape::ManyToMany {
                        join_table,
                        linking_column,
                        data_column,
                    } => {
                        join_table.validate()?;
                        validate_identifier(linking_column)?;
                        validate_identifier(data_column)?;
                        if linking_column == data_column {
                            return Err(SchemaError::InvalidLink(format!(
                                "{join_table}: linking and data column are both {linking_column}"
                            ))
                            .into());
                        }
                    }
                }
                self.reject_scalar_policies(field, &policy)?;
            }
        }
        Ok(())
    }

    fn reject_scalar_policies(
        &self,
        field: &Field,
        policy: &dyn Fn(&str) -> crate::Error,
    ) -> Result<()> {
        if field.update_interval.is_some()
            || field.expire_after.is_some()
            || field.fallback.is_some()
            || field.insert_strategy != InsertStrategy::default()
        {
            return Err(policy("scalar policies do not apply to relations"));
        }
        Ok(())
    }
}

/// Static field table of one entity type plus its handler registry.
pub struct EntityType {
    name: String,
    table: TableRef,
    id_column: String,
    insert_strategy: InsertStrategy,
    fields: Vec<Arc<Field>>,
    by_name: HashMap<String, usize>,
    pub(crate) handlers: HandlerRegistry,
}

impl std::fmt::Debug for EntityType {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("id_column", &self.id_column)
            .field("fields", &self.fields.len())
            .finish_non_exhaustive()
    }
}

impl EntityType {
    pub fn builder(
        name: impl Into<String>,
        table: TableRef,
        id_column: impl Into<String>,
    ) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name, table, id_column)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn insert_strategy(&self) -> InsertStrategy {
        self.insert_strategy
    }

    pub fn fields(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.fields.iter()
    }

    pub fn field(
        &self,
        name: &str,
    ) -> Result<&Arc<Field>> {
        self.by_name
            .get(name)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| {
                SchemaError::UnknownField {
                    entity: self.name.clone(),
                    field: name.to_string(),
                }
                .into()
            })
    }

    /// Field of the requested kind holding primitive `ty` (when scalar).
    pub(crate) fn typed_field(
        &self,
        name: &str,
        requested: &'static str,
        ty: Option<PrimitiveType>,
    ) -> Result<&Arc<Field>> {
        let field = self.field(name)?;
        if field.kind.describe() != requested {
            return Err(SchemaError::WrongFieldKind {
                entity: self.name.clone(),
                field: name.to_string(),
                actual: field.kind.describe(),
                requested,
            }
            .into());
        }
        if let (Some(requested), Some(declared)) = (ty, field.kind.primitive_type()) {
            if requested != declared {
                return Err(SchemaError::WrongFieldType {
                    entity: self.name.clone(),
                    field: name.to_string(),
                    declared,
                    requested,
                }
                .into());
            }
        }
        Ok(field)
    }

    /// Value-cache key of a scalar column field.
    pub(crate) fn cell_key(
        &self,
        field: &Field,
        id: &str,
    ) -> Option<Key> {
        match &field.kind {
            FieldKind::ScalarColumn {
                column, location, ..
            } => Some(match location {
                ColumnLocation::Root => Key::cell(&self.table, column, &self.id_column, id),
                ColumnLocation::Foreign { table, link } => {
                    Key::cell(table, column, &link.foreign_column, id)
                }
            }),
            _ => None,
        }
    }

    pub(crate) fn cache_key(
        &self,
        field: &Field,
        id: &str,
    ) -> CacheKey {
        CacheKey {
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            root_id: id.to_string(),
            logical_name: field.name.clone(),
        }
    }

    /// Link tracking key for a column of this type's root table.
    pub(crate) fn link_key(
        &self,
        column: &str,
        id: &str,
    ) -> CellKey {
        CellKey {
            table: self.table.clone(),
            column: column.to_string(),
            id_column: self.id_column.clone(),
            root_id: id.to_string(),
        }
    }

    /// Root columns whose raw text is tracked for relation resolution.
    pub(crate) fn link_columns(&self) -> impl Iterator<Item = (&Arc<Field>, &str)> {
        self.fields.iter().filter_map(|f| match &f.kind {
            FieldKind::SingularRelation { link, .. } => Some((f, link.local_column.as_str())),
            _ => None,
        })
    }

    // ---- handler registration ----

    /// Fires when a scalar field (column or cache-backed) changes, with the
    /// decoded old and new values.
    pub fn on_update<T, F>(
        &self,
        field: &str,
        handler: F,
    ) -> Result<()>
    where
        T: Primitive,
        F: Fn(&Entity, Option<T>, Option<T>) -> HandlerResult + Send + Sync + 'static,
    {
        let declared = self.field(field)?;
        let requested = match declared.kind {
            FieldKind::ScalarCache { .. } => "cache-backed value",
            _ => "scalar column",
        };
        self.typed_field(field, requested, Some(T::TYPE))?;
        self.handlers.add_update(
            field,
            Arc::new(move |entity, old, new| {
                handler(
                    entity,
                    old.and_then(T::from_value),
                    new.and_then(T::from_value),
                )
            }),
        );
        Ok(())
    }

    /// Fires when a singular relation starts pointing at another entity.
    pub fn on_link_update<F>(
        &self,
        field: &str,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&Entity, Option<&Entity>, Option<&Entity>) -> HandlerResult + Send + Sync + 'static,
    {
        self.typed_field(field, "singular relation", None)?;
        self.handlers.add_link(field, Arc::new(handler));
        Ok(())
    }

    /// Fires once per entry joining the collection, with `(owner, entry)`.
    pub fn on_add<F>(
        &self,
        field: &str,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&Entity, &Entity) -> HandlerResult + Send + Sync + 'static,
    {
        self.typed_field(field, "collection", None)?;
        self.handlers.add_member_added(field, Arc::new(handler));
        Ok(())
    }

    /// Fires once per entry leaving the collection, with `(owner, entry)`.
    pub fn on_remove<F>(
        &self,
        field: &str,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&Entity, &Entity) -> HandlerResult + Send + Sync + 'static,
    {
        self.typed_field(field, "collection", None)?;
        self.handlers.add_member_removed(field, Arc::new(handler));
        Ok(())
    }

    pub fn on_insert<F>(
        &self,
        handler: F,
    ) where
        F: Fn(&Entity) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.add_insert(Arc::new(handler));
    }

    pub fn on_delete<F>(
        &self,
        handler: F,
    ) where
        F: Fn(&Entity) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.add_delete(Arc::new(handler));
    }
}

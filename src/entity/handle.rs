use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use super::EntityType;
use crate::engine::EngineInner;
use crate::primitives::Primitive;
use crate::primitives::ValueSerializer;
use crate::value::CacheBackedValue;
use crate::value::PersistentCollection;
use crate::value::PersistentValue;
use crate::value::Reference;
use crate::value::SerializedValue;
use crate::write_path::RowRoute;
use crate::Result;

/// Handle to one root entity. Cheap to clone; field values live in the
/// engine's value cache, not in the handle.
///
/// Two entities are equal when their ids are equal.
#[derive(Clone)]
pub struct Entity {
    ty: Arc<EntityType>,
    id: Arc<str>,
    pub(crate) engine: Arc<EngineInner>,
}

impl Entity {
    pub(crate) fn new(
        engine: Arc<EngineInner>,
        ty: Arc<EntityType>,
        id: &str,
    ) -> Self {
        Self {
            ty,
            id: Arc::from(id),
            engine,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.ty
    }

    pub(crate) fn route(&self) -> RowRoute {
        RowRoute::new(self.ty.table(), &self.id)
    }

    /// Persisted scalar column.
    pub fn value<T: Primitive>(
        &self,
        field: &str,
    ) -> Result<PersistentValue<T>> {
        let field = self
            .ty
            .typed_field(field, "scalar column", Some(T::TYPE))?
            .clone();
        PersistentValue::new(self.clone(), field)
    }

    /// Value living in the key/value store.
    pub fn cached<T: Primitive>(
        &self,
        field: &str,
    ) -> Result<CacheBackedValue<T>> {
        let field = self
            .ty
            .typed_field(field, "cache-backed value", Some(T::TYPE))?
            .clone();
        Ok(CacheBackedValue::new(self.clone(), field))
    }

    pub fn reference(
        &self,
        field: &str,
    ) -> Result<Reference> {
        let field = self.ty.typed_field(field, "singular relation", None)?.clone();
        Reference::new(self.clone(), field)
    }

    pub fn collection(
        &self,
        field: &str,
    ) -> Result<PersistentCollection> {
        let field = self.ty.typed_field(field, "collection", None)?.clone();
        PersistentCollection::new(self.clone(), field)
    }

    /// Scalar column holding a non-primitive type through `serializer`.
    pub fn serialized<S: ValueSerializer>(
        &self,
        field: &str,
        serializer: S,
    ) -> Result<SerializedValue<S>> {
        Ok(SerializedValue::new(self.value::<S::Stored>(field)?, serializer))
    }

    /// Deletes the root row, applying every field's delete strategy.
    pub async fn delete(
        &self,
        mode: crate::write_path::WriteMode,
    ) -> Result<()> {
        self.engine.delete(self, mode).await
    }
}

impl PartialEq for Entity {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.ty.name())
            .field("id", &self.id)
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.ty.name(), self.id)
    }
}

use std::marker::PhantomData;
use std::sync::Arc;

use super::settle;
use crate::entity::Entity;
use crate::entity::Field;
use crate::key::Key;
use crate::primitives::Primitive;
use crate::primitives::Value;
use crate::write_path::WriteMode;
use crate::Result;

/// A scalar column of the root table or of a linked foreign table.
pub struct PersistentValue<T> {
    entity: Entity,
    field: Arc<Field>,
    key: Key,
    _type: PhantomData<fn() -> T>,
}

impl<T: Primitive> PersistentValue<T> {
    pub(crate) fn new(
        entity: Entity,
        field: Arc<Field>,
    ) -> Result<Self> {
        let key = entity
            .entity_type()
            .cell_key(&field, entity.id())
            .ok_or_else(|| {
                crate::engine::wrong_kind(entity.entity_type(), &field, "scalar column")
            })?;
        Ok(Self {
            entity,
            field,
            key,
            _type: PhantomData,
        })
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Cached value. `None` for SQL NULL and for values never loaded.
    pub fn get(&self) -> Option<T> {
        self.entity
            .engine
            .cache
            .get_scalar(&self.key)
            .flatten()
            .and_then(|v| T::from_value(&v))
    }

    /// Whether the value cache holds this column, NULL included.
    pub fn is_loaded(&self) -> bool {
        self.entity.engine.cache.contains(&self.key)
    }

    /// Updates the cache and queues the write. With an update interval the
    /// write may be folded into a later one.
    pub fn set(
        &self,
        value: T,
    ) -> Result<()> {
        self.write(Some(value.into_value()), WriteMode::Async)
            .map(|_| ())
    }

    pub fn set_null(&self) -> Result<()> {
        self.write(None, WriteMode::Async).map(|_| ())
    }

    /// Like [`set`](Self::set), then waits for the commit.
    pub async fn set_sync(
        &self,
        value: T,
    ) -> Result<()> {
        settle(self.write(Some(value.into_value()), WriteMode::Sync)?).await
    }

    pub async fn set_null_sync(&self) -> Result<()> {
        settle(self.write(None, WriteMode::Sync)?).await
    }

    fn write(
        &self,
        value: Option<Value>,
        mode: WriteMode,
    ) -> Result<Option<crate::write_path::WriteTicket>> {
        self.entity
            .engine
            .write_column(&self.entity, &self.field, value, mode)
    }
}

impl<T> std::fmt::Debug for PersistentValue<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PersistentValue")
            .field("entity", &self.entity)
            .field("field", &self.field.name())
            .finish()
    }
}

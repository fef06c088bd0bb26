use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::CachedValue;
use crate::entity::Entity;
use crate::entity::Field;
use crate::key::CacheKey;
use crate::key::Key;
use crate::primitives::Primitive;
use crate::Result;

/// A value that lives only in the key/value store.
///
/// `get` returns the field's fallback while the store holds no value (never
/// written, deleted or expired), or the type's default for non-nullable
/// types without a fallback.
pub struct CacheBackedValue<T> {
    entity: Entity,
    field: Arc<Field>,
    key: CacheKey,
    _type: PhantomData<fn() -> T>,
}

impl<T: Primitive> CacheBackedValue<T> {
    pub(crate) fn new(
        entity: Entity,
        field: Arc<Field>,
    ) -> Self {
        let key = entity.entity_type().cache_key(&field, entity.id());
        Self {
            entity,
            field,
            key,
            _type: PhantomData,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Store key, including the namespace.
    pub fn wire_key(&self) -> String {
        self.entity.engine.wire_key(&self.key)
    }

    pub fn get(&self) -> Option<T> {
        let cached = self.entity.engine.cache.get(&Key::Cache(self.key.clone()));
        match cached {
            Some(CachedValue::Scalar(Some(value))) => T::from_value(&value),
            _ => self.fallback(),
        }
    }

    /// Whether the store currently holds a value, as far as this process
    /// has observed.
    pub fn is_present(&self) -> bool {
        matches!(
            self.entity.engine.cache.get(&Key::Cache(self.key.clone())),
            Some(CachedValue::Scalar(Some(_)))
        )
    }

    fn fallback(&self) -> Option<T> {
        match self.field.fallback_value() {
            Some(fallback) => T::from_value(fallback),
            None => self
                .entity
                .engine
                .registry
                .default_value(T::TYPE)
                .and_then(|v| T::from_value(&v)),
        }
    }

    /// Updates the cache and queues the store write, with the field's
    /// expiry when it declares one.
    pub fn set(
        &self,
        value: T,
    ) -> Result<()> {
        self.entity
            .engine
            .write_cached(&self.entity, &self.field, Some(value.into_value()))
            .map(|_| ())
    }

    pub async fn set_sync(
        &self,
        value: T,
    ) -> Result<()> {
        self.entity
            .engine
            .write_cached(&self.entity, &self.field, Some(value.into_value()))?
            .wait()
            .await
    }

    /// Deletes the value from the store.
    pub fn clear(&self) -> Result<()> {
        self.entity
            .engine
            .write_cached(&self.entity, &self.field, None)
            .map(|_| ())
    }

    pub async fn clear_sync(&self) -> Result<()> {
        self.entity
            .engine
            .write_cached(&self.entity, &self.field, None)?
            .wait()
            .await
    }
}

impl<T> std::fmt::Debug for CacheBackedValue<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheBackedValue")
            .field("key", &self.key)
            .finish()
    }
}

use super::PersistentValue;
use crate::primitives::ValueSerializer;
use crate::Result;

/// A scalar column holding an application type through a
/// [`ValueSerializer`].
pub struct SerializedValue<S: ValueSerializer> {
    inner: PersistentValue<S::Stored>,
    serializer: S,
}

impl<S: ValueSerializer> SerializedValue<S> {
    pub(crate) fn new(
        inner: PersistentValue<S::Stored>,
        serializer: S,
    ) -> Self {
        Self { inner, serializer }
    }

    pub fn get(&self) -> Result<Option<S::Target>> {
        match self.inner.get() {
            Some(stored) => Ok(Some(self.serializer.deserialize(stored)?)),
            None => Ok(None),
        }
    }

    pub fn set(
        &self,
        value: &S::Target,
    ) -> Result<()> {
        self.inner.set(self.serializer.serialize(value)?)
    }

    pub async fn set_sync(
        &self,
        value: &S::Target,
    ) -> Result<()> {
        self.inner.set_sync(self.serializer.serialize(value)?).await
    }
}

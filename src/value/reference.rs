use std::sync::Arc;

use crate::entity::Entity;
use crate::entity::EntityType;
use crate::entity::Field;
use crate::entity::FieldKind;
use crate::key::CellKey;
use crate::Result;

/// A singular relation: the root row's link column holds the target's id.
///
/// Links are resolved lazily. A link may dangle; [`fetch`](Self::fetch)
/// tells a missing target apart from an unloaded one.
pub struct Reference {
    entity: Entity,
    field: Arc<Field>,
    target: Arc<EntityType>,
    key: CellKey,
}

impl Reference {
    pub(crate) fn new(
        entity: Entity,
        field: Arc<Field>,
    ) -> Result<Self> {
        let ty = entity.entity_type();
        let FieldKind::SingularRelation { target, link } = field.kind() else {
            return Err(crate::engine::wrong_kind(ty, &field, "singular relation"));
        };
        let target = entity.engine.entity_type(target)?;
        let key = ty.link_key(&link.local_column, entity.id());
        Ok(Self {
            entity,
            field,
            target,
            key,
        })
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Id held by the link column, if any.
    pub fn id(&self) -> Option<String> {
        self.entity.engine.links.get(&self.key)
    }

    /// Handle to the linked entity. Its own fields are not loaded by this.
    pub fn get(&self) -> Option<Entity> {
        self.id().map(|id| self.entity.engine.entity(&self.target, &id))
    }

    /// Loads the linked entity. `None` when nothing is linked or the target
    /// row no longer exists.
    pub async fn fetch(&self) -> Result<Option<Entity>> {
        match self.id() {
            Some(id) => self.entity.engine.load(&self.target, &id).await,
            None => Ok(None),
        }
    }

    pub fn set(
        &self,
        target: &Entity,
    ) -> Result<()> {
        self.entity
            .engine
            .write_link(&self.entity, &self.field, Some(target))
            .map(|_| ())
    }

    pub fn clear(&self) -> Result<()> {
        self.entity
            .engine
            .write_link(&self.entity, &self.field, None)
            .map(|_| ())
    }

    /// Sets (`Some`) or clears (`None`) the link and waits for the commit.
    pub async fn set_sync(
        &self,
        target: Option<&Entity>,
    ) -> Result<()> {
        self.entity
            .engine
            .write_link(&self.entity, &self.field, target)?
            .wait()
            .await
    }
}

impl std::fmt::Debug for Reference {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("entity", &self.entity)
            .field("field", &self.field.name())
            .field("target", &self.id())
            .finish()
    }
}

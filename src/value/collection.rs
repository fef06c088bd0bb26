use std::collections::BTreeSet;
use std::sync::Arc;

use crate::engine::owned_collection_key;
use crate::entity::Entity;
use crate::entity::EntityType;
use crate::entity::Field;
use crate::entity::FieldKind;
use crate::key::Key;
use crate::Result;

/// Live view of a one-to-many or many-to-many relation.
///
/// Membership follows every observed change to the child rows or the join
/// table, including changes made by other processes. Entries are returned in
/// id order.
pub struct PersistentCollection {
    owner: Entity,
    field: Arc<Field>,
    target: Arc<EntityType>,
    key: Key,
}

impl PersistentCollection {
    pub(crate) fn new(
        owner: Entity,
        field: Arc<Field>,
    ) -> Result<Self> {
        let FieldKind::CollectionRelation { target, .. } = field.kind() else {
            return Err(crate::engine::wrong_kind(owner.entity_type(), &field, "collection"));
        };
        let target = owner.engine.entity_type(target)?;
        let types = owner.engine.types();
        let key = owned_collection_key(&field, &types, owner.id())
            .ok_or_else(|| crate::engine::wrong_kind(owner.entity_type(), &field, "collection"))?;
        Ok(Self {
            owner,
            field,
            target,
            key,
        })
    }

    pub fn owner(&self) -> &Entity {
        &self.owner
    }

    pub fn ids(&self) -> Arc<BTreeSet<String>> {
        self.owner.engine.cache.members(&self.key)
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.ids()
            .iter()
            .map(|id| self.owner.engine.entity(&self.target, id))
            .collect()
    }

    pub fn contains(
        &self,
        entry: &Entity,
    ) -> bool {
        entry.entity_type().name() == self.target.name() && self.ids().contains(entry.id())
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Links `entry` to the owner: sets the child's linking column, or
    /// inserts a join row. Adding a present entry changes nothing.
    pub fn add(
        &self,
        entry: &Entity,
    ) -> Result<()> {
        self.owner
            .engine
            .write_membership(&self.owner, &self.field, entry, true)
            .map(|_| ())
    }

    /// Unlinks `entry`. The entry itself is never deleted.
    pub fn remove(
        &self,
        entry: &Entity,
    ) -> Result<()> {
        self.owner
            .engine
            .write_membership(&self.owner, &self.field, entry, false)
            .map(|_| ())
    }

    pub async fn add_sync(
        &self,
        entry: &Entity,
    ) -> Result<()> {
        self.owner
            .engine
            .write_membership(&self.owner, &self.field, entry, true)?
            .wait()
            .await
    }

    pub async fn remove_sync(
        &self,
        entry: &Entity,
    ) -> Result<()> {
        self.owner
            .engine
            .write_membership(&self.owner, &self.field, entry, false)?
            .wait()
            .await
    }
}

impl std::fmt::Debug for PersistentCollection {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PersistentCollection")
            .field("owner", &self.owner)
            .field("field", &self.field.name())
            .field("len", &self.len())
            .finish()
    }
}

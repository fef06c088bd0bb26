use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use super::EngineInner;
use crate::cache::CachedValue;
use crate::entity::CollectionShape;
use crate::entity::ColumnLocation;
use crate::entity::Entity;
use crate::entity::EntityType;
use crate::entity::FieldKind;
use crate::key::Key;
use crate::store::Filter;
use crate::store::Row;
use crate::store::Select;
use crate::Result;

impl EngineInner {
    pub(crate) async fn load(
        self: &Arc<Self>,
        ty: &Arc<EntityType>,
        id: &str,
    ) -> Result<Option<Entity>> {
        let rows = self
            .db
            .select(&Select::by(ty.table(), Filter::eq(ty.id_column(), id)))
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        self.populate(ty, id, &row).await?;
        Ok(Some(self.entity(ty, id)))
    }

    pub(crate) async fn preload(
        self: &Arc<Self>,
        ty: &Arc<EntityType>,
    ) -> Result<Vec<Entity>> {
        let rows = self.db.select(&Select::all(ty.table())).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(Some(id)) = row.get(ty.id_column()).cloned() else {
                warn!(entity = ty.name(), "skipping row without id");
                continue;
            };
            self.populate(ty, &id, &row).await?;
            entities.push(self.entity(ty, &id));
        }
        debug!(entity = ty.name(), count = entities.len(), "preloaded entities");
        Ok(entities)
    }

    /// Fills the value cache for one entity from its root row and whatever
    /// else its fields read. No handlers run; loading is not a change.
    async fn populate(
        &self,
        ty: &EntityType,
        id: &str,
        row: &Row,
    ) -> Result<()> {
        let types = self.types();
        for field in ty.fields() {
            match field.kind() {
                FieldKind::ScalarColumn {
                    ty: primitive,
                    column,
                    location: ColumnLocation::Root,
                } => {
                    let text = row.get(column).and_then(|v| v.as_deref());
                    let value = self.registry.decode(*primitive, text)?;
                    self.cache.put(
                        Key::cell(ty.table(), column, ty.id_column(), id),
                        CachedValue::Scalar(value),
                    );
                }
                FieldKind::ScalarColumn {
                    ty: primitive,
                    column,
                    location: ColumnLocation::Foreign { table, link },
                } => {
                    let rows = self
                        .db
                        .select(&Select::by(table, Filter::eq(&link.foreign_column, id)))
                        .await?;
                    let text = rows
                        .first()
                        .and_then(|r| r.get(column))
                        .and_then(|v| v.as_deref());
                    let value = self.registry.decode(*primitive, text)?;
                    self.cache.put(
                        Key::cell(table, column, &link.foreign_column, id),
                        CachedValue::Scalar(value),
                    );
                }
                FieldKind::ScalarCache { ty: primitive } => {
                    let key = ty.cache_key(field, id);
                    let cached = match self.cache_store.get(&self.wire_key(&key)).await? {
                        Some(text) => CachedValue::Scalar(self.registry.decode(*primitive, Some(&text))?),
                        None => CachedValue::Absent,
                    };
                    self.cache.put(key.into(), cached);
                }
                FieldKind::SingularRelation { link, .. } => {
                    let text = row.get(&link.local_column).and_then(|v| v.as_deref());
                    self.links.set(ty.link_key(&link.local_column, id), text);
                }
                FieldKind::CollectionRelation {
                    target,
                    shape: CollectionShape::OneToMany { linking_column },
                } => {
                    let Some(target) = types.get(target) else {
                        warn!(field = field.name(), target = %target, "collection target not registered, not loading");
                        continue;
                    };
                    let rows = self
                        .db
                        .select(&Select::by(target.table(), Filter::eq(linking_column, id)))
                        .await?;
                    let members: BTreeSet<String> = rows
                        .iter()
                        .filter_map(|r| r.get(target.id_column()).cloned().flatten())
                        .collect();
                    for member in &members {
                        self.links
                            .set(target.link_key(linking_column, member), Some(id));
                    }
                    self.cache.put(
                        Key::collection(target.table(), linking_column, target.id_column(), id),
                        CachedValue::Members(Arc::new(members)),
                    );
                }
                FieldKind::CollectionRelation {
                    shape:
                        CollectionShape::ManyToMany {
                            join_table,
                            linking_column,
                            data_column,
                        },
                    ..
                } => {
                    let rows = self
                        .db
                        .select(&Select::by(join_table, Filter::eq(linking_column, id)))
                        .await?;
                    let members: BTreeSet<String> = rows
                        .iter()
                        .filter_map(|r| r.get(data_column).cloned().flatten())
                        .collect();
                    self.cache.put(
                        Key::collection(join_table, linking_column, data_column, id),
                        CachedValue::Members(Arc::new(members)),
                    );
                }
            }
        }
        Ok(())
    }
}

use std::sync::Arc;
use std::sync::Weak;

use tracing::trace;
use tracing::warn;

use super::EngineInner;
use super::TypeMap;
use crate::cache::CachedValue;
use crate::entity::invoke;
use crate::entity::CollectionShape;
use crate::entity::ColumnLocation;
use crate::entity::Entity;
use crate::entity::EntityType;
use crate::entity::Field;
use crate::entity::FieldKind;
use crate::entity::Link;
use crate::key::CellKey;
use crate::key::Key;
use crate::key::TableRef;
use crate::listener::Notification;
use crate::listener::NotificationSink;
use crate::listener::Operation;
use crate::primitives::PrimitiveType;
use crate::primitives::Value;
use crate::store::Row;

/// A handler invocation collected while state is being applied.
pub(crate) enum Fire {
    Update {
        entity: Entity,
        field: Arc<Field>,
        old: Option<Value>,
        new: Option<Value>,
    },
    Link {
        entity: Entity,
        field: Arc<Field>,
        old: Option<Entity>,
        new: Option<Entity>,
    },
    Added {
        owner: Entity,
        field: Arc<Field>,
        entry: Entity,
    },
    Removed {
        owner: Entity,
        field: Arc<Field>,
        entry: Entity,
    },
    Inserted(Entity),
    Deleted(Entity),
}

#[derive(Default)]
struct Batch {
    fires: Vec<Fire>,
    links: Vec<(CellKey, Option<String>)>,
}

/// Change-listener sink. Holds the engine weakly so a running listener does
/// not keep a dropped engine alive.
pub(crate) struct Dispatcher {
    inner: Weak<EngineInner>,
}

impl Dispatcher {
    pub(crate) fn new(inner: Weak<EngineInner>) -> Self {
        Self { inner }
    }
}

impl NotificationSink for Dispatcher {
    fn dispatch(
        &self,
        notification: Notification,
    ) {
        if let Some(engine) = self.inner.upgrade() {
            engine.dispatch(&notification);
        }
    }
}

impl EngineInner {
    /// Applies one row change to the value cache, then runs the handlers it
    /// caused.
    ///
    /// Every cache and link update happens before the first handler runs, so
    /// a handler reading any field observes the state after the change.
    pub(crate) fn dispatch(
        self: &Arc<Self>,
        n: &Notification,
    ) {
        trace!(table = %n.table, op = %n.operation, origin = %n.origin, "applying change");
        let types = self.types();
        let mut batch = Batch::default();

        for ty in types.values() {
            if ty.table() == &n.table {
                self.apply_root(ty, n, &types, &mut batch);
            }
            for field in ty.fields() {
                match field.kind() {
                    FieldKind::ScalarColumn {
                        ty: primitive,
                        column,
                        location: ColumnLocation::Foreign { table, link },
                    } if table == &n.table => {
                        self.apply_foreign(ty, field, *primitive, column, link, n, &mut batch);
                    }
                    FieldKind::CollectionRelation {
                        target,
                        shape: CollectionShape::OneToMany { linking_column },
                    } => {
                        if let Some(target) = types.get(target) {
                            if target.table() == &n.table {
                                self.apply_child(ty, field, target, linking_column, n, &mut batch);
                            }
                        }
                    }
                    FieldKind::CollectionRelation {
                        target,
                        shape:
                            CollectionShape::ManyToMany {
                                join_table,
                                linking_column,
                                data_column,
                            },
                    } if join_table == &n.table => {
                        let target = types.get(target);
                        self.apply_join_row(
                            ty,
                            field,
                            target,
                            join_table,
                            linking_column,
                            data_column,
                            n,
                            &mut batch,
                        );
                    }
                    _ => {}
                }
            }
        }

        for (key, text) in batch.links {
            self.links.set(key, text.as_deref());
        }
        self.fire(batch.fires);
    }

    fn apply_root(
        self: &Arc<Self>,
        ty: &Arc<EntityType>,
        n: &Notification,
        types: &TypeMap,
        batch: &mut Batch,
    ) {
        let Some(id) = n.value(ty.id_column()) else {
            trace!(table = %n.table, "change without id column value");
            return;
        };
        let entity = self.entity(ty, id);

        if n.operation == Operation::Delete {
            self.cache.remove_scoped(ty.table(), ty.id_column(), id);
            self.links.remove_row(ty.table(), ty.id_column(), id);
            for field in ty.fields() {
                if let Some(key) = owned_collection_key(field, types, id) {
                    self.cache.remove(&key);
                }
            }
            batch.fires.push(Fire::Deleted(entity));

            if n.origin.is_empty() && self.config.listener.cascade_external_deletes {
                self.spawn_external_cascade(ty.clone(), id.to_string());
            }
            return;
        }

        for field in ty.fields() {
            let FieldKind::ScalarColumn {
                ty: primitive,
                column,
                location: ColumnLocation::Root,
            } = field.kind()
            else {
                continue;
            };
            let Some(text) = n.new.get(column) else {
                continue;
            };
            let Some(new) = self.decode_column(*primitive, text.as_deref(), &n.table, column)
            else {
                continue;
            };

            let key = Key::cell(ty.table(), column, ty.id_column(), id);
            let previous = self.cache.put(key, CachedValue::Scalar(new.clone()));
            let (old_text, old) = self.before(*primitive, n, column, previous);
            if old_text != *text {
                batch.fires.push(Fire::Update {
                    entity: entity.clone(),
                    field: field.clone(),
                    old,
                    new,
                });
            }
        }

        for (field, column) in ty.link_columns() {
            if !n.new.contains_key(column) {
                continue;
            }
            let key = ty.link_key(column, id);
            let before = match n.old.get(column) {
                Some(text) => text.clone(),
                None => self.links.get(&key),
            };
            let after = n.new_value(column).map(str::to_string);
            batch.links.push((key, after.clone()));

            if before != after {
                let FieldKind::SingularRelation { target, .. } = field.kind() else {
                    continue;
                };
                if let Some(target) = types.get(target) {
                    batch.fires.push(Fire::Link {
                        entity: entity.clone(),
                        field: field.clone(),
                        old: before.map(|id| self.entity(target, &id)),
                        new: after.map(|id| self.entity(target, &id)),
                    });
                }
            }
        }

        if n.operation == Operation::Insert {
            batch.fires.push(Fire::Inserted(entity));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_foreign(
        self: &Arc<Self>,
        ty: &Arc<EntityType>,
        field: &Arc<Field>,
        primitive: PrimitiveType,
        column: &str,
        link: &Link,
        n: &Notification,
        batch: &mut Batch,
    ) {
        let Some(root_id) = n.value(&link.foreign_column) else {
            return;
        };
        let key = Key::cell(&n.table, column, &link.foreign_column, root_id);

        let (previous, new_text, new) = match n.operation {
            Operation::Delete => (self.cache.remove(&key), None, None),
            _ => {
                let Some(text) = n.new.get(column) else {
                    return;
                };
                let Some(new) = self.decode_column(primitive, text.as_deref(), &n.table, column)
                else {
                    return;
                };
                (self.cache.put(key, CachedValue::Scalar(new.clone())), text.clone(), new)
            }
        };
        let (old_text, old) = self.before(primitive, n, column, previous);

        if old_text != new_text {
            batch.fires.push(Fire::Update {
                entity: self.entity(ty, root_id),
                field: field.clone(),
                old,
                new,
            });
        }
    }

    /// A row of a one-to-many target table moved between owners.
    fn apply_child(
        self: &Arc<Self>,
        owner_ty: &Arc<EntityType>,
        field: &Arc<Field>,
        target: &Arc<EntityType>,
        linking_column: &str,
        n: &Notification,
        batch: &mut Batch,
    ) {
        let Some(child) = n.value(target.id_column()) else {
            return;
        };
        let key = target.link_key(linking_column, child);
        let before = match n.old.get(linking_column) {
            Some(text) => text.clone(),
            None => self.links.get(&key),
        };
        let after = match n.operation {
            Operation::Delete => None,
            _ => match n.new.get(linking_column) {
                Some(text) => text.clone(),
                None => before.clone(),
            },
        };
        batch.links.push((key, after.clone()));

        if before == after {
            return;
        }
        let entry = self.entity(target, child);
        if let Some(owner) = before {
            let members = Key::collection(target.table(), linking_column, target.id_column(), &owner);
            if self.cache.remove_member(&members, child) {
                batch.fires.push(Fire::Removed {
                    owner: self.entity(owner_ty, &owner),
                    field: field.clone(),
                    entry: entry.clone(),
                });
            }
        }
        if let Some(owner) = after {
            let members = Key::collection(target.table(), linking_column, target.id_column(), &owner);
            if self.cache.add_member(members, child) {
                batch.fires.push(Fire::Added {
                    owner: self.entity(owner_ty, &owner),
                    field: field.clone(),
                    entry,
                });
            }
        }
    }

    /// A join table row appeared, vanished or was rewritten. Membership is
    /// tracked even when the target type is not registered; handlers need it.
    #[allow(clippy::too_many_arguments)]
    fn apply_join_row(
        self: &Arc<Self>,
        owner_ty: &Arc<EntityType>,
        field: &Arc<Field>,
        target: Option<&Arc<EntityType>>,
        join_table: &TableRef,
        linking_column: &str,
        data_column: &str,
        n: &Notification,
        batch: &mut Batch,
    ) {
        let pair = |row: &Row| -> Option<(String, String)> {
            let owner = row.get(linking_column)?.clone()?;
            let member = row.get(data_column)?.clone()?;
            Some((owner, member))
        };
        let before = match n.operation {
            Operation::Insert => None,
            _ => pair(&n.old),
        };
        let after = match n.operation {
            Operation::Delete => None,
            _ => pair(&n.new),
        };
        if before == after {
            return;
        }

        if let Some((owner, member)) = before {
            let key = Key::collection(join_table, linking_column, data_column, &owner);
            if self.cache.remove_member(&key, &member) {
                if let Some(target) = target {
                    batch.fires.push(Fire::Removed {
                        owner: self.entity(owner_ty, &owner),
                        field: field.clone(),
                        entry: self.entity(target, &member),
                    });
                }
            }
        }
        if let Some((owner, member)) = after {
            let key = Key::collection(join_table, linking_column, data_column, &owner);
            if self.cache.add_member(key, &member) {
                if let Some(target) = target {
                    batch.fires.push(Fire::Added {
                        owner: self.entity(owner_ty, &owner),
                        field: field.clone(),
                        entry: self.entity(target, &member),
                    });
                }
            }
        }
    }

    /// Decodes one column; failures are logged and counted, and the column
    /// is skipped.
    fn decode_column(
        &self,
        ty: PrimitiveType,
        text: Option<&str>,
        table: &TableRef,
        column: &str,
    ) -> Option<Option<Value>> {
        match self.registry.decode(ty, text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%table, column, error = %e, "dropping undecodable column value");
                self.metrics
                    .notifications_dropped
                    .with_label_values(&["decode"])
                    .inc();
                None
            }
        }
    }

    /// The column's state before `n`, as raw text and decoded. Changes are
    /// detected on the text. The old image wins when it carries the column;
    /// partial local images fall back to the cached copy in canonical form.
    fn before(
        &self,
        ty: PrimitiveType,
        n: &Notification,
        column: &str,
        previous: Option<CachedValue>,
    ) -> (Option<String>, Option<Value>) {
        if let Some(text) = n.old.get(column) {
            let value = self.registry.decode(ty, text.as_deref()).ok().flatten();
            return (text.clone(), value);
        }
        let value = previous.and_then(|p| p.scalar().cloned());
        let text = self.registry.encode(value.as_ref()).ok().flatten();
        (text, value)
    }

    /// Runs collected handler invocations in order. A failing handler never
    /// stops the ones after it.
    pub(crate) fn fire(
        &self,
        fires: Vec<Fire>,
    ) {
        for item in fires {
            match item {
                Fire::Update {
                    entity,
                    field,
                    old,
                    new,
                } => {
                    for handler in entity.entity_type().handlers.updates(field.name()) {
                        invoke("update", &entity, &self.metrics, || {
                            handler(&entity, old.as_ref(), new.as_ref())
                        });
                    }
                }
                Fire::Link {
                    entity,
                    field,
                    old,
                    new,
                } => {
                    for handler in entity.entity_type().handlers.links(field.name()) {
                        invoke("link", &entity, &self.metrics, || {
                            handler(&entity, old.as_ref(), new.as_ref())
                        });
                    }
                }
                Fire::Added {
                    owner,
                    field,
                    entry,
                } => {
                    for handler in owner.entity_type().handlers.member_added(field.name()) {
                        invoke("add", &owner, &self.metrics, || handler(&owner, &entry));
                    }
                }
                Fire::Removed {
                    owner,
                    field,
                    entry,
                } => {
                    for handler in owner.entity_type().handlers.member_removed(field.name()) {
                        invoke("remove", &owner, &self.metrics, || handler(&owner, &entry));
                    }
                }
                Fire::Inserted(entity) => {
                    for handler in entity.entity_type().handlers.inserts() {
                        invoke("insert", &entity, &self.metrics, || handler(&entity));
                    }
                }
                Fire::Deleted(entity) => {
                    for handler in entity.entity_type().handlers.deletes() {
                        invoke("delete", &entity, &self.metrics, || handler(&entity));
                    }
                }
            }
        }
    }
}

/// Membership key of a collection field owned by `id`.
pub(crate) fn owned_collection_key(
    field: &Field,
    types: &TypeMap,
    id: &str,
) -> Option<Key> {
    match field.kind() {
        FieldKind::CollectionRelation {
            target,
            shape: CollectionShape::OneToMany { linking_column },
        } => {
            let target = types.get(target)?;
            Some(Key::collection(target.table(), linking_column, target.id_column(), id))
        }
        FieldKind::CollectionRelation {
            shape:
                CollectionShape::ManyToMany {
                    join_table,
                    linking_column,
                    data_column,
                },
            ..
        } => Some(Key::collection(join_table, linking_column, data_column, id)),
        _ => None,
    }
}

//! Local write paths.
//!
//! Each write updates the value cache synchronously, by dispatching the
//! notification the change trigger will emit for it, and only then queues
//! the statement. The trigger's own notification later comes back with this
//! engine's origin and is discarded.

use std::sync::Arc;

use tracing::trace;

use super::EngineInner;
use super::Fire;
use crate::cache::CachedValue;
use crate::entity::CollectionShape;
use crate::entity::ColumnLocation;
use crate::entity::Entity;
use crate::entity::EntityType;
use crate::entity::Field;
use crate::entity::FieldKind;
use crate::listener::Notification;
use crate::listener::Operation;
use crate::primitives::Value;
use crate::store::Filter;
use crate::store::OnConflict;
use crate::store::Row;
use crate::store::Statement;
use crate::write_path::WriteMode;
use crate::write_path::WriteOp;
use crate::write_path::WriteTicket;
use crate::Error;
use crate::Result;
use crate::SchemaError;

pub(crate) fn wrong_kind(
    ty: &EntityType,
    field: &Field,
    requested: &'static str,
) -> Error {
    SchemaError::WrongFieldKind {
        entity: ty.name().to_string(),
        field: field.name().to_string(),
        actual: field.kind().describe(),
        requested,
    }
    .into()
}

/// Fails unless `entity` is of the relation's declared target type.
pub(crate) fn check_target(
    ty: &EntityType,
    field: &Field,
    target: &str,
    entity: &Entity,
) -> Result<()> {
    if entity.entity_type().name() != target {
        return Err(SchemaError::WrongEntityType {
            field: format!("{}.{}", ty.name(), field.name()),
            expected: target.to_string(),
            found: entity.entity_type().name().to_string(),
        }
        .into());
    }
    Ok(())
}

fn row<const N: usize>(pairs: [(&str, Option<&str>); N]) -> Row {
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), value.map(str::to_string)))
        .collect()
}

impl EngineInner {
    /// Persists one scalar column. Returns no ticket when the write was
    /// folded into a coalescing interval.
    ///
    /// `Sync` writes bypass the interval and drop any write it still holds
    /// for the key, so the confirmed value is the one that lands last.
    pub(crate) fn write_column(
        self: &Arc<Self>,
        entity: &Entity,
        field: &Arc<Field>,
        value: Option<Value>,
        mode: WriteMode,
    ) -> Result<Option<WriteTicket>> {
        let ty = entity.entity_type();
        let id = entity.id();
        let FieldKind::ScalarColumn {
            ty: primitive,
            column,
            location,
        } = field.kind()
        else {
            return Err(wrong_kind(ty, field, "scalar column"));
        };
        let text = self.registry.encode_as(*primitive, value.as_ref())?;

        let key = ty
            .cell_key(field, id)
            .ok_or_else(|| wrong_kind(ty, field, "scalar column"))?;
        let previous = match self.cache.get_scalar(&key) {
            Some(cached) => Some(self.registry.encode(cached.as_ref())?),
            None => None,
        };

        let (table, key_column, statement) = match location {
            ColumnLocation::Root => (
                ty.table(),
                ty.id_column(),
                Statement::Update {
                    table: ty.table().clone(),
                    assignments: vec![(column.clone(), text.clone())],
                    filter: Filter::eq(ty.id_column(), id),
                },
            ),
            ColumnLocation::Foreign { table, link } => (
                table,
                link.foreign_column.as_str(),
                Statement::Insert {
                    table: table.clone(),
                    values: vec![
                        (link.foreign_column.clone(), Some(id.to_string())),
                        (column.clone(), text.clone()),
                    ],
                    on_conflict: OnConflict::DoUpdate {
                        target: vec![link.foreign_column.clone()],
                        columns: vec![column.clone()],
                    },
                },
            ),
        };

        let mut old = row([(key_column, Some(id))]);
        if let Some(previous) = previous {
            old.insert(column.clone(), previous);
        }
        let new = row([(key_column, Some(id)), (column.as_str(), text.as_deref())]);
        self.dispatch(&Notification::new(
            table.clone(),
            Operation::Update,
            &*self.origin,
            old,
            new,
        ));

        match (field.interval(), mode) {
            (Some(interval), WriteMode::Async) => {
                self.coalescer
                    .submit(key, entity.route(), interval, vec![statement])?;
                Ok(None)
            }
            (Some(_), WriteMode::Sync) => {
                if self.coalescer.cancel(&key) {
                    trace!(entity = %entity, field = field.name(), "superseded coalesced write");
                }
                Ok(Some(self.queue.submit(&entity.route(), vec![statement])?))
            }
            (None, _) => Ok(Some(self.queue.submit(&entity.route(), vec![statement])?)),
        }
    }

    /// Updates the cached copy of a cache-backed value and builds the store
    /// write. `None` deletes the key.
    pub(crate) fn stage_cached(
        &self,
        entity: &Entity,
        field: &Arc<Field>,
        value: Option<Value>,
    ) -> Result<(Option<Fire>, WriteOp)> {
        let ty = entity.entity_type();
        let FieldKind::ScalarCache { ty: primitive } = field.kind() else {
            return Err(wrong_kind(ty, field, "cache-backed value"));
        };
        let text = match &value {
            Some(v) => self.registry.encode_as(*primitive, Some(v))?,
            None => None,
        };

        let cache_key = ty.cache_key(field, entity.id());
        let wire = self.wire_key(&cache_key);
        let next = match &value {
            Some(_) => CachedValue::Scalar(value.clone()),
            None => CachedValue::Absent,
        };
        let old = self
            .cache
            .put(cache_key.into(), next)
            .and_then(|previous| previous.scalar().cloned());

        let fire = (old != value).then(|| Fire::Update {
            entity: entity.clone(),
            field: field.clone(),
            old,
            new: value,
        });
        let op = match text {
            Some(text) => WriteOp::CacheSet {
                key: wire,
                value: text,
                ttl: field.ttl(),
            },
            None => WriteOp::CacheDelete { key: wire },
        };
        Ok((fire, op))
    }

    pub(crate) fn write_cached(
        self: &Arc<Self>,
        entity: &Entity,
        field: &Arc<Field>,
        value: Option<Value>,
    ) -> Result<WriteTicket> {
        let (fire, op) = self.stage_cached(entity, field, value)?;
        self.fire(fire.into_iter().collect());
        self.queue.submit(&entity.route(), op)
    }

    /// Points a singular relation at `target`, or clears it.
    pub(crate) fn write_link(
        self: &Arc<Self>,
        entity: &Entity,
        field: &Arc<Field>,
        target: Option<&Entity>,
    ) -> Result<WriteTicket> {
        let ty = entity.entity_type();
        let id = entity.id();
        let FieldKind::SingularRelation {
            target: target_type,
            link,
        } = field.kind()
        else {
            return Err(wrong_kind(ty, field, "singular relation"));
        };
        if let Some(target) = target {
            check_target(ty, field, target_type, target)?;
        }
        let column = link.local_column.as_str();
        let target_id = target.map(|t| t.id());

        let mut old = row([(ty.id_column(), Some(id))]);
        if let Some(previous) = self.links.get(&ty.link_key(column, id)) {
            old.insert(column.to_string(), Some(previous));
        }
        let new = row([(ty.id_column(), Some(id)), (column, target_id)]);
        self.dispatch(&Notification::new(
            ty.table().clone(),
            Operation::Update,
            &*self.origin,
            old,
            new,
        ));

        let statement = Statement::Update {
            table: ty.table().clone(),
            assignments: vec![(column.to_string(), target_id.map(str::to_string))],
            filter: Filter::eq(ty.id_column(), id),
        };
        self.queue.submit(&entity.route(), vec![statement])
    }

    /// Adds `entry` to, or removes it from, `owner`'s collection.
    pub(crate) fn write_membership(
        self: &Arc<Self>,
        owner: &Entity,
        field: &Arc<Field>,
        entry: &Entity,
        add: bool,
    ) -> Result<WriteTicket> {
        let ty = owner.entity_type();
        let FieldKind::CollectionRelation { target, shape } = field.kind() else {
            return Err(wrong_kind(ty, field, "collection"));
        };
        check_target(ty, field, target, entry)?;

        match shape {
            CollectionShape::OneToMany { linking_column } => {
                let child_ty = entry.entity_type();
                let child = entry.id();
                let previous = self.links.get(&child_ty.link_key(linking_column, child));

                let (statement, old, new) = if add {
                    let statement = Statement::Update {
                        table: child_ty.table().clone(),
                        assignments: vec![(linking_column.clone(), Some(owner.id().to_string()))],
                        filter: Filter::eq(child_ty.id_column(), child),
                    };
                    let mut old = row([(child_ty.id_column(), Some(child))]);
                    if let Some(previous) = &previous {
                        old.insert(linking_column.clone(), Some(previous.clone()));
                    }
                    let new = row([
                        (child_ty.id_column(), Some(child)),
                        (linking_column.as_str(), Some(owner.id())),
                    ]);
                    (statement, old, new)
                } else {
                    let statement = Statement::Update {
                        table: child_ty.table().clone(),
                        assignments: vec![(linking_column.clone(), None)],
                        filter: Filter::eq(child_ty.id_column(), child)
                            .and(linking_column.as_str(), owner.id()),
                    };
                    let old = row([
                        (child_ty.id_column(), Some(child)),
                        (linking_column.as_str(), Some(owner.id())),
                    ]);
                    let new = row([
                        (child_ty.id_column(), Some(child)),
                        (linking_column.as_str(), None),
                    ]);
                    (statement, old, new)
                };

                // Removing a child that belongs to someone else changes
                // nothing; the filtered statement is a no-op as well.
                let foreign_owner = !add
                    && previous
                        .as_deref()
                        .is_some_and(|previous| previous != owner.id());
                if !foreign_owner {
                    self.dispatch(&Notification::new(
                        child_ty.table().clone(),
                        Operation::Update,
                        &*self.origin,
                        old,
                        new,
                    ));
                }
                self.queue.submit(&entry.route(), vec![statement])
            }
            CollectionShape::ManyToMany {
                join_table,
                linking_column,
                data_column,
            } => {
                let pair = row([
                    (linking_column.as_str(), Some(owner.id())),
                    (data_column.as_str(), Some(entry.id())),
                ]);
                let (operation, old, new, statement) = if add {
                    let statement = Statement::Insert {
                        table: join_table.clone(),
                        values: pair.clone().into_iter().collect(),
                        on_conflict: OnConflict::DoNothing {
                            target: vec![linking_column.clone(), data_column.clone()],
                        },
                    };
                    (Operation::Insert, Row::new(), pair, statement)
                } else {
                    let statement = Statement::Delete {
                        table: join_table.clone(),
                        filter: Filter::eq(linking_column.as_str(), owner.id())
                            .and(data_column.as_str(), entry.id()),
                    };
                    (Operation::Delete, pair, Row::new(), statement)
                };
                self.dispatch(&Notification::new(
                    join_table.clone(),
                    operation,
                    &*self.origin,
                    old,
                    new,
                ));
                self.queue.submit(&owner.route(), vec![statement])
            }
        }
    }
}

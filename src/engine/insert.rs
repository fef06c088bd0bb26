use std::sync::Arc;

use tracing::debug;
use tracing::error;

use super::check_target;
use super::wrong_kind;
use super::EngineInner;
use crate::cascade::InsertStrategy;
use crate::entity::ColumnLocation;
use crate::entity::Entity;
use crate::entity::EntityType;
use crate::entity::Field;
use crate::entity::FieldKind;
use crate::key::TableRef;
use crate::listener::Notification;
use crate::listener::Operation;
use crate::primitives::Primitive;
use crate::primitives::PrimitiveType;
use crate::primitives::Value;
use crate::store::Filter;
use crate::store::OnConflict;
use crate::store::Row;
use crate::store::Select;
use crate::store::Statement;
use crate::write_path::InsertMode;
use crate::write_path::WriteTicket;
use crate::Result;
use crate::SchemaError;

/// Rows an insert wrote under `PREFER_EXISTING`; the database may have kept
/// different values.
struct Preferred {
    table: TableRef,
    key_column: String,
    written: Row,
}

/// Creates one root entity with its initial values.
///
/// The root row, foreign-table rows and cache-backed values are written as
/// one unit on the entity's write route; the statements share a transaction.
///
/// ```ignore
/// let ann = engine
///     .insert("user", "u1")?
///     .set("name", "Ann".to_string())?
///     .execute(InsertMode::Sync)
///     .await?;
/// ```
pub struct InsertBuilder {
    engine: Arc<EngineInner>,
    ty: Arc<EntityType>,
    id: String,
    values: Vec<(Arc<Field>, Option<Value>)>,
    links: Vec<(Arc<Field>, String)>,
}

impl InsertBuilder {
    pub(crate) fn new(
        engine: Arc<EngineInner>,
        ty: Arc<EntityType>,
        id: &str,
    ) -> Self {
        Self {
            engine,
            ty,
            id: id.to_string(),
            values: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Initial value of a scalar column or cache-backed value.
    pub fn set<T: Primitive>(
        mut self,
        field: &str,
        value: T,
    ) -> Result<Self> {
        let field = self.scalar_field(field, Some(T::TYPE))?;
        self.put(field, Some(value.into_value()));
        Ok(self)
    }

    pub fn set_null(
        mut self,
        field: &str,
    ) -> Result<Self> {
        let field = self.scalar_field(field, None)?;
        self.put(field, None);
        Ok(self)
    }

    /// Initial target of a singular relation.
    pub fn link(
        mut self,
        field: &str,
        target: &Entity,
    ) -> Result<Self> {
        let field = self.ty.typed_field(field, "singular relation", None)?.clone();
        if let FieldKind::SingularRelation {
            target: target_type,
            ..
        } = field.kind()
        {
            check_target(&self.ty, &field, target_type, target)?;
        }
        self.links.retain(|(f, _)| f.name() != field.name());
        self.links.push((field, target.id().to_string()));
        Ok(self)
    }

    fn scalar_field(
        &self,
        name: &str,
        requested: Option<PrimitiveType>,
    ) -> Result<Arc<Field>> {
        let field = self.ty.field(name)?;
        let declared = match field.kind() {
            FieldKind::ScalarColumn { ty, .. } | FieldKind::ScalarCache { ty } => *ty,
            _ => return Err(wrong_kind(&self.ty, field, "scalar column")),
        };
        if let Some(requested) = requested {
            if requested != declared {
                return Err(SchemaError::WrongFieldType {
                    entity: self.ty.name().to_string(),
                    field: name.to_string(),
                    declared,
                    requested,
                }
                .into());
            }
        }
        Ok(field.clone())
    }

    fn put(
        &mut self,
        field: Arc<Field>,
        value: Option<Value>,
    ) {
        self.values.retain(|(f, _)| f.name() != field.name());
        self.values.push((field, value));
    }

    /// Writes the entity. In `Sync` mode this returns after the database and
    /// the key/value store confirmed every write and `PREFER_EXISTING` rows
    /// were reconciled; in `Async` mode as soon as the writes are queued.
    /// Either way the value cache already holds the inserted values.
    pub async fn execute(
        self,
        mode: InsertMode,
    ) -> Result<Entity> {
        let InsertBuilder {
            engine,
            ty,
            id,
            values,
            links,
        } = self;
        let entity = engine.entity(&ty, &id);

        let mut root: Vec<(String, Option<String>)> =
            vec![(ty.id_column().to_string(), Some(id.clone()))];
        let mut foreign: Vec<(TableRef, String, InsertStrategy, Vec<(String, Option<String>)>)> =
            Vec::new();
        let mut cached = Vec::new();

        for (field, value) in values {
            match field.kind() {
                FieldKind::ScalarColumn {
                    ty: primitive,
                    column,
                    location,
                } => {
                    let text = engine.registry.encode_as(*primitive, value.as_ref())?;
                    match location {
                        ColumnLocation::Root => root.push((column.clone(), text)),
                        ColumnLocation::Foreign { table, link } => {
                            let strategy = field.insert_policy();
                            let group = foreign.iter_mut().find(|(t, k, s, _)| {
                                t == table && *k == link.foreign_column && *s == strategy
                            });
                            match group {
                                Some((_, _, _, columns)) => columns.push((column.clone(), text)),
                                None => foreign.push((
                                    table.clone(),
                                    link.foreign_column.clone(),
                                    strategy,
                                    vec![(column.clone(), text)],
                                )),
                            }
                        }
                    }
                }
                FieldKind::ScalarCache { .. } => cached.push((field, value)),
                _ => {}
            }
        }
        for (field, target) in links {
            if let FieldKind::SingularRelation { link, .. } = field.kind() {
                root.push((link.local_column.clone(), Some(target)));
            }
        }

        let mut statements = Vec::with_capacity(foreign.len() + 1);
        let mut notifications = Vec::with_capacity(foreign.len() + 1);
        let mut preferred = Vec::new();

        let id_target = vec![ty.id_column().to_string()];
        let on_conflict = match ty.insert_strategy() {
            InsertStrategy::OverwriteExisting => OnConflict::DoUpdate {
                target: id_target,
                columns: root.iter().skip(1).map(|(c, _)| c.clone()).collect(),
            },
            InsertStrategy::PreferExisting => OnConflict::DoNothing { target: id_target },
        };
        if ty.insert_strategy() == InsertStrategy::PreferExisting {
            preferred.push(Preferred {
                table: ty.table().clone(),
                key_column: ty.id_column().to_string(),
                written: root.iter().cloned().collect(),
            });
        }
        notifications.push(Notification::new(
            ty.table().clone(),
            Operation::Insert,
            &*engine.origin,
            Row::new(),
            root.iter().cloned().collect(),
        ));
        statements.push(Statement::Insert {
            table: ty.table().clone(),
            values: root,
            on_conflict,
        });

        for (table, key_column, strategy, columns) in foreign {
            let target = vec![key_column.clone()];
            let on_conflict = match strategy {
                InsertStrategy::OverwriteExisting => OnConflict::DoUpdate {
                    target,
                    columns: columns.iter().map(|(c, _)| c.clone()).collect(),
                },
                InsertStrategy::PreferExisting => OnConflict::DoNothing { target },
            };
            let mut values = vec![(key_column.clone(), Some(id.clone()))];
            values.extend(columns);
            let image: Row = values.iter().cloned().collect();

            if strategy == InsertStrategy::PreferExisting {
                preferred.push(Preferred {
                    table: table.clone(),
                    key_column,
                    written: image.clone(),
                });
            }
            notifications.push(Notification::new(
                table.clone(),
                Operation::Insert,
                &*engine.origin,
                Row::new(),
                image,
            ));
            statements.push(Statement::Insert {
                table,
                values,
                on_conflict,
            });
        }

        // Cache-backed values first, so insert handlers can read them.
        let mut fires = Vec::new();
        let mut cache_ops = Vec::with_capacity(cached.len());
        for (field, value) in cached {
            let (fire, op) = engine.stage_cached(&entity, &field, value)?;
            fires.extend(fire);
            cache_ops.push(op);
        }
        for notification in &notifications {
            engine.dispatch(notification);
        }
        engine.fire(fires);

        let route = entity.route();
        let statements_ticket = engine.queue.submit(&route, statements)?;
        let mut tickets = Vec::with_capacity(cache_ops.len());
        for op in cache_ops {
            tickets.push(engine.queue.submit(&route, op)?);
        }
        debug!(entity = %entity, mode = ?mode, "queued insert");

        match mode {
            InsertMode::Sync => {
                statements_ticket.wait().await?;
                for ticket in tickets {
                    ticket.wait().await?;
                }
                engine.reconcile(&id, preferred).await?;
            }
            InsertMode::Async if !preferred.is_empty() => {
                let engine = engine.clone();
                tokio::spawn(reconcile_after(engine, statements_ticket, id, preferred));
            }
            InsertMode::Async => {}
        }
        Ok(entity)
    }
}

async fn reconcile_after(
    engine: Arc<EngineInner>,
    ticket: WriteTicket,
    id: String,
    preferred: Vec<Preferred>,
) {
    if let Err(e) = ticket.wait().await {
        error!(id = %id, error = %e, "asynchronous insert failed");
        return;
    }
    if let Err(e) = engine.reconcile(&id, preferred).await {
        error!(id = %id, error = %e, "re-reading preferred rows failed");
    }
}

impl EngineInner {
    /// Re-reads rows written with `PREFER_EXISTING` and applies what the
    /// database actually kept as an ordinary update.
    async fn reconcile(
        self: &Arc<Self>,
        id: &str,
        preferred: Vec<Preferred>,
    ) -> Result<()> {
        for Preferred {
            table,
            key_column,
            written,
        } in preferred
        {
            let rows = self
                .db
                .select(&Select::by(&table, Filter::eq(key_column, id)))
                .await?;
            let Some(kept) = rows.into_iter().next() else {
                continue;
            };
            let differs = written
                .iter()
                .any(|(column, value)| kept.get(column).is_some_and(|kept| kept != value));
            if differs {
                debug!(%table, id, "existing row kept, reconciling cache");
                self.dispatch(&Notification::new(
                    table,
                    Operation::Update,
                    &*self.origin,
                    written,
                    kept,
                ));
            }
        }
        Ok(())
    }
}

//! The synchronization engine.
//!
//! [`SyncEngine`] wires the stores, both listeners, the value cache and the
//! write path together. Every change, local or remote, reaches the value
//! cache through one dispatcher: local writes synthesize the notification the
//! change trigger will later emit, dispatch it immediately, and the echo from
//! the database is discarded by origin.

mod builder;
mod delete;
mod dispatch;
mod insert;
mod links;
mod loader;
mod write;
pub use builder::*;
pub use insert::*;
pub(crate) use dispatch::*;
pub(crate) use links::*;
pub(crate) use write::check_target;
pub(crate) use write::wrong_kind;


use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cache::CachedValue;
use crate::cache::ValueCache;
use crate::config::SyncConfig;
use crate::entity::CollectionShape;
use crate::entity::ColumnLocation;
use crate::entity::Entity;
use crate::entity::EntityType;
use crate::entity::EntityTypeBuilder;
use crate::entity::FieldKind;
use crate::key::CacheKey;
use crate::key::TableRef;
use crate::listener::CacheListener;
use crate::listener::ChangeListener;
use crate::listener::ConnectionMonitor;
use crate::listener::ConnectionState;
use crate::metrics::SyncMetrics;
use crate::primitives::PrimitiveRegistry;
use crate::schema::SchemaCache;
use crate::store::CacheStore;
use crate::store::RelationalStore;
use crate::write_path::Coalescer;
use crate::write_path::TaskQueue;
use crate::Result;
use crate::SchemaError;

pub(crate) type TypeMap = HashMap<String, Arc<EntityType>>;

/// Shared state behind every [`SyncEngine`] clone and every [`Entity`].
pub(crate) struct EngineInner {
    pub(crate) config: SyncConfig,
    pub(crate) origin: Arc<str>,
    pub(crate) registry: Arc<PrimitiveRegistry>,
    pub(crate) db: Arc<dyn RelationalStore>,
    pub(crate) cache_store: Arc<dyn CacheStore>,
    pub(crate) cache: ValueCache,
    pub(crate) links: LinkTracker,
    pub(crate) schema: SchemaCache,
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) coalescer: Coalescer,
    pub(crate) cache_listener: Arc<CacheListener>,
    pub(crate) metrics: SyncMetrics,
    pub(crate) health: Arc<ConnectionMonitor>,
    types: ArcSwap<TypeMap>,
    register_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl EngineInner {
    pub(crate) fn types(&self) -> Arc<TypeMap> {
        self.types.load_full()
    }

    pub(crate) fn entity_type(
        &self,
        name: &str,
    ) -> Result<Arc<EntityType>> {
        self.types
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownEntityType(name.to_string()).into())
    }

    pub(crate) fn entity(
        self: &Arc<Self>,
        ty: &Arc<EntityType>,
        id: &str,
    ) -> Entity {
        Entity::new(self.clone(), ty.clone(), id)
    }

    pub(crate) fn wire_key(
        &self,
        key: &CacheKey,
    ) -> String {
        key.to_wire(&self.config.listener.keyspace_prefix)
    }
}

/// Handle to one running engine (one process's view of the data).
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("origin", &self.inner.origin)
            .field("types", &self.inner.types.load().len())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn builder(
        db: Arc<dyn RelationalStore>,
        cache_store: Arc<dyn CacheStore>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder::new(db, cache_store)
    }

    /// Origin tag stamped on every change this engine writes.
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.inner.metrics
    }

    pub fn registry(&self) -> &PrimitiveRegistry {
        &self.inner.registry
    }

    pub(crate) fn value_cache(&self) -> &ValueCache {
        &self.inner.cache
    }

    /// Validates and registers an entity type.
    ///
    /// Installs the change trigger on every table the type reads from, checks
    /// declared columns against the live schema and subscribes its
    /// cache-backed fields to key-space events. Relations may name types that
    /// are registered later; links between two registered types are checked
    /// as soon as both exist.
    pub async fn register(
        &self,
        builder: EntityTypeBuilder,
    ) -> Result<Arc<EntityType>> {
        let inner = &self.inner;
        let _guard = inner.register_lock.lock().await;

        let ty = Arc::new(builder.build(&inner.registry)?);
        let current = inner.types();
        if current.contains_key(ty.name()) {
            return Err(SchemaError::Duplicate(format!("entity type {}", ty.name())).into());
        }

        let mut next = TypeMap::clone(&current);
        next.insert(ty.name().to_string(), ty.clone());
        check_links(&next)?;

        for table in tables_of(&ty, &next) {
            inner
                .schema
                .ensure_trigger(inner.db.as_ref(), &inner.config.listener, &table)
                .await?;
        }
        self.check_columns(&ty).await?;

        for field in ty.fields() {
            if let FieldKind::ScalarCache { .. } = field.kind() {
                let partial = ty.cache_key(field, "_").to_partial_key();
                let weak: Weak<EngineInner> = Arc::downgrade(inner);
                let type_name = ty.name().to_string();
                let field_name = field.name().to_string();
                inner.cache_listener.register(
                    partial,
                    Arc::new(move |key, text| {
                        if let Some(engine) = weak.upgrade() {
                            engine.apply_cache_event(&type_name, &field_name, key, text);
                        }
                    }),
                )?;
            }
        }

        inner.types.store(Arc::new(next));
        info!(entity = ty.name(), table = %ty.table(), "registered entity type");
        Ok(ty)
    }

    async fn check_columns(
        &self,
        ty: &EntityType,
    ) -> Result<()> {
        let inner = &self.inner;
        let db = inner.db.as_ref();
        inner.schema.require_column(db, ty.table(), ty.id_column()).await?;
        for field in ty.fields() {
            match field.kind() {
                FieldKind::ScalarColumn {
                    column,
                    location: ColumnLocation::Root,
                    ..
                } => inner.schema.require_column(db, ty.table(), column).await?,
                FieldKind::ScalarColumn {
                    column,
                    location: ColumnLocation::Foreign { table, link },
                    ..
                } => {
                    inner.schema.require_column(db, table, column).await?;
                    inner.schema.require_column(db, table, &link.foreign_column).await?;
                }
                FieldKind::SingularRelation { link, .. } => {
                    inner.schema.require_column(db, ty.table(), &link.local_column).await?
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
                    inner.schema.require_column(db, join_table, linking_column).await?;
                    inner.schema.require_column(db, join_table, data_column).await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn entity_type(
        &self,
        name: &str,
    ) -> Result<Arc<EntityType>> {
        self.inner.entity_type(name)
    }

    /// Handle to an entity without loading anything.
    pub fn entity(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<Entity> {
        let ty = self.inner.entity_type(type_name)?;
        Ok(self.inner.entity(&ty, id))
    }

    /// Subscribes both listeners. Changes made before `start` are not
    /// observed.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let dispatcher = Arc::new(Dispatcher::new(Arc::downgrade(inner)));
        let change_listener = ChangeListener::new(
            inner.db.clone(),
            inner.config.listener.channel.clone(),
            inner.origin.clone(),
            dispatcher,
            inner.metrics.clone(),
            inner.health.clone(),
        );
        let db_task = change_listener.start(inner.shutdown.child_token()).await?;
        let cache_task = inner
            .cache_listener
            .clone()
            .start(inner.shutdown.child_token())
            .await?;

        inner.tasks.lock().extend([db_task, cache_task]);
        info!(origin = %inner.origin, "sync engine started");
        Ok(())
    }

    pub fn insert(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<InsertBuilder> {
        let ty = self.inner.entity_type(type_name)?;
        Ok(InsertBuilder::new(self.inner.clone(), ty, id))
    }

    /// Materializes one entity into the value cache: root row, foreign
    /// values, collections and cache-backed values. `None` when the root row
    /// does not exist.
    pub async fn load(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<Option<Entity>> {
        let ty = self.inner.entity_type(type_name)?;
        self.inner.load(&ty, id).await
    }

    /// Loads every row of the type's root table.
    pub async fn preload(
        &self,
        type_name: &str,
    ) -> Result<Vec<Entity>> {
        let ty = self.inner.entity_type(type_name)?;
        self.inner.preload(&ty).await
    }

    /// Drops the cached column list of `table` after a migration.
    pub fn notify_schema_changed(
        &self,
        table: &TableRef,
    ) {
        self.inner.schema.invalidate(table);
    }

    /// Listener health. A lost link is final; reconnecting means building a
    /// new engine.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.health.subscribe()
    }

    /// Stops both listeners, flushes coalesced writes and drains the write
    /// path. Queued writes are executed, not cancelled.
    pub async fn shutdown(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Ok(());
        }
        debug!(origin = %inner.origin, "shutting down sync engine");
        inner.shutdown.cancel();

        let tasks = std::mem::take(&mut *inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "listener task ended abnormally");
            }
        }

        inner.coalescer.flush();
        inner.queue.drain(inner.config.write_path.drain_timeout()).await?;
        info!(origin = %inner.origin, "sync engine stopped");
        Ok(())
    }
}

/// Every table whose changes affect `ty`.
fn tables_of(
    ty: &EntityType,
    types: &TypeMap,
) -> Vec<TableRef> {
    let mut tables = vec![ty.table().clone()];
    for field in ty.fields() {
        match field.kind() {
            FieldKind::ScalarColumn {
                location: ColumnLocation::Foreign { table, .. },
                ..
            } => tables.push(table.clone()),
            FieldKind::CollectionRelation { target, shape } => match shape {
                CollectionShape::OneToMany { .. } => {
                    if let Some(target) = types.get(target) {
                        tables.push(target.table().clone());
                    }
                }
                CollectionShape::ManyToMany { join_table, .. } => tables.push(join_table.clone()),
            },
            _ => {}
        }
    }
    tables.sort();
    tables.dedup();
    tables
}

/// Singular relations must link to their target's id column.
fn check_links(types: &TypeMap) -> Result<()> {
    for ty in types.values() {
        for field in ty.fields() {
            if let FieldKind::SingularRelation { target, link } = field.kind() {
                if let Some(target) = types.get(target) {
                    if link.foreign_column != target.id_column() {
                        return Err(SchemaError::InvalidLink(format!(
                            "{}.{}: {link} must reference {}.{}",
                            ty.name(),
                            field.name(),
                            target.name(),
                            target.id_column()
                        ))
                        .into());
                    }
                }
            }
        }
    }
    Ok(())
}

impl EngineInner {
    /// Updates the value cache from a key-space event and fires update
    /// handlers when the decoded value differs from what is cached. Echoes of
    /// this process's own writes therefore change nothing.
    pub(crate) fn apply_cache_event(
        self: &Arc<Self>,
        type_name: &str,
        field_name: &str,
        key: CacheKey,
        text: Option<String>,
    ) {
        let Ok(ty) = self.entity_type(type_name) else {
            return;
        };
        let Ok(field) = ty.field(field_name).cloned() else {
            return;
        };
        let Some(primitive) = field.kind().primitive_type() else {
            return;
        };

        let next = match text {
            Some(text) => match self.registry.decode(primitive, Some(&text)) {
                Ok(value) => CachedValue::Scalar(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "dropping undecodable cache value");
                    self.metrics
                        .notifications_dropped
                        .with_label_values(&["decode"])
                        .inc();
                    return;
                }
            },
            None => CachedValue::Absent,
        };

        let cache_key = key.clone().into();
        let previous = self.cache.get(&cache_key);
        let unchanged = match &previous {
            Some(previous) => previous == &next,
            None => next == CachedValue::Absent,
        };
        if unchanged {
            return;
        }
        let old = previous.as_ref().and_then(|v| v.scalar()).cloned();
        let new = next.scalar().cloned();
        self.cache.put(cache_key, next);

        let entity = self.entity(&ty, &key.root_id);
        self.fire(vec![Fire::Update {
            entity,
            field,
            old,
            new,
        }]);
    }
}

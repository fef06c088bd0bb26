//! Engine construction.
//!
//! ```ignore
//! let engine = SyncEngine::builder(db, cache)
//!     .config(SyncConfig::new()?.validate()?)
//!     .metrics_registry(prometheus::Registry::new())
//!     .build()?;
//! engine.register(user_type).await?;
//! engine.start().await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use arc_swap::ArcSwap;
use nanoid::nanoid;
use parking_lot::Mutex;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::EngineInner;
use super::LinkTracker;
use super::SyncEngine;
use crate::cache::ValueCache;
use crate::config::SyncConfig;
use crate::listener::CacheListener;
use crate::listener::ConnectionMonitor;
use crate::metrics::SyncMetrics;
use crate::primitives::PrimitiveRegistry;
use crate::schema::SchemaCache;
use crate::store::CacheStore;
use crate::store::RelationalStore;
use crate::write_path::Coalescer;
use crate::write_path::TaskQueue;
use crate::Result;

pub struct SyncEngineBuilder {
    db: Arc<dyn RelationalStore>,
    cache_store: Arc<dyn CacheStore>,
    config: Option<SyncConfig>,
    primitives: Option<PrimitiveRegistry>,
    metrics_registry: Option<Registry>,
}

impl SyncEngineBuilder {
    pub fn new(
        db: Arc<dyn RelationalStore>,
        cache_store: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            db,
            cache_store,
            config: None,
            primitives: None,
            metrics_registry: None,
        }
    }

    /// Explicit configuration; validated by `build`. Without it the layered
    /// defaults/file/environment configuration is loaded.
    pub fn config(
        mut self,
        config: SyncConfig,
    ) -> Self {
        self.config = Some(config);
        self
    }

    /// Primitive registry with custom descriptors. Defaults to the built-in
    /// set.
    pub fn primitives(
        mut self,
        registry: PrimitiveRegistry,
    ) -> Self {
        self.primitives = Some(registry);
        self
    }

    /// Registry the engine's collectors are registered into.
    pub fn metrics_registry(
        mut self,
        registry: Registry,
    ) -> Self {
        self.metrics_registry = Some(registry);
        self
    }

    /// Builds the engine and spawns its write workers, so it must run inside
    /// a tokio runtime. Listeners stay idle until [`SyncEngine::start`].
    pub fn build(self) -> Result<SyncEngine> {
        let config = match self.config {
            Some(config) => config.validate()?,
            None => SyncConfig::new()?.validate()?,
        };
        let origin: Arc<str> = match &config.origin_tag {
            Some(tag) => Arc::from(tag.as_str()),
            None => Arc::from(nanoid!().as_str()),
        };

        let metrics = SyncMetrics::new()?;
        if let Some(registry) = &self.metrics_registry {
            metrics.register(registry)?;
        }

        let shutdown = CancellationToken::new();
        let queue = Arc::new(TaskQueue::start(
            self.db.clone(),
            self.cache_store.clone(),
            origin.clone(),
            config.write_path.workers,
            metrics.clone(),
        ));
        let coalescer = Coalescer::new(queue.clone(), metrics.clone(), shutdown.child_token());
        let health = Arc::new(ConnectionMonitor::new());
        let cache_listener = Arc::new(CacheListener::new(
            self.cache_store.clone(),
            config.listener.keyspace_prefix.clone(),
            metrics.clone(),
            health.clone(),
        ));

        info!(origin = %origin, workers = config.write_path.workers, "sync engine built");
        let inner = EngineInner {
            cache: ValueCache::new(&config.cache),
            config,
            origin,
            registry: Arc::new(self.primitives.unwrap_or_else(PrimitiveRegistry::with_defaults)),
            db: self.db,
            cache_store: self.cache_store,
            links: LinkTracker::default(),
            schema: SchemaCache::new(),
            queue,
            coalescer,
            cache_listener,
            metrics,
            health,
            types: ArcSwap::from_pointee(HashMap::new()),
            register_lock: tokio::sync::Mutex::new(()),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        };
        Ok(SyncEngine {
            inner: Arc::new(inner),
        })
    }
}

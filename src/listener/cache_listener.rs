use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::compile_glob;
use super::ConnectionMonitor;
use super::Link;
use super::LinkState;
use crate::key::CacheKey;
use crate::key::PartialKey;
use crate::metrics::SyncMetrics;
use crate::store::CacheStore;
use crate::store::KeyspaceEvent;
use crate::store::KeyspaceEventKind;
use crate::KeyError;
use crate::ListenerError;
use crate::Result;

/// Invoked with the parsed key and the stored text, `None` when the store
/// reports the key absent (deleted or expired).
pub type KeyspaceHandler = Arc<dyn Fn(CacheKey, Option<String>) + Send + Sync>;

struct Pattern {
    partial: PartialKey,
    glob: String,
    regex: Regex,
    handler: KeyspaceHandler,
}

/// Key-space event subscriber routing events to the handler of the first
/// registered glob that matches.
pub struct CacheListener {
    store: Arc<dyn CacheStore>,
    namespace: String,
    patterns: ArcSwap<Vec<Arc<Pattern>>>,
    register_lock: Mutex<()>,
    metrics: SyncMetrics,
    health: Arc<ConnectionMonitor>,
}

impl CacheListener {
    pub fn new(
        store: Arc<dyn CacheStore>,
        namespace: String,
        metrics: SyncMetrics,
        health: Arc<ConnectionMonitor>,
    ) -> Self {
        Self {
            store,
            namespace,
            patterns: ArcSwap::from_pointee(Vec::new()),
            register_lock: Mutex::new(()),
            metrics,
            health,
        }
    }

    /// Registers `handler` for every key of a cache-backed field. Returns
    /// `false` when the partial key is already registered.
    pub fn register(
        &self,
        partial: PartialKey,
        handler: KeyspaceHandler,
    ) -> Result<bool> {
        let _guard = self.register_lock.lock();
        let current = self.patterns.load();
        if current.iter().any(|p| p.partial == partial) {
            return Ok(false);
        }

        let glob = partial.to_glob(&self.namespace).ok_or_else(|| {
            KeyError::InvalidComponent {
                component: format!("{partial:?}"),
                reason: "only cache-backed fields subscribe to key-space events",
            }
        })?;
        let regex = compile_glob(&glob).map_err(|_| KeyError::InvalidComponent {
            component: glob.clone(),
            reason: "glob does not compile",
        })?;

        let mut next = Vec::clone(&current);
        debug!(%glob, "registered key-space pattern");
        next.push(Arc::new(Pattern {
            partial,
            glob,
            regex,
            handler,
        }));
        self.patterns.store(Arc::new(next));
        Ok(true)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.load().len()
    }

    pub async fn start(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let rx = self
            .store
            .subscribe_keyspace(&format!("{}:*", self.namespace))
            .await?;
        self.health.set(Link::Cache, LinkState::Connected);
        Ok(tokio::spawn(self.run(rx, shutdown)))
    }

    async fn run(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<KeyspaceEvent>,
        shutdown: CancellationToken,
    ) {
        debug!(namespace = %self.namespace, "cache listener started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(namespace = %self.namespace, "cache listener stopped");
                    self.health.set(Link::Cache, LinkState::Stopped);
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        let err = ListenerError::ConnectionLost(format!("{}:*", self.namespace));
                        error!(%err, "cache listener lost its subscription");
                        self.health.set(Link::Cache, LinkState::Lost(err.to_string()));
                        break;
                    }
                }
            }
        }
    }

    pub(crate) async fn handle_event(
        &self,
        event: KeyspaceEvent,
    ) {
        self.metrics
            .keyspace_events
            .with_label_values(&[event.kind.as_str()])
            .inc();

        let Some(pattern) = self.matching(&event.key) else {
            trace!(key = %event.key, "no pattern matches key-space event");
            return;
        };

        let key = match CacheKey::from_wire(&event.key, &self.namespace) {
            Ok(key) => key,
            Err(e) => {
                warn!(key = %event.key, error = %e, "dropping key-space event");
                self.metrics
                    .notifications_dropped
                    .with_label_values(&["cache_key"])
                    .inc();
                return;
            }
        };

        let value = match event.kind {
            KeyspaceEventKind::Set => match self.store.get(&event.key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %event.key, error = %e, "re-read after set failed");
                    return;
                }
            },
            KeyspaceEventKind::Del | KeyspaceEventKind::Expired => None,
        };

        trace!(key = %event.key, kind = event.kind.as_str(), glob = %pattern.glob, "key-space event");
        (pattern.handler)(key, value);
    }

    fn matching(
        &self,
        wire_key: &str,
    ) -> Option<Arc<Pattern>> {
        let in_namespace = wire_key
            .strip_prefix(self.namespace.as_str())
            .is_some_and(|rest| rest.starts_with(':'));
        if !in_namespace {
            return None;
        }
        self.patterns
            .load()
            .iter()
            .find(|p| p.regex.is_match(wire_key))
            .cloned()
    }
}

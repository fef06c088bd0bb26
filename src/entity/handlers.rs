use std::collections::HashMap;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use super::Entity;
use crate::metrics::SyncMetrics;
use crate::primitives::Value;

/// Outcome of an application handler. Errors are logged, never propagated.
///
/// Handlers run synchronously on the task that applied the change: the
/// listener task for remote changes, the writer for local ones. A handler
/// must not block; slow work belongs on `tokio::spawn` or
/// `spawn_blocking`, and until it returns no further change is applied.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub(crate) type ValueHandler =
    Arc<dyn Fn(&Entity, Option<&Value>, Option<&Value>) -> HandlerResult + Send + Sync>;
pub(crate) type LinkHandler =
    Arc<dyn Fn(&Entity, Option<&Entity>, Option<&Entity>) -> HandlerResult + Send + Sync>;
pub(crate) type MemberHandler = Arc<dyn Fn(&Entity, &Entity) -> HandlerResult + Send + Sync>;
pub(crate) type LifecycleHandler = Arc<dyn Fn(&Entity) -> HandlerResult + Send + Sync>;

/// Per entity type handler lists, keyed by field name.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    updates: RwLock<HashMap<String, Vec<ValueHandler>>>,
    links: RwLock<HashMap<String, Vec<LinkHandler>>>,
    adds: RwLock<HashMap<String, Vec<MemberHandler>>>,
    removes: RwLock<HashMap<String, Vec<MemberHandler>>>,
    inserts: RwLock<Vec<LifecycleHandler>>,
    deletes: RwLock<Vec<LifecycleHandler>>,
}

impl HandlerRegistry {
    pub(crate) fn add_update(
        &self,
        field: &str,
        handler: ValueHandler,
    ) {
        self.updates.write().entry(field.to_string()).or_default().push(handler);
    }

    pub(crate) fn add_link(
        &self,
        field: &str,
        handler: LinkHandler,
    ) {
        self.links.write().entry(field.to_string()).or_default().push(handler);
    }

    pub(crate) fn add_member_added(
        &self,
        field: &str,
        handler: MemberHandler,
    ) {
        self.adds.write().entry(field.to_string()).or_default().push(handler);
    }

    pub(crate) fn add_member_removed(
        &self,
        field: &str,
        handler: MemberHandler,
    ) {
        self.removes.write().entry(field.to_string()).or_default().push(handler);
    }

    pub(crate) fn add_insert(
        &self,
        handler: LifecycleHandler,
    ) {
        self.inserts.write().push(handler);
    }

    pub(crate) fn add_delete(
        &self,
        handler: LifecycleHandler,
    ) {
        self.deletes.write().push(handler);
    }

    // Lists are cloned out of the lock so handlers may register handlers.

    pub(crate) fn updates(
        &self,
        field: &str,
    ) -> Vec<ValueHandler> {
        self.updates.read().get(field).cloned().unwrap_or_default()
    }

    pub(crate) fn links(
        &self,
        field: &str,
    ) -> Vec<LinkHandler> {
        self.links.read().get(field).cloned().unwrap_or_default()
    }

    pub(crate) fn member_added(
        &self,
        field: &str,
    ) -> Vec<MemberHandler> {
        self.adds.read().get(field).cloned().unwrap_or_default()
    }

    pub(crate) fn member_removed(
        &self,
        field: &str,
    ) -> Vec<MemberHandler> {
        self.removes.read().get(field).cloned().unwrap_or_default()
    }

    pub(crate) fn inserts(&self) -> Vec<LifecycleHandler> {
        self.inserts.read().clone()
    }

    pub(crate) fn deletes(&self) -> Vec<LifecycleHandler> {
        self.deletes.read().clone()
    }
}

/// Runs one handler, catching errors and panics. Returns whether it
/// succeeded.
pub(crate) fn invoke(
    kind: &'static str,
    entity: &Entity,
    metrics: &SyncMetrics,
    handler: impl FnOnce() -> HandlerResult,
) -> bool {
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(handler = kind, entity = %entity, error = %e, "handler failed");
            metrics.handler_failed(kind);
            false
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(handler = kind, entity = %entity, panic = %message, "handler panicked");
            metrics.handler_failed(kind);
            false
        }
    }
}

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::ConnectionMonitor;
use super::Link;
use super::LinkState;
use super::Notification;
use crate::metrics::SyncMetrics;
use crate::store::RelationalStore;
use crate::ListenerError;
use crate::Result;

/// Receives decoded change notifications. Called inline on the listener task,
/// one notification at a time, so implementations must not block on I/O.
/// The engine's sink also runs application handlers here.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync + 'static {
    fn dispatch(
        &self,
        notification: Notification,
    );
}

/// Single persistent subscriber on the change channel.
pub struct ChangeListener {
    store: Arc<dyn RelationalStore>,
    channel: String,
    origin: Arc<str>,
    sink: Arc<dyn NotificationSink>,
    metrics: SyncMetrics,
    health: Arc<ConnectionMonitor>,
}

impl ChangeListener {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        channel: String,
        origin: Arc<str>,
        sink: Arc<dyn NotificationSink>,
        metrics: SyncMetrics,
        health: Arc<ConnectionMonitor>,
    ) -> Self {
        Self {
            store,
            channel,
            origin,
            sink,
            metrics,
            health,
        }
    }

    /// Subscribes, then moves the receive loop onto its own task.
    pub async fn start(
        self,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let rx = self.store.subscribe(&self.channel).await?;
        self.health.set(Link::Database, LinkState::Connected);
        Ok(tokio::spawn(self.run(rx, shutdown)))
    }

    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<String>,
        shutdown: CancellationToken,
    ) {
        debug!(channel = %self.channel, "change listener started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(channel = %self.channel, "change listener stopped");
                    self.health.set(Link::Database, LinkState::Stopped);
                    break;
                }
                payload = rx.recv() => match payload {
                    Some(payload) => self.handle_payload(&payload),
                    None => {
                        let err = ListenerError::ConnectionLost(self.channel.clone());
                        error!(%err, "change listener lost its subscription");
                        self.health.set(Link::Database, LinkState::Lost(err.to_string()));
                        break;
                    }
                }
            }
        }
    }

    /// Decodes one payload and hands it to the sink unless this process
    /// wrote it. Malformed payloads are logged and dropped.
    pub(crate) fn handle_payload(
        &self,
        payload: &str,
    ) {
        let notification = match Notification::parse(payload) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "dropping malformed change notification");
                self.metrics
                    .notifications_dropped
                    .with_label_values(&["malformed"])
                    .inc();
                return;
            }
        };

        self.metrics
            .notifications_received
            .with_label_values(&[&notification.table.to_string(), notification.operation.as_str()])
            .inc();

        if notification.origin == *self.origin {
            trace!(table = %notification.table, op = %notification.operation, "suppressed own notification");
            self.metrics.notifications_suppressed.inc();
            return;
        }

        trace!(
            table = %notification.table,
            op = %notification.operation,
            origin = %notification.origin,
            "dispatching notification"
        );
        self.sink.dispatch(notification);
    }
}

//! Prometheus collectors for one engine instance.
//!
//! Collectors are created per engine and registered into a caller supplied
//! [`Registry`]; nothing is registered globally.

use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;

use crate::Result;


#[derive(Clone, Debug)]
pub struct SyncMetrics {
    /// Change notifications received, labeled by table and operation
    pub notifications_received: IntCounterVec,
    /// Notifications discarded because this process wrote them
    pub notifications_suppressed: IntCounter,
    /// Notifications that failed to parse or decode, labeled by reason
    pub notifications_dropped: IntCounterVec,
    /// Key-space events consumed, labeled by event kind
    pub keyspace_events: IntCounterVec,
    /// Update/add/remove/lifecycle handler failures, labeled by handler kind
    pub handler_failures: IntCounterVec,
    /// Write path task outcomes, labeled `ok` / `err`
    pub write_outcomes: IntCounterVec,
    /// Sets absorbed by a coalescing interval
    pub coalesced_writes: IntCounter,
}

impl SyncMetrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            notifications_received: IntCounterVec::new(
                Opts::new(
                    "cellsync_notifications_received",
                    "Change notifications received from the relational store",
                ),
                &["table", "operation"],
            )?,
            notifications_suppressed: IntCounter::new(
                "cellsync_notifications_suppressed",
                "Self-originated notifications discarded",
            )?,
            notifications_dropped: IntCounterVec::new(
                Opts::new(
                    "cellsync_notifications_dropped",
                    "Notifications dropped because they could not be decoded",
                ),
                &["reason"],
            )?,
            keyspace_events: IntCounterVec::new(
                Opts::new("cellsync_keyspace_events", "Key-space events consumed"),
                &["kind"],
            )?,
            handler_failures: IntCounterVec::new(
                Opts::new("cellsync_handler_failures", "Handler invocations that failed"),
                &["handler"],
            )?,
            write_outcomes: IntCounterVec::new(
                Opts::new("cellsync_write_outcomes", "Write path task outcomes"),
                &["outcome"],
            )?,
            coalesced_writes: IntCounter::new(
                "cellsync_coalesced_writes",
                "Sets folded into a pending coalesced write",
            )?,
        })
    }

    /// Registers every collector. Fails if any name is already registered.
    pub fn register(
        &self,
        registry: &Registry,
    ) -> Result<()> {
        registry.register(Box::new(self.notifications_received.clone()))?;
        registry.register(Box::new(self.notifications_suppressed.clone()))?;
        registry.register(Box::new(self.notifications_dropped.clone()))?;
        registry.register(Box::new(self.keyspace_events.clone()))?;
        registry.register(Box::new(self.handler_failures.clone()))?;
        registry.register(Box::new(self.write_outcomes.clone()))?;
        registry.register(Box::new(self.coalesced_writes.clone()))?;
        Ok(())
    }

    pub(crate) fn handler_failed(
        &self,
        handler: &str,
    ) {
        self.handler_failures.with_label_values(&[handler]).inc();
    }

    pub(crate) fn write_finished(
        &self,
        ok: bool,
    ) {
        let outcome = if ok { "ok" } else { "err" };
        self.write_outcomes.with_label_values(&[outcome]).inc();
    }
}

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::trace;

use super::RowRoute;
use super::TaskQueue;
use super::WriteOp;
use crate::key::Key;
use crate::metrics::SyncMetrics;
use crate::Result;

/// Minimum spacing between persisted writes of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateInterval(pub Duration);

impl UpdateInterval {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

struct Slot {
    route: RowRoute,
    /// Latest write made inside the current interval
    pending: Option<WriteOp>,
}

/// Folds rapid writes of one key into at most one write per interval.
///
/// The first write of a quiet key goes out immediately and opens an interval.
/// Writes inside the interval replace each other; when the interval ends the
/// latest one is written and a new interval opens. An interval that ends with
/// nothing pending closes the slot.
pub struct Coalescer {
    slots: Arc<DashMap<Key, Slot>>,
    queue: Arc<TaskQueue>,
    metrics: SyncMetrics,
    shutdown: CancellationToken,
}

impl Coalescer {
    pub fn new(
        queue: Arc<TaskQueue>,
        metrics: SyncMetrics,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            queue,
            metrics,
            shutdown,
        }
    }

    pub fn submit(
        &self,
        key: Key,
        route: RowRoute,
        interval: UpdateInterval,
        op: impl Into<WriteOp>,
    ) -> Result<()> {
        let op = op.into();
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                trace!(?key, "coalesced write");
                self.metrics.coalesced_writes.inc();
                slot.get_mut().pending = Some(op);
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot {
                    route: route.clone(),
                    pending: None,
                });
                let submitted = self.queue.submit(&route, op).map(|_| ());
                self.arm(key, interval);
                submitted
            }
        }
    }

    /// Drops a pending write for `key`, returning whether one existed.
    pub fn cancel(
        &self,
        key: &Key,
    ) -> bool {
        self.slots
            .get_mut(key)
            .map(|mut slot| slot.pending.take().is_some())
            .unwrap_or(false)
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.pending.is_some()).count()
    }

    /// Writes every pending value now. Called on shutdown before draining.
    pub fn flush(&self) {
        for mut slot in self.slots.iter_mut() {
            if let Some(op) = slot.pending.take() {
                if let Err(e) = self.queue.submit(&slot.route, op) {
                    error!(key = ?slot.key(), error = %e, "failed to flush coalesced write");
                }
            }
        }
    }

    fn arm(
        &self,
        key: Key,
        interval: UpdateInterval,
    ) {
        let slots = self.slots.clone();
        let queue = self.queue.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(interval.0) => {}
                }
                let Some((route, op)) = take_or_close(&slots, &key) else {
                    return;
                };
                trace!(?key, "interval elapsed, writing latest value");
                if let Err(e) = queue.submit(&route, op) {
                    error!(?key, error = %e, "failed to submit coalesced write");
                }
            }
        });
    }
}

/// Ends one interval of `key`: takes the write made during it, or closes the
/// slot when there is none. Runs under the slot's shard lock; a concurrent
/// `submit` is either taken here or finds no slot and opens a new interval.
fn take_or_close(
    slots: &DashMap<Key, Slot>,
    key: &Key,
) -> Option<(RowRoute, WriteOp)> {
    match slots.entry(key.clone()) {
        Entry::Occupied(mut slot) => match slot.get_mut().pending.take() {
            Some(op) => Some((slot.get().route.clone(), op)),
            None => {
                slot.remove();
                None
            }
        },
        Entry::Vacant(_) => None,
    }
}

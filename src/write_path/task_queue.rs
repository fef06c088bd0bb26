use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::key::TableRef;
use crate::metrics::SyncMetrics;
use crate::store::CacheStore;
use crate::store::RelationalStore;
use crate::store::Statement;
use crate::Result;
use crate::WriteError;

/// Whether the caller waits for the database to confirm a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Wait for commit; failures are returned to the caller
    Sync,
    /// Return once queued; failures are logged
    #[default]
    Async,
}

pub type InsertMode = WriteMode;

/// Routing key shared by every write of one root row, so writes of one
/// entity are applied in the order they were made.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowRoute {
    pub table: TableRef,
    pub id: String,
}

impl RowRoute {
    pub fn new(
        table: &TableRef,
        id: &str,
    ) -> Self {
        Self {
            table: table.clone(),
            id: id.to_string(),
        }
    }
}

/// One unit of work for a shard worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Statements committed in one transaction
    Statements(Vec<Statement>),
    CacheSet {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    CacheDelete {
        key: String,
    },
}

impl From<Vec<Statement>> for WriteOp {
    fn from(statements: Vec<Statement>) -> Self {
        WriteOp::Statements(statements)
    }
}

struct WriteTask {
    op: WriteOp,
    reply: oneshot::Sender<Result<()>>,
}

/// Completion handle of one queued batch.
#[derive(Debug)]
pub struct WriteTicket(oneshot::Receiver<Result<()>>);

impl WriteTicket {
    /// Resolves when the batch committed or failed.
    pub async fn wait(self) -> Result<()> {
        match self.0.await {
            Ok(result) => result,
            Err(_) => Err(WriteError::Dropped.into()),
        }
    }
}

/// Sharded queue of statement batches.
pub struct TaskQueue {
    shards: RwLock<Vec<mpsc::UnboundedSender<WriteTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Spawns `workers` shard workers on the current runtime.
    pub fn start(
        store: Arc<dyn RelationalStore>,
        cache_store: Arc<dyn CacheStore>,
        origin: Arc<str>,
        workers: usize,
        metrics: SyncMetrics,
    ) -> Self {
        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for shard in 0..workers.max(1) {
            let (tx, rx) = mpsc::unbounded_channel();
            shards.push(tx);
            handles.push(tokio::spawn(run_worker(
                shard,
                rx,
                store.clone(),
                cache_store.clone(),
                origin.clone(),
                metrics.clone(),
            )));
        }
        Self {
            shards: RwLock::new(shards),
            workers: Mutex::new(handles),
        }
    }

    /// Queues an operation on the shard owning `route`.
    pub fn submit<R: Hash + ?Sized>(
        &self,
        route: &R,
        op: impl Into<WriteOp>,
    ) -> Result<WriteTicket> {
        let op = op.into();
        let (reply, rx) = oneshot::channel();
        let shards = self.shards.read();
        if shards.is_empty() {
            return Err(WriteError::Closed.into());
        }
        let shard = shard_for(route, shards.len());
        shards[shard]
            .send(WriteTask { op, reply })
            .map_err(|_| WriteError::Closed)?;
        Ok(WriteTicket(rx))
    }

    /// Queues and, in `Sync` mode, waits for the commit.
    pub async fn write<R: Hash + ?Sized>(
        &self,
        route: &R,
        op: impl Into<WriteOp>,
        mode: WriteMode,
    ) -> Result<()> {
        let ticket = self.submit(route, op)?;
        match mode {
            WriteMode::Sync => ticket.wait().await,
            WriteMode::Async => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shards.read().is_empty()
    }

    /// Stops accepting batches and waits for every queued batch to finish.
    /// Queued batches are executed, never cancelled.
    pub async fn drain(
        &self,
        timeout: Duration,
    ) -> Result<()> {
        drop(std::mem::take(&mut *self.shards.write()));
        let handles = std::mem::take(&mut *self.workers.lock());
        debug!(workers = handles.len(), "draining write path");

        match tokio::time::timeout(timeout, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    result?;
                }
                Ok(())
            }
            Err(_) => Err(WriteError::DrainTimeout(timeout).into()),
        }
    }
}

fn shard_for<R: Hash + ?Sized>(
    route: &R,
    shards: usize,
) -> usize {
    let mut hasher = DefaultHasher::new();
    route.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

async fn run_worker(
    shard: usize,
    mut rx: mpsc::UnboundedReceiver<WriteTask>,
    store: Arc<dyn RelationalStore>,
    cache_store: Arc<dyn CacheStore>,
    origin: Arc<str>,
    metrics: SyncMetrics,
) {
    trace!(shard, "write worker started");
    while let Some(task) = rx.recv().await {
        let result = match task.op {
            WriteOp::Statements(statements) => {
                store.apply(&origin, statements).await.map(|_| ())
            }
            WriteOp::CacheSet { key, value, ttl } => cache_store.set(&key, &value, ttl).await,
            WriteOp::CacheDelete { key } => cache_store.delete(&key).await.map(|_| ()),
        };
        metrics.write_finished(result.is_ok());
        trace!(shard, ok = result.is_ok(), "write finished");

        // Nobody waits on asynchronous writes, so their failures end here.
        if let Err(Err(e)) = task.reply.send(result) {
            error!(shard, error = %e, "asynchronous write failed");
        }
    }
    trace!(shard, "write worker stopped");
}

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing_test::traced_test;

use super::*;
use crate::key::TableRef;
use crate::metrics::SyncMetrics;
use crate::store::Filter;
use crate::store::MockCacheStore;
use crate::store::MockRelationalStore;
use crate::store::Statement;
use crate::Error;
use crate::StoreError;
use crate::SystemError;
use crate::WriteError;

fn update(value: &str) -> Statement {
    Statement::Update {
        table: TableRef::new("public", "users"),
        assignments: vec![("name".to_string(), Some(value.to_string()))],
        filter: Filter::eq("id", "u1"),
    }
}

fn recording_store(log: Arc<Mutex<Vec<String>>>) -> MockRelationalStore {
    let mut store = MockRelationalStore::new();
    store.expect_apply().returning(move |origin, statements| {
        assert_eq!(origin, "proc-a");
        for statement in &statements {
            if let Statement::Update { assignments, .. } = statement {
                log.lock().push(assignments[0].1.clone().unwrap_or_default());
            }
        }
        Ok(vec![1; statements.len()])
    });
    store
}

fn queue(store: MockRelationalStore) -> (TaskQueue, SyncMetrics) {
    let metrics = SyncMetrics::new().unwrap();
    let queue = TaskQueue::start(
        Arc::new(store),
        Arc::new(MockCacheStore::new()),
        Arc::from("proc-a"),
        4,
        metrics.clone(),
    );
    (queue, metrics)
}

#[tokio::test]
async fn test_sync_write_waits_for_commit() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (queue, metrics) = queue(recording_store(log.clone()));

    queue.write("u1", vec![update("Bo")], WriteMode::Sync).await.unwrap();

    assert_eq!(*log.lock(), vec!["Bo".to_string()]);
    assert_eq!(metrics.write_outcomes.with_label_values(&["ok"]).get(), 1);
}

#[tokio::test]
async fn test_sync_write_surfaces_store_error() {
    let mut store = MockRelationalStore::new();
    store.expect_apply().returning(|_, _| {
        Err(StoreError::Constraint {
            table: "public.users".to_string(),
            detail: "duplicate key".to_string(),
        }
        .into())
    });
    let (queue, metrics) = queue(store);

    let err = queue
        .write("u1", vec![update("Bo")], WriteMode::Sync)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::System(SystemError::Store(StoreError::Constraint { .. }))
    ));
    assert_eq!(metrics.write_outcomes.with_label_values(&["err"]).get(), 1);
}

#[tokio::test]
#[traced_test]
async fn test_async_write_failure_is_logged() {
    let mut store = MockRelationalStore::new();
    store
        .expect_apply()
        .returning(|_, _| Err(StoreError::Disconnected.into()));
    let (queue, _) = queue(store);

    queue.write("u1", vec![update("Bo")], WriteMode::Async).await.unwrap();
    queue.drain(Duration::from_secs(5)).await.unwrap();

    assert!(logs_contain("asynchronous write failed"));
}

#[tokio::test]
async fn test_same_route_keeps_submission_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (queue, _) = queue(recording_store(log.clone()));

    for i in 0..100 {
        queue.submit("u1", vec![update(&i.to_string())]).unwrap();
    }
    queue.drain(Duration::from_secs(5)).await.unwrap();

    let expected: Vec<String> = (0..100).map(|i| i.to_string()).collect();
    assert_eq!(*log.lock(), expected);
}

#[tokio::test]
async fn test_drain_runs_queued_batches_then_closes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (queue, _) = queue(recording_store(log.clone()));

    let tickets: Vec<_> = (0..10)
        .map(|i| queue.submit(&format!("u{i}"), vec![update("x")]).unwrap())
        .collect();
    queue.drain(Duration::from_secs(5)).await.unwrap();

    assert_eq!(log.lock().len(), 10);
    for ticket in tickets {
        ticket.wait().await.unwrap();
    }
    assert!(queue.is_closed());
    assert!(matches!(
        queue.submit("u1", vec![update("late")]),
        Err(Error::System(SystemError::Write(WriteError::Closed)))
    ));
}

#[tokio::test]
async fn test_cache_ops_run_on_the_cache_store() {
    let mut cache_store = MockCacheStore::new();
    cache_store
        .expect_set()
        .withf(|key, value, ttl| {
            key.to_string() == "cellsync:public:users:id:u1:status"
                && value.to_string() == "online"
                && *ttl == Some(Duration::from_secs(5))
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    cache_store.expect_delete().times(1).returning(|_| Ok(true));

    let queue = TaskQueue::start(
        Arc::new(MockRelationalStore::new()),
        Arc::new(cache_store),
        Arc::from("proc-a"),
        2,
        SyncMetrics::new().unwrap(),
    );
    let route = RowRoute::new(&TableRef::new("public", "users"), "u1");
    queue
        .write(
            &route,
            WriteOp::CacheSet {
                key: "cellsync:public:users:id:u1:status".to_string(),
                value: "online".to_string(),
                ttl: Some(Duration::from_secs(5)),
            },
            WriteMode::Sync,
        )
        .await
        .unwrap();
    queue
        .write(
            &route,
            WriteOp::CacheDelete {
                key: "cellsync:public:users:id:u1:status".to_string(),
            },
            WriteMode::Sync,
        )
        .await
        .unwrap();
}

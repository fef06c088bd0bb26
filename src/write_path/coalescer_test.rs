use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::key::Key;
use crate::key::TableRef;
use crate::metrics::SyncMetrics;
use crate::store::Filter;
use crate::store::MockCacheStore;
use crate::store::MockRelationalStore;
use crate::store::Statement;

fn users() -> TableRef {
    TableRef::new("public", "users")
}

fn score(value: i64) -> Vec<Statement> {
    vec![Statement::Update {
        table: users(),
        assignments: vec![("score".to_string(), Some(value.to_string()))],
        filter: Filter::eq("id", "u1"),
    }]
}

fn setup() -> (Coalescer, Arc<TaskQueue>, Arc<Mutex<Vec<String>>>, SyncMetrics) {
    let written = Arc::new(Mutex::new(Vec::new()));
    let log = written.clone();
    let mut store = MockRelationalStore::new();
    store.expect_apply().returning(move |_, statements| {
        for statement in &statements {
            if let Statement::Update { assignments, .. } = statement {
                log.lock().push(assignments[0].1.clone().unwrap_or_default());
            }
        }
        Ok(vec![1])
    });
    let metrics = SyncMetrics::new().unwrap();
    let queue = Arc::new(TaskQueue::start(
        Arc::new(store),
        Arc::new(MockCacheStore::new()),
        Arc::from("me"),
        2,
        metrics.clone(),
    ));
    let coalescer = Coalescer::new(queue.clone(), metrics.clone(), CancellationToken::new());
    (coalescer, queue, written, metrics)
}

fn key() -> Key {
    Key::cell(&users(), "score", "id", "u1")
}

fn route() -> RowRoute {
    RowRoute::new(&users(), "u1")
}

#[tokio::test(start_paused = true)]
async fn test_rapid_sets_write_first_and_latest() {
    let (coalescer, _queue, written, metrics) = setup();
    let interval = UpdateInterval::from_millis(1000);

    for value in 1..=5 {
        coalescer.submit(key(), route(), interval, score(value)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*written.lock(), vec!["1".to_string()]);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(*written.lock(), vec!["1".to_string(), "5".to_string()]);
    assert_eq!(metrics.coalesced_writes.get(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_key_slot_closes() {
    let (coalescer, _queue, written, _) = setup();
    let interval = UpdateInterval::from_millis(100);

    coalescer.submit(key(), route(), interval, score(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(coalescer.pending(), 0);

    // a new interval opens with an immediate write
    coalescer.submit(key(), route(), interval, score(2)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*written.lock(), vec!["1".to_string(), "2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_flush_writes_pending_before_drain() {
    let (coalescer, queue, written, _) = setup();
    let interval = UpdateInterval::from_millis(60_000);

    coalescer.submit(key(), route(), interval, score(1)).unwrap();
    coalescer.submit(key(), route(), interval, score(2)).unwrap();
    assert_eq!(coalescer.pending(), 1);

    coalescer.flush();
    queue.drain(Duration::from_secs(1)).await.unwrap();

    assert_eq!(*written.lock(), vec!["1".to_string(), "2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_discards_pending_value() {
    let (coalescer, _queue, written, _) = setup();
    let interval = UpdateInterval::from_millis(100);

    coalescer.submit(key(), route(), interval, score(1)).unwrap();
    coalescer.submit(key(), route(), interval, score(2)).unwrap();
    assert!(coalescer.cancel(&key()));
    assert!(!coalescer.cancel(&key()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*written.lock(), vec!["1".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submits_always_persist_latest_value() {
    let written = Arc::new(Mutex::new(Vec::new()));
    let log = written.clone();
    let mut store = MockRelationalStore::new();
    store.expect_apply().returning(move |_, statements| {
        for statement in &statements {
            if let Statement::Update { assignments, .. } = statement {
                log.lock().push(assignments[0].1.clone().unwrap_or_default());
            }
        }
        Ok(vec![1])
    });
    let metrics = SyncMetrics::new().unwrap();
    let queue = Arc::new(TaskQueue::start(
        Arc::new(store),
        Arc::new(MockCacheStore::new()),
        Arc::from("me"),
        4,
        metrics.clone(),
    ));
    let coalescer = Arc::new(Coalescer::new(queue, metrics, CancellationToken::new()));
    let interval = UpdateInterval::from_millis(1);

    let mut tasks = Vec::new();
    for row in 0..64 {
        let coalescer = coalescer.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("u{row}");
            let key = Key::cell(&users(), "score", "id", &id);
            for value in 1..=30 {
                let statement = Statement::Update {
                    table: users(),
                    assignments: vec![("score".to_string(), Some(format!("{id}:{value}")))],
                    filter: Filter::eq("id", id.as_str()),
                };
                coalescer
                    .submit(key.clone(), RowRoute::new(&users(), &id), interval, vec![statement])
                    .unwrap();
                if value % 3 == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let latest_persisted = |written: &[String]| {
        (0..64).all(|row| {
            let prefix = format!("u{row}:");
            written.iter().rev().find(|w| w.starts_with(&prefix)) == Some(&format!("u{row}:30"))
        })
    };
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !latest_persisted(written.lock().as_slice()) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "a coalesced write was never persisted"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(coalescer.pending(), 0);
}

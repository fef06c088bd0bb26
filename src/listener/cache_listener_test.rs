use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use super::*;
use crate::key::CacheKey;
use crate::key::PartialKey;
use crate::key::TableRef;
use crate::metrics::SyncMetrics;
use crate::store::KeyspaceEvent;
use crate::store::KeyspaceEventKind;
use crate::store::MockCacheStore;

type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

fn status_field() -> PartialKey {
    PartialKey::Cache {
        table: TableRef::new("public", "users"),
        id_column: "id".to_string(),
        logical_name: "status".to_string(),
    }
}

fn recording_handler(seen: &Seen) -> KeyspaceHandler {
    let seen = seen.clone();
    Arc::new(move |key: CacheKey, value: Option<String>| {
        seen.lock().push((key.root_id, value));
    })
}

fn listener(store: MockCacheStore) -> CacheListener {
    CacheListener::new(
        Arc::new(store),
        "cellsync".to_string(),
        SyncMetrics::new().unwrap(),
        Arc::new(ConnectionMonitor::new()),
    )
}

fn event(
    key: &str,
    kind: KeyspaceEventKind,
) -> KeyspaceEvent {
    KeyspaceEvent {
        key: key.to_string(),
        kind,
    }
}

#[tokio::test]
async fn test_set_rereads_value_from_store() {
    let mut store = MockCacheStore::new();
    store
        .expect_get()
        .withf(|key| key.to_string() == "cellsync:public:users:id:u1:status")
        .times(1)
        .returning(|_| Ok(Some("online".to_string())));

    let listener = listener(store);
    let seen = Seen::default();
    assert!(listener.register(status_field(), recording_handler(&seen)).unwrap());

    listener
        .handle_event(event("cellsync:public:users:id:u1:status", KeyspaceEventKind::Set))
        .await;

    assert_eq!(*seen.lock(), vec![("u1".to_string(), Some("online".to_string()))]);
}

#[tokio::test]
async fn test_delete_and_expire_skip_the_read() {
    let mut store = MockCacheStore::new();
    store.expect_get().never();

    let listener = listener(store);
    let seen = Seen::default();
    listener.register(status_field(), recording_handler(&seen)).unwrap();

    listener
        .handle_event(event("cellsync:public:users:id:u1:status", KeyspaceEventKind::Del))
        .await;
    listener
        .handle_event(event("cellsync:public:users:id:u2:status", KeyspaceEventKind::Expired))
        .await;

    assert_eq!(
        *seen.lock(),
        vec![("u1".to_string(), None), ("u2".to_string(), None)]
    );
}

#[tokio::test]
async fn test_keys_outside_namespace_are_ignored() {
    let mut store = MockCacheStore::new();
    store.expect_get().never();

    let listener = listener(store);
    let seen = Seen::default();
    listener.register(status_field(), recording_handler(&seen)).unwrap();

    listener
        .handle_event(event("other:public:users:id:u1:status", KeyspaceEventKind::Set))
        .await;
    listener
        .handle_event(event("cellsyncx:public:users:id:u1:status", KeyspaceEventKind::Set))
        .await;
    listener
        .handle_event(event("cellsync:public:users:id:u1:mood", KeyspaceEventKind::Set))
        .await;

    assert!(seen.lock().is_empty());
}

#[test]
fn test_registering_same_partial_key_twice_is_noop() {
    let listener = listener(MockCacheStore::new());
    let seen = Seen::default();

    assert!(listener.register(status_field(), recording_handler(&seen)).unwrap());
    assert!(!listener.register(status_field(), recording_handler(&seen)).unwrap());
    assert_eq!(listener.pattern_count(), 1);
}

#[test]
fn test_non_cache_partial_key_is_rejected() {
    let listener = listener(MockCacheStore::new());
    let partial = PartialKey::Cell {
        table: TableRef::new("public", "users"),
        column: "name".to_string(),
        id_column: "id".to_string(),
    };
    assert!(listener.register(partial, Arc::new(|_, _| {})).is_err());
}

#[tokio::test]
async fn test_first_matching_pattern_wins() {
    let mut store = MockCacheStore::new();
    store.expect_get().returning(|_| Ok(Some("x".to_string())));
    let listener = listener(store);

    let first = Seen::default();
    let second = Seen::default();
    listener.register(status_field(), recording_handler(&first)).unwrap();
    // distinct partial key whose glob overlaps the first one
    let overlapping = PartialKey::Cache {
        table: TableRef::new("public", "users"),
        id_column: "id".to_string(),
        logical_name: "*".to_string(),
    };
    listener.register(overlapping, recording_handler(&second)).unwrap();

    listener
        .handle_event(event("cellsync:public:users:id:u1:status", KeyspaceEventKind::Set))
        .await;

    assert_eq!(first.lock().len(), 1);
    assert!(second.lock().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_failed_reread_is_logged() {
    let mut store = MockCacheStore::new();
    store
        .expect_get()
        .returning(|_| Err(crate::StoreError::Disconnected.into()));
    let listener = listener(store);
    let seen = Seen::default();
    listener.register(status_field(), recording_handler(&seen)).unwrap();

    listener
        .handle_event(event("cellsync:public:users:id:u1:status", KeyspaceEventKind::Set))
        .await;

    assert!(seen.lock().is_empty());
    assert!(logs_contain("re-read after set failed"));
}

#[tokio::test]
async fn test_stream_end_marks_cache_link_lost() {
    let (tx, rx) = mpsc::unbounded_channel::<KeyspaceEvent>();
    let mut store = MockCacheStore::new();
    store
        .expect_subscribe_keyspace()
        .withf(|pattern| pattern.to_string() == "cellsync:*")
        .return_once(move |_| Ok(rx));

    let health = Arc::new(ConnectionMonitor::new());
    let listener = Arc::new(CacheListener::new(
        Arc::new(store),
        "cellsync".to_string(),
        SyncMetrics::new().unwrap(),
        health.clone(),
    ));
    let handle = listener.start(CancellationToken::new()).await.unwrap();
    drop(tx);
    handle.await.unwrap();

    assert!(health.current().cache.is_lost());
    assert_eq!(health.current().database, LinkState::Connecting);
}

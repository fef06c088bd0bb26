use std::sync::Arc;

use super::*;
use crate::config::CacheConfig;
use crate::key::Key;
use crate::key::TableRef;
use crate::primitives::Value;

fn users() -> TableRef {
    TableRef::new("public", "users")
}

#[test]
fn test_put_then_get_returns_latest_value() {
    let cache = ValueCache::new(&CacheConfig::default());
    let key = Key::cell(&users(), "name", "id", "u1");

    assert_eq!(cache.get_scalar(&key), None);
    cache.put(key.clone(), CachedValue::Scalar(Some("Ann".into())));
    let previous = cache.put(key.clone(), CachedValue::Scalar(Some("Bo".into())));

    assert_eq!(previous, Some(CachedValue::Scalar(Some("Ann".into()))));
    assert_eq!(cache.get_scalar(&key), Some(Some(Value::Text("Bo".into()))));
}

#[test]
fn test_absent_is_distinct_from_miss() {
    let cache = ValueCache::default();
    let key = Key::cache(&users(), "id", "u1", "status");

    assert!(!cache.contains(&key));
    cache.put(key.clone(), CachedValue::Absent);
    assert!(cache.contains(&key));
    assert_eq!(cache.get_scalar(&key), Some(None));
}

#[test]
fn test_membership_transitions_report_once() {
    let cache = ValueCache::default();
    let key = Key::collection(&TableRef::new("public", "user_friends"), "user_id", "friend_id", "u1");

    assert!(cache.add_member(key.clone(), "u2"));
    assert!(!cache.add_member(key.clone(), "u2"));
    assert!(cache.add_member(key.clone(), "u3"));
    assert_eq!(cache.members(&key).len(), 2);

    assert!(cache.remove_member(&key, "u2"));
    assert!(!cache.remove_member(&key, "u2"));
    assert!(!cache.remove_member(&key, "never"));
    assert_eq!(
        cache.members(&key).iter().cloned().collect::<Vec<_>>(),
        vec!["u3".to_string()]
    );
}

#[test]
fn test_members_snapshot_is_not_mutated_by_later_adds() {
    let cache = ValueCache::default();
    let key = Key::collection(&users(), "user_id", "tag", "u1");
    cache.add_member(key.clone(), "t1");

    let snapshot = cache.members(&key);
    cache.add_member(key.clone(), "t2");

    assert_eq!(snapshot.len(), 1);
    assert_eq!(cache.members(&key).len(), 2);
}

#[test]
fn test_remove_scoped_evicts_only_that_row() {
    let cache = ValueCache::default();
    let table = users();
    cache.put(Key::cell(&table, "name", "id", "u1"), CachedValue::Scalar(Some("Ann".into())));
    cache.put(Key::cell(&table, "age", "id", "u1"), CachedValue::Scalar(Some(Value::Int32(3))));
    cache.put(Key::cache(&table, "id", "u1", "status"), CachedValue::Absent);
    cache.put(Key::cell(&table, "name", "id", "u2"), CachedValue::Scalar(Some("Bo".into())));

    let removed = cache.remove_scoped(&table, "id", "u1");

    assert_eq!(removed.len(), 3);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(&Key::cell(&table, "name", "id", "u2")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_membership_adds_are_counted_once() {
    let cache = Arc::new(ValueCache::default());
    let key = Key::collection(&users(), "user_id", "tag", "u1");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { cache.add_member(key, "same") }));
    }
    let mut transitions = 0;
    for handle in handles {
        if handle.await.unwrap() {
            transitions += 1;
        }
    }

    assert_eq!(transitions, 1);
    assert_eq!(cache.members(&key).len(), 1);
}

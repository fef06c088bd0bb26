use mockall::predicate::eq;

use super::*;
use crate::config::ListenerConfig;
use crate::key::TableRef;
use crate::store::MockRelationalStore;
use crate::Error;
use crate::ModelError;
use crate::SchemaError;

fn users() -> TableRef {
    TableRef::new("public", "users")
}

#[tokio::test]
async fn test_columns_are_fetched_once() {
    let mut store = MockRelationalStore::new();
    store
        .expect_table_columns()
        .with(eq(users()))
        .times(1)
        .returning(|_| Ok(vec!["id".to_string(), "name".to_string()]));

    let cache = SchemaCache::new();
    let first = cache.columns(&store, &users()).await.unwrap();
    let second = cache.columns(&store, &users()).await.unwrap();

    assert_eq!(first.as_slice(), ["id", "name"]);
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let mut store = MockRelationalStore::new();
    let mut calls = 0;
    store.expect_table_columns().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Ok(vec!["id".to_string()])
        } else {
            Ok(vec!["id".to_string(), "email".to_string()])
        }
    });

    let cache = SchemaCache::new();
    assert!(cache.require_column(&store, &users(), "email").await.is_err());
    cache.invalidate(&users());
    assert!(cache.require_column(&store, &users(), "email").await.is_ok());
}

#[tokio::test]
async fn test_missing_table_is_reported() {
    let mut store = MockRelationalStore::new();
    store.expect_table_columns().returning(|_| Ok(Vec::new()));

    let cache = SchemaCache::new();
    let err = cache.columns(&store, &users()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Model(ModelError::Schema(SchemaError::UnknownTable(_)))
    ));
}

#[tokio::test]
async fn test_trigger_installed_once_per_table() {
    let mut store = MockRelationalStore::new();
    // function once, then one trigger per table
    store.expect_apply_ddl().times(3).returning(|_| Ok(()));

    let cache = SchemaCache::new();
    let config = ListenerConfig::default();
    cache.ensure_trigger(&store, &config, &users()).await.unwrap();
    cache.ensure_trigger(&store, &config, &users()).await.unwrap();
    cache
        .ensure_trigger(&store, &config, &TableRef::new("public", "posts"))
        .await
        .unwrap();

    assert!(cache.has_trigger(&users()));
}

use std::collections::HashSet;

use super::*;
use crate::KeyError;

fn users() -> TableRef {
    TableRef::new("public", "users")
}

#[test]
fn test_cache_key_string_roundtrip() {
    let key = CacheKey {
        table: users(),
        id_column: "id".to_string(),
        root_id: "u1".to_string(),
        logical_name: "status".to_string(),
    };
    let wire = key.to_string();
    assert_eq!(wire, "public:users:id:u1:status");
    assert_eq!(wire.parse::<CacheKey>().unwrap(), key);
}

#[test]
fn test_cache_key_root_id_may_contain_colons() {
    let key = CacheKey {
        table: users(),
        id_column: "id".to_string(),
        root_id: "tenant:42:u1".to_string(),
        logical_name: "status".to_string(),
    };
    assert_eq!(key.to_string().parse::<CacheKey>().unwrap(), key);
}

#[test]
fn test_cache_key_wire_namespace() {
    let key = CacheKey {
        table: users(),
        id_column: "id".to_string(),
        root_id: "u1".to_string(),
        logical_name: "status".to_string(),
    };
    let wire = key.to_wire("cellsync");
    assert_eq!(wire, "cellsync:public:users:id:u1:status");
    assert_eq!(CacheKey::from_wire(&wire, "cellsync").unwrap(), key);

    assert!(matches!(
        CacheKey::from_wire("other:public:users:id:u1:status", "cellsync"),
        Err(KeyError::ForeignNamespace { .. })
    ));
    // A namespace that merely shares a prefix is still foreign
    assert!(CacheKey::from_wire("cellsyncx:public:users:id:u1:status", "cellsync").is_err());
}

#[test]
fn test_cache_key_malformed() {
    for bad in ["", "a:b:c", "a:b:c:d", "a:b:c::e", ":b:c:d:e"] {
        assert!(bad.parse::<CacheKey>().is_err(), "{bad:?} should not parse");
    }
}

#[test]
fn test_keys_of_different_variants_never_equal() {
    let table = users();
    let cell = Key::cell(&table, "name", "id", "u1");
    let coll = Key::collection(&table, "name", "id", "u1");
    let cache = Key::cache(&table, "id", "u1", "name");

    let set: HashSet<Key> = [cell.clone(), coll.clone(), cache.clone()].into_iter().collect();
    assert_eq!(set.len(), 3);
    assert_ne!(cell, coll);
    assert_ne!(cell, cache);
}

#[test]
fn test_keys_differing_in_one_component_are_distinct() {
    let table = users();
    assert_ne!(
        Key::cell(&table, "name", "id", "u1"),
        Key::cell(&table, "name", "id", "u2")
    );
    assert_ne!(
        Key::cell(&table, "name", "id", "u1"),
        Key::cell(&TableRef::new("audit", "users"), "name", "id", "u1")
    );
    assert_eq!(
        Key::cell(&table, "name", "id", "u1"),
        Key::cell(&users(), "name", "id", "u1")
    );
}

#[test]
fn test_partial_key_drops_root_id() {
    let table = users();
    assert_eq!(
        Key::cell(&table, "name", "id", "u1").to_partial_key(),
        Key::cell(&table, "name", "id", "u2").to_partial_key()
    );
    let entry = Key::CollectionEntry(CollectionEntryKey {
        collection: CollectionKey {
            table: table.clone(),
            linking_column: "user_id".to_string(),
            data_column: "tag".to_string(),
            root_id: "u1".to_string(),
        },
        entry_id: "t1".to_string(),
    });
    assert_eq!(
        entry.to_partial_key(),
        Key::collection(&table, "user_id", "tag", "u9").to_partial_key()
    );
}

#[test]
fn test_partial_cache_key_glob() {
    let partial = Key::cache(&users(), "id", "u1", "status").to_partial_key();
    assert_eq!(
        partial.to_glob("cellsync").as_deref(),
        Some("cellsync:public:users:id:*:status")
    );
    assert_eq!(Key::cell(&users(), "name", "id", "u1").to_partial_key().to_glob("cellsync"), None);
}

#[test]
fn test_scoped_to_row() {
    let table = users();
    assert!(Key::cell(&table, "name", "id", "u1").is_scoped_to(&table, "id", "u1"));
    assert!(Key::cache(&table, "id", "u1", "status").is_scoped_to(&table, "id", "u1"));
    assert!(!Key::cell(&table, "name", "id", "u1").is_scoped_to(&table, "id", "u2"));
    assert!(!Key::collection(&table, "user_id", "tag", "u1").is_scoped_to(&table, "user_id", "u1"));
}

#[test]
fn test_identifier_validation() {
    assert!(validate_identifier("user_friends").is_ok());
    assert!(validate_identifier("_x1").is_ok());
    for bad in ["", "1abc", "a-b", "a:b", "a,b", "a b", "a\"b"] {
        assert!(validate_identifier(bad).is_err(), "{bad:?} should be rejected");
    }
    assert_eq!(users().quoted(), "\"public\".\"users\"");
}

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::config::CacheConfig;
use crate::key::Key;
use crate::key::TableRef;
use crate::primitives::Value;

/// A cached entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// Decoded scalar; `None` is SQL NULL.
    Scalar(Option<Value>),
    /// Cache-backed value the key/value store reported as missing.
    Absent,
    /// Entry ids currently in a collection.
    Members(Arc<BTreeSet<String>>),
}

impl CachedValue {
    pub fn scalar(&self) -> Option<&Value> {
        match self {
            CachedValue::Scalar(v) => v.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ValueCache {
    entries: DashMap<Key, CachedValue>,
}

impl Default for ValueCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl ValueCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::with_capacity_and_shard_amount(
                config.initial_capacity,
                config.shard_amount,
            ),
        }
    }

    pub fn get(
        &self,
        key: &Key,
    ) -> Option<CachedValue> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Outer `None` is a cache miss, inner `None` a cached NULL or absence.
    pub fn get_scalar(
        &self,
        key: &Key,
    ) -> Option<Option<Value>> {
        self.entries.get(key).map(|e| match e.value() {
            CachedValue::Scalar(v) => v.clone(),
            _ => None,
        })
    }

    pub fn contains(
        &self,
        key: &Key,
    ) -> bool {
        self.entries.contains_key(key)
    }

    /// Upserts and returns the replaced entry.
    pub fn put(
        &self,
        key: Key,
        value: CachedValue,
    ) -> Option<CachedValue> {
        trace!(?key, ?value, "cache put");
        self.entries.insert(key, value)
    }

    pub fn remove(
        &self,
        key: &Key,
    ) -> Option<CachedValue> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    /// Adds one entry id to a membership set. Returns `true` only on the
    /// transition from non-member to member.
    pub fn add_member(
        &self,
        key: Key,
        entry_id: &str,
    ) -> bool {
        let mut entry = self
            .entries
            .entry(key)
            .or_insert_with(|| CachedValue::Members(Arc::default()));
        match entry.value_mut() {
            CachedValue::Members(members) => {
                if members.contains(entry_id) {
                    return false;
                }
                let mut next = BTreeSet::clone(members);
                next.insert(entry_id.to_string());
                *members = Arc::new(next);
                true
            }
            other => {
                *other = CachedValue::Members(Arc::new(BTreeSet::from([entry_id.to_string()])));
                true
            }
        }
    }

    /// Removes one entry id. Returns `true` only on the transition from
    /// member to non-member.
    pub fn remove_member(
        &self,
        key: &Key,
        entry_id: &str,
    ) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => match entry.value_mut() {
                CachedValue::Members(members) if members.contains(entry_id) => {
                    let mut next = BTreeSet::clone(members);
                    next.remove(entry_id);
                    *members = Arc::new(next);
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    pub fn members(
        &self,
        key: &Key,
    ) -> Arc<BTreeSet<String>> {
        match self.entries.get(key).as_deref() {
            Some(CachedValue::Members(members)) => members.clone(),
            _ => Arc::default(),
        }
    }

    /// Evicts every cell and cache-backed entry of one row.
    pub fn remove_scoped(
        &self,
        table: &TableRef,
        id_column: &str,
        root_id: &str,
    ) -> Vec<(Key, CachedValue)> {
        let mut removed = Vec::new();
        self.entries.retain(|key, value| {
            if key.is_scoped_to(table, id_column, root_id) {
                removed.push((key.clone(), value.clone()));
                false
            } else {
                true
            }
        });
        trace!(%table, root_id, count = removed.len(), "evicted row");
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

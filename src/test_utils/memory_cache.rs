use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::mpsc;

use crate::listener::compile_glob;
use crate::store::CacheStore;
use crate::store::KeyspaceEvent;
use crate::store::KeyspaceEventKind;
use crate::Result;
use crate::StoreError;

#[derive(Default)]
struct CacheState {
    /// Value and the write generation that set it
    entries: HashMap<String, (String, u64)>,
    generation: u64,
    subscribers: Vec<(Regex, mpsc::UnboundedSender<KeyspaceEvent>)>,
}

impl CacheState {
    fn publish(
        &mut self,
        key: &str,
        kind: KeyspaceEventKind,
    ) {
        let event = KeyspaceEvent {
            key: key.to_string(),
            kind,
        };
        self.subscribers
            .retain(|(pattern, tx)| !pattern.is_match(key) || tx.send(event.clone()).is_ok());
    }
}

/// In-memory key/value store with TTLs and key-space events.
///
/// Expiry runs on tokio timers, so paused-clock tests can advance past a TTL
/// and observe the `expired` event.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    state: Arc<Mutex<CacheState>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(
        &self,
        key: &str,
    ) -> Option<String> {
        self.state.lock().entries.get(key).map(|(v, _)| v.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Ends every key-space subscription.
    pub fn disconnect_subscribers(&self) {
        self.state.lock().subscribers.clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>> {
        Ok(self.value(key))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            let generation = state.generation;
            state
                .entries
                .insert(key.to_string(), (value.to_string(), generation));
            state.publish(key, KeyspaceEventKind::Set);
            generation
        };

        if let Some(ttl) = ttl {
            let state = self.state.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let mut state = state.lock();
                if state.entries.get(&key).is_some_and(|(_, g)| *g == generation) {
                    state.entries.remove(&key);
                    state.publish(&key, KeyspaceEventKind::Expired);
                }
            });
        }
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        let removed = state.entries.remove(key).is_some();
        if removed {
            state.publish(key, KeyspaceEventKind::Del);
        }
        Ok(removed)
    }

    async fn subscribe_keyspace(
        &self,
        pattern: &str,
    ) -> Result<mpsc::UnboundedReceiver<KeyspaceEvent>> {
        let pattern = compile_glob(pattern).map_err(|e| StoreError::Cache(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push((pattern, tx));
        Ok(rx)
    }
}

//! In-process [`KvStore`] backed by a hash map.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::Mutex;

use glean_shared::Result;

use crate::{KvStore, StoreMap};

/// Volatile key-value store for tests and throwaway sessions.
///
/// Every call yields to the scheduler once before touching the map, so
/// concurrent callers interleave the way they would against a real backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl KvStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        tokio::task::yield_now().await;
        let entries = self.entries.lock().await;
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(*k).map(|v| ((*k).to_owned(), v.clone())))
            .collect())
    }

    async fn set(&self, items: StoreMap) -> Result<()> {
        tokio::task::yield_now().await;
        self.entries.lock().await.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        tokio::task::yield_now().await;
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

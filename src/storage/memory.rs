use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::KeyValueStore;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store. Expired entries are dropped lazily on access.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.read().get(key).and_then(|e| e.expires_at)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn store(&self, key: &str, value: Value, ttl_seconds: Option<u64>) -> Result<()> {
        let expires_at = ttl_seconds.map(|ttl| Utc::now() + Duration::seconds(ttl as i64));
        self.entries
            .write()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Value>> {
        let now = Utc::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .entries
            .write()
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }
}

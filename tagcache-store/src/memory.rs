//! In-memory TTL store.
//!
//! A `HashMap` of entries with absolute deadlines behind an `RwLock`.
//! Deadlines use `tokio::time::Instant`, so TTL behavior is testable
//! under a paused runtime clock. Expired entries are dropped lazily:
//! reads treat them as absent, writes to the same key replace them.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tagcache_core::StoreError;
use tokio::time::Instant;

use crate::traits::{negative_ttl, Store, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    deadline: Instant,
}

impl Entry {
    fn new(value: Value, ttl: Duration) -> Self {
        // Null values are negative results; bound their staleness.
        let effective = if value.is_null() { negative_ttl(ttl) } else { ttl };
        Self {
            value,
            deadline: Instant::now() + effective,
        }
    }

    fn live(&self) -> bool {
        Instant::now() < self.deadline
    }
}

/// In-process store backend.
///
/// Suitable for tests and single-process use. All operations are
/// synchronous under the hood; the async surface exists to satisfy the
/// [`Store`] contract shared with networked backends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), Entry::new(value.clone(), ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<Value>>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|entry| entry.live())
                    .map(|entry| entry.value.clone())
            })
            .collect())
    }

    async fn set_many(&self, batch: Vec<(String, Value)>, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        for (key, value) in batch {
            entries.insert(key, Entry::new(value, ttl));
        }
        Ok(())
    }
}

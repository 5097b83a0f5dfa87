//! Store trait: the key-value collaborator the memoizers talk to.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tagcache_core::StoreError;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Largest TTL a cached negative result may carry.
const NEGATIVE_TTL_MAX: Duration = Duration::from_secs(300);

/// Pluggable key-value store.
///
/// Each method is one logical request against the store. A miss is
/// `Ok(None)` - never an error - and a store failure is `Err(_)` - never
/// a miss. Implementations must be safe to share across tasks; single-key
/// operations are expected to be atomic, multi-key operations need not be
/// atomic across keys.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get the value at `key`, or `None` if absent or expired.
    ///
    /// A present `Value::Null` is a decodable "no result" entry and is
    /// returned as `Some(Value::Null)`, not as a miss.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Write `value` at `key` with the given expiry.
    ///
    /// Implementations should store `Value::Null` with [`negative_ttl`]
    /// instead of the nominal TTL to bound negative-cache staleness.
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> StoreResult<()>;

    /// Remove the given keys. Removing an absent key is a no-op.
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    /// Get many values in one request, one slot per input key, in input
    /// order.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<Value>>>;

    /// Write many entries in one request, all with the same TTL.
    ///
    /// Partial failure mid-batch is implementation-defined but must not
    /// corrupt unrelated keys.
    async fn set_many(&self, entries: Vec<(String, Value)>, ttl: Duration) -> StoreResult<()>;
}

/// Shortened TTL for cached negative results.
///
/// A tenth of the nominal TTL, bounded to `1s..=300s`, so a cached "no
/// result" rotates out well before the data it shadows would.
pub fn negative_ttl(ttl: Duration) -> Duration {
    let tenth = ttl / 10;
    tenth.clamp(Duration::from_secs(1), NEGATIVE_TTL_MAX)
}

//! Value interchange between typed results and the store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tagcache_core::{CacheResult, StoreError};

pub(crate) fn encode<T: Serialize>(result: &T) -> CacheResult<Value> {
    serde_json::to_value(result).map_err(|e| {
        StoreError::Serialization {
            reason: e.to_string(),
        }
        .into()
    })
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> CacheResult<T> {
    serde_json::from_value(value).map_err(|e| {
        StoreError::Deserialization {
            reason: e.to_string(),
        }
        .into()
    })
}

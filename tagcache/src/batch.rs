//! Batched-result memoizer.
//!
//! Same contract as the single-result path, but over an ordered sequence
//! of independent arguments in one round trip: one multi-get, at most one
//! invocation of the wrapped computation (with exactly the missed
//! arguments, relative order preserved), one multi-set, and a merge back
//! into input order. Tags are not part of this path.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tagcache_core::{CacheError, CacheResult, Identity};
use tagcache_store::Store;
use tracing::debug;

use crate::codec::{decode, encode};
use crate::key;

/// The wrapped batch computation seam.
///
/// Invoked with the missed arguments only, in their original relative
/// order, and must return exactly one result per argument, in the same
/// order.
#[async_trait]
pub trait BatchCompute<A, T>: Send + Sync {
    async fn compute(&self, args: &[A]) -> CacheResult<Vec<T>>;
}

/// Immutable per-memoizer configuration for the batched path.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub(crate) ttl: Duration,
    pub(crate) namespace: Option<String>,
}

impl BatchConfig {
    pub fn new() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            namespace: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Batched-result memoizer.
///
/// Results are correlated by generated key string rather than by argument
/// value, so arguments only need `Display + Clone`; two arguments that
/// render identically share one entry and one computation, and the value
/// fans back out to every occurrence.
pub struct Batch<S, C, A, T> {
    store: Arc<S>,
    identity: Identity,
    compute: C,
    config: BatchConfig,
    _args: PhantomData<fn(&A) -> T>,
}

impl<S, C, A, T> Batch<S, C, A, T>
where
    S: Store,
    C: BatchCompute<A, T>,
    A: Display + Clone + Send + Sync,
    T: Serialize + DeserializeOwned + Clone + Send,
{
    pub fn new(store: Arc<S>, identity: Identity, compute: C, config: BatchConfig) -> Self {
        Self {
            store,
            identity,
            compute,
            config,
            _args: PhantomData,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn keys(&self, args: &[A]) -> Vec<String> {
        key::batch_keys(
            self.config.namespace.as_deref(),
            &self.identity.qualified(),
            args,
        )
    }

    /// Cached batch call: length- and order-preserving with the input.
    ///
    /// Empty input returns empty with no store interaction. The wrapped
    /// computation runs at most once per call and never sees an argument
    /// that was a hit.
    pub async fn call(&self, args: &[A]) -> CacheResult<Vec<T>> {
        if args.is_empty() {
            return Ok(Vec::new());
        }

        let keys = self.keys(args);

        // Collapse duplicate keys, first occurrence wins the slot.
        let mut seen = HashSet::new();
        let mut unique_keys = Vec::new();
        let mut unique_args = Vec::new();
        for (arg, key) in args.iter().zip(&keys) {
            if seen.insert(key.clone()) {
                unique_keys.push(key.clone());
                unique_args.push(arg.clone());
            }
        }

        let cached = self.store.get_many(&unique_keys).await?;

        let mut resolved: HashMap<String, T> = HashMap::with_capacity(unique_keys.len());
        let mut miss_keys = Vec::new();
        let mut miss_args = Vec::new();
        for ((unique_key, arg), slot) in unique_keys.iter().zip(&unique_args).zip(cached) {
            match slot {
                Some(value) => {
                    resolved.insert(unique_key.clone(), decode(value)?);
                }
                None => {
                    miss_keys.push(unique_key.clone());
                    miss_args.push(arg.clone());
                }
            }
        }

        if !miss_args.is_empty() {
            debug!(
                identity = %self.identity,
                hits = resolved.len(),
                misses = miss_args.len(),
                "batch partial miss, invoking computation"
            );
            let computed = self.compute.compute(&miss_args).await?;
            if computed.len() != miss_args.len() {
                return Err(CacheError::Compute {
                    reason: format!(
                        "batch computation returned {} results for {} arguments",
                        computed.len(),
                        miss_args.len()
                    ),
                });
            }

            let mut entries = Vec::with_capacity(computed.len());
            for (miss_key, result) in miss_keys.iter().zip(&computed) {
                entries.push((miss_key.clone(), encode(result)?));
            }
            self.store.set_many(entries, self.config.ttl).await?;

            for (miss_key, result) in miss_keys.into_iter().zip(computed) {
                resolved.insert(miss_key, result);
            }
        }

        // Reassemble in input order; every key is either a hit or was
        // just computed.
        keys.iter()
            .map(|k| {
                resolved.get(k).cloned().ok_or_else(|| CacheError::Compute {
                    reason: format!("batch result missing for key {k}"),
                })
            })
            .collect()
    }

    /// Delete the entries for all given arguments in one batched delete.
    pub async fn invalidate(&self, args: &[A]) -> CacheResult<()> {
        if args.is_empty() {
            return Ok(());
        }
        let keys = self.keys(args);
        debug!(identity = %self.identity, count = keys.len(), "invalidating batch entries");
        self.store.delete(&keys).await?;
        Ok(())
    }
}

impl<S, C, A, T> Clone for Batch<S, C, A, T>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            identity: self.identity.clone(),
            compute: self.compute.clone(),
            config: self.config.clone(),
            _args: PhantomData,
        }
    }
}

//! Function-result caching with tag-based lazy invalidation.
//!
//! Callers annotate a computation with one or more tags; invalidating a
//! tag transparently invalidates every cached result ever produced under
//! it, without tracking or deleting individual entries. The cache key
//! itself embeds each tag's current generation token, so invalidating a
//! tag is a single O(1) delete that orphans the old generation's entries
//! (the store's TTL reclaims them).
//!
//! # Design Philosophy
//!
//! The core is stateless: keys are pure functions of (namespace,
//! identity, arguments, tag generations), and the store is the only
//! source of truth - including for the tag namespace, which is why two
//! unrelated memoizers sharing a tag get invalidated together without
//! any in-memory registry. There is no single-flight guarantee and no
//! internal retry; concurrent misses may both compute, and store errors
//! propagate instead of masquerading as misses.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tagcache::{CallArgs, Identity, TagCache, TagSpec};
//! use tagcache_store::MemoryStore;
//!
//! let cache = TagCache::new(MemoryStore::new());
//!
//! let add = cache.cached_with(
//!     Identity::function("billing", "add"),
//!     compute_add,
//!     |config| config.with_tags(vec![TagSpec::template("account:{0}")]),
//! );
//!
//! let total = add.call((account_id, month)).await?;
//!
//! // One delete invalidates every entry tagged with this account.
//! cache.invalidate_tag(&format!("account:{account_id}")).await?;
//! ```

pub mod batch;
pub mod cached;
mod codec;
pub mod key;
pub mod tag;

pub use batch::{Batch, BatchCompute, BatchConfig};
pub use cached::{Cached, CachedConfig, Compute, ComputeFn};
pub use key::{batch_keys, CallArgs, KeyStrategy, ToCallArgs};
pub use tag::TagSpec;
pub use tagcache_core::{Binding, CacheError, CacheResult, Identity, KeyError, StoreError};
pub use tagcache_store::{MemoryStore, Store};

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Entry point: a shared store handle plus the defaults every memoizer
/// built from it inherits (TTL and tag prefix).
///
/// Tags live in the store under `tag_prefix + tag_name`, so memoizers
/// built from different `TagCache` values over the same store still share
/// tags as long as they share the prefix.
#[derive(Debug)]
pub struct TagCache<S> {
    store: Arc<S>,
    tag_prefix: String,
    default_ttl: Duration,
}

impl<S> Clone for TagCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tag_prefix: self.tag_prefix.clone(),
            default_ttl: self.default_ttl,
        }
    }
}

impl<S: Store> TagCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            tag_prefix: "tag:".to_string(),
            default_ttl: Duration::from_secs(3600),
        }
    }

    /// Change the store-key prefix under which tag generations live.
    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    /// Change the default entry TTL inherited by memoizers.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// A handle to the shared store.
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Build a single-result memoizer with this cache's defaults.
    pub fn cached<C, A, T>(&self, identity: Identity, compute: C) -> Cached<S, C, A, T>
    where
        C: Compute<A, T>,
        A: ToCallArgs + Send + Sync,
        T: Serialize + DeserializeOwned + Send,
    {
        self.cached_with(identity, compute, |config| config)
    }

    /// Build a single-result memoizer, customizing the inherited
    /// configuration (tags, namespace, key strategy, predicate, TTL).
    pub fn cached_with<C, A, T>(
        &self,
        identity: Identity,
        compute: C,
        configure: impl FnOnce(CachedConfig<T>) -> CachedConfig<T>,
    ) -> Cached<S, C, A, T>
    where
        C: Compute<A, T>,
        A: ToCallArgs + Send + Sync,
        T: Serialize + DeserializeOwned + Send,
    {
        let config = configure(
            CachedConfig::new()
                .with_ttl(self.default_ttl)
                .with_tag_prefix(self.tag_prefix.clone()),
        );
        Cached::new(self.store(), identity, compute, config)
    }

    /// Build a batched-result memoizer with this cache's defaults.
    pub fn batch<C, A, T>(&self, identity: Identity, compute: C) -> Batch<S, C, A, T>
    where
        C: BatchCompute<A, T>,
        A: Display + Clone + Send + Sync,
        T: Serialize + DeserializeOwned + Clone + Send,
    {
        self.batch_with(identity, compute, |config| config)
    }

    /// Build a batched-result memoizer, customizing the inherited
    /// configuration.
    pub fn batch_with<C, A, T>(
        &self,
        identity: Identity,
        compute: C,
        configure: impl FnOnce(BatchConfig) -> BatchConfig,
    ) -> Batch<S, C, A, T>
    where
        C: BatchCompute<A, T>,
        A: Display + Clone + Send + Sync,
        T: Serialize + DeserializeOwned + Clone + Send,
    {
        let config = configure(BatchConfig::new().with_ttl(self.default_ttl));
        Batch::new(self.store(), identity, compute, config)
    }

    /// Invalidate a tag for every memoizer sharing this cache's prefix.
    pub async fn invalidate_tag(&self, tag: &str) -> CacheResult<()> {
        tag::invalidate_tag(&*self.store, &self.tag_prefix, tag).await
    }
}

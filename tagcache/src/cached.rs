//! Single-result memoizer.
//!
//! Wraps one computation behind the get -> miss -> compute -> store state
//! machine, with explicit invalidate/refresh/bypass operations. No
//! single-flight guarantee: two concurrent misses may both compute and
//! both store, and the store's last write wins. That race is accepted by
//! design in exchange for keeping this layer stateless.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tagcache_core::{CacheError, CacheResult, Identity};
use tagcache_store::Store;
use tracing::{debug, trace, warn};

use crate::codec::{decode, encode};
use crate::key::{CallArgs, KeyStrategy, ToCallArgs};
use crate::tag::{self, TagSpec};

/// The wrapped computation seam.
///
/// Implementations hold whatever state the computation needs; the
/// memoizer only ever calls `compute` with the call arguments. Errors
/// propagate to the caller and nothing is stored for a failed call.
#[async_trait]
pub trait Compute<A, T>: Send + Sync {
    async fn compute(&self, args: &A) -> CacheResult<T>;
}

/// Adapter turning an async closure into a [`Compute`].
pub struct ComputeFn<F>(F);

impl<F> ComputeFn<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<A, T, F, Fut> Compute<A, T> for ComputeFn<F>
where
    A: Clone + Send + Sync,
    T: Send,
    F: Fn(A) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = CacheResult<T>> + Send,
{
    async fn compute(&self, args: &A) -> CacheResult<T> {
        (self.0)(args.clone()).await
    }
}

/// Immutable per-memoizer configuration, fixed at construction.
pub struct CachedConfig<T> {
    pub(crate) ttl: Duration,
    pub(crate) namespace: Option<String>,
    pub(crate) key: KeyStrategy,
    pub(crate) tags: Vec<TagSpec>,
    pub(crate) tag_prefix: String,
    pub(crate) should_cache: Arc<dyn Fn(&T) -> bool + Send + Sync>,
    pub(crate) fallback_on_store_error: bool,
}

impl<T> CachedConfig<T> {
    pub fn new() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            namespace: None,
            key: KeyStrategy::Positional,
            tags: Vec::new(),
            tag_prefix: "tag:".to_string(),
            should_cache: Arc::new(|_| true),
            fallback_on_store_error: false,
        }
    }

    /// Set the entry TTL (also used for generation tokens).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the key strategy.
    pub fn with_key(mut self, key: KeyStrategy) -> Self {
        self.key = key;
        self
    }

    /// Set the tag specifications, in declaration order.
    pub fn with_tags(mut self, tags: Vec<TagSpec>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the store-key prefix for tags.
    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    /// Set the cacheability predicate. When it returns false the computed
    /// result is returned to the caller but never written to the store.
    pub fn with_should_cache(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.should_cache = Arc::new(predicate);
        self
    }

    /// When enabled, a store failure on the read path of `call` degrades
    /// to an uncached computation instead of failing the call; the result
    /// is returned without a store write. Off by default, so store
    /// failures surface as errors.
    pub fn with_fallback_on_store_error(mut self, fallback: bool) -> Self {
        self.fallback_on_store_error = fallback;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl<T> Default for CachedConfig<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CachedConfig<T> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            namespace: self.namespace.clone(),
            key: self.key.clone(),
            tags: self.tags.clone(),
            tag_prefix: self.tag_prefix.clone(),
            should_cache: Arc::clone(&self.should_cache),
            fallback_on_store_error: self.fallback_on_store_error,
        }
    }
}

impl<T> fmt::Debug for CachedConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedConfig")
            .field("ttl", &self.ttl)
            .field("namespace", &self.namespace)
            .field("key", &self.key)
            .field("tags", &self.tags)
            .field("tag_prefix", &self.tag_prefix)
            .field("fallback_on_store_error", &self.fallback_on_store_error)
            .finish_non_exhaustive()
    }
}

/// Single-result memoizer.
///
/// # Type Parameters
///
/// - `S`: the store collaborator
/// - `C`: the wrapped computation
/// - `A`: the argument value (rendered for keying via [`ToCallArgs`])
/// - `T`: the result type, serialized through the store
pub struct Cached<S, C, A, T> {
    store: Arc<S>,
    identity: Identity,
    compute: C,
    config: CachedConfig<T>,
    _args: PhantomData<fn(&A) -> T>,
}

impl<S, C, A, T> Cached<S, C, A, T>
where
    S: Store,
    C: Compute<A, T>,
    A: ToCallArgs + Send + Sync,
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(store: Arc<S>, identity: Identity, compute: C, config: CachedConfig<T>) -> Self {
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

    pub fn config(&self) -> &CachedConfig<T> {
        &self.config
    }

    /// The key `call` would use right now: the base key, tag-wrapped with
    /// current generations when tags are configured. Resolving may itself
    /// provision missing generation tokens.
    async fn current_key(&self, args: &CallArgs) -> CacheResult<String> {
        let base = self.config.key.base_key(
            self.config.namespace.as_deref(),
            &self.identity.qualified(),
            args,
        )?;
        if self.config.tags.is_empty() {
            return Ok(base);
        }
        tag::resolve_key(
            &*self.store,
            &base,
            &self.config.tag_prefix,
            &self.config.tags,
            self.config.ttl,
            args,
        )
        .await
    }

    /// Resolve the key and read its entry in one step, so the caller can
    /// treat a store failure anywhere on the read path uniformly.
    async fn read_entry(&self, call_args: &CallArgs) -> CacheResult<(String, Option<Value>)> {
        let key = self.current_key(call_args).await?;
        let value = self.store.get(&key).await?;
        Ok((key, value))
    }

    /// Cached call: get, and on a miss compute, conditionally store, and
    /// return. With `fallback_on_store_error` set, a store failure while
    /// reading computes uncached instead of failing.
    pub async fn call(&self, args: A) -> CacheResult<T> {
        let call_args = args.to_call_args();
        let key = match self.read_entry(&call_args).await {
            Ok((key, Some(value))) => {
                trace!(%key, "cache hit");
                return decode(value);
            }
            Ok((key, None)) => {
                debug!(%key, "cache miss, invoking computation");
                Some(key)
            }
            Err(CacheError::Store(err)) if self.config.fallback_on_store_error => {
                warn!(identity = %self.identity, error = %err, "store read failed, computing uncached");
                None
            }
            Err(err) => return Err(err),
        };

        let result = self.compute.compute(&args).await?;
        if let Some(key) = key {
            if (self.config.should_cache)(&result) {
                self.store.set(&key, &encode(&result)?, self.config.ttl).await?;
            }
        }
        Ok(result)
    }

    /// Delete the entry the matching `call` would have used. Generation
    /// tokens are left untouched.
    pub async fn invalidate(&self, args: A) -> CacheResult<()> {
        let call_args = args.to_call_args();
        let key = self.current_key(&call_args).await?;
        debug!(%key, "invalidating entry");
        self.store.delete(std::slice::from_ref(&key)).await?;
        Ok(())
    }

    /// Invalidate every entry sharing `tag`, across all memoizers using
    /// the same tag prefix.
    pub async fn invalidate_tag(&self, tag: &str) -> CacheResult<()> {
        tag::invalidate_tag(&*self.store, &self.config.tag_prefix, tag).await
    }

    /// Invoke the wrapped computation directly; no store interaction.
    pub async fn bypass(&self, args: A) -> CacheResult<T> {
        self.compute.compute(&args).await
    }

    /// Unconditionally recompute and store at the same key `call` would
    /// resolve, so a subsequent `call` observes the refreshed value.
    /// Returns the fresh value even when the predicate keeps it out of
    /// the store.
    pub async fn refresh(&self, args: A) -> CacheResult<T> {
        let call_args = args.to_call_args();
        let key = self.current_key(&call_args).await?;
        let result = self.compute.compute(&args).await?;
        if (self.config.should_cache)(&result) {
            debug!(%key, "refreshed entry");
            self.store.set(&key, &encode(&result)?, self.config.ttl).await?;
        }
        Ok(result)
    }
}

impl<S, C, A, T> Clone for Cached<S, C, A, T>
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tagcache_core::{CacheError, StoreError};
    use tagcache_store::{MemoryStore, StoreResult};

    /// `a + b + invocation_count`, so every recomputation is observable.
    #[derive(Default)]
    struct Adder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Compute<(i64, i64), i64> for Adder {
        async fn compute(&self, &(a, b): &(i64, i64)) -> CacheResult<i64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(a + b + i64::from(n))
        }
    }

    fn cached(config: CachedConfig<i64>) -> Cached<MemoryStore, Adder, (i64, i64), i64> {
        Cached::new(
            Arc::new(MemoryStore::new()),
            Identity::instance_method("billing", "Account", "add"),
            Adder::default(),
            config,
        )
    }

    #[tokio::test]
    async fn call_memoizes_until_invalidated() {
        let add = cached(CachedConfig::new());

        assert_eq!(add.call((5, 6)).await.unwrap(), 12);
        assert_eq!(add.call((5, 6)).await.unwrap(), 12);
        assert_eq!(add.compute.calls.load(Ordering::SeqCst), 1);

        add.invalidate((5, 6)).await.unwrap();
        assert_eq!(add.call((5, 6)).await.unwrap(), 13);
        assert_eq!(add.compute.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_arguments_use_distinct_entries() {
        let add = cached(CachedConfig::new());
        let first = add.call((5, 6)).await.unwrap();
        let second = add.call((5, 7)).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(add.call((5, 6)).await.unwrap(), first);
    }

    #[tokio::test]
    async fn refresh_recomputes_and_a_following_call_sees_it() {
        let add = cached(CachedConfig::new());
        assert_eq!(add.call((5, 6)).await.unwrap(), 12);
        assert_eq!(add.refresh((5, 6)).await.unwrap(), 13);
        assert_eq!(add.call((5, 6)).await.unwrap(), 13);
        assert_eq!(add.compute.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_resolves_tags_like_call_does() {
        let add = cached(
            CachedConfig::new().with_tags(vec![TagSpec::template("add:{0}")]),
        );
        assert_eq!(add.call((5, 6)).await.unwrap(), 12);
        assert_eq!(add.refresh((5, 6)).await.unwrap(), 13);
        assert_eq!(add.call((5, 6)).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn bypass_never_touches_the_store() {
        let add = cached(CachedConfig::new());
        assert_eq!(add.bypass((5, 6)).await.unwrap(), 12);
        assert_eq!(add.bypass((5, 6)).await.unwrap(), 13);
        // A later cached call still misses.
        assert_eq!(add.call((5, 6)).await.unwrap(), 14);
    }

    #[tokio::test]
    async fn tagged_entries_rotate_on_tag_invalidation() {
        let add = cached(
            CachedConfig::new().with_tags(vec![TagSpec::template("add:{0}")]),
        );
        let before = add.call((5, 6)).await.unwrap();
        let unrelated = add.call((9, 1)).await.unwrap();

        add.invalidate_tag("add:5").await.unwrap();

        assert_ne!(add.call((5, 6)).await.unwrap(), before);
        assert_eq!(add.call((9, 1)).await.unwrap(), unrelated);
    }

    #[tokio::test]
    async fn precise_invalidation_leaves_tag_generations_alone() {
        let add = cached(
            CachedConfig::new().with_tags(vec![TagSpec::template("add:{0}")]),
        );
        let first = add.call((5, 6)).await.unwrap();
        let sibling = add.call((5, 7)).await.unwrap();

        add.invalidate((5, 6)).await.unwrap();

        assert_ne!(add.call((5, 6)).await.unwrap(), first);
        assert_eq!(add.call((5, 7)).await.unwrap(), sibling);
    }

    #[tokio::test]
    async fn keyword_strategy_keys_by_sorted_names() {
        #[derive(Default)]
        struct NamedAdder {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Compute<CallArgs, i64> for NamedAdder {
            async fn compute(&self, args: &CallArgs) -> CacheResult<i64> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(args
                    .named_args()
                    .iter()
                    .map(|(_, v)| v.parse::<i64>().unwrap_or(0))
                    .sum())
            }
        }

        let add: Cached<_, _, CallArgs, i64> = Cached::new(
            Arc::new(MemoryStore::new()),
            Identity::function("billing", "add"),
            NamedAdder::default(),
            CachedConfig::new().with_key(KeyStrategy::Keyword),
        );

        assert_eq!(
            add.call(CallArgs::named([("a", 5), ("b", 6)])).await.unwrap(),
            11
        );
        // Same logical call, different order: must hit the same entry.
        assert_eq!(
            add.call(CallArgs::named([("b", 6), ("a", 5)])).await.unwrap(),
            11
        );
        assert_eq!(add.compute.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn positional_strategy_rejects_named_arguments() {
        let add: Cached<_, _, CallArgs, i64> = Cached::new(
            Arc::new(MemoryStore::new()),
            Identity::function("billing", "add"),
            ComputeFn::new(|_: CallArgs| async { Ok::<i64, CacheError>(0) }),
            CachedConfig::new(),
        );
        let err = add
            .invalidate(CallArgs::named([("a", 5)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Key(_)));
    }

    #[tokio::test]
    async fn negative_results_are_cached_by_default() {
        #[derive(Default)]
        struct Lookup {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Compute<(i64,), Option<String>> for Lookup {
            async fn compute(&self, _: &(i64,)) -> CacheResult<Option<String>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }

        let lookup: Cached<_, _, (i64,), Option<String>> = Cached::new(
            Arc::new(MemoryStore::new()),
            Identity::function("users", "find"),
            Lookup::default(),
            CachedConfig::new(),
        );

        assert_eq!(lookup.call((7,)).await.unwrap(), None);
        assert_eq!(lookup.call((7,)).await.unwrap(), None);
        assert_eq!(lookup.compute.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_cache_predicate_skips_the_write() {
        #[derive(Default)]
        struct Flaky {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Compute<(i64,), Option<i64>> for Flaky {
            async fn compute(&self, &(v,): &(i64,)) -> CacheResult<Option<i64>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok((v > 0).then_some(v))
            }
        }

        let get: Cached<_, _, (i64,), Option<i64>> = Cached::new(
            Arc::new(MemoryStore::new()),
            Identity::function("users", "get"),
            Flaky::default(),
            CachedConfig::new().with_should_cache(|v: &Option<i64>| v.is_some()),
        );

        // "No data" results are recomputed every time.
        assert_eq!(get.call((-1,)).await.unwrap(), None);
        assert_eq!(get.call((-1,)).await.unwrap(), None);
        assert_eq!(get.compute.calls.load(Ordering::SeqCst), 2);

        // Real results are cached.
        assert_eq!(get.call((3,)).await.unwrap(), Some(3));
        assert_eq!(get.call((3,)).await.unwrap(), Some(3));
        assert_eq!(get.compute.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn closure_computations_work_through_compute_fn() {
        let add =
            ComputeFn::new(|(a, b): (i64, i64)| async move { Ok::<_, CacheError>(a * 10 + b) });
        let cached: Cached<_, _, (i64, i64), i64> = Cached::new(
            Arc::new(MemoryStore::new()),
            Identity::function("m", "mul_add"),
            add,
            CachedConfig::new(),
        );
        assert_eq!(cached.call((5, 6)).await.unwrap(), 56);
    }

    /// Two overlapping misses may each invoke the computation; whichever
    /// write lands last wins and both callers see a valid result.
    #[tokio::test]
    async fn concurrent_misses_may_each_invoke_the_computation() {
        #[derive(Default)]
        struct YieldingAdder {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Compute<(i64, i64), i64> for YieldingAdder {
            async fn compute(&self, &(a, b): &(i64, i64)) -> CacheResult<i64> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                // Hold the miss window open so the other call can enter it.
                tokio::task::yield_now().await;
                Ok(a + b)
            }
        }

        let add: Cached<_, _, (i64, i64), i64> = Cached::new(
            Arc::new(MemoryStore::new()),
            Identity::function("billing", "add"),
            YieldingAdder::default(),
            CachedConfig::new(),
        );

        let (first, second) = tokio::join!(add.call((5, 6)), add.call((5, 6)));
        assert_eq!(first.unwrap(), 11);
        assert_eq!(second.unwrap(), 11);

        let calls = add.compute.calls.load(Ordering::SeqCst);
        assert!(
            calls == 1 || calls == 2,
            "expected one or two invocations, got {calls}"
        );
    }

    /// Every operation fails with a connection error.
    #[derive(Debug)]
    struct DownStore;

    fn refused() -> StoreError {
        StoreError::Connection {
            reason: "connection refused".to_string(),
        }
    }

    #[async_trait]
    impl Store for DownStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<Value>> {
            Err(refused())
        }
        async fn set(&self, _: &str, _: &Value, _: Duration) -> StoreResult<()> {
            Err(refused())
        }
        async fn delete(&self, _: &[String]) -> StoreResult<()> {
            Err(refused())
        }
        async fn get_many(&self, _: &[String]) -> StoreResult<Vec<Option<Value>>> {
            Err(refused())
        }
        async fn set_many(&self, _: Vec<(String, Value)>, _: Duration) -> StoreResult<()> {
            Err(refused())
        }
    }

    /// Without the fallback knob, store failure on the read path fails
    /// the call rather than silently computing uncached.
    #[tokio::test]
    async fn store_failure_is_not_a_miss() {
        let add: Cached<_, Adder, (i64, i64), i64> = Cached::new(
            Arc::new(DownStore),
            Identity::function("billing", "add"),
            Adder::default(),
            CachedConfig::new(),
        );

        let err = add.call((5, 6)).await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Store(StoreError::Connection { .. })
        ));
        // The wrapped computation was never invoked as a fallback.
        assert_eq!(add.compute.calls.load(Ordering::SeqCst), 0);
    }

    /// With the fallback knob set, a down store degrades to uncached
    /// computation: every call recomputes and nothing is written.
    #[tokio::test]
    async fn fallback_config_computes_through_a_down_store() {
        let add: Cached<_, Adder, (i64, i64), i64> = Cached::new(
            Arc::new(DownStore),
            Identity::function("billing", "add"),
            Adder::default(),
            CachedConfig::new().with_fallback_on_store_error(true),
        );

        assert_eq!(add.call((5, 6)).await.unwrap(), 12);
        assert_eq!(add.call((5, 6)).await.unwrap(), 13);
        assert_eq!(add.compute.calls.load(Ordering::SeqCst), 2);
    }
}

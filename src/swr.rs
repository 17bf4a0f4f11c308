use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::builder::CacheManagerBuilder;
use crate::entry::CacheEntry;
use crate::error::{BoxError, CacheError, FactoryError};
use crate::executor::{BackgroundTask, Executor, FailureHook, default_executor};
use crate::store::Store;
use crate::utils::{duration_ms, now_ms, panic_message};

/// How long before expiration a hit may trigger revalidation, unless configured.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(1);

/// Options for `try_get_or_add` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryGetOrAddOptions {
    /// How long a newly produced value stays valid.
    pub ttl: Duration,
    /// Window before expiration during which a hit schedules a background refresh.
    pub stale_threshold: Duration,
}

impl TryGetOrAddOptions {
    /// Options with the given ttl and the default stale threshold.
    pub fn new(ttl: Duration) -> Self {
        TryGetOrAddOptions {
            ttl,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }

    /// Override the stale threshold.
    pub fn with_stale_threshold(mut self, stale_threshold: Duration) -> Self {
        self.stale_threshold = stale_threshold;
        self
    }
}

/// Outcome of materializing an entry.
enum Materialized<V> {
    Value(V),
    /// The factory produced nothing worth caching.
    Null,
    Failed(FactoryError),
}

impl<V> From<Result<Option<V>, FactoryError>> for Materialized<V> {
    fn from(result: Result<Option<V>, FactoryError>) -> Self {
        match result {
            Ok(Some(value)) => Materialized::Value(value),
            Ok(None) => Materialized::Null,
            Err(err) => Materialized::Failed(err),
        }
    }
}

/// Result of installing a candidate entry.
enum Lookup<V> {
    /// The candidate is now authoritative.
    Created,
    /// A live entry was already present.
    Existing(Arc<CacheEntry<V>>),
}

fn expires_in(ttl: Duration) -> i64 {
    now_ms().saturating_add(duration_ms(ttl))
}

pub(crate) fn log_background_failure() -> FailureHook {
    Arc::new(|err: CacheError| tracing::warn!(error = %err, "background revalidation failed"))
}

/// In-process cache with single-flight factories and stale-while-revalidate.
///
/// The manager holds no entries itself: everything lives in the injected
/// [`Store`], keyed by string, and values of different types can share one
/// store. Background revalidations run on the injected [`Executor`] and their
/// failures are reported to the background-failure hook only.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn Store>,
    executor: Arc<dyn Executor>,
    on_background_failure: FailureHook,
    stale_threshold: Duration,
}

impl CacheManager {
    /// Create a cache over `store` with the default executor and hook.
    ///
    /// The executor is tokio if a runtime is current, threads otherwise.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::from_parts(
            store,
            default_executor(),
            log_background_failure(),
            DEFAULT_STALE_THRESHOLD,
        )
    }

    /// Start building a cache.
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        store: Arc<dyn Store>,
        executor: Arc<dyn Executor>,
        on_background_failure: FailureHook,
        stale_threshold: Duration,
    ) -> Self {
        CacheManager {
            store,
            executor,
            on_background_failure,
            stale_threshold,
        }
    }

    /// Stale threshold used when none is passed explicitly.
    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    fn options(&self, ttl: Duration) -> TryGetOrAddOptions {
        TryGetOrAddOptions::new(ttl).with_stale_threshold(self.stale_threshold)
    }

    /// Return the cached value for `key` or produce it with `factory`.
    ///
    /// See [`CacheManager::try_get_or_add_with_options`].
    pub fn try_get_or_add<V, F, E>(
        &self,
        key: &str,
        ttl: Duration,
        factory: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> Result<Option<V>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.try_get_or_add_with_options(key, self.options(ttl), factory)
    }

    /// Return the cached value for `key` or produce it with `factory`.
    ///
    /// - On a miss the factory runs once, however many callers race for the
    ///   key, and its value is cached for `options.ttl`.
    /// - On a hit within `options.stale_threshold` of expiration, exactly one
    ///   caller schedules a background refresh with `factory`; everyone keeps
    ///   getting the current value meanwhile.
    /// - A failing factory evicts the key and the error is returned. A factory
    ///   returning `None` evicts the key and `None` is returned.
    ///
    /// Blocks the calling thread while a value is being produced.
    pub fn try_get_or_add_with_options<V, F, E>(
        &self,
        key: &str,
        options: TryGetOrAddOptions,
        factory: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> Result<Option<V>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let candidate = Arc::new(CacheEntry::new(factory, expires_in(options.ttl)));

        match self.install(key, &candidate)? {
            Lookup::Created => {
                tracing::debug!(key, "cache miss");
                self.settle(key, candidate.value())
            }
            Lookup::Existing(existing) => {
                self.maybe_revalidate(key, &existing, candidate, options.stale_threshold);
                self.settle(key, existing.value())
            }
        }
    }

    /// Async counterpart of [`CacheManager::try_get_or_add`].
    pub async fn try_get_or_add_async<V, F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        factory: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<V>, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.try_get_or_add_async_with_options(key, self.options(ttl), factory)
            .await
    }

    /// Async counterpart of [`CacheManager::try_get_or_add_with_options`].
    ///
    /// Suspends instead of blocking; shares single-flight guarantees with the
    /// blocking variant.
    pub async fn try_get_or_add_async_with_options<V, F, Fut, E>(
        &self,
        key: &str,
        options: TryGetOrAddOptions,
        factory: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<V>, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let candidate = Arc::new(CacheEntry::new_async(factory, expires_in(options.ttl)));

        match self.install(key, &candidate)? {
            Lookup::Created => {
                tracing::debug!(key, "cache miss");
                self.settle(key, candidate.value_async().await)
            }
            Lookup::Existing(existing) => {
                self.maybe_revalidate(key, &existing, candidate, options.stale_threshold);
                self.settle(key, existing.value_async().await)
            }
        }
    }

    /// Set the value in the cache, replacing whatever is there.
    ///
    /// `None` is a no-op.
    pub fn store<V>(&self, key: &str, value: Option<V>, ttl: Duration) -> Result<(), CacheError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let Some(value) = value else {
            return Ok(());
        };

        let entry = Arc::new(CacheEntry::ready(value, expires_in(ttl)));
        self.store.set(key, entry.to_stored())
    }

    /// Removes the key from the cache.
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(key)
    }

    /// Return the cached value.
    ///
    /// The response will be `None` for cache misses, expired entries and
    /// entries holding another type. Never runs a factory, but waits for one
    /// already in flight; if that fails the key is evicted.
    pub fn get<V>(&self, key: &str) -> Result<Option<V>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let Some(entry) = self.lookup::<V>(key)? else {
            return Ok(None);
        };
        self.read_existing(key, entry.value())
    }

    /// Async counterpart of [`CacheManager::get`].
    pub async fn get_async<V>(&self, key: &str) -> Result<Option<V>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let Some(entry) = self.lookup::<V>(key)? else {
            return Ok(None);
        };
        self.read_existing(key, entry.value_async().await)
    }

    fn lookup<V>(&self, key: &str) -> Result<Option<Arc<CacheEntry<V>>>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let Some(stored) = self.store.get(key)? else {
            return Ok(None);
        };

        // Non-consuming check: reads never take the stale transition
        Ok(stored
            .downcast::<CacheEntry<V>>()
            .filter(|entry| !entry.is_expired_at(now_ms())))
    }

    fn read_existing<V>(
        &self,
        key: &str,
        result: Result<Option<V>, FactoryError>,
    ) -> Result<Option<V>, CacheError> {
        result.map_err(|err| {
            self.evict_failed(key, &err);
            CacheError::factory(key, err)
        })
    }

    /// Install `candidate` unless a live entry of the same type exists.
    fn install<V>(&self, key: &str, candidate: &Arc<CacheEntry<V>>) -> Result<Lookup<V>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let now = now_ms();
        let winner = self.store.get_or_install(key, candidate.to_stored(), &|existing| {
            existing
                .downcast::<CacheEntry<V>>()
                .is_some_and(|entry| !entry.has_expired(now))
        })?;

        match winner.downcast::<CacheEntry<V>>() {
            Some(entry) if !Arc::ptr_eq(&entry, candidate) => Ok(Lookup::Existing(entry)),
            _ => Ok(Lookup::Created),
        }
    }

    /// Turn a materialization into the caller's result, evicting on null or failure.
    fn settle<V>(
        &self,
        key: &str,
        result: Result<Option<V>, FactoryError>,
    ) -> Result<Option<V>, CacheError> {
        match Materialized::from(result) {
            Materialized::Value(value) => Ok(Some(value)),
            Materialized::Null => {
                tracing::debug!(key, "factory produced no value, evicting");
                self.store.remove(key)?;
                Ok(None)
            }
            Materialized::Failed(err) => {
                self.evict_failed(key, &err);
                Err(CacheError::factory(key, err))
            }
        }
    }

    fn evict_failed(&self, key: &str, err: &FactoryError) {
        tracing::debug!(key, error = %err, "factory failed, evicting");
        if let Err(remove_err) = self.store.remove(key) {
            tracing::warn!(key, error = %remove_err, "failed to evict key after factory failure");
        }
    }

    /// Schedule a background refresh if this caller wins the stale transition.
    ///
    /// On success the refreshed candidate replaces the entry. On failure the
    /// stale value is re-installed with the candidate's expiration so it keeps
    /// serving for another ttl instead of being retried on every request.
    fn maybe_revalidate<V>(
        &self,
        key: &str,
        existing: &Arc<CacheEntry<V>>,
        candidate: Arc<CacheEntry<V>>,
        stale_threshold: Duration,
    ) where
        V: Clone + Send + Sync + 'static,
    {
        if !existing.will_expire_within(stale_threshold) {
            return;
        }

        tracing::debug!(
            key,
            executor = self.executor.name(),
            "scheduling background revalidation"
        );

        let store = Arc::clone(&self.store);
        let stale = Arc::clone(existing);
        let key = key.to_string();

        let task: BackgroundTask = Box::pin(async move {
            let outcome = AssertUnwindSafe(candidate.value_async())
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    let message = panic_message(&*payload);
                    Err(FactoryError::msg(format!("factory panicked: {message}")))
                });

            match Materialized::from(outcome) {
                Materialized::Value(_) => {
                    store.set(&key, candidate.to_stored())?;
                    tracing::debug!(key = %key, "background revalidation stored a fresh value");
                    Ok(())
                }
                Materialized::Null => {
                    tracing::debug!(
                        key = %key,
                        "background revalidation produced no value, keeping stale entry"
                    );
                    Ok(())
                }
                Materialized::Failed(err) => {
                    let bumped = Arc::new(stale.bump(candidate.expires_at()));
                    store.set(&key, bumped.to_stored())?;
                    Err(CacheError::background_refresh(key, err))
                }
            }
        });

        self.executor.execute(task, Arc::clone(&self.on_background_failure));
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("store", &self.store.name())
            .field("executor", &self.executor.name())
            .field("stale_threshold", &self.stale_threshold)
            .finish_non_exhaustive()
    }
}

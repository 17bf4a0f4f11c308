use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use crate::error::{BoxError, CacheError};
use crate::swr::{CacheManager, TryGetOrAddOptions};
use crate::utils::build_cache_key;

/// Typed view of a `CacheManager` under a key prefix.
///
/// Every key is stored as `{namespace}::{key}`, so namespaces sharing one
/// manager never see each other's entries. Factories receive the key without
/// the prefix.
pub struct Namespace<V> {
    namespace: String,
    cache: CacheManager,
    options: TryGetOrAddOptions,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for Namespace<V> {
    fn clone(&self) -> Self {
        Namespace {
            namespace: self.namespace.clone(),
            cache: self.cache.clone(),
            options: self.options,
            _value: PhantomData,
        }
    }
}

impl<V> Namespace<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new Namespace over `cache`.
    ///
    /// The stale threshold starts at the manager's default.
    ///
    /// # Example
    /// ```ignore
    /// let cache = CacheManager::new(Arc::new(MokaStore::default()));
    /// let users: Namespace<User> = Namespace::new("users", cache, Duration::from_secs(60));
    /// ```
    pub fn new(namespace: &str, cache: CacheManager, ttl: Duration) -> Self {
        let options = TryGetOrAddOptions::new(ttl).with_stale_threshold(cache.stale_threshold());
        Namespace {
            namespace: namespace.to_string(),
            cache,
            options,
            _value: PhantomData,
        }
    }

    /// Override the stale threshold for this namespace.
    pub fn with_stale_threshold(mut self, stale_threshold: Duration) -> Self {
        self.options = self.options.with_stale_threshold(stale_threshold);
        self
    }

    /// The key prefix of this namespace.
    pub fn name(&self) -> &str {
        &self.namespace
    }

    fn key(&self, key: &str) -> String {
        build_cache_key(&self.namespace, key)
    }

    /// Return the cached value.
    ///
    /// Returns `None` for cache misses.
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        self.cache.get(&self.key(key))
    }

    /// Async counterpart of [`Namespace::get`].
    pub async fn get_async(&self, key: &str) -> Result<Option<V>, CacheError> {
        self.cache.get_async(&self.key(key)).await
    }

    /// Set the value in the cache with the namespace ttl.
    pub fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        self.cache.store(&self.key(key), Some(value), self.options.ttl)
    }

    /// Remove the key from the cache.
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.cache.remove(&self.key(key))
    }

    /// Stale-while-revalidate: get the cached value or load from origin.
    ///
    /// - If the value is fresh, return it immediately
    /// - If the value is close to expiring, return it and refresh in the background
    /// - If the value is missing or expired, load from origin
    ///
    /// # Example
    /// ```ignore
    /// let user = users.swr("user:123", |id| async move {
    ///     db.get_user(&id).await
    /// }).await?;
    /// ```
    pub async fn swr<F, Fut, E>(
        &self,
        key: &str,
        load_from_origin: F,
    ) -> Result<Option<V>, CacheError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<V>, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let origin_key = key.to_string();
        self.cache
            .try_get_or_add_async_with_options(&self.key(key), self.options, move || {
                load_from_origin(origin_key.clone())
            })
            .await
    }

    /// Blocking variant of [`Namespace::swr`].
    pub fn swr_blocking<F, E>(
        &self,
        key: &str,
        load_from_origin: F,
    ) -> Result<Option<V>, CacheError>
    where
        F: Fn(String) -> Result<Option<V>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let origin_key = key.to_string();
        self.cache
            .try_get_or_add_with_options(&self.key(key), self.options, move || {
                load_from_origin(origin_key.clone())
            })
    }
}

impl<V> std::fmt::Debug for Namespace<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

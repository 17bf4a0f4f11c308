use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::error::{BoxError, FactoryError};
use crate::lazy::LazyValue;
use crate::utils::{duration_ms, now_ms};

const VALID: u8 = 0;
const STALE: u8 = 1;

/// A cache entry: a lazily computed value, its expiration time and a one-shot
/// stale flag.
///
/// The value is `Option<V>` because a factory may legitimately produce nothing;
/// such results are returned to the caller but never kept in the cache.
pub struct CacheEntry<V> {
    lazy: Arc<LazyValue<Option<V>>>,

    /// Unix timestamp in milliseconds.
    /// After this time the entry is eligible for its single stale transition.
    expires_at: i64,

    state: AtomicU8,
}

impl<V> CacheEntry<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an entry whose value comes from a synchronous factory.
    pub fn new<F, E>(factory: F, expires_at: i64) -> Self
    where
        F: Fn() -> Result<Option<V>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::from_lazy(Arc::new(LazyValue::new(factory)), expires_at)
    }

    /// Create an entry whose value comes from an asynchronous factory.
    pub fn new_async<F, Fut, E>(factory: F, expires_at: i64) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<V>, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_lazy(Arc::new(LazyValue::new_async(factory)), expires_at)
    }

    /// Create an entry around an already known value.
    pub fn ready(value: V, expires_at: i64) -> Self {
        Self::from_lazy(Arc::new(LazyValue::ready(Some(value))), expires_at)
    }

    fn from_lazy(lazy: Arc<LazyValue<Option<V>>>, expires_at: i64) -> Self {
        CacheEntry {
            lazy,
            expires_at,
            state: AtomicU8::new(VALID),
        }
    }

    /// A fresh, valid entry over the same value with a new expiration.
    ///
    /// The value is shared, not recomputed.
    pub fn bump(&self, expires_at: i64) -> Self {
        Self::from_lazy(Arc::clone(&self.lazy), expires_at)
    }

    /// The materialized value, blocking while the factory runs.
    pub fn value(&self) -> Result<Option<V>, FactoryError> {
        self.lazy.value()
    }

    /// The materialized value, suspending while the factory runs.
    pub async fn value_async(&self) -> Result<Option<V>, FactoryError> {
        self.lazy.value_async().await
    }

    /// Whether the factory has already produced a value.
    pub fn is_initialized(&self) -> bool {
        self.lazy.is_initialized()
    }

    /// Expiration as a unix timestamp in milliseconds.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Whether `at_ms` is past the expiration, without touching the stale flag.
    pub fn is_expired_at(&self, at_ms: i64) -> bool {
        at_ms > self.expires_at
    }

    /// Whether the stale transition has already been taken.
    pub fn is_stale(&self) -> bool {
        self.state.load(Ordering::Acquire) == STALE
    }

    /// Consume the stale transition if `at_ms` is past the expiration.
    ///
    /// Returns `true` for exactly one caller over the entry's lifetime: the one
    /// whose check flips the entry from valid to stale. Every other call,
    /// concurrent or later, returns `false`.
    pub fn has_expired(&self, at_ms: i64) -> bool {
        self.is_expired_at(at_ms)
            && self
                .state
                .compare_exchange(VALID, STALE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// `has_expired` looked `threshold` into the future. Also consumes the flag.
    pub fn will_expire_within(&self, threshold: Duration) -> bool {
        self.has_expired(now_ms().saturating_add(duration_ms(threshold)))
    }

    /// Type-erase a shared entry for storage.
    pub fn to_stored(self: &Arc<Self>) -> StoredEntry {
        StoredEntry::from_typed(Arc::clone(self), self.expires_at)
    }
}

impl<V: fmt::Debug> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("lazy", &self.lazy)
            .field("expires_at", &self.expires_at)
            .field("stale", &(self.state.load(Ordering::Relaxed) == STALE))
            .finish()
    }
}

/// Type-erased storage entry.
///
/// Stores are type-agnostic: the value is kept as an `Arc<dyn Any>` that is
/// cheap to clone and is downcast back to the caller's type on read. A failed
/// downcast means the key holds a value of another type and is treated as a
/// miss by the cache.
#[derive(Clone)]
pub struct StoredEntry {
    value: Arc<dyn Any + Send + Sync>,

    /// Unix timestamp in milliseconds.
    /// Stores must not return the entry after this point.
    expires_at: i64,
}

impl StoredEntry {
    /// Create a StoredEntry from a shared typed value.
    pub fn from_typed<T>(value: Arc<T>, expires_at: i64) -> Self
    where
        T: Send + Sync + 'static,
    {
        StoredEntry { value, expires_at }
    }

    /// Try to recover the typed value.
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Get the expiration timestamp.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Check if the entry has expired and should not be used.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Remaining lifetime relative to `now_ms`, zero once expired.
    pub fn time_to_live(&self, now_ms: i64) -> Duration {
        let remaining = self.expires_at.saturating_sub(now_ms).max(0);
        Duration::from_millis(remaining as u64)
    }
}

impl fmt::Debug for StoredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredEntry")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

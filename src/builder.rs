//! Builder API for creating cache managers.
//!
//! This module provides a convenient way to assemble a `CacheManager` from its
//! collaborators: the store, the background executor and the hook that observes
//! background failures.

use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;
use crate::executor::{Executor, FailureHook, default_executor};
use crate::store::Store;
use crate::stores::moka::MokaStore;
use crate::swr::{CacheManager, DEFAULT_STALE_THRESHOLD, log_background_failure};

/// Builder for `CacheManager`.
///
/// Every collaborator is optional:
/// - store: `MokaStore` with default configuration
/// - executor: tokio if a runtime is current when `build` runs, threads otherwise
/// - background failure hook: logs a warning through `tracing`
///
/// # Example
///
/// ```ignore
/// use lazy_swr_cache::{CacheManager, HashMapStore, ThreadExecutor};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let cache = CacheManager::builder()
///     .store(Arc::new(HashMapStore::default()))
///     .executor(Arc::new(ThreadExecutor))
///     .stale_threshold(Duration::from_millis(500))
///     .on_background_failure(|err| eprintln!("refresh failed: {err}"))
///     .build();
/// ```
pub struct CacheManagerBuilder {
    store: Option<Arc<dyn Store>>,
    executor: Option<Arc<dyn Executor>>,
    on_background_failure: Option<FailureHook>,
    stale_threshold: Duration,
}

impl CacheManagerBuilder {
    /// Create a new CacheManagerBuilder.
    pub fn new() -> Self {
        CacheManagerBuilder {
            store: None,
            executor: None,
            on_background_failure: None,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }

    /// Use `store` for all entries.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run background revalidations on `executor`.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Observe failures of background revalidations.
    pub fn on_background_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(CacheError) + Send + Sync + 'static,
    {
        self.on_background_failure = Some(Arc::new(hook));
        self
    }

    /// Default stale threshold for calls that don't pass one.
    pub fn stale_threshold(mut self, stale_threshold: Duration) -> Self {
        self.stale_threshold = stale_threshold;
        self
    }

    /// Build the cache manager.
    pub fn build(self) -> CacheManager {
        CacheManager::from_parts(
            self.store.unwrap_or_else(|| Arc::new(MokaStore::default())),
            self.executor.unwrap_or_else(default_executor),
            self.on_background_failure.unwrap_or_else(log_background_failure),
            self.stale_threshold,
        )
    }
}

impl Default for CacheManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! lazy-swr-cache - An in-process stale-while-revalidate (SWR) cache for Rust
//!
//! This library provides a caching solution with:
//! - Single-flight value factories: concurrent misses on a key share one call
//! - Stale-while-revalidate: hits close to expiration are served immediately
//!   while exactly one caller refreshes the value in the background
//! - Failures and empty results are never cached
//! - Blocking and async entry points over the same entries
//! - Pluggable stores (HashMap, Moka) and background executors
//!
//! # Example
//!
//! ```ignore
//! use lazy_swr_cache::{CacheManager, MokaStore, Namespace};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = CacheManager::new(Arc::new(MokaStore::default()));
//!
//!     let rate = cache
//!         .try_get_or_add_async("rates:EUR", Duration::from_secs(60), || async {
//!             Ok::<_, std::io::Error>(Some(1.08_f64))
//!         })
//!         .await
//!         .unwrap();
//!
//!     // Namespaces share the manager but not keys
//!     let users: Namespace<String> = Namespace::new("users", cache, Duration::from_secs(300));
//!     let user = users
//!         .swr("user:123", |id| async move {
//!             // 'id' is "user:123"
//!             Ok::<_, std::io::Error>(Some(format!("User data for {}", id)))
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```

mod builder;
mod config;
mod entry;
mod error;
mod executor;
mod lazy;
mod namespace;
mod store;
pub mod stores;
mod swr;
mod utils;

// Re-export public API
pub use builder::CacheManagerBuilder;
pub use config::{CacheConfig, StoreConfig};
pub use entry::{CacheEntry, StoredEntry};
pub use error::{BoxError, CacheError, FactoryError};
pub use executor::{
    BackgroundTask, Executor, FailureHook, ThreadExecutor, TokioExecutor, default_executor,
};
pub use lazy::LazyValue;
pub use namespace::Namespace;
pub use store::Store;
pub use stores::memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use swr::{CacheManager, DEFAULT_STALE_THRESHOLD, TryGetOrAddOptions};

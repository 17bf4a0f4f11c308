//! Declarative cache configuration.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::builder::CacheManagerBuilder;
use crate::error::CacheError;
use crate::store::Store;
use crate::stores::memory::{HashMapStore, HashMapStoreConfig};
use crate::stores::moka::{MokaStore, MokaStoreConfig};
use crate::swr::{CacheManager, DEFAULT_STALE_THRESHOLD};

/// Which store backs the cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    HashMap(HashMapStoreConfig),
    Moka(MokaStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Moka(MokaStoreConfig::default())
    }
}

impl StoreConfig {
    /// Instantiate the configured store.
    pub fn build(&self) -> Arc<dyn Store> {
        match self {
            StoreConfig::HashMap(config) => Arc::new(HashMapStore::new(config.clone())),
            StoreConfig::Moka(config) => Arc::new(MokaStore::new(config.clone())),
        }
    }
}

/// Cache configuration, typically loaded from a JSON document.
///
/// ```json
/// {
///   "store": { "kind": "moka", "max_capacity": 50000 },
///   "stale_threshold_ms": 1500
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub store: StoreConfig,
    /// Default stale threshold in milliseconds.
    pub stale_threshold_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            store: StoreConfig::default(),
            stale_threshold_ms: DEFAULT_STALE_THRESHOLD.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        serde_json::from_str(json).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// A builder preloaded with this configuration.
    pub fn builder(&self) -> CacheManagerBuilder {
        CacheManagerBuilder::new()
            .store(self.store.build())
            .stale_threshold(Duration::from_millis(self.stale_threshold_ms))
    }

    /// Build a cache manager with default executor and failure hook.
    pub fn build(&self) -> CacheManager {
        self.builder().build()
    }
}

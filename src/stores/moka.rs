use moka::Expiry;
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::entry::StoredEntry;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::now_ms;

/// Configuration for MokaStore.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold.
    pub max_capacity: u64,

    /// Time to idle: entries are expired if not accessed within this duration.
    /// `None` means entries don't expire based on idle time.
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
            time_to_idle: None,
        }
    }
}

/// Expires each entry at its own `expires_at`.
struct EntryExpiry;

impl Expiry<String, StoredEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.time_to_live(now_ms()))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.time_to_live(now_ms()))
    }
}

/// High-performance concurrent cache store using Moka.
///
/// MokaStore provides:
/// - Lock-free concurrent reads and per-key atomic installs
/// - Per-entry expiration driven by each entry's own expiration time
/// - Automatic size-bounded eviction
///
/// Use this store for production workloads requiring:
/// - High throughput
/// - Low P99 latency
/// - Predictable performance under load
pub struct MokaStore {
    cache: Cache<String, StoredEntry>,
}

impl MokaStore {
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let config = MokaStoreConfig {
    ///     max_capacity: 10_000,
    ///     time_to_idle: Some(Duration::from_secs(60)),
    /// };
    /// let store = MokaStore::new(config);
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry);

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaStore {
            cache: builder.build(),
        }
    }

    /// Get cache statistics (for monitoring/debugging).
    pub fn stats(&self) -> (u64, u64) {
        let entry_count = self.cache.entry_count();
        let weighted_size = self.cache.weighted_size();
        (entry_count, weighted_size)
    }
}

impl Default for MokaStore {
    fn default() -> Self {
        Self::new(MokaStoreConfig::default())
    }
}

impl Store for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        match self.cache.get(key) {
            Some(entry) => {
                // Moka expires lazily; honour the entry's own deadline
                if entry.is_expired(now_ms()) {
                    self.cache.invalidate(key);
                    return Ok(None);
                }

                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        self.cache.insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key);
        Ok(())
    }

    fn get_or_install(
        &self,
        key: &str,
        candidate: StoredEntry,
        keep_existing: &dyn Fn(&StoredEntry) -> bool,
    ) -> Result<StoredEntry, CacheError> {
        let replacement = candidate.clone();
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(|current| match current {
                Some(existing)
                    if !existing.value().is_expired(now_ms()) && keep_existing(existing.value()) =>
                {
                    Op::Nop
                }
                _ => Op::Put(replacement),
            });

        match result {
            CompResult::Inserted(entry)
            | CompResult::ReplacedWith(entry)
            | CompResult::Unchanged(entry) => Ok(entry.into_value()),
            CompResult::StillNone(_) | CompResult::Removed(_) => Err(CacheError::operation(
                self.name(),
                key,
                "entry vanished during install",
            )),
        }
    }
}

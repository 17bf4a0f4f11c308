use crate::entry::StoredEntry;
use crate::error::CacheError;

/// A store is a common interface for storing, reading and deleting cache entries.
///
/// Stores are type-agnostic and work with `StoredEntry`, which holds a
/// type-erased value plus its expiration time.
///
/// The store implementation is responsible for cleaning up expired data on its
/// own and must never return an entry past `entry.expires_at()`. All operations
/// must be atomic with respect to each other for the same key.
pub trait Store: Send + Sync {
    /// A name for errors and tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    fn name(&self) -> &'static str;

    /// Return the cached entry.
    ///
    /// The response must be `None` for cache misses and expired entries.
    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError>;

    /// Unconditionally sets the entry for the given key.
    ///
    /// Use `entry.expires_at()` (unix milli timestamp) to configure expiration.
    fn set(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError>;

    /// Removes the key from the store. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically install `candidate` unless the current entry should be kept.
    ///
    /// `keep_existing` is called with the live (unexpired) entry for `key`, if
    /// any, while the key is held exclusively. Returns the entry that is
    /// authoritative afterwards: either the existing one or `candidate`.
    fn get_or_install(
        &self,
        key: &str,
        candidate: StoredEntry,
        keep_existing: &dyn Fn(&StoredEntry) -> bool,
    ) -> Result<StoredEntry, CacheError>;
}

//! DotCache: flat store plus a key index for cascading deletes

use std::sync::Arc;
use std::time::Duration;

use dotstore::{Error, Result, Store};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::index::{segments, KeyIndex};
use crate::stats::CacheStats;

/// Store key the index is persisted under unless configured otherwise
pub const DEFAULT_INDEX_KEY: &str = "dotcache-keys";

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Reserved store key holding the persisted key index
    pub index_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index_key: DEFAULT_INDEX_KEY.to_string(),
        }
    }
}

impl CacheConfig {
    /// Use a different reserved key for the index
    pub fn with_index_key(mut self, index_key: impl Into<String>) -> Self {
        self.index_key = index_key.into();
        self
    }
}

/// Cache facade that tracks every written key in a [`KeyIndex`]
///
/// Writes register the key (persisting the index when it changes) before
/// reaching the store. `forget` deletes every entry registered at or below a
/// dotted path. The index is loaded once at construction; separate instances
/// over the same store do not coordinate and the last index write wins.
pub struct DotCache<S: Store + ?Sized> {
    /// Backing store for values and the persisted index
    store: Arc<S>,

    /// Registered keys; the write lock is held for a whole mutating call
    index: RwLock<KeyIndex>,

    /// Cache statistics
    stats: CacheStats,

    config: CacheConfig,
}

impl<S: Store + ?Sized> DotCache<S> {
    /// Create a cache over `store` with the default configuration
    ///
    /// # Arguments
    /// * `store` - Backing store, shared with any other users
    ///
    /// # Returns
    /// * `Result<DotCache<S>>` - Cache with the persisted index loaded
    pub fn new(store: Arc<S>) -> Result<Self> {
        Self::with_config(store, CacheConfig::default())
    }

    /// Create a cache over `store`, loading the index from `config.index_key`
    pub fn with_config(store: Arc<S>, config: CacheConfig) -> Result<Self> {
        let index = KeyIndex::load(&*store, &config.index_key)?;
        debug!(index_key = %config.index_key, entries = index.len(), "loaded key index");

        Ok(Self {
            store,
            index: RwLock::new(index),
            stats: CacheStats::new(),
            config,
        })
    }

    /// Retrieve a value
    ///
    /// Reads straight from the store; the index is not consulted.
    ///
    /// # Arguments
    /// * `key` - Exact store key
    ///
    /// # Returns
    /// * `Result<Option<T>>` - Decoded value, or `None` on a miss
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let bytes = self.store.get(key)?;
        self.decode(bytes)
    }

    /// Retrieve a value, or `default` on a miss
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Does the store hold a live value at `key`?
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.store.get(key)?.is_some())
    }

    /// Retrieve a value and delete it
    ///
    /// The entry is unregistered before the store is touched. Keys registered
    /// beneath `key` are left alone. If the index write fails the key stays
    /// registered and the value stays in the store.
    ///
    /// # Arguments
    /// * `key` - Exact store key
    ///
    /// # Returns
    /// * `Result<Option<T>>` - Decoded value that was removed, or `None`
    pub fn pull<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut index = self.index.write();
        if index.contains(key) {
            self.commit(&mut index, |next| Ok(next.unregister(key)))?;
        }
        let bytes = self.store.pull(key)?;
        drop(index);

        self.decode(bytes)
    }

    /// Retrieve and delete a value, or `default` on a miss
    pub fn pull_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.pull(key)?.unwrap_or(default))
    }

    /// Store a value
    ///
    /// # Arguments
    /// * `key` - Dotted key, registered in the index before the write
    /// * `value` - Anything serde can serialize
    /// * `ttl` - Time to live; `None` means no expiry
    ///
    /// # Returns
    /// * `Result<bool>` - Whether the store accepted the write
    pub fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.check_key(key)?;
        let bytes = serde_json::to_vec(value)?;

        let mut index = self.index.write();
        self.register(&mut index, key)?;
        let written = self.store.put(key, bytes, ttl)?;
        self.stats.record_writes(1);

        Ok(written)
    }

    /// Alias for [`put`](Self::put)
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.put(key, value, ttl)
    }

    /// Store a value only if the store has none at `key`
    ///
    /// The key is registered even when the store rejects the write.
    pub fn add<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.check_key(key)?;
        let bytes = serde_json::to_vec(value)?;

        let mut index = self.index.write();
        self.register(&mut index, key)?;
        let added = self.store.add(key, bytes, ttl)?;
        if added {
            self.stats.record_writes(1);
        }

        Ok(added)
    }

    /// Store a value with no expiry
    pub fn forever<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<bool> {
        self.check_key(key)?;
        let bytes = serde_json::to_vec(value)?;

        let mut index = self.index.write();
        self.register(&mut index, key)?;
        let written = self.store.forever(key, bytes)?;
        self.stats.record_writes(1);

        Ok(written)
    }

    /// Return the cached value, or compute, store and return it
    ///
    /// `producer` runs only on a miss, and without the index lock held.
    ///
    /// # Arguments
    /// * `key` - Dotted key, registered on a hit as well as a miss
    /// * `ttl` - Time to live for a produced value; `None` means no expiry
    /// * `producer` - Computes the value on a miss
    ///
    /// # Returns
    /// * `Result<T>` - Cached or freshly produced value
    pub fn remember<T, F>(&self, key: &str, ttl: Option<Duration>, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.check_key(key)?;

        if let Some(bytes) = self.store.get(key)? {
            self.stats.record_hit();
            let value = serde_json::from_slice(&bytes)?;
            let mut index = self.index.write();
            self.register(&mut index, key)?;
            return Ok(value);
        }

        self.stats.record_miss();
        let value = producer();
        let bytes = serde_json::to_vec(&value)?;

        let mut index = self.index.write();
        self.register(&mut index, key)?;
        self.store.put(key, bytes, ttl)?;
        self.stats.record_writes(1);

        Ok(value)
    }

    /// [`remember`](Self::remember) with no expiry
    pub fn remember_forever<T, F>(&self, key: &str, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.remember(key, None, producer)
    }

    /// Alias for [`remember_forever`](Self::remember_forever)
    pub fn sear<T, F>(&self, key: &str, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.remember_forever(key, producer)
    }

    /// Retrieve several values, in the order requested
    pub fn many<T: DeserializeOwned>(&self, keys: &[&str]) -> Result<Vec<(String, Option<T>)>> {
        self.store
            .get_many(keys)?
            .into_iter()
            .map(|(key, bytes)| -> Result<(String, Option<T>)> {
                Ok((key, self.decode(bytes)?))
            })
            .collect()
    }

    /// Store several values with the same ttl
    ///
    /// All keys are registered and the index is written once.
    ///
    /// # Arguments
    /// * `values` - Key and value pairs; every key is validated first
    /// * `ttl` - Time to live for every value; `None` means no expiry
    ///
    /// # Returns
    /// * `Result<bool>` - Whether the store accepted every write
    pub fn put_many<K, T>(&self, values: &[(K, T)], ttl: Option<Duration>) -> Result<bool>
    where
        K: AsRef<str>,
        T: Serialize,
    {
        self.write_many(values, ttl)
    }

    /// Alias for [`put_many`](Self::put_many)
    pub fn set_multiple<K, T>(&self, values: &[(K, T)], ttl: Option<Duration>) -> Result<bool>
    where
        K: AsRef<str>,
        T: Serialize,
    {
        self.write_many(values, ttl)
    }

    /// Store several values with no expiry
    pub fn put_many_forever<K, T>(&self, values: &[(K, T)]) -> Result<bool>
    where
        K: AsRef<str>,
        T: Serialize,
    {
        self.write_many(values, None)
    }

    /// Delete `key` and every entry registered beneath it
    ///
    /// If a store delete or the index write fails the error is returned and
    /// the index keeps the whole subtree, so a later `forget` retries it.
    ///
    /// # Arguments
    /// * `key` - Dotted path; need not be an entry itself
    ///
    /// # Returns
    /// * `Result<bool>` - `false` (having done nothing) if nothing is
    ///   registered at `key`
    pub fn forget(&self, key: &str) -> Result<bool> {
        let mut index = self.index.write();

        let leaves = index.leaves(key);
        if leaves.is_empty() {
            return Ok(false);
        }

        debug!(key, entries = leaves.len(), "cascading forget");
        self.cascade(&leaves)?;
        self.stats.record_forget(leaves.len() as u64);
        self.commit(&mut index, |next| Ok(next.remove(key)))?;

        Ok(true)
    }

    /// [`forget`](Self::forget) each key in turn
    pub fn delete_multiple<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        for key in keys {
            self.forget(key.as_ref())?;
        }
        Ok(())
    }

    /// Delete every registered entry and empty the index
    pub fn clear(&self) -> Result<()> {
        let mut index = self.index.write();

        let leaves = index.all_leaves();
        debug!(entries = leaves.len(), "clearing cache");
        self.cascade(&leaves)?;
        self.stats.record_deleted(leaves.len() as u64);
        self.commit(&mut index, |next| {
            next.clear();
            Ok(true)
        })
    }

    /// Registered keys at or below `prefix`, or every registered key
    pub fn keys(&self, prefix: Option<&str>) -> Vec<String> {
        let index = self.index.read();
        match prefix {
            Some(prefix) => index.leaves(prefix),
            None => index.all_leaves(),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the backing store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the reserved index key
    pub fn index_key(&self) -> &str {
        &self.config.index_key
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if key == self.config.index_key {
            return Err(Error::ReservedKey(key.to_string()));
        }
        segments(key)?;
        Ok(())
    }

    fn register(&self, index: &mut KeyIndex, key: &str) -> Result<()> {
        if index.contains(key) {
            return Ok(());
        }
        self.commit(index, |next| next.register(key))
    }

    /// Apply `edit` to a copy of the index and swap it in once persisted
    ///
    /// `edit` reports whether it changed anything; an unchanged copy is not
    /// written. On any failure the live index is left as it was.
    fn commit<F>(&self, index: &mut KeyIndex, edit: F) -> Result<()>
    where
        F: FnOnce(&mut KeyIndex) -> Result<bool>,
    {
        let mut next = index.clone();
        if edit(&mut next)? {
            next.persist(&*self.store, &self.config.index_key)?;
            *index = next;
        }
        Ok(())
    }

    fn cascade(&self, leaves: &[String]) -> Result<()> {
        for leaf in leaves {
            self.store.delete(leaf)?;
        }
        Ok(())
    }

    fn write_many<K, T>(&self, values: &[(K, T)], ttl: Option<Duration>) -> Result<bool>
    where
        K: AsRef<str>,
        T: Serialize,
    {
        let mut entries = Vec::with_capacity(values.len());
        for (key, value) in values {
            let key = key.as_ref();
            self.check_key(key)?;
            entries.push((key.to_string(), serde_json::to_vec(value)?));
        }

        let mut index = self.index.write();
        self.commit(&mut index, |next| {
            next.register_many(entries.iter().map(|(key, _)| key.as_str()))?;
            Ok(true)
        })?;

        let count = entries.len() as u64;
        let written = self.store.put_many(entries, ttl)?;
        self.stats.record_writes(count);

        Ok(written)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: Option<Vec<u8>>) -> Result<Option<T>> {
        match bytes {
            Some(bytes) => {
                self.stats.record_hit();
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }
}

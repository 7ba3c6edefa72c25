//! In-memory store with lazy expiry

use std::collections::HashMap;
use std::time::Duration;

use ahash::RandomState;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{expires_at, Store};

/// Maximum value size (1 MB)
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// A stored value and its optional expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Raw value bytes
    pub value: Vec<u8>,
    /// Instant after which the entry reads as absent
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: expires_at(ttl),
        }
    }

    /// Has this entry passed its expiry instant?
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Process-local `Store` backed by a hash map
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry, RandomState>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously snapshotted entries, dropping expired ones
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Entry)>,
    {
        let now = Utc::now();
        let map = entries
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Copy out every live entry, sorted by key
    pub fn snapshot(&self) -> Vec<(String, Entry)> {
        let now = Utc::now();
        let entries = self.entries.read();
        let mut live: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        live.sort_by(|a, b| a.0.cmp(&b.0));
        live
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Remove everything
    pub fn flush(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_size(value: &[u8]) -> Result<()> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(Error::ValueTooLarge(value.len()));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Utc::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired - drop it lazily
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        if ttl.is_some_and(|ttl| ttl.is_zero()) {
            self.delete(key)?;
            return Ok(true);
        }
        Self::check_size(&value)?;

        self.entries
            .write()
            .insert(key.to_string(), Entry::new(value, ttl));
        Ok(true)
    }

    fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        if ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Ok(false);
        }
        Self::check_size(&value)?;

        let now = Utc::now();
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| !entry.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(true)
    }

    fn put_unbounded(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        self.entries
            .write()
            .insert(key.to_string(), Entry::new(value, None));
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .entries
            .write()
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    fn pull(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Utc::now();
        let entry = self.entries.write().remove(key);
        Ok(entry
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let store = MemoryStore::new();
        assert!(store.put("users.1", b"alice".to_vec(), None).unwrap());

        assert_eq!(store.get("users.1").unwrap(), Some(b"alice".to_vec()));
        assert_eq!(store.get("users.2").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_only_if_absent() {
        let store = MemoryStore::new();
        assert!(store.add("k", b"first".to_vec(), None).unwrap());
        assert!(!store.add("k", b"second".to_vec(), None).unwrap());

        assert_eq!(store.get("k").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn test_add_replaces_expired() {
        let store = MemoryStore::from_entries(vec![(
            "k".to_string(),
            Entry {
                value: b"stale".to_vec(),
                expires_at: Some(Utc::now() - chrono::Duration::seconds(5)),
            },
        )]);
        assert!(store.is_empty());

        store.entries.write().insert(
            "k".to_string(),
            Entry {
                value: b"stale".to_vec(),
                expires_at: Some(Utc::now() - chrono::Duration::seconds(5)),
            },
        );
        assert!(store.add("k", b"fresh".to_vec(), None).unwrap());
        assert_eq!(store.get("k").unwrap(), Some(b"fresh".to_vec()));
    }

    #[test]
    fn test_expired_reads_as_absent() {
        let store = MemoryStore::new();
        store.entries.write().insert(
            "old".to_string(),
            Entry {
                value: b"gone".to_vec(),
                expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            },
        );

        assert_eq!(store.get("old").unwrap(), None);
        // Lazily dropped on read
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_zero_ttl_removes() {
        let store = MemoryStore::new();
        store.put("k", b"v".to_vec(), None).unwrap();
        store.put("k", b"v2".to_vec(), Some(Duration::ZERO)).unwrap();

        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.add("k", b"v3".to_vec(), Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn test_pull() {
        let store = MemoryStore::new();
        store.put("k", b"v".to_vec(), Some(Duration::from_secs(60))).unwrap();

        assert_eq!(store.pull("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.pull("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        store.put("k", b"v".to_vec(), None).unwrap();

        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn test_batch_operations() {
        let store = MemoryStore::new();
        store
            .put_many(
                vec![
                    ("a".to_string(), b"1".to_vec()),
                    ("b".to_string(), b"2".to_vec()),
                ],
                None,
            )
            .unwrap();

        let values = store.get_many(&["b", "missing", "a"]).unwrap();
        assert_eq!(
            values,
            vec![
                ("b".to_string(), Some(b"2".to_vec())),
                ("missing".to_string(), None),
                ("a".to_string(), Some(b"1".to_vec())),
            ]
        );
    }

    #[test]
    fn test_value_too_large() {
        let store = MemoryStore::new();
        let large = vec![b'x'; MAX_VALUE_SIZE + 1];

        let result = store.put("k", large.clone(), None);
        assert!(matches!(result, Err(Error::ValueTooLarge(_))));
        assert!(matches!(
            store.forever("k", large.clone()),
            Err(Error::ValueTooLarge(_))
        ));

        // Bookkeeping writes skip the cap
        assert!(store.put_unbounded("k", large).unwrap());
        assert_eq!(store.get("k").unwrap().map(|v| v.len()), Some(MAX_VALUE_SIZE + 1));
    }

    #[test]
    fn test_purge_and_snapshot() {
        let store = MemoryStore::new();
        store.put("b", b"2".to_vec(), None).unwrap();
        store.put("a", b"1".to_vec(), None).unwrap();
        store.entries.write().insert(
            "c".to_string(),
            Entry {
                value: b"3".to_vec(),
                expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            },
        );

        let keys: Vec<_> = store.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);

        store.flush();
        assert!(store.is_empty());
    }
}

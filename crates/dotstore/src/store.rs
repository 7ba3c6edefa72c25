//! The backing-store contract
//!
//! A `Store` is a flat key-value cache: exact-key reads, writes and deletes
//! with optional expiry. It knows nothing about dotted hierarchies.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Flat key-value store with per-key expiry
///
/// Single-key operations are expected to be atomic. Multi-key operations
/// carry no transactional guarantee.
pub trait Store: Send + Sync {
    /// Read a live value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value. `None` ttl means no expiry; a zero ttl removes the key.
    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool>;

    /// Write a value only if no live value exists at `key`
    fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool>;

    /// Delete a value, returning whether one existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Read a value and delete it
    fn pull(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.delete(key)?;
        }
        Ok(value)
    }

    /// Read several values, in the order requested
    fn get_many(&self, keys: &[&str]) -> Result<Vec<(String, Option<Vec<u8>>)>> {
        keys.iter()
            .map(|key| -> Result<(String, Option<Vec<u8>>)> {
                Ok((key.to_string(), self.get(key)?))
            })
            .collect()
    }

    /// Write several values with the same ttl
    fn put_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<bool> {
        let mut all = true;
        for (key, value) in entries {
            all &= self.put(&key, value, ttl)?;
        }
        Ok(all)
    }

    /// Write a value with no expiry
    fn forever(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        self.put(key, value, None)
    }

    /// Write a value with no expiry, exempt from any per-value size cap
    ///
    /// Meant for bookkeeping records that grow with the number of keys, such
    /// as a key index. Stores without a cap can rely on the default.
    fn put_unbounded(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        self.forever(key, value)
    }
}

/// Absolute expiry instant for a ttl measured from now
pub fn expires_at(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = ttl?;
    // Saturate absurd ttls to "never"
    let delta = chrono::Duration::from_std(ttl).ok()?;
    Utc::now().checked_add_signed(delta)
}

//! # dotcache
//!
//! Cache facade that adds dotted-path hierarchy to a flat key-value store.
//!
//! ## Architecture
//! - **KeyIndex**: tree of every key written through the cache, split on `.`
//! - **DotCache**: get/put/remember/forget operations that register keys in
//!   the index before writing to the store, and cascade `forget` to every
//!   entry registered beneath a path
//! - **Store**: any [`dotstore::Store`]; the index itself is persisted in
//!   the same store under a reserved key
//!
//! ```
//! use std::sync::Arc;
//! use dotcache::DotCache;
//! use dotstore::MemoryStore;
//!
//! let cache = DotCache::new(Arc::new(MemoryStore::new()))?;
//! cache.put("users.1.name", "alice", None)?;
//! cache.put("users.1.email", "alice@example.com", None)?;
//!
//! cache.forget("users.1")?;
//! assert_eq!(cache.get::<String>("users.1.name")?, None);
//! # Ok::<(), dotstore::Error>(())
//! ```

#![warn(missing_docs)]

mod cache;
mod index;
mod stats;

pub use cache::{CacheConfig, DotCache, DEFAULT_INDEX_KEY};
pub use dotstore::{Error, Result, Store};
pub use index::{segments, Branch, KeyIndex, Node, SEPARATOR};
pub use stats::CacheStats;

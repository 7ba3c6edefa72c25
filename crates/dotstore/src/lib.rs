//! # dotstore
//!
//! Flat key-value backing stores for dotcache.
//!
//! ## Contents
//! - **Store**: the contract a backing store must satisfy (get, put, add,
//!   delete, pull, batch variants, no-expiry writes)
//! - **MemoryStore**: process-local store with lazy TTL expiry
//! - **FileStore**: `MemoryStore` persisted to a snapshot file after every write
//!
//! Stores know nothing about dotted hierarchies; a key is an opaque string.

#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod parser;
mod store;

pub use error::{Error, Result};
pub use file::FileStore;
pub use memory::{Entry, MemoryStore, MAX_VALUE_SIZE};
pub use store::{expires_at, Store};

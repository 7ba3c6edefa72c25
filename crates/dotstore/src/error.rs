//! Error types shared by the store and cache layers

use std::fmt;
use std::io;

/// Result type alias for dotstore and dotcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store and cache operations
#[derive(Debug)]
pub enum Error {
    /// I/O error from the backing store
    Io(io::Error),

    /// Snapshot file is corrupt or has an unknown layout
    Parse(String),

    /// Value or index could not be (de)serialized
    Serialization(serde_json::Error),

    /// Value too large (max 1 MB)
    ValueTooLarge(usize),

    /// Key is empty or contains an empty segment
    InvalidKey(String),

    /// Key is reserved for the persisted key index
    ReservedKey(String),

    /// Store is closed
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::ValueTooLarge(size) => write!(f, "Value too large: {} bytes (max 1 MB)", size),
            Error::InvalidKey(key) => write!(f, "Invalid key: {:?}", key),
            Error::ReservedKey(key) => write!(f, "Key is reserved for the key index: {}", key),
            Error::Closed => write!(f, "Store is closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}

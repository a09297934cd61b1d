//! Persistence ports used by the registries.
//!
//! The registries only see [`Store<T>`]: "give me the last saved value, or
//! nothing" and "save this value".  How bytes reach the disk is the business of
//! the `infrastructure::storage` implementations.

use thiserror::Error;

/// Error type for persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing medium could not be read or written.
    #[error("I/O error for key {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The value could not be encoded.
    #[error("failed to encode {key:?}: {message}")]
    Encode { key: String, message: String },

    /// The stored bytes could not be decoded.
    #[error("failed to decode {key:?}: {message}")]
    Decode { key: String, message: String },
}

/// Raw byte-blob persistence keyed by a short name.
pub trait KeyValueStore: Send + Sync {
    /// Returns the bytes last saved under `key`, or `None` if nothing was saved.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replaces the bytes saved under `key`.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Typed persistence of one value, decoupled from its encoding.
pub trait Store<T>: Send + Sync {
    /// Returns the last saved value, or `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<T>, StoreError>;

    /// Replaces the saved value.
    fn save(&self, value: &T) -> Result<(), StoreError>;
}

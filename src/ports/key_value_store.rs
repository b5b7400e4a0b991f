use thiserror::Error;

/// Error type for durable key-value storage
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// Error when the backing medium could not be read or written
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error when stored data is corrupt
    #[error("Corrupt store data: {0}")]
    Corrupt(String),

    /// Error when the store lock was poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Result type for key-value store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// KeyValueStore defines the port (interface) for durable client-local storage.
///
/// Every operation is synchronous so that best-effort lookups never suspend.
/// Writes replace the previous value of a key atomically.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key`; removing an absent key is not an error
    fn delete(&self, key: &str) -> StoreResult<()>;
}

//! Error types for durable storage.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by [`super::DurableStorage`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage backend is not reachable (e.g. `localStorage` disabled).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Errors reading from the storage backend.
    #[error("storage read error: {0}")]
    Read(String),

    /// Errors writing to the storage backend.
    #[error("storage write error: {0}")]
    Write(String),

    /// Serialization/deserialization failures of the backing file.
    #[error("serialization error: {0}")]
    Serialization(String),
}

//! Durable client storage for the session credential.
//!
//! The browser keeps the credential in `localStorage`; the CLI keeps it in a file.
//! Both are plain string key/value stores scoped to the application, modeled by
//! [`DurableStorage`].

mod error;
mod memory;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;

/// Key/value string store scoped to the application origin.
pub trait DurableStorage {
    /// Reads the value at `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes `value` at `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes the value at `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

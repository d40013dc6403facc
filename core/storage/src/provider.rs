//! Storage provider trait definition.

use async_trait::async_trait;

use keyward_common::{Result, StorageKey};

/// Key-value storage area used by the vault core.
///
/// Values are opaque bytes; the core decides what is encrypted. Storage
/// engine internals are the implementor's concern, but every
/// implementation must honour the contract documented on each method.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Read the value stored under `key`.
    ///
    /// # Returns
    /// `None` if nothing is stored under the key.
    ///
    /// # Errors
    /// - I/O or backend failure
    async fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Postconditions
    /// - On success the new value is durable for this storage area
    /// - On failure the previous value (if any) is still intact; readers
    ///   never observe a partially written value
    async fn put(&self, key: &StorageKey, value: Vec<u8>) -> Result<()>;

    /// Remove the value stored under `key`.
    ///
    /// Removing an absent key is not an error.
    ///
    /// # Returns
    /// Whether a value was removed.
    async fn delete(&self, key: &StorageKey) -> Result<bool>;

    /// Check if a value is stored under `key`.
    async fn exists(&self, key: &StorageKey) -> Result<bool>;
}

//! Common types used throughout Keyward.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroize;

/// Unique identifier for a vault entry.
///
/// Identifiers are random UUIDs, so an id freed by deletion is never handed
/// out again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(String);

impl EntryId {
    /// Create an EntryId from an existing string.
    ///
    /// # Errors
    /// - Returns error if id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "EntryId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh, never-reused identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EntryId {
    type Error = crate::Error;

    fn try_from(id: String) -> crate::Result<Self> {
        Self::new(id)
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

/// Name of a record in a key-value storage area.
///
/// Keys are restricted to ASCII alphanumerics, `_`, `-` and `.` so that every
/// backend (including file-per-key stores) can use them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    /// Parse a storage key.
    ///
    /// # Errors
    /// - Returns error if the key is empty, starts with a dot, or contains
    ///   characters outside the allowed set
    pub fn new(key: impl Into<String>) -> crate::Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Storage key cannot be empty".to_string(),
            ));
        }
        if key.starts_with('.') {
            return Err(crate::Error::InvalidInput(
                "Storage key cannot start with '.'".to_string(),
            ));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(crate::Error::InvalidInput(format!(
                "Storage key contains invalid characters: {}",
                key
            )));
        }
        Ok(Self(key))
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for StorageKey {
    type Error = crate::Error;

    fn try_from(key: String) -> crate::Result<Self> {
        Self::new(key)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

/// Secret text, such as a master password, that zeroizes on drop.
///
/// Deserializes from a plain JSON string; `Debug` never shows the value.
#[derive(Clone, Default, Zeroize, Deserialize)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the secret text.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Get the length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED; {} bytes])", self.0.len())
    }
}

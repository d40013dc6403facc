//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use keyward_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the vault salt in bytes.
pub const SALT_LENGTH: usize = 16;

/// Master key derived from the user's master password.
///
/// Only the session layer keeps one alive; it is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Encode the key for the ephemeral session mirror.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.key))
    }

    /// Decode a key previously produced by [`MasterKey::to_base64`].
    ///
    /// # Errors
    /// - Returns error if the input is not base64 or has the wrong length
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|e| Error::Crypto(format!("Invalid key encoding: {}", e)))?,
        );
        if decoded.len() != KEY_LENGTH {
            return Err(Error::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                decoded.len()
            )));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for MasterKey {}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Salt for key derivation.
///
/// Generated once when a vault is created and never rotated afterwards.
/// Serialized as a base64 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }

    /// Base64 representation.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl TryFrom<String> for Salt {
    type Error = Error;

    fn try_from(encoded: String) -> Result<Self> {
        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::Crypto(format!("Invalid salt encoding: {}", e)))?;
        let bytes: [u8; SALT_LENGTH] = decoded.try_into().map_err(|v: Vec<u8>| {
            Error::Crypto(format!(
                "Invalid salt length: expected {}, got {}",
                SALT_LENGTH,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl From<Salt> for String {
    fn from(salt: Salt) -> Self {
        salt.to_base64()
    }
}

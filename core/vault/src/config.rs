//! Vault configuration, settings and persisted layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use keyward_common::{Error, Result, StorageKey};
use keyward_crypto::{KdfParams, Salt};

/// Storage key of the encrypted vault blob (durable area).
pub const VAULT_KEY: &str = "vault_data";

/// Storage key of the unencrypted salt record (durable area).
pub const SALT_KEY: &str = "vault_salt";

/// Storage key of the session mirror (ephemeral area).
pub const SESSION_KEY: &str = "session_data";

/// Maximum age of a session mirror that may be restored after a restart.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default auto-lock timeout in minutes.
pub const DEFAULT_LOCK_TIMEOUT: u32 = 15;

pub(crate) fn storage_key(name: &str) -> Result<StorageKey> {
    StorageKey::new(name)
}

/// Vault format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultVersion {
    pub major: u32,
    pub minor: u32,
}

impl VaultVersion {
    /// Current vault format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for VaultVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Unencrypted record stored beside the vault blob.
///
/// Holds everything needed to derive the key before decryption is
/// attempted. The salt never changes for the lifetime of the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaltRecord {
    /// Vault format version.
    pub version: VaultVersion,
    /// Salt for master key derivation.
    pub salt: Salt,
    /// KDF parameters used when the vault was created.
    pub kdf_params: KdfParams,
    /// Vault creation timestamp.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl SaltRecord {
    /// Create a record for a freshly generated salt.
    pub fn new(salt: Salt, kdf_params: KdfParams) -> Self {
        Self {
            version: VaultVersion::CURRENT,
            salt,
            kdf_params,
            created_at: Utc::now(),
        }
    }

    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes, rejecting incompatible versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: Self = serde_json::from_slice(bytes)?;
        if !record.version.is_compatible() {
            return Err(Error::InvalidInput(format!(
                "Incompatible vault version: {}.{}",
                record.version.major, record.version.minor
            )));
        }
        Ok(record)
    }
}

/// Defaults for the password generator UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorSettings {
    pub length: u32,
    pub include_uppercase: bool,
    pub include_lowercase: bool,
    pub include_numbers: bool,
    pub include_symbols: bool,
    pub exclude_similar: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            length: 16,
            include_uppercase: true,
            include_lowercase: true,
            include_numbers: true,
            include_symbols: true,
            exclude_similar: true,
        }
    }
}

/// User settings stored inside the encrypted vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Auto-lock timeout in minutes; `0` disables auto-lock.
    pub lock_timeout: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fill: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_save: Option<bool>,
    /// Explicit auto-lock switch; `Some(false)` disables auto-lock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_lock_enabled: Option<bool>,
    #[serde(default)]
    pub password_generator: GeneratorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            auto_fill: None,
            auto_save: None,
            auto_lock_enabled: Some(true),
            password_generator: GeneratorSettings::default(),
        }
    }
}

impl Settings {
    /// Inactivity period after which the session locks, if auto-lock is on.
    pub fn auto_lock_after(&self) -> Option<Duration> {
        if self.lock_timeout == 0 || self.auto_lock_enabled == Some(false) {
            return None;
        }
        Some(Duration::from_secs(u64::from(self.lock_timeout) * 60))
    }

    /// Validate settings supplied by a caller.
    ///
    /// # Errors
    /// - Generator length is zero
    /// - No generator character class is enabled
    pub fn validate(&self) -> Result<()> {
        let generator = &self.password_generator;
        if generator.length == 0 {
            return Err(Error::InvalidInput(
                "Generator length must be at least 1".to_string(),
            ));
        }
        if !(generator.include_uppercase
            || generator.include_lowercase
            || generator.include_numbers
            || generator.include_symbols)
        {
            return Err(Error::InvalidInput(
                "At least one generator character set must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

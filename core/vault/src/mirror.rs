//! Session mirror in the ephemeral storage area.
//!
//! Lets an unlocked session survive a host process restart. The mirror
//! lives in storage that the host clears on full teardown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{storage_key, SESSION_KEY};
use keyward_common::{Result, StorageKey};
use keyward_crypto::MasterKey;
use keyward_storage::StorageProvider;

/// Persisted form of an unlocked session.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRecord {
    /// Base64 encoded master key.
    key: String,
    #[zeroize(skip)]
    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_activity: DateTime<Utc>,
}

impl MirrorRecord {
    pub fn new(key: &MasterKey, last_activity: DateTime<Utc>) -> Self {
        Self {
            key: key.to_base64().to_string(),
            last_activity,
        }
    }

    pub fn key(&self) -> Result<MasterKey> {
        MasterKey::from_base64(&self.key)
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }
}

/// Reader and writer of the session mirror.
pub struct SessionMirror {
    provider: Arc<dyn StorageProvider>,
    key: StorageKey,
}

impl SessionMirror {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Result<Self> {
        Ok(Self {
            provider,
            key: storage_key(SESSION_KEY)?,
        })
    }

    /// Persist the session key and its last activity time.
    pub async fn save(&self, record: &MirrorRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.provider.put(&self.key, bytes).await
    }

    /// Read the mirror if present.
    ///
    /// A record that cannot be parsed is reported as absent.
    pub async fn load(&self) -> Result<Option<MirrorRecord>> {
        let Some(bytes) = self.provider.get(&self.key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session mirror");
                Ok(None)
            }
        }
    }

    /// Remove the mirror. Clearing an absent mirror is a no-op.
    pub async fn clear(&self) -> Result<()> {
        self.provider.delete(&self.key).await?;
        Ok(())
    }
}

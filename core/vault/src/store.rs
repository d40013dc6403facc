//! Encrypted vault store.
//!
//! Owns the persisted form of the vault: one encrypted blob plus the
//! unencrypted salt record. Every operation that needs plaintext takes the
//! derived key as a parameter; the store never keeps it.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{storage_key, SaltRecord, Settings, SALT_KEY, VAULT_KEY};
use crate::model::{timestamp_now, Entry, ExportDocument, ImportSummary, VaultBlob};
use keyward_common::{EntryId, Error, Result, StorageKey};
use keyward_crypto::{decrypt, derive_key, encrypt, hash, verify_hash, KdfParams, MasterKey, Salt};
use keyward_storage::StorageProvider;

/// Run Argon2id on the blocking pool so the executor keeps serving other
/// requests while the key is stretched.
pub async fn derive_key_blocking(
    password: Zeroizing<Vec<u8>>,
    salt: Salt,
    params: KdfParams,
) -> Result<MasterKey> {
    let started = Instant::now();
    let key = tokio::task::spawn_blocking(move || derive_key(&password, &salt, &params))
        .await
        .map_err(|e| Error::Crypto(format!("Key derivation task failed: {}", e)))??;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Key derived");
    Ok(key)
}

/// Encrypted vault store backed by a durable storage area.
pub struct VaultStore {
    provider: Arc<dyn StorageProvider>,
    vault_key: StorageKey,
    salt_key: StorageKey,
    /// Serializes decrypt-modify-encrypt cycles for this vault.
    writer: Mutex<()>,
}

impl VaultStore {
    /// Create a store over the given durable storage area.
    pub fn new(provider: Arc<dyn StorageProvider>) -> Result<Self> {
        Ok(Self {
            provider,
            vault_key: storage_key(VAULT_KEY)?,
            salt_key: storage_key(SALT_KEY)?,
            writer: Mutex::new(()),
        })
    }

    /// Whether a vault has been persisted.
    pub async fn exists(&self) -> Result<bool> {
        self.provider.exists(&self.vault_key).await
    }

    /// Read the unencrypted salt record.
    ///
    /// # Errors
    /// - `Error::NotFound` if no vault exists
    pub async fn salt_record(&self) -> Result<SaltRecord> {
        if !self.exists().await? {
            return Err(Error::NotFound("No vault has been created".to_string()));
        }
        let bytes = self
            .provider
            .get(&self.salt_key)
            .await?
            .ok_or_else(|| Error::NotFound("Vault salt record is missing".to_string()))?;
        SaltRecord::from_bytes(&bytes)
    }

    /// Create a new, empty vault.
    ///
    /// # Postconditions
    /// - Salt record and encrypted blob are persisted
    /// - Returns the blob and the key derived for it
    ///
    /// # Errors
    /// - `Error::AlreadyExists` if a vault is already persisted
    /// - `Error::InvalidInput` if the password is empty
    pub async fn create(
        &self,
        password: Zeroizing<Vec<u8>>,
        settings: Settings,
        params: KdfParams,
    ) -> Result<(VaultBlob, MasterKey)> {
        if password.is_empty() {
            return Err(Error::InvalidInput("Password cannot be empty".to_string()));
        }
        settings.validate()?;

        let _guard = self.writer.lock().await;
        if self.exists().await? {
            return Err(Error::AlreadyExists("A vault already exists".to_string()));
        }

        let salt = Salt::generate();
        let password_hash = hash(&password, &salt);
        let key = derive_key_blocking(password, salt.clone(), params).await?;

        let blob = VaultBlob::new(password_hash, salt.clone(), settings);
        let ciphertext = encrypt(key.as_bytes(), &blob.to_bytes()?)?;

        // The blob marks the vault as existing, so it is written last. A
        // stale salt record left by a failed blob write is overwritten by
        // the next create.
        let record = SaltRecord::new(salt, params);
        self.provider.put(&self.salt_key, record.to_bytes()?).await?;
        self.provider.put(&self.vault_key, ciphertext).await?;

        info!("Vault created");
        Ok((blob, key))
    }

    /// Decrypt and return the persisted vault.
    ///
    /// # Errors
    /// - `Error::NotFound` if no vault exists
    /// - `Error::WrongKey` if the key does not authenticate the blob
    pub async fn load(&self, key: &MasterKey) -> Result<VaultBlob> {
        let ciphertext = self
            .provider
            .get(&self.vault_key)
            .await?
            .ok_or_else(|| Error::NotFound("No vault has been created".to_string()))?;

        let plaintext = match decrypt(key.as_bytes(), &ciphertext) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(Error::AuthenticationFailure) => return Err(Error::WrongKey),
            Err(e) => return Err(e),
        };

        VaultBlob::from_bytes(&plaintext)
    }

    async fn persist(&self, blob: &VaultBlob, key: &MasterKey) -> Result<()> {
        let ciphertext = encrypt(key.as_bytes(), &blob.to_bytes()?)?;
        self.provider.put(&self.vault_key, ciphertext).await
    }

    /// Run one serialized decrypt-modify-encrypt cycle.
    ///
    /// `apply` works on a private copy; nothing is written unless it
    /// succeeds and the new ciphertext is produced.
    async fn mutate<T>(
        &self,
        key: &MasterKey,
        apply: impl FnOnce(&mut VaultBlob) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.writer.lock().await;
        let mut blob = self.load(key).await?;
        let outcome = apply(&mut blob)?;
        self.persist(&blob, key).await?;
        Ok(outcome)
    }

    /// Insert a new entry or replace an existing one with the same id.
    pub async fn upsert_entry(&self, entry: Entry, key: &MasterKey) -> Result<Entry> {
        let id = entry.id.clone();
        let stored = self
            .mutate(key, |blob| Ok(blob.upsert(entry, timestamp_now()).clone()))
            .await?;
        debug!(entry_id = %id, "Entry saved");
        Ok(stored)
    }

    /// Remove an entry. Removing an unknown id is a no-op.
    ///
    /// # Returns
    /// Whether an entry was removed.
    pub async fn delete_entry(&self, id: &EntryId, key: &MasterKey) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let mut blob = self.load(key).await?;
        if !blob.remove(id) {
            debug!(entry_id = %id, "Delete of unknown entry ignored");
            return Ok(false);
        }
        self.persist(&blob, key).await?;
        debug!(entry_id = %id, "Entry deleted");
        Ok(true)
    }

    /// Record an autofill use of an entry.
    ///
    /// # Errors
    /// - `Error::NotFound` if the entry does not exist
    pub async fn touch_entry(&self, id: &EntryId, key: &MasterKey) -> Result<Entry> {
        self.mutate(key, |blob| {
            blob.touch(id, timestamp_now())
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Entry not found: {}", id)))
        })
        .await
    }

    /// Replace the vault settings.
    pub async fn update_settings(&self, settings: Settings, key: &MasterKey) -> Result<()> {
        settings.validate()?;
        self.mutate(key, |blob| {
            blob.set_settings(settings, timestamp_now());
            Ok(())
        })
        .await
    }

    /// Produce an unencrypted, versioned export of all entries.
    ///
    /// The caller owns the risk of handling the plaintext document.
    pub async fn export_plaintext(&self, key: &MasterKey) -> Result<ExportDocument> {
        let blob = self.load(key).await?;
        let count = blob.len();
        let document = ExportDocument::new(blob.into_entries());
        warn!(entries = count, "Plaintext export produced");
        Ok(document)
    }

    /// Merge an export document into the vault.
    ///
    /// Entries whose id already exists are skipped; new ids are appended.
    ///
    /// # Errors
    /// - `Error::MalformedImport` if the document cannot be parsed
    pub async fn import_merge(&self, document: &str, key: &MasterKey) -> Result<ImportSummary> {
        let incoming = ExportDocument::parse_entries(document)?;
        let _guard = self.writer.lock().await;
        let mut blob = self.load(key).await?;
        let summary = blob.merge(incoming, timestamp_now());
        if summary.imported > 0 {
            self.persist(&blob, key).await?;
        }
        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            "Import merged"
        );
        Ok(summary)
    }

    /// Re-encrypt the vault under a key derived from `new_password`.
    ///
    /// The salt is left unchanged; only the key and the verification hash
    /// change.
    pub async fn rekey(
        &self,
        current_key: &MasterKey,
        new_password: Zeroizing<Vec<u8>>,
    ) -> Result<MasterKey> {
        if new_password.is_empty() {
            return Err(Error::InvalidInput("Password cannot be empty".to_string()));
        }

        let _guard = self.writer.lock().await;
        let record = self.salt_record().await?;
        let mut blob = self.load(current_key).await?;

        let new_hash = hash(&new_password, &record.salt);
        let new_key = derive_key_blocking(new_password, record.salt, record.kdf_params).await?;

        blob.set_master_password_hash(new_hash, timestamp_now());
        self.persist(&blob, &new_key).await?;

        info!("Vault re-encrypted under new master password");
        Ok(new_key)
    }

    /// Out-of-band check of a master password against the stored hash.
    ///
    /// Derives the key, opens the vault, and compares the salted hash.
    /// Returns `false` for a wrong password instead of an error.
    pub async fn verify_password(&self, password: Zeroizing<Vec<u8>>) -> Result<bool> {
        if password.is_empty() {
            return Ok(false);
        }
        let record = self.salt_record().await?;
        let candidate_hash_input = Zeroizing::new(password.to_vec());
        let key = derive_key_blocking(password, record.salt.clone(), record.kdf_params).await?;

        match self.load(&key).await {
            Ok(blob) => Ok(verify_hash(
                &candidate_hash_input,
                &record.salt,
                blob.master_password_hash(),
            )),
            Err(Error::WrongKey) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

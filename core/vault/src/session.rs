//! Vault session management.
//!
//! The session holds the derived master key in memory and authorizes every
//! vault operation. The key is zeroized when the session locks, whether by
//! explicit request, by the auto-lock timer, or on drop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::autolock::AutoLockTimer;
use crate::config::{Settings, FRESHNESS_WINDOW};
use crate::matcher;
use crate::mirror::{MirrorRecord, SessionMirror};
use crate::model::{timestamp_now, Entry, EntryInput, ExportDocument, ImportSummary};
use crate::store::{derive_key_blocking, VaultStore};
use keyward_common::{EntryId, Error, Result};
use keyward_crypto::{KdfParams, MasterKey};
use keyward_storage::StorageProvider;

/// Observable state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// No vault has been created.
    Uninitialized,
    /// A vault exists but no key is held.
    Locked,
    /// A key is held and the session is fresh.
    Unlocked,
    /// A key is held but the lock timeout has passed.
    Expired,
}

impl SessionStatus {
    pub fn is_locked(&self) -> bool {
        !matches!(self, SessionStatus::Unlocked)
    }
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// KDF parameters for newly created vaults.
    pub kdf_params: KdfParams,
    /// Maximum age of a session mirror accepted on restore.
    pub freshness_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kdf_params: KdfParams::default(),
            freshness_window: FRESHNESS_WINDOW,
        }
    }
}

struct SessionState {
    /// Master key (zeroized on drop).
    key: Option<MasterKey>,
    last_activity: Instant,
    lock_after: Option<Duration>,
    /// Bumped whenever the held key changes or is dropped.
    generation: u64,
}

impl SessionState {
    fn locked() -> Self {
        Self {
            key: None,
            last_activity: Instant::now(),
            lock_after: None,
            generation: 0,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.lock_after.map(|after| self.last_activity + after)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }
}

struct Inner {
    store: VaultStore,
    mirror: SessionMirror,
    config: SessionConfig,
    state: RwLock<SessionState>,
    /// Serializes mirror writes and clears.
    mirror_gate: Mutex<()>,
    timer: AutoLockTimer,
}

/// Owner of the live master key.
///
/// Constructed once by the host and shared by reference (or by cloning the
/// handle) with whatever dispatches commands.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Create a locked controller.
    ///
    /// `vault_provider` is the durable area holding the vault blob and salt
    /// record; `session_provider` is the ephemeral area for the mirror.
    pub fn new(
        vault_provider: Arc<dyn StorageProvider>,
        session_provider: Arc<dyn StorageProvider>,
        config: SessionConfig,
    ) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                store: VaultStore::new(vault_provider)?,
                mirror: SessionMirror::new(session_provider)?,
                config,
                state: RwLock::new(SessionState::locked()),
                mirror_gate: Mutex::new(()),
                timer: AutoLockTimer::new(),
            }),
        })
    }

    /// Create a controller and restore a recent session from the mirror.
    pub async fn restore(
        vault_provider: Arc<dyn StorageProvider>,
        session_provider: Arc<dyn StorageProvider>,
        config: SessionConfig,
    ) -> Result<Self> {
        let controller = Self::new(vault_provider, session_provider, config)?;
        controller.restore_from_mirror().await?;
        Ok(controller)
    }

    async fn restore_from_mirror(&self) -> Result<()> {
        let Some(record) = self.inner.mirror.load().await? else {
            return Ok(());
        };

        match self.check_mirror(&record).await? {
            Some((key, settings, idle)) => {
                let last_activity = Instant::now().checked_sub(idle).unwrap_or_else(Instant::now);
                self.install(key, &settings, last_activity).await;
                info!(idle_secs = idle.as_secs(), "Session restored");
            }
            None => {
                self.inner.mirror.clear().await?;
                debug!("Stale session mirror cleared");
            }
        }
        Ok(())
    }

    /// Validate a mirror record; `None` means it must not be restored.
    async fn check_mirror(
        &self,
        record: &MirrorRecord,
    ) -> Result<Option<(MasterKey, Settings, Duration)>> {
        let idle = match (Utc::now() - record.last_activity()).to_std() {
            Ok(idle) => idle,
            // Timestamp in the future: treat as just active.
            Err(_) => Duration::ZERO,
        };
        if idle >= self.inner.config.freshness_window {
            return Ok(None);
        }

        let Ok(key) = record.key() else {
            return Ok(None);
        };
        let blob = match self.inner.store.load(&key).await {
            Ok(blob) => blob,
            Err(Error::WrongKey) | Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let settings = blob.settings().clone();
        if settings.auto_lock_after().is_some_and(|after| idle >= after) {
            return Ok(None);
        }
        Ok(Some((key, settings, idle)))
    }

    /// Current session status.
    pub async fn status(&self) -> Result<SessionStatus> {
        {
            let state = self.inner.state.read().await;
            if state.key.is_some() {
                return Ok(if state.is_expired(Instant::now()) {
                    SessionStatus::Expired
                } else {
                    SessionStatus::Unlocked
                });
            }
        }
        if self.inner.store.exists().await? {
            Ok(SessionStatus::Locked)
        } else {
            Ok(SessionStatus::Uninitialized)
        }
    }

    /// Whether a vault has been persisted.
    pub async fn vault_exists(&self) -> Result<bool> {
        self.inner.store.exists().await
    }

    /// Create a vault and unlock the session under its key.
    pub async fn create_vault(&self, password: &str, settings: Settings) -> Result<()> {
        let (blob, key) = self
            .inner
            .store
            .create(secret(password), settings, self.inner.config.kdf_params)
            .await?;
        self.install(key, blob.settings(), Instant::now()).await;
        Ok(())
    }

    /// Unlock an existing vault.
    ///
    /// # Returns
    /// The decrypted entries.
    ///
    /// # Errors
    /// - `Error::NotFound` if no vault exists
    /// - `Error::WrongKey` if the password is wrong; the session stays locked
    pub async fn unlock(&self, password: &str) -> Result<Vec<Entry>> {
        let record = self.inner.store.salt_record().await?;
        let key = derive_key_blocking(secret(password), record.salt, record.kdf_params).await?;

        let blob = match self.inner.store.load(&key).await {
            Ok(blob) => blob,
            Err(Error::WrongKey) => {
                warn!("Unlock rejected: wrong master password");
                return Err(Error::WrongKey);
            }
            Err(e) => return Err(e),
        };

        self.install(key, blob.settings(), Instant::now()).await;
        Ok(blob.into_entries())
    }

    /// Lock the session, dropping the key and clearing the mirror.
    ///
    /// Locking an already locked session is a no-op.
    pub async fn lock(&self) -> Result<()> {
        let held = {
            let mut state = self.inner.state.write().await;
            state.lock_after = None;
            state.generation += 1;
            self.inner.timer.cancel();
            state.key.take()
        };
        clear_mirror(&self.inner).await?;
        if held.is_some() {
            info!("Session locked");
        }
        Ok(())
    }

    /// Entries for a site, or every entry when `url` is `None`.
    pub async fn get_entries(&self, url: Option<&str>) -> Result<Vec<Entry>> {
        let key = self.authorize().await?;
        let blob = self.inner.store.load(&key).await?;
        let entries = match url {
            Some(url) => matcher::entries_for_host(blob.entries(), url)
                .into_iter()
                .cloned()
                .collect(),
            None => blob.into_entries(),
        };
        self.record_activity(&key).await;
        Ok(entries)
    }

    /// Free-text search over the vault.
    pub async fn search(&self, query: &str) -> Result<Vec<Entry>> {
        let key = self.authorize().await?;
        let blob = self.inner.store.load(&key).await?;
        let hits = matcher::search(blob.entries(), query)
            .into_iter()
            .cloned()
            .collect();
        self.record_activity(&key).await;
        Ok(hits)
    }

    /// Insert or replace an entry.
    pub async fn save_entry(&self, input: EntryInput) -> Result<Entry> {
        let key = self.authorize().await?;
        let saved = self
            .inner
            .store
            .upsert_entry(input.into_entry(timestamp_now()), &key)
            .await?;
        self.record_activity(&key).await;
        Ok(saved)
    }

    /// Delete an entry; unknown ids are ignored.
    pub async fn delete_entry(&self, id: &EntryId) -> Result<bool> {
        let key = self.authorize().await?;
        let removed = self.inner.store.delete_entry(id, &key).await?;
        self.record_activity(&key).await;
        Ok(removed)
    }

    /// Return an entry's credentials for filling and record its use.
    pub async fn autofill(&self, id: &EntryId) -> Result<Entry> {
        let key = self.authorize().await?;
        let entry = self.inner.store.touch_entry(id, &key).await?;
        self.record_activity(&key).await;
        Ok(entry)
    }

    pub async fn export(&self) -> Result<ExportDocument> {
        let key = self.authorize().await?;
        let document = self.inner.store.export_plaintext(&key).await?;
        self.record_activity(&key).await;
        Ok(document)
    }

    pub async fn import(&self, document: &str) -> Result<ImportSummary> {
        let key = self.authorize().await?;
        let summary = self.inner.store.import_merge(document, &key).await?;
        self.record_activity(&key).await;
        Ok(summary)
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        let key = self.authorize().await?;
        let settings = self.inner.store.load(&key).await?.settings().clone();
        self.record_activity(&key).await;
        Ok(settings)
    }

    /// Replace the settings and re-arm the auto-lock timer.
    pub async fn update_settings(&self, settings: Settings) -> Result<()> {
        let key = self.authorize().await?;
        self.inner.store.update_settings(settings.clone(), &key).await?;
        {
            let mut state = self.inner.state.write().await;
            state.lock_after = settings.auto_lock_after();
            state.last_activity = Instant::now();
            self.arm_timer();
        }
        self.record_activity(&key).await;
        debug!(lock_timeout = settings.lock_timeout, "Settings updated");
        Ok(())
    }

    /// Change the master password.
    ///
    /// # Errors
    /// - `Error::WrongKey` if `current` is not the master password
    pub async fn change_password(&self, current: &str, new: &str) -> Result<()> {
        let key = self.authorize().await?;
        if !self.inner.store.verify_password(secret(current)).await? {
            warn!("Password change rejected: wrong current password");
            return Err(Error::WrongKey);
        }

        let new_key = self.inner.store.rekey(&key, secret(new)).await?;
        let generation = {
            let mut state = self.inner.state.write().await;
            if state.key.is_none() {
                debug!("Session locked during password change");
                return Ok(());
            }
            state.key = Some(new_key.clone());
            state.last_activity = Instant::now();
            state.generation += 1;
            state.generation
        };
        self.save_mirror(&MirrorRecord::new(&new_key, Utc::now()), generation)
            .await;
        Ok(())
    }

    /// Check a master password without touching the session.
    pub async fn verify_master_password(&self, password: &str) -> Result<bool> {
        self.inner.store.verify_password(secret(password)).await
    }

    /// Hold `key` as the live session key and arm auto-lock.
    async fn install(&self, key: MasterKey, settings: &Settings, last_activity: Instant) {
        let mirror = MirrorRecord::new(&key, wall_clock(last_activity));
        let generation = {
            let mut state = self.inner.state.write().await;
            state.key = Some(key);
            state.last_activity = last_activity;
            state.lock_after = settings.auto_lock_after();
            state.generation += 1;
            self.arm_timer();
            state.generation
        };
        self.save_mirror(&mirror, generation).await;
        info!("Session unlocked");
    }

    /// Check that the session is unlocked and return a copy of the key.
    ///
    /// An expired session is locked on the spot.
    async fn authorize(&self) -> Result<MasterKey> {
        {
            let state = self.inner.state.read().await;
            match &state.key {
                None => return Err(Error::Locked),
                Some(key) if !state.is_expired(Instant::now()) => return Ok(key.clone()),
                Some(_) => {}
            }
        }
        debug!("Session expired before the auto-lock task ran");
        self.lock().await?;
        Err(Error::Locked)
    }

    async fn record_activity(&self, key: &MasterKey) {
        let generation = {
            let mut state = self.inner.state.write().await;
            if state.key.is_none() {
                return;
            }
            state.last_activity = Instant::now();
            state.generation
        };
        self.save_mirror(&MirrorRecord::new(key, Utc::now()), generation)
            .await;
    }

    /// Write the mirror unless the key it was built from has since been
    /// dropped or replaced.
    async fn save_mirror(&self, record: &MirrorRecord, generation: u64) {
        let _gate = self.inner.mirror_gate.lock().await;
        if self.inner.state.read().await.generation != generation {
            debug!("Skipping stale session mirror write");
            return;
        }
        if let Err(e) = self.inner.mirror.save(record).await {
            warn!(error = %e, "Failed to persist session mirror");
        }
    }

    fn arm_timer(&self) {
        arm_auto_lock(&self.inner);
    }
}

/// Callers hold the state write lock, which orders every arm, cancel and
/// release of the timer. The task exits on its own if auto-lock is off.
fn arm_auto_lock(inner: &Arc<Inner>) {
    inner.timer.arm(run_auto_lock(Arc::downgrade(inner)));
}

/// Sleep until the inactivity deadline, re-checking after every wake-up.
async fn run_auto_lock(inner: Weak<Inner>) {
    loop {
        let deadline = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let state = inner.state.read().await;
            match (&state.key, state.deadline()) {
                (Some(_), Some(deadline)) => deadline,
                _ => return,
            }
        };

        tokio::time::sleep_until(deadline).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let held = {
            let mut state = inner.state.write().await;
            if state.key.is_none() {
                return;
            }
            if !state.is_expired(Instant::now()) {
                continue;
            }
            state.lock_after = None;
            state.generation += 1;
            inner.timer.release();
            state.key.take()
        };
        drop(held);
        if let Err(e) = clear_mirror(&inner).await {
            warn!(error = %e, "Failed to clear session mirror on auto-lock");
        }
        info!("Session auto-locked after inactivity");
        return;
    }
}

/// Clear the mirror once any in-flight write has finished.
///
/// Callers bump the state generation first, so writes queued behind the
/// gate are skipped.
async fn clear_mirror(inner: &Inner) -> Result<()> {
    let _gate = inner.mirror_gate.lock().await;
    inner.mirror.clear().await
}

fn wall_clock(at: Instant) -> DateTime<Utc> {
    let elapsed = Instant::now().saturating_duration_since(at);
    chrono::Duration::from_std(elapsed)
        .map(|elapsed| Utc::now() - elapsed)
        .unwrap_or_else(|_| Utc::now())
}

fn secret(password: &str) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(password.as_bytes().to_vec())
}

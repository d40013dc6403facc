//! Vault data model: entries, the decrypted vault blob and the export document.

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use zeroize::Zeroizing;

use crate::config::Settings;
use keyward_common::{EntryId, Error, Result};
use keyward_crypto::Salt;

/// Current export document version.
pub const EXPORT_VERSION: &str = "1.0";

/// Current time at the millisecond precision timestamps are stored with.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Timestamps never move backwards, even if the wall clock does.
fn advance(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    previous.max(now)
}

/// One stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub title: String,
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default,
        with = "ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_used: Option<DateTime<Utc>>,
}

/// Entry fields supplied by a caller when saving.
///
/// A missing `id` creates a new entry. Timestamps are owned by the vault
/// and any supplied by the caller are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInput {
    #[serde(default)]
    pub id: Option<EntryId>,
    pub title: String,
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
}

impl EntryInput {
    /// Build an entry, generating an id when none was supplied.
    pub fn into_entry(self, now: DateTime<Utc>) -> Entry {
        Entry {
            id: self.id.unwrap_or_else(EntryId::generate),
            title: self.title,
            url: self.url,
            username: self.username,
            password: self.password,
            notes: self.notes,
            tags: self.tags,
            is_favorite: self.is_favorite,
            created_at: now,
            updated_at: now,
            last_used: None,
        }
    }
}

/// Decrypted contents of the vault.
///
/// Entries keep insertion order for display; an id index beside them gives
/// O(1) lookups. The index is rebuilt after deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultBlob {
    entries: Vec<Entry>,
    master_password_hash: String,
    salt: Salt,
    settings: Settings,
    #[serde(with = "ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    index: HashMap<EntryId, usize>,
}

impl VaultBlob {
    /// Create an empty vault.
    pub fn new(master_password_hash: String, salt: Salt, settings: Settings) -> Self {
        let now = timestamp_now();
        Self {
            entries: Vec::new(),
            master_password_hash,
            salt,
            settings,
            created_at: now,
            updated_at: now,
            index: HashMap::new(),
        }
    }

    /// Serialize for encryption. The buffer is wiped when dropped.
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(serde_json::to_vec(self)?))
    }

    /// Deserialize decrypted bytes and rebuild the id index.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut blob: Self = serde_json::from_slice(bytes)?;
        blob.reindex();
        Ok(blob)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (position, entry) in self.entries.iter().enumerate() {
            self.index.entry(entry.id.clone()).or_insert(position);
        }
    }

    fn mark_updated(&mut self, now: DateTime<Utc>) {
        self.updated_at = advance(self.updated_at, now);
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Consume the blob, returning its entries.
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the vault holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &EntryId) -> Option<&Entry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    /// Whether an entry with this id exists.
    pub fn contains(&self, id: &EntryId) -> bool {
        self.index.contains_key(id)
    }

    /// Insert a new entry or replace the fields of an existing one.
    ///
    /// Replacing keeps the stored `createdAt` and `lastUsed` and bumps
    /// `updatedAt`.
    pub fn upsert(&mut self, mut entry: Entry, now: DateTime<Utc>) -> &Entry {
        let position = match self.index.get(&entry.id) {
            Some(&position) => {
                let existing = &self.entries[position];
                entry.created_at = existing.created_at;
                entry.last_used = existing.last_used;
                entry.updated_at = advance(existing.updated_at, now);
                self.entries[position] = entry;
                position
            }
            None => {
                let position = self.entries.len();
                self.index.insert(entry.id.clone(), position);
                self.entries.push(entry);
                position
            }
        };
        self.mark_updated(now);
        &self.entries[position]
    }

    /// Remove an entry by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: &EntryId) -> bool {
        let Some(position) = self.index.remove(id) else {
            return false;
        };
        self.entries.remove(position);
        self.reindex();
        self.mark_updated(timestamp_now());
        true
    }

    /// Record that an entry was used for autofill.
    pub fn touch(&mut self, id: &EntryId, now: DateTime<Utc>) -> Option<&Entry> {
        let position = *self.index.get(id)?;
        let entry = &mut self.entries[position];
        entry.last_used = Some(match entry.last_used {
            Some(previous) => advance(previous, now),
            None => now,
        });
        self.mark_updated(now);
        Some(&self.entries[position])
    }

    /// Append entries whose ids are not present yet.
    ///
    /// Known ids (and repeats within `incoming`) are skipped, never
    /// overwritten.
    pub fn merge(&mut self, incoming: Vec<Entry>, now: DateTime<Utc>) -> ImportSummary {
        let mut summary = ImportSummary::default();
        let mut seen = HashSet::new();

        for entry in incoming {
            if self.contains(&entry.id) || !seen.insert(entry.id.clone()) {
                summary.skipped += 1;
                continue;
            }
            self.index.insert(entry.id.clone(), self.entries.len());
            self.entries.push(entry);
            summary.imported += 1;
        }

        if summary.imported > 0 {
            self.mark_updated(now);
        }
        summary
    }

    /// Vault settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the vault settings.
    pub fn set_settings(&mut self, settings: Settings, now: DateTime<Utc>) {
        self.settings = settings;
        self.mark_updated(now);
    }

    /// Salted hash of the master password.
    pub fn master_password_hash(&self) -> &str {
        &self.master_password_hash
    }

    /// Replace the master password hash after a password change.
    pub fn set_master_password_hash(&mut self, hash: String, now: DateTime<Utc>) {
        self.master_password_hash = hash;
        self.mark_updated(now);
    }

    /// The vault salt.
    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification timestamp.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Plaintext export of the vault's entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub entries: Vec<Entry>,
    #[serde(with = "ts_milliseconds")]
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

#[derive(Deserialize)]
struct ImportDocument {
    entries: Vec<Entry>,
    #[serde(default)]
    version: Option<String>,
}

impl ExportDocument {
    /// Create an export of `entries` stamped with the current time.
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            exported_at: timestamp_now(),
            version: EXPORT_VERSION.to_string(),
        }
    }

    /// Pretty-printed JSON form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse the entries of an import document.
    ///
    /// Only `entries` is required; `version`, when present, must share the
    /// current major version.
    ///
    /// # Errors
    /// - `Error::MalformedImport` if the document is not valid JSON, lacks
    ///   `entries`, has malformed entries, or declares an unsupported version
    pub fn parse_entries(document: &str) -> Result<Vec<Entry>> {
        let parsed: ImportDocument =
            serde_json::from_str(document).map_err(|e| Error::MalformedImport(e.to_string()))?;

        if let Some(version) = parsed.version.as_deref() {
            let major = version.split('.').next().unwrap_or_default();
            let current_major = EXPORT_VERSION.split('.').next().unwrap_or_default();
            if major != current_major {
                return Err(Error::MalformedImport(format!(
                    "Unsupported export version: {}",
                    version
                )));
            }
        }

        Ok(parsed.entries)
    }
}

/// Outcome of an additive import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(id: &str, url: &str) -> Entry {
        EntryInput {
            id: Some(EntryId::new(id).unwrap()),
            title: format!("Title {}", id),
            url: url.to_string(),
            username: "alice".to_string(),
            password: "p@ss".to_string(),
            ..EntryInput::default()
        }
        .into_entry(timestamp_now())
    }

    fn blob() -> VaultBlob {
        VaultBlob::new("hash".to_string(), Salt::generate(), Settings::default())
    }

    #[test]
    fn test_input_without_id_gets_generated_id() {
        let input = EntryInput {
            title: "Example".to_string(),
            ..EntryInput::default()
        };
        let a = input.clone().into_entry(timestamp_now());
        let b = input.into_entry(timestamp_now());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_upsert_appends_then_replaces() {
        let mut vault = blob();
        let original = entry("1", "https://example.com");
        let created_at = original.created_at;
        vault.upsert(original.clone(), timestamp_now());
        assert_eq!(vault.len(), 1);

        let mut changed = original;
        changed.username = "bob".to_string();
        changed.created_at = created_at + Duration::days(3);
        let later = timestamp_now() + Duration::seconds(5);
        let stored = vault.upsert(changed, later).clone();

        assert_eq!(vault.len(), 1);
        assert_eq!(stored.username, "bob");
        assert_eq!(stored.created_at, created_at);
        assert_eq!(stored.updated_at, later);
        assert_eq!(vault.updated_at(), later);
    }

    #[test]
    fn test_get_by_id() {
        let mut vault = blob();
        vault.upsert(entry("a", "https://a.example"), timestamp_now());
        vault.upsert(entry("b", "https://b.example"), timestamp_now());

        let id = EntryId::new("b").unwrap();
        assert_eq!(vault.get(&id).unwrap().url, "https://b.example");
        assert!(vault.get(&EntryId::new("zzz").unwrap()).is_none());
    }

    #[test]
    fn test_remove_keeps_index_consistent() {
        let mut vault = blob();
        for id in ["a", "b", "c"] {
            vault.upsert(entry(id, "https://example.com"), timestamp_now());
        }

        assert!(vault.remove(&EntryId::new("a").unwrap()));
        assert!(!vault.remove(&EntryId::new("a").unwrap()));

        let c = EntryId::new("c").unwrap();
        assert_eq!(vault.get(&c).unwrap().id, c);
        assert_eq!(vault.len(), 2);
    }

    #[test]
    fn test_touch_sets_last_used_only() {
        let mut vault = blob();
        let original = entry("a", "https://example.com");
        vault.upsert(original.clone(), timestamp_now());

        let now = timestamp_now() + Duration::minutes(1);
        let touched = vault.touch(&original.id, now).unwrap().clone();

        assert_eq!(touched.last_used, Some(now));
        assert_eq!(touched.updated_at, original.updated_at);
        assert!(vault.touch(&EntryId::new("missing").unwrap(), now).is_none());
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let mut vault = blob();
        let before = vault.updated_at();
        vault.set_settings(Settings::default(), before - Duration::hours(1));
        assert_eq!(vault.updated_at(), before);
    }

    #[test]
    fn test_merge_is_additive() {
        let mut vault = blob();
        let existing = entry("known", "https://example.com");
        vault.upsert(existing.clone(), timestamp_now());

        let mut conflicting = existing.clone();
        conflicting.password = "overwritten?".to_string();

        let summary = vault.merge(
            vec![
                conflicting,
                entry("new-1", "https://one.example"),
                entry("new-2", "https://two.example"),
                entry("new-1", "https://dup.example"),
            ],
            timestamp_now(),
        );

        assert_eq!(summary, ImportSummary { imported: 2, skipped: 2 });
        assert_eq!(vault.len(), 3);
        assert_eq!(vault.get(&existing.id).unwrap().password, "p@ss");
        assert_eq!(
            vault.get(&EntryId::new("new-1").unwrap()).unwrap().url,
            "https://one.example"
        );
    }

    #[test]
    fn test_blob_bytes_roundtrip_rebuilds_index() {
        let mut vault = blob();
        vault.upsert(entry("a", "https://example.com"), timestamp_now());

        let bytes = vault.to_bytes().unwrap();
        let restored = VaultBlob::from_bytes(&bytes).unwrap();

        assert!(restored.contains(&EntryId::new("a").unwrap()));
        assert_eq!(restored.entries(), vault.entries());
        assert_eq!(restored.salt(), vault.salt());
    }

    #[test]
    fn test_blob_wire_format_uses_camel_case() {
        let vault = blob();
        let value: serde_json::Value = serde_json::from_slice(&vault.to_bytes().unwrap()).unwrap();
        assert!(value.get("masterPasswordHash").is_some());
        assert!(value.get("createdAt").unwrap().is_i64());
        assert!(value.get("index").is_none());
    }

    #[test]
    fn test_export_document_format() {
        let doc = ExportDocument::new(vec![entry("a", "https://example.com")]);
        let value: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();

        assert_eq!(value["version"], "1.0");
        assert!(value["exportedAt"].is_i64());
        assert_eq!(value["entries"][0]["id"], "a");
    }

    #[test]
    fn test_parse_entries_accepts_export() {
        let doc = ExportDocument::new(vec![entry("a", "https://example.com")]);
        let entries = ExportDocument::parse_entries(&doc.to_json().unwrap()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_parse_entries_rejects_malformed() {
        for doc in [
            "not json",
            "{}",
            r#"{"entries": [{"id": "x"}]}"#,
            r#"{"entries": [], "version": "2.0"}"#,
        ] {
            assert!(matches!(
                ExportDocument::parse_entries(doc),
                Err(Error::MalformedImport(_))
            ));
        }
    }
}

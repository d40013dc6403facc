//! Command contract for UI and content-script callers.
//!
//! Requests are JSON objects `{"type": "...", "data": {...}}`. Domain
//! failures are answered with `{success: false, error, code}`; only storage
//! faults are returned as `Err` from [`dispatch`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::Settings;
use crate::model::{Entry, EntryInput, ExportDocument};
use crate::session::{SessionController, SessionStatus};
use keyward_common::{EntryId, Error, ErrorCode, Result, SecretString};

/// A request addressed to the session controller.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    CreateVault {
        master_password: SecretString,
        #[serde(default)]
        settings: Option<Settings>,
    },
    UnlockVault {
        master_password: SecretString,
    },
    LockVault {},
    GetEntries {
        #[serde(default)]
        url: Option<String>,
    },
    SaveEntry {
        entry: EntryInput,
    },
    DeleteEntry {
        id: EntryId,
    },
    ExportData {},
    ImportData {
        import_data: String,
    },
    CheckLockStatus {},
    GetSettings {},
    UpdateSettings {
        settings: Settings,
    },
    AutoFill {
        entry_id: EntryId,
    },
    SearchEntries {
        #[serde(default)]
        query: String,
    },
    ChangePassword {
        current_password: SecretString,
        new_password: SecretString,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl Command {
    /// Parse a JSON request. A missing or `null` `data` is read as `{}`.
    ///
    /// # Errors
    /// - `Error::InvalidInput` for unknown types or malformed payloads
    pub fn parse(request: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(request)
            .map_err(|e| Error::InvalidInput(format!("Malformed command: {}", e)))?;
        let data = match envelope.data {
            Value::Null => Value::Object(Default::default()),
            data => data,
        };
        let kind = envelope.kind;
        serde_json::from_value(serde_json::json!({ "type": kind, "data": data }))
            .map_err(|e| Error::InvalidInput(format!("Invalid {} command: {}", kind, e)))
    }

    /// Wire name of the command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateVault { .. } => "CREATE_VAULT",
            Command::UnlockVault { .. } => "UNLOCK_VAULT",
            Command::LockVault {} => "LOCK_VAULT",
            Command::GetEntries { .. } => "GET_ENTRIES",
            Command::SaveEntry { .. } => "SAVE_ENTRY",
            Command::DeleteEntry { .. } => "DELETE_ENTRY",
            Command::ExportData {} => "EXPORT_DATA",
            Command::ImportData { .. } => "IMPORT_DATA",
            Command::CheckLockStatus {} => "CHECK_LOCK_STATUS",
            Command::GetSettings {} => "GET_SETTINGS",
            Command::UpdateSettings { .. } => "UPDATE_SETTINGS",
            Command::AutoFill { .. } => "AUTO_FILL",
            Command::SearchEntries { .. } => "SEARCH_ENTRIES",
            Command::ChangePassword { .. } => "CHANGE_PASSWORD",
        }
    }
}

/// `{success, error?, code?}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            code: None,
        }
    }

    pub fn failed(err: &Error) -> Self {
        Self {
            success: false,
            error: Some(user_message(err)),
            code: Some(err.code()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Unlocked {
    pub success: bool,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub locked: bool,
    pub vault_exists: bool,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub success: bool,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Imported {
    pub success: bool,
    pub imported: usize,
    pub skipped: usize,
}

/// Result of a dispatched command, serialized without a tag.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ack(Ack),
    Unlocked(Unlocked),
    Entries(Vec<Entry>),
    Document(ExportDocument),
    LockStatus(LockStatus),
    Settings(Settings),
    Credentials(Credentials),
    Imported(Imported),
}

impl Response {
    /// Whether the response reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Ack(ack) if !ack.success)
    }
}

fn user_message(err: &Error) -> String {
    match err {
        Error::WrongKey | Error::AuthenticationFailure => "Invalid master password".to_string(),
        Error::Locked => "Vault is locked".to_string(),
        other => other.to_string(),
    }
}

/// Execute a command against the session.
///
/// # Errors
/// Only storage faults (`Error::is_fault`) are returned as `Err`.
pub async fn dispatch(session: &SessionController, command: Command) -> Result<Response> {
    let name = command.name();
    match execute(session, command).await {
        Ok(response) => {
            debug!(command = name, "Command completed");
            Ok(response)
        }
        Err(e) if e.is_fault() => {
            error!(command = name, error = %e, "Command failed with storage fault");
            Err(e)
        }
        Err(e) => {
            debug!(command = name, code = ?e.code(), "Command rejected");
            Ok(Response::Ack(Ack::failed(&e)))
        }
    }
}

async fn execute(session: &SessionController, command: Command) -> Result<Response> {
    let response = match command {
        Command::CreateVault {
            master_password,
            settings,
        } => {
            session
                .create_vault(master_password.expose(), settings.unwrap_or_default())
                .await?;
            Response::Ack(Ack::ok())
        }
        Command::UnlockVault { master_password } => {
            let entries = session.unlock(master_password.expose()).await?;
            Response::Unlocked(Unlocked {
                success: true,
                entries,
            })
        }
        Command::LockVault {} => {
            session.lock().await?;
            Response::Ack(Ack::ok())
        }
        Command::GetEntries { url } => Response::Entries(session.get_entries(url.as_deref()).await?),
        Command::SaveEntry { entry } => {
            session.save_entry(entry).await?;
            Response::Ack(Ack::ok())
        }
        Command::DeleteEntry { id } => {
            session.delete_entry(&id).await?;
            Response::Ack(Ack::ok())
        }
        Command::ExportData {} => Response::Document(session.export().await?),
        Command::ImportData { import_data } => {
            let summary = session.import(&import_data).await?;
            Response::Imported(Imported {
                success: true,
                imported: summary.imported,
                skipped: summary.skipped,
            })
        }
        Command::CheckLockStatus {} => {
            let status = session.status().await?;
            Response::LockStatus(LockStatus {
                locked: status.is_locked(),
                vault_exists: status != SessionStatus::Uninitialized,
                status,
            })
        }
        Command::GetSettings {} => Response::Settings(session.get_settings().await?),
        Command::UpdateSettings { settings } => {
            session.update_settings(settings).await?;
            Response::Ack(Ack::ok())
        }
        Command::AutoFill { entry_id } => {
            let entry = session.autofill(&entry_id).await?;
            Response::Credentials(Credentials {
                success: true,
                username: entry.username.clone(),
                password: entry.password.clone(),
            })
        }
        Command::SearchEntries { query } => Response::Entries(session.search(&query).await?),
        Command::ChangePassword {
            current_password,
            new_password,
        } => {
            session
                .change_password(current_password.expose(), new_password.expose())
                .await?;
            Response::Ack(Ack::ok())
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use keyward_crypto::KdfParams;
    use keyward_storage::MemoryProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn session() -> SessionController {
        let config = SessionConfig {
            kdf_params: KdfParams {
                memory_cost: 1024,
                time_cost: 1,
                parallelism: 1,
            },
            ..SessionConfig::default()
        };
        SessionController::new(
            Arc::new(MemoryProvider::new()),
            Arc::new(MemoryProvider::new()),
            config,
        )
        .unwrap()
    }

    async fn send(session: &SessionController, request: Value) -> Value {
        let command = Command::parse(&request.to_string()).unwrap();
        let response = dispatch(session, command).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_parse_without_data() {
        assert!(matches!(
            Command::parse(r#"{"type":"LOCK_VAULT"}"#).unwrap(),
            Command::LockVault {}
        ));
        assert!(matches!(
            Command::parse(r#"{"type":"GET_ENTRIES","data":null}"#).unwrap(),
            Command::GetEntries { url: None }
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(matches!(
            Command::parse(r#"{"type":"SYNC_DATA"}"#),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(Command::parse("not json"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let command =
            Command::parse(r#"{"type":"UNLOCK_VAULT","data":{"masterPassword":"hunter2"}}"#)
                .unwrap();
        assert!(!format!("{:?}", command).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_full_command_flow() {
        let session = session();

        let status = send(&session, json!({"type": "CHECK_LOCK_STATUS"})).await;
        assert_eq!(status["locked"], true);
        assert_eq!(status["vaultExists"], false);

        let created = send(
            &session,
            json!({"type": "CREATE_VAULT", "data": {"masterPassword": "Tr0ub4dor&3"}}),
        )
        .await;
        assert_eq!(created, json!({"success": true}));

        let saved = send(
            &session,
            json!({"type": "SAVE_ENTRY", "data": {"entry": {
                "title": "Example",
                "url": "https://example.com",
                "username": "alice",
                "password": "p@ss"
            }}}),
        )
        .await;
        assert_eq!(saved["success"], true);

        let entries = send(
            &session,
            json!({"type": "GET_ENTRIES", "data": {"url": "https://example.com/login"}}),
        )
        .await;
        assert_eq!(entries.as_array().unwrap().len(), 1);
        let id = entries[0]["id"].as_str().unwrap().to_string();

        let filled = send(&session, json!({"type": "AUTO_FILL", "data": {"entryId": id}})).await;
        assert_eq!(filled["username"], "alice");
        assert_eq!(filled["password"], "p@ss");

        send(&session, json!({"type": "LOCK_VAULT"})).await;

        let unlocked = send(
            &session,
            json!({"type": "UNLOCK_VAULT", "data": {"masterPassword": "Tr0ub4dor&3"}}),
        )
        .await;
        assert_eq!(unlocked["success"], true);
        assert_eq!(unlocked["entries"][0]["title"], "Example");
        assert_eq!(unlocked["entries"][0]["password"], "p@ss");

        send(&session, json!({"type": "LOCK_VAULT"})).await;
        let rejected = send(
            &session,
            json!({"type": "UNLOCK_VAULT", "data": {"masterPassword": "wrong"}}),
        )
        .await;
        assert_eq!(rejected["success"], false);
        assert_eq!(rejected["code"], "WRONG_KEY");
    }

    #[tokio::test]
    async fn test_locked_operations_return_error_field() {
        let session = session();
        send(
            &session,
            json!({"type": "CREATE_VAULT", "data": {"masterPassword": "pw"}}),
        )
        .await;
        send(&session, json!({"type": "LOCK_VAULT"})).await;

        for request in [
            json!({"type": "GET_ENTRIES"}),
            json!({"type": "EXPORT_DATA"}),
            json!({"type": "GET_SETTINGS"}),
            json!({"type": "SEARCH_ENTRIES", "data": {"query": "x"}}),
            json!({"type": "DELETE_ENTRY", "data": {"id": "abc"}}),
        ] {
            let response = send(&session, request).await;
            assert_eq!(response["success"], false);
            assert_eq!(response["code"], "LOCKED");
            assert!(response["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_export_import_and_duplicate_create() {
        let session = session();
        send(
            &session,
            json!({"type": "CREATE_VAULT", "data": {"masterPassword": "pw"}}),
        )
        .await;

        let again = send(
            &session,
            json!({"type": "CREATE_VAULT", "data": {"masterPassword": "pw"}}),
        )
        .await;
        assert_eq!(again["code"], "ALREADY_EXISTS");

        let document = send(&session, json!({"type": "EXPORT_DATA"})).await;
        assert_eq!(document["version"], "1.0");
        assert!(document["entries"].as_array().unwrap().is_empty());

        let bad = send(
            &session,
            json!({"type": "IMPORT_DATA", "data": {"importData": "{}"}}),
        )
        .await;
        assert_eq!(bad["code"], "MALFORMED_IMPORT");

        let settings = send(&session, json!({"type": "GET_SETTINGS"})).await;
        assert_eq!(settings["lockTimeout"], 15);
    }

    #[tokio::test]
    async fn test_empty_entry_id_is_rejected() {
        let save = json!({
            "type": "SAVE_ENTRY",
            "data": {"entry": {"id": "", "title": "T", "url": "https://a.com", "username": "u", "password": "p"}}
        });
        assert!(matches!(
            Command::parse(&save.to_string()),
            Err(Error::InvalidInput(_))
        ));

        let session = session();
        send(
            &session,
            json!({"type": "CREATE_VAULT", "data": {"masterPassword": "pw"}}),
        )
        .await;
        let document = json!({
            "entries": [{
                "id": "",
                "title": "T",
                "url": "https://a.com",
                "username": "u",
                "password": "p",
                "createdAt": 0,
                "updatedAt": 0
            }],
            "version": "1.0"
        });
        let imported = send(
            &session,
            json!({"type": "IMPORT_DATA", "data": {"importData": document.to_string()}}),
        )
        .await;
        assert_eq!(imported["code"], "MALFORMED_IMPORT");
        assert!(session.get_entries(None).await.unwrap().is_empty());
    }
}

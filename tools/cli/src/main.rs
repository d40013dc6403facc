//! Keyward CLI - Command line interface for the credential vault.
//!
//! Every invocation restores the session from the mirror in the session
//! directory, so `unlock` in one invocation carries over to the next until
//! the vault locks or the mirror goes stale.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use keyward_common::{EntryId, Error};
use keyward_crypto::KdfParams;
use keyward_storage::{create_default_registry, ProviderRegistry, StorageProvider};
use keyward_vault::command::Ack;
use keyward_vault::{
    dispatch, Command, EntryInput, Response, SessionConfig, SessionController, Settings,
};

#[derive(Parser)]
#[command(name = "keyward")]
#[command(about = "Keyward - Encrypted credential vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the encrypted vault.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory holding the session mirror; should be cleared on logout.
    #[arg(long, global = true)]
    session_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault.
    Init {
        /// KDF strength: "interactive", "moderate", or "sensitive".
        #[arg(short, long, default_value = "moderate")]
        strength: String,

        /// Auto-lock timeout in minutes (0 disables auto-lock).
        #[arg(short, long)]
        lock_timeout: Option<u32>,
    },

    /// Unlock the vault.
    Unlock,

    /// Lock the vault and forget the session.
    Lock,

    /// Show lock status.
    Status,

    /// List entries, optionally only those for a site.
    List {
        /// Site URL to match by host.
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Search entries by title, URL, username or tag.
    Search {
        /// Search text.
        query: String,
    },

    /// Add or replace an entry. The entry password is prompted for.
    Add {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        url: String,

        #[arg(short = 'n', long)]
        username: String,

        /// Replace the entry with this id instead of creating one.
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Remove an entry.
    Remove {
        #[arg(short, long)]
        id: String,
    },

    /// Print the credentials of an entry.
    Show {
        #[arg(short, long)]
        id: String,
    },

    /// Write a plaintext export document.
    Export {
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge an export document into the vault.
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show or change settings.
    Settings {
        /// Auto-lock timeout in minutes (0 disables auto-lock).
        #[arg(short, long)]
        lock_timeout: Option<u32>,

        /// Turn auto-lock on or off.
        #[arg(long)]
        auto_lock: Option<bool>,
    },

    /// Change the master password.
    ChangePassword,

    /// Answer JSON commands, one per line, on stdin and stdout.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout carries command output only.
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let strength = match &cli.command {
        Commands::Init { strength, .. } => strength.as_str(),
        _ => "moderate",
    };
    let session = open_session(
        &data_dir(cli.data_dir)?,
        &session_dir(cli.session_dir),
        kdf_params(strength)?,
    )
    .await?;

    match cli.command {
        Commands::Init { lock_timeout, .. } => cmd_init(&session, lock_timeout).await,
        Commands::Unlock => cmd_unlock(&session).await,
        Commands::Lock => cmd_lock(&session).await,
        Commands::Status => cmd_status(&session).await,
        Commands::List { url } => cmd_list(&session, url.as_deref()).await,
        Commands::Search { query } => cmd_search(&session, &query).await,
        Commands::Add {
            title,
            url,
            username,
            id,
            notes,
            tags,
        } => {
            let id = id
                .map(EntryId::new)
                .transpose()
                .context("Invalid entry id")?;
            let input = EntryInput {
                id,
                title,
                url,
                username,
                notes,
                tags,
                ..EntryInput::default()
            };
            cmd_add(&session, input).await
        }
        Commands::Remove { id } => cmd_remove(&session, &id).await,
        Commands::Show { id } => cmd_show(&session, &id).await,
        Commands::Export { output } => cmd_export(&session, output.as_deref()).await,
        Commands::Import { input } => cmd_import(&session, &input).await,
        Commands::Settings {
            lock_timeout,
            auto_lock,
        } => cmd_settings(&session, lock_timeout, auto_lock).await,
        Commands::ChangePassword => cmd_change_password(&session).await,
        Commands::Serve => cmd_serve(&session).await,
    }
}

fn data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(dir) => Ok(dir),
        None => dirs::data_dir()
            .map(|dir| dir.join("keyward"))
            .context("No data directory found; pass --data-dir"),
    }
}

fn session_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("keyward-session")
    })
}

fn kdf_params(strength: &str) -> Result<KdfParams> {
    KdfParams::from_preset(strength)
        .with_context(|| format!("Invalid strength '{}'. Use: interactive, moderate, or sensitive", strength))
}

async fn open_session(
    data_dir: &Path,
    session_dir: &Path,
    kdf_params: KdfParams,
) -> Result<SessionController> {
    let registry = create_default_registry();
    let vault_provider = resolve_local(&registry, data_dir).context("Failed to open data directory")?;
    let session_provider =
        resolve_local(&registry, session_dir).context("Failed to open session directory")?;

    let config = SessionConfig {
        kdf_params,
        ..SessionConfig::default()
    };
    SessionController::restore(vault_provider, session_provider, config)
        .await
        .context("Failed to restore session")
}

fn resolve_local(
    registry: &ProviderRegistry,
    root: &Path,
) -> keyward_common::Result<Arc<dyn StorageProvider>> {
    registry.resolve("local", serde_json::json!({ "root": root }))
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

fn prompt_new_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;

    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }
    Ok(password)
}

fn locked_hint(err: Error) -> anyhow::Error {
    match err {
        Error::Locked => anyhow::anyhow!("Vault is locked. Run `keyward unlock` first."),
        Error::WrongKey => anyhow::anyhow!("Invalid master password"),
        other => anyhow::Error::new(other),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Create a new vault.
async fn cmd_init(session: &SessionController, lock_timeout: Option<u32>) -> Result<()> {
    let mut settings = Settings::default();
    if let Some(minutes) = lock_timeout {
        settings.lock_timeout = minutes;
    }

    let password = prompt_new_password("Enter master password: ")?;
    session
        .create_vault(&password, settings)
        .await
        .context("Failed to create vault")?;

    println!("Vault created and unlocked.");
    Ok(())
}

async fn cmd_unlock(session: &SessionController) -> Result<()> {
    let password = prompt_password("Enter master password: ")?;
    let entries = session.unlock(&password).await.map_err(locked_hint)?;
    println!("Vault unlocked ({} entries).", entries.len());
    Ok(())
}

async fn cmd_lock(session: &SessionController) -> Result<()> {
    session.lock().await.context("Failed to lock vault")?;
    println!("Vault locked.");
    Ok(())
}

async fn cmd_status(session: &SessionController) -> Result<()> {
    let status = session.status().await?;
    println!("{:?}", status);
    Ok(())
}

async fn cmd_list(session: &SessionController, url: Option<&str>) -> Result<()> {
    let entries = session.get_entries(url).await.map_err(locked_hint)?;
    if entries.is_empty() {
        println!("No entries.");
    }
    for entry in entries {
        println!("{}  {}  {}  {}", entry.id, entry.title, entry.username, entry.url);
    }
    Ok(())
}

async fn cmd_search(session: &SessionController, query: &str) -> Result<()> {
    let entries = session.search(query).await.map_err(locked_hint)?;
    for entry in entries {
        println!("{}  {}  {}  {}", entry.id, entry.title, entry.username, entry.url);
    }
    Ok(())
}

async fn cmd_add(session: &SessionController, mut input: EntryInput) -> Result<()> {
    let password = prompt_password("Entry password: ")?;
    input.password = password.to_string();

    let entry = session.save_entry(input).await.map_err(locked_hint)?;
    info!(entry_id = %entry.id, "Entry saved");
    println!("Saved {}", entry.id);
    Ok(())
}

async fn cmd_remove(session: &SessionController, id: &str) -> Result<()> {
    let id = EntryId::new(id).context("Invalid entry id")?;
    if session.delete_entry(&id).await.map_err(locked_hint)? {
        println!("Removed {}", id);
    } else {
        println!("No entry {}", id);
    }
    Ok(())
}

async fn cmd_show(session: &SessionController, id: &str) -> Result<()> {
    let id = EntryId::new(id).context("Invalid entry id")?;
    let entry = session.autofill(&id).await.map_err(locked_hint)?;
    println!("Username: {}", entry.username);
    println!("Password: {}", entry.password);
    Ok(())
}

async fn cmd_export(session: &SessionController, output: Option<&Path>) -> Result<()> {
    let document = session.export().await.map_err(locked_hint)?;
    let json = document.to_json()?;

    match output {
        Some(path) => {
            tokio::fs::write(path, json.as_bytes())
                .await
                .context("Failed to write export file")?;
            warn!(path = %path.display(), "Export file contains plaintext passwords");
            println!("Exported {} entries to {}", document.entries.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn cmd_import(session: &SessionController, input: &Path) -> Result<()> {
    let document = tokio::fs::read_to_string(input)
        .await
        .context("Failed to read import file")?;
    let summary = session.import(&document).await.map_err(locked_hint)?;
    println!(
        "Imported {} entries, skipped {} already present.",
        summary.imported, summary.skipped
    );
    Ok(())
}

async fn cmd_settings(
    session: &SessionController,
    lock_timeout: Option<u32>,
    auto_lock: Option<bool>,
) -> Result<()> {
    let mut settings = session.get_settings().await.map_err(locked_hint)?;

    if lock_timeout.is_some() || auto_lock.is_some() {
        if let Some(minutes) = lock_timeout {
            settings.lock_timeout = minutes;
        }
        if auto_lock.is_some() {
            settings.auto_lock_enabled = auto_lock;
        }
        session
            .update_settings(settings.clone())
            .await
            .map_err(locked_hint)?;
    }

    print_json(&settings)
}

async fn cmd_change_password(session: &SessionController) -> Result<()> {
    let current = prompt_password("Enter current password: ")?;
    let new = prompt_new_password("Enter new password: ")?;

    session
        .change_password(&current, &new)
        .await
        .map_err(locked_hint)?;

    println!("Password changed successfully!");
    Ok(())
}

/// JSON lines loop for hosts that drive the vault over a pipe.
async fn cmd_serve(session: &SessionController) -> Result<()> {
    info!("Serving commands on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match Command::parse(&line) {
            Ok(command) => match dispatch(session, command).await {
                Ok(response) => response,
                Err(e) => Response::Ack(Ack::failed(&e)),
            },
            Err(e) => Response::Ack(Ack::failed(&e)),
        };
        if response.is_failure() {
            warn!("Command answered with failure");
        }

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("Input closed, shutting down");
    Ok(())
}

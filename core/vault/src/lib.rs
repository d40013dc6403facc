//! Vault engine for Keyward.
//!
//! This module provides:
//! - The encrypted vault store and its persisted layout
//! - Host matching and search over entries
//! - Session handling with auto-lock and restart tolerance
//! - The JSON command contract used by UI callers
//!
//! # Architecture
//! The session controller sits between command dispatch and the vault store.
//! It alone holds the derived master key and hands it to the store per call.

pub mod autolock;
pub mod command;
pub mod config;
pub mod matcher;
mod mirror;
pub mod model;
pub mod session;
pub mod store;

pub use command::{dispatch, Command, Response};
pub use config::{GeneratorSettings, SaltRecord, Settings, VaultVersion};
pub use model::{Entry, EntryInput, ExportDocument, ImportSummary, VaultBlob};
pub use session::{SessionConfig, SessionController, SessionStatus};
pub use store::VaultStore;

//! Common utilities and types shared across Keyward modules.
//!
//! This module provides foundational types that are used throughout the codebase,
//! ensuring consistency and type safety.

pub mod error;
pub mod types;

pub use error::{Error, ErrorCode, Result};
pub use types::{EntryId, SecretString, StorageKey};

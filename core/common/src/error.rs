//! Common error types for Keyward.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for Keyward operations.
///
/// Domain outcomes (wrong password, locked session, duplicate vault, bad
/// import) are distinct variants so callers can map them to messages without
/// inspecting error text. Storage and I/O failures are the only faults.
#[derive(Debug, Error)]
pub enum Error {
    /// No vault (or requested record) has been persisted yet.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authenticated decryption failed: wrong key or tampered ciphertext.
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// The vault could not be opened with the supplied key.
    #[error("Invalid master password")]
    WrongKey,

    /// Operation attempted without an unlocked session.
    #[error("Vault is locked")]
    Locked,

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Import document failed to parse or lacks required fields.
    #[error("Malformed import: {0}")]
    MalformedImport(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error is an unexpected storage fault rather than a
    /// domain outcome.
    pub fn is_fault(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::AuthenticationFailure | Error::WrongKey => ErrorCode::WrongKey,
            Error::Locked => ErrorCode::Locked,
            Error::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Error::MalformedImport(_) => ErrorCode::MalformedImport,
            Error::InvalidInput(_) => ErrorCode::InvalidInput,
            Error::Crypto(_) | Error::Serialization(_) => ErrorCode::Internal,
            Error::Storage(_) | Error::Io(_) => ErrorCode::Storage,
        }
    }
}

/// Wire representation of an error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    WrongKey,
    Locked,
    AlreadyExists,
    MalformedImport,
    InvalidInput,
    Storage,
    Internal,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

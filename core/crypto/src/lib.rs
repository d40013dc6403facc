//! Cryptographic primitives for Keyward.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Salted verification hashes using BLAKE2b
//! - Secure key management with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time operations for sensitive comparisons
//! - The verification hash is never used as key material

pub mod aead;
pub mod hash;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, encrypt, NONCE_SIZE, TAG_SIZE};
pub use hash::{hash, verify_hash};
pub use kdf::{derive_key, KdfParams};
pub use keys::{MasterKey, Salt, KEY_LENGTH, SALT_LENGTH};

//! Salted verification hashes.
//!
//! These digests are fast by construction and only ever compared against a
//! stored value. Key material always comes from [`crate::derive_key`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use subtle::ConstantTimeEq;

use crate::keys::Salt;

const DOMAIN: &[u8] = b"keyward-verify-v1";

fn digest(value: &[u8], salt: &Salt) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(DOMAIN);
    hasher.update(salt.as_bytes());
    hasher.update(value);

    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Compute the base64-encoded salted digest of `value`.
pub fn hash(value: &[u8], salt: &Salt) -> String {
    STANDARD.encode(digest(value, salt))
}

/// Check `value` against a digest produced by [`hash`] in constant time.
///
/// Malformed `expected` strings never verify.
pub fn verify_hash(value: &[u8], salt: &Salt, expected: &str) -> bool {
    let Ok(expected) = STANDARD.decode(expected) else {
        return false;
    };
    let actual = digest(value, salt);
    expected.len() == actual.len() && bool::from(actual[..].ct_eq(&expected[..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SALT_LENGTH;

    #[test]
    fn test_hash_is_deterministic() {
        let salt = Salt::from_bytes([3u8; SALT_LENGTH]);
        assert_eq!(hash(b"value", &salt), hash(b"value", &salt));
    }

    #[test]
    fn test_hash_depends_on_salt() {
        let a = Salt::from_bytes([1u8; SALT_LENGTH]);
        let b = Salt::from_bytes([2u8; SALT_LENGTH]);
        assert_ne!(hash(b"value", &a), hash(b"value", &b));
    }

    #[test]
    fn test_verify_hash() {
        let salt = Salt::generate();
        let digest = hash(b"Tr0ub4dor&3", &salt);

        assert!(verify_hash(b"Tr0ub4dor&3", &salt, &digest));
        assert!(!verify_hash(b"wrong", &salt, &digest));
        assert!(!verify_hash(b"Tr0ub4dor&3", &salt, "%%%"));
        assert!(!verify_hash(b"Tr0ub4dor&3", &salt, ""));
    }
}

//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};

use crate::keys::KEY_LENGTH;
use keyward_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

fn check_key(key: &[u8]) -> Result<()> {
    if key.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        )));
    }
    Ok(())
}

/// Encrypt plaintext using XChaCha20-Poly1305.
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is freshly drawn from the OS RNG on every call
///
/// # Errors
/// - Returns error if key length is incorrect
/// - Returns error if encryption fails
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_key(key)?;

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// # Errors
/// - `Error::Crypto` if the key length is incorrect
/// - `Error::AuthenticationFailure` if the blob is truncated, was tampered
///   with, or was sealed under a different key. These cases are
///   deliberately indistinguishable.
pub fn decrypt(key: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
    check_key(key)?;

    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::AuthenticationFailure);
    }

    let (nonce_bytes, encrypted) = blob.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));

    cipher
        .decrypt(nonce, encrypted)
        .map_err(|_| Error::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Hello, World!";

        let ciphertext = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_size() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Test message";

        let ciphertext = encrypt(&key, plaintext).unwrap();

        assert_eq!(ciphertext.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_different_nonce_each_time() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Same plaintext";

        let ct1 = encrypt(&key, plaintext).unwrap();
        let ct2 = encrypt(&key, plaintext).unwrap();

        assert_ne!(&ct1[..NONCE_SIZE], &ct2[..NONCE_SIZE]);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_is_authentication_failure() {
        let key1 = [1u8; KEY_LENGTH];
        let key2 = [2u8; KEY_LENGTH];

        let ciphertext = encrypt(&key1, b"Secret data").unwrap();

        assert!(matches!(
            decrypt(&key2, &ciphertext),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [42u8; KEY_LENGTH];

        let mut ciphertext = encrypt(&key, b"Important data").unwrap();
        ciphertext[NONCE_SIZE + 5] ^= 0xFF;

        assert!(matches!(
            decrypt(&key, &ciphertext),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let key = [42u8; KEY_LENGTH];
        assert!(matches!(
            decrypt(&key, &[0u8; NONCE_SIZE]),
            Err(Error::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key = [0u8; 16];
        assert!(matches!(encrypt(&short_key, b"data"), Err(Error::Crypto(_))));
        assert!(matches!(decrypt(&short_key, &[0u8; 64]), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [42u8; KEY_LENGTH];

        let ciphertext = encrypt(&key, b"").unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();

        assert!(decrypted.is_empty());
    }

    proptest! {
        #[test]
        fn decrypt_inverts_encrypt(key in any::<[u8; KEY_LENGTH]>(), plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let sealed = encrypt(&key, &plaintext).unwrap();
            prop_assert_eq!(decrypt(&key, &sealed).unwrap(), plaintext);
        }
    }
}

//! Sealing of private-key material at rest.
//!
//! Layout of a sealed blob: `salt(16) ‖ nonce(24) ‖ ciphertext`. The
//! symmetric key is derived from the configured passphrase with Argon2id;
//! the cipher is XChaCha20-Poly1305, so a random nonce per seal is safe.

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;

use canopy_types::CatalogError;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], CatalogError> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| {
            CatalogError::UnableToGenerateSigningKey(format!("key derivation failed: {e}"))
        })?;
    Ok(key)
}

/// Encrypt private-key bytes under the passphrase.
pub fn seal_private_key(passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>, CatalogError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CatalogError::UnableToGenerateSigningKey(format!("seal failed: {e}")))?;

    let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a sealed blob under the passphrase.
pub fn open_private_key(passphrase: &str, blob: &[u8]) -> Result<Vec<u8>, CatalogError> {
    if blob.len() <= SALT_LEN + NONCE_LEN {
        return Err(CatalogError::UnableToGenerateSigningKey(
            "sealed key blob is truncated".to_string(),
        ));
    }
    let (salt, rest) = blob.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    let key = derive_key(passphrase, salt)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            CatalogError::UnableToGenerateSigningKey(
                "failed to decrypt signing key; wrong passphrase?".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let secret = b"very-private-der-bytes";
        let blob = seal_private_key("passw0rd", secret).unwrap();
        assert_ne!(&blob[SALT_LEN + NONCE_LEN..], secret.as_slice());
        let back = open_private_key("passw0rd", &blob).unwrap();
        assert_eq!(back, secret);
    }

    #[test]
    fn wrong_passphrase_fails_closed() {
        let blob = seal_private_key("right", b"material").unwrap();
        assert!(open_private_key("wrong", &blob).is_err());
    }

    #[test]
    fn sealing_twice_never_repeats() {
        let a = seal_private_key("pw", b"material").unwrap();
        let b = seal_private_key("pw", b"material").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn truncated_blobs_are_rejected() {
        assert!(open_private_key("pw", &[0u8; 10]).is_err());
    }
}

//! Cursor Codec: encodes an ordered vector of sort-key values into an
//! opaque, integrity-protected pagination cursor and decodes it back.
//!
//! Encoding is canonical JSON of a `Vec<SortValue>`, encrypted with
//! AES-256-GCM (a random 96-bit nonce prepended to the ciphertext), then
//! `base64::URL_SAFE_NO_PAD`. The codec never interprets the values; the
//! Services Layer is responsible for checking the decoded vector's arity and
//! types against the sort axes of the query that produced it.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::types::sort::SortValue;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cursor key must be 32 bytes once hashed")]
    BadKey,
    #[error("malformed base64")]
    Base64,
    #[error("ciphertext too short to contain a nonce")]
    Truncated,
    #[error("decryption failed")]
    Decrypt,
    #[error("cursor payload was not a valid sort-value vector")]
    Shape,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Derives a 256-bit AES key from the configured secret via SHA-256, so
/// operators may supply a passphrase of any length as `encryption_key`.
fn derive_key(secret: &SecretString) -> Key<Aes256Gcm> {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(secret.expose_secret().as_bytes());
    *Key::<Aes256Gcm>::from_slice(&digest)
}

/// Encodes a sort-value vector into an opaque cursor string.
pub fn encode(values: &[SortValue], secret: &SecretString) -> String {
    let key = derive_key(secret);
    let cipher = Aes256Gcm::new(&key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let plaintext = serde_json::to_vec(values).expect("sort values always serialise");
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_ref())
        .expect("encryption with a fixed-size key/nonce never fails");

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&ciphertext);

    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(blob)
}

/// Decodes a cursor string back into its sort-value vector. Any failure —
/// malformed base64, a truncated or tampered ciphertext, or a payload that
/// doesn't deserialise to `Vec<SortValue>` — is folded into a single opaque
/// [`Error::Shape`]-or-earlier variant; callers convert all of them to
/// `InvalidInput("invalid cursor")` and never see the intermediate cause.
pub fn decode(cursor: &str, secret: &SecretString) -> Result<Vec<SortValue>> {
    let blob = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| Error::Base64)?;

    if blob.len() < NONCE_LEN {
        return Err(Error::Truncated);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);

    let key = derive_key(secret);
    let cipher = Aes256Gcm::new(&key);
    let nonce = aes_gcm::Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::Decrypt)?;

    serde_json::from_slice(&plaintext).map_err(|_| Error::Shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key() -> SecretString {
        SecretString::new("a test encryption key, any length works".to_string())
    }

    #[test]
    fn round_trips_heterogeneous_vectors() {
        let values = vec![
            SortValue::Str("sunset".into()),
            SortValue::I64(42),
            SortValue::F64(0.875),
            SortValue::Bool(true),
            SortValue::Timestamp(Utc::now()),
        ];
        let cursor = encode(&values, &key());
        let decoded = decode(&cursor, &key()).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn empty_string_is_invalid() {
        assert!(decode("", &key()).is_err());
    }

    #[test]
    fn random_garbage_is_invalid() {
        assert!(decode("not-a-real-cursor-at-all-####", &key()).is_err());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let values = vec![SortValue::I64(1)];
        let cursor = encode(&values, &key());
        let other = SecretString::new("a completely different secret key material".to_string());
        assert!(decode(&cursor, &other).is_err());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let values = vec![SortValue::I64(7)];
        let cursor = encode(&values, &key());
        let mut bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&cursor)
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let tampered = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        assert!(decode(&tampered, &key()).is_err());
    }
}

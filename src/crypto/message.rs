//! # Message Cipher
//!
//! Per-message encryption for direct and group conversations.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  encrypt_direct()                                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. X25519 DH: sender_secret × recipient_public → shared_secret        │
//! │  2. HKDF: shared_secret → message key                                   │
//! │  3. AES-256-GCM: encrypt(key, fresh nonce, plaintext)                   │
//! │                                                                         │
//! │  The recipient computes recipient_secret × sender_public, which yields │
//! │  the same shared secret. Only the two key holders can produce a        │
//! │  ciphertext the other accepts, so the sender is implicitly             │
//! │  authenticated.                                                        │
//! │                                                                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  encrypt_group()                                                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  AES-256-GCM under the conversation's shared 32-byte group key.        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All functions are pure over the supplied key material. Malformed keys
//! produce `InvalidKey`; anything wrong with ciphertext or nonce produces
//! `DecryptionFailed`.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::encryption::{decrypt, encrypt, EncryptionKey, Nonce, KEY_SIZE};
use super::kdf::derive_direct_message_key;
use super::keys::{decode_public_key, IdentityKeyPair};
use super::{decode_b64, encode_b64};
use crate::error::{Error, Result};

const DIRECT_AAD: &[u8] = b"ahub-dm-v1";
const GROUP_AAD: &[u8] = b"ahub-group-v1";

/// Ciphertext and nonce of one encrypted message, both base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// AES-256-GCM ciphertext with tag
    pub ciphertext: String,
    /// 12-byte nonce
    pub nonce: String,
}

impl EncryptedPayload {
    fn from_parts(nonce: Nonce, ciphertext: Vec<u8>) -> Self {
        Self {
            ciphertext: encode_b64(&ciphertext),
            nonce: encode_b64(nonce.as_bytes()),
        }
    }
}

/// Encrypt a direct message from sender to recipient
pub fn encrypt_direct(
    plaintext: &str,
    sender_secret_key: &str,
    recipient_public_key: &str,
) -> Result<EncryptedPayload> {
    let key = direct_key(sender_secret_key, recipient_public_key)?;
    let (nonce, ciphertext) = encrypt(&key, plaintext.as_bytes(), DIRECT_AAD)?;
    Ok(EncryptedPayload::from_parts(nonce, ciphertext))
}

/// Decrypt a direct message received from `sender_public_key`
pub fn decrypt_direct(
    ciphertext: &str,
    nonce: &str,
    sender_public_key: &str,
    recipient_secret_key: &str,
) -> Result<String> {
    let key = direct_key(recipient_secret_key, sender_public_key)?;
    open(&key, ciphertext, nonce, DIRECT_AAD)
}

/// Encrypt a group message under the shared group key
pub fn encrypt_group(plaintext: &str, group_key: &str) -> Result<EncryptedPayload> {
    let key = group_key_from_base64(group_key)?;
    let (nonce, ciphertext) = encrypt(&key, plaintext.as_bytes(), GROUP_AAD)?;
    Ok(EncryptedPayload::from_parts(nonce, ciphertext))
}

/// Decrypt a group message with the shared group key
pub fn decrypt_group(ciphertext: &str, nonce: &str, group_key: &str) -> Result<String> {
    let key = group_key_from_base64(group_key)?;
    open(&key, ciphertext, nonce, GROUP_AAD)
}

/// Generate a new random group key (base64)
pub fn generate_group_key() -> Result<String> {
    let key = EncryptionKey::random()?;
    Ok(encode_b64(key.as_bytes()))
}

fn direct_key(our_secret_key: &str, their_public_key: &str) -> Result<EncryptionKey> {
    let ours = IdentityKeyPair::from_secret_base64(our_secret_key)?;
    let theirs = decode_public_key(their_public_key)?;
    let shared = ours.diffie_hellman(&theirs);
    derive_direct_message_key(&shared)
}

fn group_key_from_base64(group_key: &str) -> Result<EncryptionKey> {
    let bytes = Zeroizing::new(
        decode_b64(group_key)
            .map_err(|_| Error::InvalidKey("Group key is not valid base64".into()))?,
    );
    if bytes.len() != KEY_SIZE {
        return Err(Error::InvalidKey(format!(
            "Group key must be {} bytes, got {}",
            KEY_SIZE,
            bytes.len()
        )));
    }
    EncryptionKey::from_slice(&bytes)
}

fn open(key: &EncryptionKey, ciphertext: &str, nonce: &str, aad: &[u8]) -> Result<String> {
    let ciphertext = decode_b64(ciphertext)
        .map_err(|e| Error::DecryptionFailed(format!("Ciphertext is malformed: {}", e)))?;
    let nonce_bytes = decode_b64(nonce)
        .map_err(|e| Error::DecryptionFailed(format!("Nonce is malformed: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes)?;

    let plaintext = decrypt(key, &nonce, &ciphertext, aad)?;
    String::from_utf8(plaintext)
        .map_err(|_| Error::DecryptionFailed("Message plaintext is not UTF-8".into()))
}

// ============================================================================
// TESTS
// ============================================================================

//! # Cryptography Module
//!
//! All cryptographic primitives used by the key vault.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Identity Key Pair (X25519, 32-byte keys, base64 on the wire)          │
//! │         │                                                               │
//! │         ├──► Direct messages: X25519 DH → HKDF-SHA256 → AES-256-GCM    │
//! │         │                                                               │
//! │         └──► Backup: secret key encrypted under                        │
//! │              PBKDF2-HMAC-SHA256(password, salt) → AES-256-GCM          │
//! │                                                                         │
//! │  Group Key (32 random bytes per conversation + version)                │
//! │         │                                                               │
//! │         └──► Group messages: AES-256-GCM                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | X25519 | Key agreement for direct messages |
//! | AES-256-GCM | Authenticated encryption everywhere |
//! | HKDF-SHA256 | Message key from DH output |
//! | PBKDF2-HMAC-SHA256 | Backup key from password |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: secret keys and derived keys are zeroized on drop
//! 2. **Secure Random**: `OsRng` only; failure is `EntropyUnavailable`
//! 3. **No Nonce Reuse**: a fresh random nonce for every encryption

mod backup;
mod encryption;
mod kdf;
mod keys;
mod message;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub use backup::{create_key_backup, restore_from_backup, BackupCodec, EncryptedBackup};
pub use encryption::{
    decrypt, encrypt, random_bytes, EncryptionKey, Nonce, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use kdf::{
    compute_key_fingerprint, derive_direct_message_key, derive_password_key,
    DEFAULT_KDF_ITERATIONS, MIN_KDF_ITERATIONS, SALT_SIZE,
};
pub use keys::{decode_public_key, decode_secret_key, IdentityKeyPair, X25519_KEY_SIZE};
pub use message::{
    decrypt_direct, decrypt_group, encrypt_direct, encrypt_group, generate_group_key,
    EncryptedPayload,
};

/// Encode bytes as standard padded base64
pub(crate) fn encode_b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard padded base64
pub(crate) fn decode_b64(encoded: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}

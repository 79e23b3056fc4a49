//! # Key Derivation Functions
//!
//! Two derivations live here:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      KEY DERIVATION                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Backup key (password-based)                                            │
//! │  ───────────────────────────                                            │
//! │  PBKDF2-HMAC-SHA256(password, salt[16], iterations) → 32-byte AES key  │
//! │                                                                         │
//! │  Direct message key (shared-secret based)                               │
//! │  ────────────────────────────────────────                               │
//! │  X25519(our_secret, their_public) → dh_output                          │
//! │  HKDF-SHA256(salt = DIRECT_MESSAGE_SALT, ikm = dh_output,              │
//! │              info = "ahub-direct-message-v1") → 32-byte AES key        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Aspect | Design Choice |
//! |--------|---------------|
//! | Password KDF | PBKDF2-HMAC-SHA256, tunable iteration count |
//! | Shared-secret KDF | HKDF-SHA256 |
//! | Key Separation | Different `info` strings per purpose |
//! | Version String | "-v1" suffix for future algorithm upgrades |

use hkdf::Hkdf;
use hmac::Hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::encryption::{EncryptionKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Default PBKDF2 iteration count for key backups.
///
/// OWASP's 2023 recommendation for PBKDF2-HMAC-SHA256; a few hundred
/// milliseconds on a current phone.
pub const DEFAULT_KDF_ITERATIONS: u32 = 600_000;

/// Lowest iteration count accepted from configuration.
pub const MIN_KDF_ITERATIONS: u32 = 10_000;

/// Size of the backup salt in bytes (128 bits)
pub const SALT_SIZE: usize = 16;

/// Domain separation strings for HKDF
pub mod domain {
    /// Salt for direct message key derivation
    pub const DIRECT_MESSAGE_SALT: &[u8] = b"ahub-e2e";

    /// Info for direct message key derivation
    pub const DIRECT_MESSAGE: &[u8] = b"ahub-direct-message-v1";

    /// Prefix hashed into public key fingerprints
    pub const FINGERPRINT: &[u8] = b"ahub-key-fingerprint-v1";
}

/// Derive a 32-byte backup key from a password and salt
///
/// Deterministic for identical `(password, salt, iterations)`. CPU-bound;
/// async callers should run it on a blocking worker.
pub fn derive_password_key(password: &[u8], salt: &[u8], iterations: u32) -> Result<EncryptionKey> {
    if iterations == 0 {
        return Err(Error::KeyDerivationFailed(
            "PBKDF2 iteration count must be positive".into(),
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, iterations, key.as_mut())
        .map_err(|e| Error::KeyDerivationFailed(format!("PBKDF2 failed: {}", e)))?;

    Ok(EncryptionKey::from_bytes(*key))
}

/// Derive a direct message key from raw X25519 DH output
///
/// Both parties compute the same DH output, so both derive the same key.
pub fn derive_direct_message_key(dh_output: &[u8; 32]) -> Result<EncryptionKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(domain::DIRECT_MESSAGE_SALT), dh_output);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(domain::DIRECT_MESSAGE, key.as_mut())
        .map_err(|_| Error::KeyDerivationFailed("HKDF expansion failed".into()))?;

    Ok(EncryptionKey::from_bytes(*key))
}

/// Compute a short, human-comparable fingerprint of a public key
///
/// 16 bytes of SHA-256 over a domain prefix and the key, hex encoded and
/// grouped in fours (e.g. `3f2a 91c0 ...`).
pub fn compute_key_fingerprint(public_key: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain::FINGERPRINT);
    hasher.update(public_key);
    let digest = hasher.finalize();

    hex::encode(&digest[..16])
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

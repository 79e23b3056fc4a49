//! # Key Backup Codec
//!
//! Password-protected encryption of the identity secret key for storage on
//! the backend.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       BACKUP CREATION                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  salt  = 16 random bytes                                                │
//! │  key   = PBKDF2-HMAC-SHA256(password, salt, iterations)                 │
//! │  nonce = 12 random bytes                                                │
//! │  ct    = AES-256-GCM(key, nonce, private_key, aad = BACKUP_AAD)         │
//! │                                                                         │
//! │  EncryptedBackup { encrypted_private_key: b64(ct),                      │
//! │                    nonce: b64(nonce), salt: b64(salt) }                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A wrong password yields a different key, which fails the GCM tag check:
//! restore returns `DecryptionFailed` and never partial plaintext.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::encryption::{decrypt, encrypt, random_bytes, Nonce};
use super::kdf::{derive_password_key, DEFAULT_KDF_ITERATIONS, SALT_SIZE};
use super::{decode_b64, encode_b64};
use crate::error::{Error, Result};

/// Associated data binding a ciphertext to its purpose
const BACKUP_AAD: &[u8] = b"ahub-key-backup-v1";

/// Encrypted private key backup, as stored server-side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBackup {
    /// AES-256-GCM ciphertext with tag (base64)
    pub encrypted_private_key: String,
    /// 12-byte nonce (base64)
    pub nonce: String,
    /// 16-byte PBKDF2 salt (base64)
    pub salt: String,
}

/// Backup codec with a fixed PBKDF2 work factor
///
/// The iteration count must match between creation and restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupCodec {
    iterations: u32,
}

impl BackupCodec {
    /// Create a codec with the given PBKDF2 iteration count
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    /// The PBKDF2 iteration count
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Encrypt `private_key` under a key derived from `password`
    ///
    /// A fresh salt and nonce are drawn for every call. Empty passwords are
    /// accepted here; rejecting them is UI policy.
    pub fn create_key_backup(&self, private_key: &str, password: &str) -> Result<EncryptedBackup> {
        let salt = random_bytes::<SALT_SIZE>()?;
        let key = derive_password_key(password.as_bytes(), &salt, self.iterations)?;

        let (nonce, ciphertext) = encrypt(&key, private_key.as_bytes(), BACKUP_AAD)?;

        tracing::debug!(iterations = self.iterations, "Created key backup");

        Ok(EncryptedBackup {
            encrypted_private_key: encode_b64(&ciphertext),
            nonce: encode_b64(nonce.as_bytes()),
            salt: encode_b64(&salt),
        })
    }

    /// Recover the private key from a backup
    ///
    /// ## Errors
    ///
    /// `DecryptionFailed` for a wrong password, malformed fields or any
    /// tampering with ciphertext, nonce or salt.
    pub fn restore_from_backup(
        &self,
        backup: &EncryptedBackup,
        password: &str,
    ) -> Result<Zeroizing<String>> {
        let ciphertext = decode_field("encryptedPrivateKey", &backup.encrypted_private_key)?;
        let nonce = Nonce::from_slice(&decode_field("nonce", &backup.nonce)?)?;
        let salt = decode_field("salt", &backup.salt)?;

        let key = derive_password_key(password.as_bytes(), &salt, self.iterations)?;
        let plaintext = Zeroizing::new(decrypt(&key, &nonce, &ciphertext, BACKUP_AAD)?);

        let private_key = std::str::from_utf8(&plaintext)
            .map_err(|_| Error::DecryptionFailed("Backup plaintext is not UTF-8".into()))?;

        Ok(Zeroizing::new(private_key.to_owned()))
    }
}

impl Default for BackupCodec {
    fn default() -> Self {
        Self::new(DEFAULT_KDF_ITERATIONS)
    }
}

/// Create a backup with the default work factor
pub fn create_key_backup(private_key: &str, password: &str) -> Result<EncryptedBackup> {
    BackupCodec::default().create_key_backup(private_key, password)
}

/// Restore a backup created with the default work factor
pub fn restore_from_backup(backup: &EncryptedBackup, password: &str) -> Result<Zeroizing<String>> {
    BackupCodec::default().restore_from_backup(backup, password)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    decode_b64(value)
        .map_err(|e| Error::DecryptionFailed(format!("Backup field {} is malformed: {}", name, e)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::IdentityKeyPair;

    fn codec() -> BackupCodec {
        BackupCodec::new(1_000)
    }

    #[test]
    fn test_backup_round_trip() {
        let kp = IdentityKeyPair::generate().unwrap();
        let secret = kp.secret_key_base64();

        let backup = codec().create_key_backup(&secret, "Secret123").unwrap();
        let restored = codec().restore_from_backup(&backup, "Secret123").unwrap();

        assert_eq!(*restored, *secret);
    }

    #[test]
    fn test_round_trip_arbitrary_strings() {
        for (private_key, password) in [
            ("", ""),
            ("short", "pässwörd"),
            ("a much longer private key string with spaces", "🔑"),
        ] {
            let backup = codec().create_key_backup(private_key, password).unwrap();
            let restored = codec().restore_from_backup(&backup, password).unwrap();
            assert_eq!(restored.as_str(), private_key);
        }
    }

    #[test]
    fn test_wrong_password_fails_closed() {
        let backup = codec().create_key_backup("private", "correct").unwrap();

        let result = codec().restore_from_backup(&backup, "wrong");
        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_iteration_mismatch_fails() {
        let backup = BackupCodec::new(1_000).create_key_backup("private", "pw").unwrap();

        let result = BackupCodec::new(1_001).restore_from_backup(&backup, "pw");
        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_backup() {
        let b1 = codec().create_key_backup("private", "pw").unwrap();
        let b2 = codec().create_key_backup("private", "pw").unwrap();

        assert_ne!(b1.salt, b2.salt);
        assert_ne!(b1.nonce, b2.nonce);
        assert_ne!(b1.encrypted_private_key, b2.encrypted_private_key);

        assert_eq!(codec().restore_from_backup(&b1, "pw").unwrap().as_str(), "private");
        assert_eq!(codec().restore_from_backup(&b2, "pw").unwrap().as_str(), "private");
    }

    #[test]
    fn test_field_sizes() {
        let backup = codec().create_key_backup("private", "pw").unwrap();

        assert_eq!(decode_b64(&backup.salt).unwrap().len(), SALT_SIZE);
        assert_eq!(decode_b64(&backup.nonce).unwrap().len(), 12);
    }

    #[test]
    fn test_tampered_fields_fail() {
        let backup = codec().create_key_backup("private", "pw").unwrap();

        let flip = |field: &str| {
            let mut bytes = decode_b64(field).unwrap();
            bytes[0] ^= 0x01;
            encode_b64(&bytes)
        };

        let tampered = [
            EncryptedBackup {
                encrypted_private_key: flip(&backup.encrypted_private_key),
                ..backup.clone()
            },
            EncryptedBackup {
                nonce: flip(&backup.nonce),
                ..backup.clone()
            },
            EncryptedBackup {
                salt: flip(&backup.salt),
                ..backup.clone()
            },
        ];

        for bad in tampered {
            assert!(matches!(
                codec().restore_from_backup(&bad, "pw"),
                Err(Error::DecryptionFailed(_))
            ));
        }
    }

    #[test]
    fn test_malformed_fields_fail() {
        let backup = codec().create_key_backup("private", "pw").unwrap();

        let bad_base64 = EncryptedBackup {
            nonce: "***".into(),
            ..backup.clone()
        };
        let short_nonce = EncryptedBackup {
            nonce: encode_b64(&[0u8; 8]),
            ..backup
        };

        assert!(matches!(
            codec().restore_from_backup(&bad_base64, "pw"),
            Err(Error::DecryptionFailed(_))
        ));
        assert!(matches!(
            codec().restore_from_backup(&short_nonce, "pw"),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_serde_field_names() {
        let backup = codec().create_key_backup("private", "pw").unwrap();
        let json = serde_json::to_value(&backup).unwrap();

        assert!(json.get("encryptedPrivateKey").is_some());
        assert!(json.get("nonce").is_some());
        assert!(json.get("salt").is_some());
    }
}

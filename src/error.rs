//! # Error Handling
//!
//! Error types for the key vault.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Configuration Errors                                              │
//! │  │   └── InvalidConfig         - Rejected configuration value          │
//! │  │                                                                      │
//! │  ├── Key Errors                                                        │
//! │  │   ├── NoLocalKeys           - No identity key pair on this device   │
//! │  │   ├── NoBackupAvailable     - Server holds no key backup            │
//! │  │   ├── InvalidKey            - Invalid key format/length             │
//! │  │   └── KeyDerivationFailed   - KDF failure                           │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── EncryptionFailed      - Encryption operation failed           │
//! │  │   ├── DecryptionFailed      - Authentication check failed           │
//! │  │   └── EntropyUnavailable    - OS random source failed               │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   └── StorageUnavailable    - Secure storage read/write failed      │
//! │  │                                                                      │
//! │  ├── Network Errors                                                    │
//! │  │   └── NetworkError          - Backend request failed                │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── SerializationError                                            │
//! │      └── Internal                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Absence of a key is never an error: `KeyStore` getters return
//! `Ok(None)` for a missing key and `Err(StorageUnavailable)` only when the
//! storage backend itself misbehaves.

use thiserror::Error;

/// Result type alias for key vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the key vault
///
/// Every variant is a distinct, inspectable kind so UI code can tell a wrong
/// password apart from a missing backup or an unreachable server.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors (100-199)
    // ========================================================================

    /// A configuration value was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Key Errors (200-299)
    // ========================================================================

    /// No identity key pair exists on this device
    #[error("No encryption keys on this device. Generate or restore keys first.")]
    NoLocalKeys,

    /// Restore was attempted but the server has no backup record
    #[error("No key backup is available for this account.")]
    NoBackupAvailable,

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authenticated decryption failed (wrong key/password, tampering)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// The secure random source could not produce entropy
    #[error("Secure random number generator unavailable")]
    EntropyUnavailable,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Secure storage could not be read or written
    #[error("Cannot access secure storage: {0}")]
    StorageUnavailable(String),

    // ========================================================================
    // Network Errors (500-599)
    // ========================================================================

    /// Backend request failed
    #[error("Network error: {0}")]
    NetworkError(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Configuration
    /// - 200-299: Keys
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 500-599: Network
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_) => 100,

            Error::NoLocalKeys => 200,
            Error::NoBackupAvailable => 201,
            Error::InvalidKey(_) => 202,
            Error::KeyDerivationFailed(_) => 203,

            Error::EncryptionFailed(_) => 300,
            Error::DecryptionFailed(_) => 301,
            Error::EntropyUnavailable => 302,

            Error::StorageUnavailable(_) => 400,

            Error::NetworkError(_) => 500,

            Error::SerializationError(_) => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can potentially be resolved by retrying
    /// or by user action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NetworkError(_) | Error::DecryptionFailed(_) | Error::NoBackupAvailable
        )
    }

    /// Check if this error requires user action
    ///
    /// `DecryptionFailed` during restore means "re-enter password";
    /// `NoBackupAvailable` and `NoLocalKeys` mean "generate new keys".
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::DecryptionFailed(_) | Error::NoBackupAvailable | Error::NoLocalKeys
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // A body that does not parse is a contract fault, not a transient one
        if err.is_decode() {
            Error::SerializationError(err.to_string())
        } else {
            Error::NetworkError(err.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Background task failed: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidConfig("test".into()).code(), 100);
        assert_eq!(Error::NoLocalKeys.code(), 200);
        assert_eq!(Error::NoBackupAvailable.code(), 201);
        assert_eq!(Error::DecryptionFailed("test".into()).code(), 301);
        assert_eq!(Error::EntropyUnavailable.code(), 302);
        assert_eq!(Error::StorageUnavailable("test".into()).code(), 400);
        assert_eq!(Error::NetworkError("test".into()).code(), 500);
        assert_eq!(Error::Internal("test".into()).code(), 901);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::NetworkError("timeout".into()).is_recoverable());
        assert!(Error::DecryptionFailed("bad tag".into()).is_recoverable());
        assert!(!Error::EntropyUnavailable.is_recoverable());
        assert!(!Error::StorageUnavailable("keychain locked".into()).is_recoverable());
    }

    #[test]
    fn test_wrong_password_and_missing_backup_are_distinct() {
        let wrong_password = Error::DecryptionFailed("tag mismatch".into());
        let no_backup = Error::NoBackupAvailable;

        assert_ne!(wrong_password.code(), no_backup.code());
        assert!(wrong_password.requires_user_action());
        assert!(no_backup.requires_user_action());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(err.to_string().contains("denied"));
    }
}

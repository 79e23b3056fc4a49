//! # A-hub Key Vault
//!
//! End-to-end encryption key management for A-hub messaging: identity key
//! pairs, password-protected key backups, direct and group message
//! encryption, and backend synchronisation of public keys and backups.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KEY VAULT MODULES                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                         Sync                                     │   │
//! │  │  - ensure_keys / enable_backup / fetch_and_restore               │   │
//! │  │  - KeyBackupApi (HTTP: /user/encryption-keys, /user/{id}/...)    │   │
//! │  └──────────────┬──────────────────────────────────┬────────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────┐   ┌───────────────▼───────────────┐    │
//! │  │          Storage            │   │            Crypto             │    │
//! │  │                             │   │                               │    │
//! │  │ - KeyStore (identity,       │──►│ - X25519 key pairs            │    │
//! │  │   group keys, key cache)    │   │ - Backup (PBKDF2 + AES-GCM)   │    │
//! │  │ - Keychain / files / memory │   │ - Direct + group messages     │    │
//! │  └─────────────────────────────┘   └───────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Runtime configuration from the environment
//! - [`crypto`] - Key pairs, backup codec, message cipher
//! - [`storage`] - Secure storage capability and the key store
//! - [`sync`] - Backend publication and restore of keys
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Private keys never leave the device in plaintext                      │
//! │  ─────────────────────────────────────────────────                      │
//! │  The backend only ever sees the public key and, if the user opts in,  │
//! │  the secret key encrypted under a password-derived key.                │
//! │                                                                         │
//! │  Backups fail closed                                                   │
//! │  ───────────────────                                                    │
//! │  A wrong password or a modified backup is rejected by the GCM tag;     │
//! │  no partially decrypted key is ever returned or stored.                │
//! │                                                                         │
//! │  Secrets live in platform secure storage                               │
//! │  ───────────────────────────────────────                                │
//! │  Keychain on Apple platforms, owner-only files elsewhere.              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use ahub_keyvault::{KeyVault, VaultConfig};
//!
//! let vault = KeyVault::from_config(&VaultConfig::from_env()?, Some(token))?;
//! let identity = vault.ensure_keys().await?;
//! vault.enable_backup("correct horse battery staple").await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod sync;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::VaultConfig;
pub use crypto::{BackupCodec, EncryptedBackup, EncryptedPayload, IdentityKeyPair};
pub use error::{Error, Result};
pub use storage::{InMemoryStorage, KeyStore, PlatformSecureStorage, SecureStorage};
pub use sync::{HttpKeyBackupApi, KeyBackupApi, KeyBackupSync, KeyState};

use std::sync::Arc;

// ============================================================================
// KEY VAULT
// ============================================================================

/// Key backup sync wired to the HTTP backend and platform secure storage
pub type KeyVault = KeyBackupSync<HttpKeyBackupApi>;

impl KeyVault {
    /// Build a vault from configuration
    ///
    /// `auth_token` is sent as a bearer token on every backend request.
    pub fn from_config(config: &VaultConfig, auth_token: Option<String>) -> Result<Self> {
        config.validate()?;

        tracing::info!("Initializing A-hub key vault v{}", version());

        let storage = PlatformSecureStorage::from_config(config)?;
        let api = HttpKeyBackupApi::from_config(config, auth_token)?;

        Ok(KeyBackupSync::new(
            api,
            Arc::new(KeyStore::new(Arc::new(storage))),
            BackupCodec::new(config.kdf_iterations),
        ))
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of the key vault
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        #[cfg(target_os = "ios")]
        target: "ios",
        #[cfg(target_os = "android")]
        target: "android",
        #[cfg(target_os = "macos")]
        target: "macos",
        #[cfg(target_os = "linux")]
        target: "linux",
        #[cfg(target_os = "windows")]
        target: "windows",
        #[cfg(not(any(
            target_os = "ios",
            target_os = "android",
            target_os = "macos",
            target_os = "linux",
            target_os = "windows"
        )))]
        target: "unknown",
        secure_storage: if cfg!(any(target_os = "ios", target_os = "macos")) {
            "keychain"
        } else {
            "file"
        },
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target OS
    pub target: &'static str,
    /// Secure storage backend compiled in
    pub secure_storage: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

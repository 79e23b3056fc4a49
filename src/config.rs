//! Key vault configuration.
//!
//! Reads backend and key-derivation settings from environment variables,
//! falling back to defaults suitable for production.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::{DEFAULT_KDF_ITERATIONS, MIN_KDF_ITERATIONS};
use crate::error::{Error, Result};

/// Default keychain service name on Apple platforms.
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.ahub.e2e";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Configuration for the key vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Base URL of the A-hub API (e.g. `https://api.ahub.app`).
    pub api_base_url: String,

    /// PBKDF2 iteration count for key backups.
    ///
    /// Backups can only be restored with the same count they were created
    /// with, so every client of one backend must agree on this value.
    pub kdf_iterations: u32,

    /// Keychain service name (iOS/macOS).
    pub keychain_service: String,

    /// Directory for file-backed secure storage on non-Apple platforms.
    pub key_dir: Option<PathBuf>,

    /// HTTP request timeout in seconds.
    pub http_timeout_secs: u64,
}

impl VaultConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `AHUB_API_URL` | `api_base_url` |
    /// | `AHUB_KDF_ITERATIONS` | `kdf_iterations` |
    /// | `AHUB_KEYCHAIN_SERVICE` | `keychain_service` |
    /// | `AHUB_KEY_DIR` | `key_dir` |
    /// | `AHUB_HTTP_TIMEOUT_SECS` | `http_timeout_secs` |
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let kdf_iterations = match env::var("AHUB_KDF_ITERATIONS") {
            Ok(raw) => raw.parse().map_err(|_| {
                Error::InvalidConfig(format!("AHUB_KDF_ITERATIONS is not a number: {}", raw))
            })?,
            Err(_) => defaults.kdf_iterations,
        };

        let http_timeout_secs = match env::var("AHUB_HTTP_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().map_err(|_| {
                Error::InvalidConfig(format!("AHUB_HTTP_TIMEOUT_SECS is not a number: {}", raw))
            })?,
            Err(_) => defaults.http_timeout_secs,
        };

        let config = Self {
            api_base_url: env::var("AHUB_API_URL").unwrap_or(defaults.api_base_url),
            kdf_iterations,
            keychain_service: env::var("AHUB_KEYCHAIN_SERVICE")
                .unwrap_or(defaults.keychain_service),
            key_dir: env::var("AHUB_KEY_DIR").ok().map(PathBuf::from),
            http_timeout_secs,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the vault insecure or unusable.
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.is_empty() {
            return Err(Error::InvalidConfig("api_base_url must not be empty".into()));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(Error::InvalidConfig(format!(
                "api_base_url must be an http(s) URL: {}",
                self.api_base_url
            )));
        }
        if self.kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(Error::InvalidConfig(format!(
                "kdf_iterations must be at least {}",
                MIN_KDF_ITERATIONS
            )));
        }
        if self.keychain_service.is_empty() {
            return Err(Error::InvalidConfig("keychain_service must not be empty".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::InvalidConfig("http_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// HTTP request timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            key_dir: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

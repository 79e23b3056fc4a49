//! # Key Backup Sync
//!
//! Publishes the identity public key and encrypted backup to the backend,
//! and restores local keys from a fetched backup.
//!
//! ## Key Lifecycle (per device)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY STATE MACHINE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │            ensure_keys()                   enable_backup()              │
//! │  ┌────────┐ (generate) ┌───────────────┐  (publish) ┌──────────┐        │
//! │  │ NoKeys │───────────►│ LocalKeysOnly │───────────►│ BackedUp │        │
//! │  └────────┘            └───────────────┘            └──────────┘        │
//! │      │  ▲                     ▲   │                       │             │
//! │      │  │      reset()        │   │                       │             │
//! │      │  └─────────────────────┼───┴───────────────────────┘             │
//! │      │                        │                                         │
//! │      └────────────────────────┘                                         │
//! │        fetch_and_restore(password)                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A usable key pair only ever comes from generation or a successful
//! restore. No retries happen here: network failures surface as
//! `NetworkError` and the caller decides.

mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{decode_public_key, BackupCodec, EncryptedBackup, IdentityKeyPair};
use crate::error::{Error, Result};
use crate::storage::KeyStore;

pub use http::HttpKeyBackupApi;

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Body of `PATCH /user/encryption-keys`
///
/// Sending only `public_key` publishes the identity without a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKeysUpdate {
    /// Identity public key (base64)
    pub public_key: String,
    /// Encrypted private key (base64)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<String>,
    /// Backup nonce (base64)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key_nonce: Option<String>,
    /// Backup PBKDF2 salt (base64)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key_salt: Option<String>,
}

impl EncryptionKeysUpdate {
    /// Publish only the public key
    pub fn public_key_only(public_key: &str) -> Self {
        Self {
            public_key: public_key.to_string(),
            encrypted_private_key: None,
            encrypted_private_key_nonce: None,
            encryption_key_salt: None,
        }
    }

    /// Publish the public key together with a backup
    pub fn with_backup(public_key: &str, backup: &EncryptedBackup) -> Self {
        Self {
            public_key: public_key.to_string(),
            encrypted_private_key: Some(backup.encrypted_private_key.clone()),
            encrypted_private_key_nonce: Some(backup.nonce.clone()),
            encryption_key_salt: Some(backup.salt.clone()),
        }
    }
}

/// The user's key fields as returned by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncryptionKeysRecord {
    /// Identity public key (base64)
    pub public_key: Option<String>,
    /// Encrypted private key (base64)
    pub encrypted_private_key: Option<String>,
    /// Backup nonce (base64)
    pub encrypted_private_key_nonce: Option<String>,
    /// Backup PBKDF2 salt (base64)
    pub encryption_key_salt: Option<String>,
}

impl EncryptionKeysRecord {
    /// Split into `(public_key, backup)`, `None` unless every field is set
    pub fn into_backup(self) -> Option<(String, EncryptedBackup)> {
        let present = |field: Option<String>| field.filter(|value| !value.is_empty());

        Some((
            present(self.public_key)?,
            EncryptedBackup {
                encrypted_private_key: present(self.encrypted_private_key)?,
                nonce: present(self.encrypted_private_key_nonce)?,
                salt: present(self.encryption_key_salt)?,
            },
        ))
    }
}

// ============================================================================
// BACKEND SEAM
// ============================================================================

/// Backend operations the sync layer depends on
#[async_trait]
pub trait KeyBackupApi: Send + Sync {
    /// Publish the public key and, optionally, backup fields
    async fn update_encryption_keys(&self, update: &EncryptionKeysUpdate) -> Result<()>;

    /// Fetch the current user's key fields
    async fn fetch_encryption_keys(&self) -> Result<EncryptionKeysRecord>;

    /// Fetch another user's public key, `None` if they have not published one
    async fn fetch_user_public_key(&self, user_id: &str) -> Result<Option<String>>;
}

// ============================================================================
// ORCHESTRATION
// ============================================================================

/// Key lifecycle state of this device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    /// No identity key pair stored
    NoKeys,
    /// Key pair stored, no backup published from this device
    LocalKeysOnly,
    /// Key pair stored and its backup published
    BackedUp,
}

/// Drives key publication, backup and restore against the backend
pub struct KeyBackupSync<A> {
    api: A,
    store: Arc<KeyStore>,
    codec: BackupCodec,
}

impl<A: KeyBackupApi> KeyBackupSync<A> {
    /// Create the orchestrator
    pub fn new(api: A, store: Arc<KeyStore>, codec: BackupCodec) -> Self {
        Self { api, store, codec }
    }

    /// The underlying key store
    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    /// The backend client
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Current lifecycle state
    pub fn state(&self) -> Result<KeyState> {
        if !self.store.has_encryption_keys()? {
            return Ok(KeyState::NoKeys);
        }
        if self.store.is_backup_published()? {
            Ok(KeyState::BackedUp)
        } else {
            Ok(KeyState::LocalKeysOnly)
        }
    }

    /// Send the public key to the backend
    pub async fn publish_public_key(&self, public_key: &str) -> Result<()> {
        self.api
            .update_encryption_keys(&EncryptionKeysUpdate::public_key_only(public_key))
            .await?;
        tracing::info!("Published identity public key");
        Ok(())
    }

    /// Send backup fields alongside the local public key
    ///
    /// Replaces any backup the backend already holds.
    pub async fn publish_backup(&self, backup: &EncryptedBackup) -> Result<()> {
        let public_key = self.store.get_public_key()?.ok_or(Error::NoLocalKeys)?;

        self.api
            .update_encryption_keys(&EncryptionKeysUpdate::with_backup(&public_key, backup))
            .await?;
        self.store.mark_backup_published()?;

        tracing::info!("Published encrypted key backup");
        Ok(())
    }

    /// Load the local key pair, or generate one, then publish its public key
    ///
    /// Publishing is repeated on every call; the backend treats an unchanged
    /// key as a no-op.
    pub async fn ensure_keys(&self) -> Result<IdentityKeyPair> {
        let pair = match self.store.get_key_pair()? {
            Some(pair) => pair,
            None => {
                tracing::info!("No local encryption keys, generating a new pair");
                self.store.generate_and_save_key_pair()?
            }
        };

        self.publish_public_key(&pair.public_key_base64()).await?;
        Ok(pair)
    }

    /// Encrypt the local secret key with `password` and publish the backup
    pub async fn enable_backup(&self, password: &str) -> Result<EncryptedBackup> {
        let secret = self.store.get_private_key()?.ok_or(Error::NoLocalKeys)?;
        let password = Zeroizing::new(password.to_owned());
        let codec = self.codec;

        let backup = tokio::task::spawn_blocking(move || {
            codec.create_key_backup(&secret, &password)
        })
        .await??;

        self.publish_backup(&backup).await?;
        Ok(backup)
    }

    /// Fetch the backup, decrypt it with `password` and store the key pair
    ///
    /// ## Errors
    ///
    /// - `NoBackupAvailable` if the backend lacks any backup field
    /// - `DecryptionFailed` for a wrong password or damaged backup
    /// - `InvalidKey` if the recovered secret does not match the public key
    /// - `NetworkError` if the fetch fails
    pub async fn fetch_and_restore(&self, password: &str) -> Result<IdentityKeyPair> {
        let record = self.api.fetch_encryption_keys().await?;
        let (public_key, backup) = record.into_backup().ok_or_else(|| {
            tracing::warn!("Restore requested but backend has no key backup");
            Error::NoBackupAvailable
        })?;

        let password = Zeroizing::new(password.to_owned());
        let codec = self.codec;
        let secret = tokio::task::spawn_blocking(move || {
            codec.restore_from_backup(&backup, &password)
        })
        .await??;

        let pair = IdentityKeyPair::from_secret_base64(&secret)?;
        if !pair.matches_public_key(&public_key) {
            return Err(Error::InvalidKey(
                "Restored secret key does not match the published public key".into(),
            ));
        }

        self.store.save_key_pair(&public_key, &secret)?;
        tracing::info!("Restored identity key pair from backup");
        Ok(pair)
    }

    /// Public key of another user, from cache or the backend
    ///
    /// Fetched keys are validated and cached; `None` if the user has not
    /// published a key.
    pub async fn public_key_for(&self, user_id: &str) -> Result<Option<String>> {
        if let Some(cached) = self.store.get_cached_public_key(user_id) {
            return Ok(Some(cached));
        }

        let fetched = self.api.fetch_user_public_key(user_id).await?;
        if let Some(ref public_key) = fetched {
            decode_public_key(public_key)?;
            self.store.set_cached_public_key(user_id, public_key);
        }
        Ok(fetched)
    }

    /// Forget all local key material (logout / key reset)
    pub fn reset(&self) -> Result<()> {
        self.store.clear_encryption_keys()?;
        self.store.clear_public_key_cache();
        tracing::info!("Reset local encryption state");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend double that keeps one user's record in memory
    #[derive(Default)]
    struct StubApi {
        record: Mutex<EncryptionKeysRecord>,
        directory: Mutex<std::collections::HashMap<String, String>>,
        offline: bool,
        directory_lookups: AtomicUsize,
    }

    impl StubApi {
        fn offline() -> Self {
            Self {
                offline: true,
                ..Self::default()
            }
        }

        fn check_online(&self) -> Result<()> {
            if self.offline {
                Err(Error::NetworkError("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl KeyBackupApi for StubApi {
        async fn update_encryption_keys(&self, update: &EncryptionKeysUpdate) -> Result<()> {
            self.check_online()?;
            let mut record = self.record.lock();
            record.public_key = Some(update.public_key.clone());
            if update.encrypted_private_key.is_some() {
                record.encrypted_private_key = update.encrypted_private_key.clone();
                record.encrypted_private_key_nonce = update.encrypted_private_key_nonce.clone();
                record.encryption_key_salt = update.encryption_key_salt.clone();
            }
            Ok(())
        }

        async fn fetch_encryption_keys(&self) -> Result<EncryptionKeysRecord> {
            self.check_online()?;
            Ok(self.record.lock().clone())
        }

        async fn fetch_user_public_key(&self, user_id: &str) -> Result<Option<String>> {
            self.check_online()?;
            self.directory_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.directory.lock().get(user_id).cloned())
        }
    }

    fn sync_with(api: StubApi) -> KeyBackupSync<StubApi> {
        KeyBackupSync::new(
            api,
            Arc::new(KeyStore::new(Arc::new(InMemoryStorage::new()))),
            BackupCodec::new(1_000),
        )
    }

    #[tokio::test]
    async fn test_ensure_keys_generates_once_and_publishes() {
        let sync = sync_with(StubApi::default());
        assert_eq!(sync.state().unwrap(), KeyState::NoKeys);

        let first = sync.ensure_keys().await.unwrap();
        let second = sync.ensure_keys().await.unwrap();

        assert_eq!(first.public_bytes(), second.public_bytes());
        assert_eq!(sync.state().unwrap(), KeyState::LocalKeysOnly);
        assert_eq!(
            sync.api().record.lock().public_key.as_deref(),
            Some(first.public_key_base64().as_str())
        );
        assert!(sync.api().record.lock().encrypted_private_key.is_none());
    }

    #[tokio::test]
    async fn test_enable_backup_moves_to_backed_up() {
        let sync = sync_with(StubApi::default());
        sync.ensure_keys().await.unwrap();

        let backup = sync.enable_backup("Secret123").await.unwrap();

        assert_eq!(sync.state().unwrap(), KeyState::BackedUp);
        let record = sync.api().record.lock().clone();
        assert_eq!(record.encrypted_private_key.unwrap(), backup.encrypted_private_key);
        assert_eq!(record.encrypted_private_key_nonce.unwrap(), backup.nonce);
        assert_eq!(record.encryption_key_salt.unwrap(), backup.salt);
    }

    #[tokio::test]
    async fn test_enable_backup_without_keys() {
        let sync = sync_with(StubApi::default());

        let result = sync.enable_backup("pw").await;
        assert!(matches!(result, Err(Error::NoLocalKeys)));
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let api = StubApi::default();
        let old_device = sync_with(api);
        let original = old_device.ensure_keys().await.unwrap();
        old_device.enable_backup("Secret123").await.unwrap();

        // Same backend, empty key store
        let record = old_device.api().record.lock().clone();
        let new_device = sync_with(StubApi {
            record: Mutex::new(record),
            ..StubApi::default()
        });
        assert_eq!(new_device.state().unwrap(), KeyState::NoKeys);

        let restored = new_device.fetch_and_restore("Secret123").await.unwrap();

        assert_eq!(restored.public_bytes(), original.public_bytes());
        assert_eq!(
            *new_device.store().get_private_key().unwrap().unwrap(),
            *original.secret_key_base64()
        );
        assert_eq!(new_device.state().unwrap(), KeyState::LocalKeysOnly);
    }

    #[tokio::test]
    async fn test_restore_wrong_password() {
        let sync = sync_with(StubApi::default());
        sync.ensure_keys().await.unwrap();
        sync.enable_backup("correct").await.unwrap();
        sync.reset().unwrap();

        let result = sync.fetch_and_restore("wrong").await;

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
        assert_eq!(sync.state().unwrap(), KeyState::NoKeys);
    }

    #[tokio::test]
    async fn test_restore_without_backup() {
        let sync = sync_with(StubApi::default());
        sync.ensure_keys().await.unwrap();
        sync.reset().unwrap();

        let result = sync.fetch_and_restore("pw").await;
        assert!(matches!(result, Err(Error::NoBackupAvailable)));
    }

    #[tokio::test]
    async fn test_restore_rejects_mismatched_public_key() {
        let sync = sync_with(StubApi::default());
        sync.ensure_keys().await.unwrap();
        sync.enable_backup("pw").await.unwrap();
        sync.reset().unwrap();

        let stranger = IdentityKeyPair::generate().unwrap();
        sync.api().record.lock().public_key = Some(stranger.public_key_base64());

        let result = sync.fetch_and_restore("pw").await;
        assert!(matches!(result, Err(Error::InvalidKey(_))));
        assert!(!sync.store().has_encryption_keys().unwrap());
    }

    #[tokio::test]
    async fn test_network_errors_propagate() {
        let sync = sync_with(StubApi::offline());

        assert!(matches!(
            sync.publish_public_key("pk").await,
            Err(Error::NetworkError(_))
        ));
        assert!(matches!(
            sync.fetch_and_restore("pw").await,
            Err(Error::NetworkError(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_backup_requires_local_public_key() {
        let sync = sync_with(StubApi::default());
        let backup = BackupCodec::new(1_000).create_key_backup("sk", "pw").unwrap();

        let result = sync.publish_backup(&backup).await;
        assert!(matches!(result, Err(Error::NoLocalKeys)));
    }

    #[tokio::test]
    async fn test_public_key_lookup_is_cached() {
        let peer = IdentityKeyPair::generate().unwrap();
        let api = StubApi::default();
        api.directory
            .lock()
            .insert("user-42".into(), peer.public_key_base64());
        let sync = sync_with(api);

        let first = sync.public_key_for("user-42").await.unwrap();
        let second = sync.public_key_for("user-42").await.unwrap();
        let missing = sync.public_key_for("user-7").await.unwrap();

        assert_eq!(first.as_deref(), Some(peer.public_key_base64().as_str()));
        assert_eq!(first, second);
        assert!(missing.is_none());
        assert_eq!(sync.api().directory_lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_keys_and_cache() {
        let sync = sync_with(StubApi::default());
        sync.ensure_keys().await.unwrap();
        sync.store().set_cached_public_key("u", "pk");

        sync.reset().unwrap();

        assert_eq!(sync.state().unwrap(), KeyState::NoKeys);
        assert!(sync.store().get_cached_public_key("u").is_none());
    }

    #[test]
    fn test_record_requires_every_backup_field() {
        let full = EncryptionKeysRecord {
            public_key: Some("pk".into()),
            encrypted_private_key: Some("ct".into()),
            encrypted_private_key_nonce: Some("n".into()),
            encryption_key_salt: Some("s".into()),
        };
        assert!(full.clone().into_backup().is_some());

        let no_salt = EncryptionKeysRecord {
            encryption_key_salt: None,
            ..full.clone()
        };
        let empty_nonce = EncryptionKeysRecord {
            encrypted_private_key_nonce: Some(String::new()),
            ..full
        };
        assert!(no_salt.into_backup().is_none());
        assert!(empty_nonce.into_backup().is_none());
    }

    #[test]
    fn test_update_serialization() {
        let only_key = serde_json::to_value(EncryptionKeysUpdate::public_key_only("pk")).unwrap();
        assert_eq!(only_key, serde_json::json!({ "publicKey": "pk" }));

        let backup = EncryptedBackup {
            encrypted_private_key: "ct".into(),
            nonce: "n".into(),
            salt: "s".into(),
        };
        let full = serde_json::to_value(EncryptionKeysUpdate::with_backup("pk", &backup)).unwrap();
        assert_eq!(
            full,
            serde_json::json!({
                "publicKey": "pk",
                "encryptedPrivateKey": "ct",
                "encryptedPrivateKeyNonce": "n",
                "encryptionKeySalt": "s",
            })
        );
    }

    #[test]
    fn test_record_deserializes_nulls_and_missing_fields() {
        let record: EncryptionKeysRecord =
            serde_json::from_str(r#"{"publicKey": "pk", "encryptedPrivateKey": null}"#).unwrap();

        assert_eq!(record.public_key.as_deref(), Some("pk"));
        assert!(record.encrypted_private_key.is_none());
        assert!(record.encryption_key_salt.is_none());
    }
}

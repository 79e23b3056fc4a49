//! # Key Store
//!
//! Identity key pair, group keys and the public-key cache on top of a
//! [`SecureStorage`] backend.
//!
//! ## Storage Layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `ahub.e2e.identity` | JSON record: public key, secret key (base64), backup marker |
//! | `ahub.e2e.group_key.{conversation_id}_v{version}` | group key (base64) |
//!
//! Both halves of the identity live in one entry, so a single `store` call
//! replaces the pair and a failed write leaves the previous pair intact.
//!
//! The public-key cache never touches storage; it lives and dies with the
//! `KeyStore` instance.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::secure_store::SecureStorage;
use crate::crypto::{generate_group_key, IdentityKeyPair};
use crate::error::{Error, Result};

/// Default group key version
pub const DEFAULT_GROUP_KEY_VERSION: u32 = 1;

/// Key names for secure storage
pub mod keys {
    /// Identity key pair record
    pub const IDENTITY: &str = "ahub.e2e.identity";

    /// Prefix for group keys
    pub const GROUP_KEY_PREFIX: &str = "ahub.e2e.group_key.";

    /// Composite identifier for a group key
    pub fn group_key(conversation_id: &str, version: u32) -> String {
        format!("{}{}_v{}", GROUP_KEY_PREFIX, conversation_id, version)
    }
}

/// Persisted identity slot
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct StoredIdentity {
    public_key: String,
    secret_key: String,
    /// Set once a backup of this identity has been published from here
    #[serde(default)]
    backup_published: bool,
}

/// Secure key store for one user on one device
///
/// Construct one per session and share it by reference (or `Arc`).
pub struct KeyStore {
    storage: Arc<dyn SecureStorage>,
    /// Serializes writers of the identity slot against readers of the pair
    identity_lock: RwLock<()>,
    public_key_cache: RwLock<HashMap<String, String>>,
}

impl KeyStore {
    /// Create a key store over the given backend
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            storage,
            identity_lock: RwLock::new(()),
            public_key_cache: RwLock::new(HashMap::new()),
        }
    }

    // ========================================================================
    // IDENTITY KEYS
    // ========================================================================

    /// True iff an identity key pair is present
    pub fn has_encryption_keys(&self) -> Result<bool> {
        let _guard = self.identity_lock.read();
        self.storage.exists(keys::IDENTITY)
    }

    /// The identity secret key, `None` if absent
    pub fn get_private_key(&self) -> Result<Option<Zeroizing<String>>> {
        let _guard = self.identity_lock.read();
        Ok(self
            .read_identity()?
            .map(|identity| Zeroizing::new(identity.secret_key.clone())))
    }

    /// The identity public key, `None` if absent
    pub fn get_public_key(&self) -> Result<Option<String>> {
        let _guard = self.identity_lock.read();
        Ok(self
            .read_identity()?
            .map(|identity| identity.public_key.clone()))
    }

    /// Both halves of the identity key pair, checked against each other
    pub fn get_key_pair(&self) -> Result<Option<IdentityKeyPair>> {
        let _guard = self.identity_lock.read();

        let identity = match self.read_identity()? {
            Some(identity) => identity,
            None => return Ok(None),
        };

        let pair = IdentityKeyPair::from_secret_base64(&identity.secret_key).map_err(|_| {
            Error::StorageUnavailable("Stored secret key is malformed".into())
        })?;
        if !pair.matches_public_key(&identity.public_key) {
            return Err(Error::StorageUnavailable(
                "Stored public key does not match secret key".into(),
            ));
        }
        Ok(Some(pair))
    }

    /// Overwrite the identity key pair
    ///
    /// One storage write; on failure the previous pair is still in place.
    /// A new identity starts without a published backup.
    pub fn save_key_pair(&self, public_key: &str, secret_key: &str) -> Result<()> {
        let _guard = self.identity_lock.write();

        self.write_identity(&StoredIdentity {
            public_key: public_key.to_string(),
            secret_key: secret_key.to_string(),
            backup_published: false,
        })?;

        tracing::info!("Saved identity key pair");
        Ok(())
    }

    /// Generate a fresh key pair and persist it
    pub fn generate_and_save_key_pair(&self) -> Result<IdentityKeyPair> {
        let pair = IdentityKeyPair::generate()?;
        self.save_key_pair(&pair.public_key_base64(), &pair.secret_key_base64())?;
        Ok(pair)
    }

    /// Delete the identity key pair; no-op if already absent
    pub fn clear_encryption_keys(&self) -> Result<()> {
        let _guard = self.identity_lock.write();

        self.storage.delete(keys::IDENTITY)?;

        tracing::info!("Cleared identity key pair");
        Ok(())
    }

    /// Whether a backup of the current identity was published from here
    pub fn is_backup_published(&self) -> Result<bool> {
        let _guard = self.identity_lock.read();
        Ok(self
            .read_identity()?
            .map_or(false, |identity| identity.backup_published))
    }

    /// Record that a backup of the current identity was published
    ///
    /// Fails with `NoLocalKeys` if there is no identity to mark.
    pub fn mark_backup_published(&self) -> Result<()> {
        let _guard = self.identity_lock.write();

        let mut identity = self.read_identity()?.ok_or(Error::NoLocalKeys)?;
        identity.backup_published = true;
        self.write_identity(&identity)
    }

    // ========================================================================
    // GROUP KEYS
    // ========================================================================

    /// Group key for a conversation version, `None` if absent
    pub fn get_group_key(
        &self,
        conversation_id: &str,
        version: u32,
    ) -> Result<Option<Zeroizing<String>>> {
        self.read_string(&keys::group_key(conversation_id, version))
    }

    /// Store a group key for a conversation version
    pub fn save_group_key(&self, conversation_id: &str, key: &str, version: u32) -> Result<()> {
        self.storage
            .store(&keys::group_key(conversation_id, version), key.as_bytes())?;
        tracing::debug!(conversation_id, version, "Saved group key");
        Ok(())
    }

    /// Delete a group key; no-op if absent
    pub fn delete_group_key(&self, conversation_id: &str, version: u32) -> Result<()> {
        self.storage
            .delete(&keys::group_key(conversation_id, version))?;
        tracing::debug!(conversation_id, version, "Deleted group key");
        Ok(())
    }

    /// Replace `from_version` with a freshly generated key at `from_version + 1`
    ///
    /// Returns the new version and key. The old key is deleted only after
    /// the new one is stored.
    pub fn rotate_group_key(
        &self,
        conversation_id: &str,
        from_version: u32,
    ) -> Result<(u32, String)> {
        let next_version = from_version
            .checked_add(1)
            .ok_or_else(|| Error::InvalidKey("Group key version overflow".into()))?;
        let key = generate_group_key()?;

        self.save_group_key(conversation_id, &key, next_version)?;
        self.delete_group_key(conversation_id, from_version)?;

        tracing::info!(conversation_id, next_version, "Rotated group key");
        Ok((next_version, key))
    }

    // ========================================================================
    // PUBLIC KEY CACHE
    // ========================================================================

    /// Cached public key for a user
    pub fn get_cached_public_key(&self, user_id: &str) -> Option<String> {
        self.public_key_cache.read().get(user_id).cloned()
    }

    /// Cache a user's public key (last writer wins)
    pub fn set_cached_public_key(&self, user_id: &str, public_key: &str) {
        self.public_key_cache
            .write()
            .insert(user_id.to_string(), public_key.to_string());
    }

    /// Drop every cached public key
    pub fn clear_public_key_cache(&self) {
        self.public_key_cache.write().clear();
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn read_string(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        match self.storage.retrieve(key)? {
            Some(bytes) => {
                let value = std::str::from_utf8(&bytes).map_err(|_| {
                    Error::StorageUnavailable(format!("Stored value for {} is not UTF-8", key))
                })?;
                Ok(Some(Zeroizing::new(value.to_owned())))
            }
            None => Ok(None),
        }
    }

    // Callers hold `identity_lock`.
    fn read_identity(&self) -> Result<Option<StoredIdentity>> {
        match self.storage.retrieve(keys::IDENTITY)? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|_| {
                Error::StorageUnavailable("Stored identity record is malformed".into())
            }),
            None => Ok(None),
        }
    }

    // Callers hold the write half of `identity_lock`.
    fn write_identity(&self, identity: &StoredIdentity) -> Result<()> {
        let bytes = Zeroizing::new(serde_json::to_vec(identity)?);
        self.storage.store(keys::IDENTITY, &bytes)
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! # Secure Storage
//!
//! Platform-specific secure storage for key material.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SECURE STORAGE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SecureStorage Trait                                                    │
//! │  ───────────────────                                                    │
//! │  • store(key, value)   - Write (overwrite) a value                      │
//! │  • retrieve(key)       - Read a value, None if absent                   │
//! │  • delete(key)         - Remove a value                                 │
//! │  • exists(key)         - Check presence                                 │
//! │                                                                         │
//! │  Implementations (chosen at construction):                             │
//! │                                                                         │
//! │  ┌──────────────────────┐   ┌────────────────────────────────────────┐ │
//! │  │  InMemoryStorage     │   │  PlatformSecureStorage                 │ │
//! │  │  HashMap + RwLock    │   │  iOS/macOS: Keychain                   │ │
//! │  │  tests, fallback     │   │  other: 0600 files, atomic rename      │ │
//! │  └──────────────────────┘   └────────────────────────────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Absence is `Ok(None)`. Backend faults are `Err(StorageUnavailable)`.

use std::collections::HashMap;

use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::error::{Error, Result};

/// Durable key-value storage for sensitive material
pub trait SecureStorage: Send + Sync {
    /// Store a value, replacing any previous one
    fn store(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a value, `None` if absent
    fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Delete a value; returns whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Check if a key exists
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.retrieve(key)?.is_some())
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Process-local storage, lost on exit
#[derive(Default)]
pub struct InMemoryStorage {
    memory: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl InMemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for InMemoryStorage {
    fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut storage = self.memory.write();
        storage.insert(key.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let storage = self.memory.read();
        Ok(storage.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut storage = self.memory.write();
        Ok(storage.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let storage = self.memory.read();
        Ok(storage.contains_key(key))
    }
}

// ============================================================================
// PLATFORM
// ============================================================================

/// OS-backed secure storage
///
/// Keychain on iOS/macOS. On other targets each entry is an owner-only
/// file in a private directory, replaced via temp file + rename so a reader
/// never sees a partially written value.
pub struct PlatformSecureStorage {
    #[cfg(any(target_os = "ios", target_os = "macos"))]
    service: String,

    #[cfg(not(any(target_os = "ios", target_os = "macos")))]
    dir: std::path::PathBuf,
}

impl PlatformSecureStorage {
    /// Build the platform store from configuration
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        #[cfg(any(target_os = "ios", target_os = "macos"))]
        {
            Ok(Self::with_service(&config.keychain_service))
        }

        #[cfg(not(any(target_os = "ios", target_os = "macos")))]
        {
            let dir = config.key_dir.as_ref().ok_or_else(|| {
                Error::InvalidConfig("key_dir is required for file-backed secure storage".into())
            })?;
            Self::in_dir(dir)
        }
    }
}

#[cfg(any(target_os = "ios", target_os = "macos"))]
mod keychain {
    use security_framework::passwords::{
        delete_generic_password, get_generic_password, set_generic_password,
    };

    use super::*;

    /// errSecItemNotFound
    const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

    impl PlatformSecureStorage {
        /// Keychain storage under the given service name
        pub fn with_service(service: &str) -> Self {
            Self {
                service: service.to_string(),
            }
        }
    }

    impl SecureStorage for PlatformSecureStorage {
        fn store(&self, key: &str, value: &[u8]) -> Result<()> {
            set_generic_password(&self.service, key, value).map_err(|e| {
                Error::StorageUnavailable(format!("Keychain write failed: {}", e))
            })
        }

        fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
            match get_generic_password(&self.service, key) {
                Ok(data) => Ok(Some(Zeroizing::new(data))),
                Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(None),
                Err(e) => Err(Error::StorageUnavailable(format!(
                    "Keychain read failed: {}",
                    e
                ))),
            }
        }

        fn delete(&self, key: &str) -> Result<bool> {
            match delete_generic_password(&self.service, key) {
                Ok(()) => Ok(true),
                Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(false),
                Err(e) => Err(Error::StorageUnavailable(format!(
                    "Keychain delete failed: {}",
                    e
                ))),
            }
        }
    }
}

#[cfg(not(any(target_os = "ios", target_os = "macos")))]
mod file {
    use std::fs;
    use std::io::{ErrorKind, Write};
    use std::path::{Path, PathBuf};

    use tempfile::NamedTempFile;

    use super::*;

    impl PlatformSecureStorage {
        /// File-backed storage rooted at `dir`, created owner-only if missing
        pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
            let dir = dir.as_ref().to_path_buf();
            create_private_dir(&dir).map_err(|e| {
                Error::StorageUnavailable(format!(
                    "Cannot create key directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            Ok(Self { dir })
        }

        // Keys may contain arbitrary conversation ids; hex keeps file names safe.
        fn path_for(&self, key: &str) -> PathBuf {
            self.dir.join(format!("{}.key", hex::encode(key.as_bytes())))
        }
    }

    impl SecureStorage for PlatformSecureStorage {
        fn store(&self, key: &str, value: &[u8]) -> Result<()> {
            let path = self.path_for(key);

            // Fresh owner-only temp file per write, removed on failure
            let write = || -> std::io::Result<()> {
                let mut tmp = NamedTempFile::new_in(&self.dir)?;
                tmp.write_all(value)?;
                tmp.as_file().sync_all()?;
                tmp.persist(&path).map_err(|e| e.error)?;
                Ok(())
            };

            write().map_err(|e| Error::StorageUnavailable(format!("Key file write failed: {}", e)))
        }

        fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
            match fs::read(self.path_for(key)) {
                Ok(data) => Ok(Some(Zeroizing::new(data))),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(Error::StorageUnavailable(format!(
                    "Key file read failed: {}",
                    e
                ))),
            }
        }

        fn delete(&self, key: &str) -> Result<bool> {
            match fs::remove_file(self.path_for(key)) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(Error::StorageUnavailable(format!(
                    "Key file delete failed: {}",
                    e
                ))),
            }
        }

        fn exists(&self, key: &str) -> Result<bool> {
            match fs::metadata(self.path_for(key)) {
                Ok(metadata) => Ok(metadata.is_file()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(Error::StorageUnavailable(format!(
                    "Key file lookup failed: {}",
                    e
                ))),
            }
        }
    }

    #[cfg(unix)]
    fn create_private_dir(dir: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
    }

    #[cfg(not(unix))]
    fn create_private_dir(dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(dir)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_retrieve() {
        let store = InMemoryStorage::new();

        store.store("test-key", b"test-value").unwrap();

        let value = store.retrieve("test-key").unwrap().unwrap();
        assert_eq!(&**value, b"test-value");

        let deleted = store.delete("test-key").unwrap();
        assert!(deleted);

        assert!(store.retrieve("test-key").unwrap().is_none());
    }

    #[test]
    fn test_exists_and_double_delete() {
        let store = InMemoryStorage::new();

        assert!(!store.exists("nonexistent").unwrap());
        assert!(!store.delete("nonexistent").unwrap());

        store.store("exists", b"data").unwrap();
        assert!(store.exists("exists").unwrap());
    }

    #[test]
    fn test_overwrite() {
        let store = InMemoryStorage::new();

        store.store("k", b"one").unwrap();
        store.store("k", b"two").unwrap();

        assert_eq!(&**store.retrieve("k").unwrap().unwrap(), b"two");
    }

    #[cfg(not(any(target_os = "ios", target_os = "macos")))]
    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlatformSecureStorage::in_dir(dir.path().join("keys")).unwrap();

        assert!(store.retrieve("ahub.e2e.public_key").unwrap().is_none());

        store.store("ahub.e2e.public_key", b"pk").unwrap();
        store.store("ahub.e2e.group_key.conv/../x_v1", b"gk").unwrap();

        assert!(store.exists("ahub.e2e.public_key").unwrap());
        assert_eq!(&**store.retrieve("ahub.e2e.group_key.conv/../x_v1").unwrap().unwrap(), b"gk");

        assert!(store.delete("ahub.e2e.public_key").unwrap());
        assert!(!store.delete("ahub.e2e.public_key").unwrap());
    }

    #[cfg(not(any(target_os = "ios", target_os = "macos")))]
    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        PlatformSecureStorage::in_dir(dir.path())
            .unwrap()
            .store("k", b"durable")
            .unwrap();

        let reopened = PlatformSecureStorage::in_dir(dir.path()).unwrap();
        assert_eq!(&**reopened.retrieve("k").unwrap().unwrap(), b"durable");
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = PlatformSecureStorage::in_dir(dir.path()).unwrap();
        store.store("secret", b"s").unwrap();

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let mode = entry.metadata().unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(all(unix, not(any(target_os = "ios", target_os = "macos"))))]
    #[test]
    fn test_file_storage_fault_is_not_absence() {
        let dir = tempfile::tempdir().unwrap();
        let key_dir = dir.path().join("keys");
        let store = PlatformSecureStorage::in_dir(&key_dir).unwrap();

        // Directory swapped for a plain file: every lookup now fails
        std::fs::remove_dir(&key_dir).unwrap();
        std::fs::write(&key_dir, b"").unwrap();

        assert!(matches!(
            store.exists("ahub.e2e.identity"),
            Err(Error::StorageUnavailable(_))
        ));
        assert!(matches!(
            store.retrieve("ahub.e2e.identity"),
            Err(Error::StorageUnavailable(_))
        ));

        let key_store = crate::storage::KeyStore::new(std::sync::Arc::new(store));
        assert!(matches!(
            key_store.has_encryption_keys(),
            Err(Error::StorageUnavailable(_))
        ));
    }

    #[cfg(not(any(target_os = "ios", target_os = "macos")))]
    #[test]
    fn test_file_storage_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(PlatformSecureStorage::in_dir(dir.path()).unwrap());

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.store("shared", &[i; 64]).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let value = store.retrieve("shared").unwrap().unwrap();
        assert_eq!(value.len(), 64);
        assert!(value.iter().all(|b| *b == value[0]));

        // Only the final entry remains; no temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(not(any(target_os = "ios", target_os = "macos")))]
    #[test]
    fn test_from_config_requires_key_dir() {
        let config = VaultConfig::default();
        let result = PlatformSecureStorage::from_config(&config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}

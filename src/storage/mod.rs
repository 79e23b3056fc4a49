//! # Storage Module
//!
//! Local persistence of key material.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  KeyStore                                                               │
//! │  ├── identity key pair    ─┐                                           │
//! │  ├── group keys            ├──► SecureStorage (Keychain / files / mem) │
//! │  ├── backup marker        ─┘                                           │
//! │  └── public-key cache     ───► in-memory only, never persisted         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod key_store;
mod secure_store;

pub use key_store::{keys, KeyStore, DEFAULT_GROUP_KEY_VERSION};
pub use secure_store::{InMemoryStorage, PlatformSecureStorage, SecureStorage};

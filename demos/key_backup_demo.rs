//! # Key Backup Demo
//!
//! Generates an identity on one device, backs it up under a password and
//! restores it on a second device that shares only the backend.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=ahub_keyvault=debug cargo run --example key_backup_demo
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ahub_keyvault::sync::{EncryptionKeysRecord, EncryptionKeysUpdate};
use ahub_keyvault::{
    BackupCodec, Error, InMemoryStorage, KeyBackupApi, KeyBackupSync, KeyStore, Result,
};

/// Stands in for the A-hub backend: one user, kept in memory.
#[derive(Clone, Default)]
struct DemoBackend {
    record: Arc<Mutex<EncryptionKeysRecord>>,
}

#[async_trait]
impl KeyBackupApi for DemoBackend {
    async fn update_encryption_keys(&self, update: &EncryptionKeysUpdate) -> Result<()> {
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
        Ok(self.record.lock().clone())
    }

    async fn fetch_user_public_key(&self, _user_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

fn device(backend: &DemoBackend) -> KeyBackupSync<DemoBackend> {
    KeyBackupSync::new(
        backend.clone(),
        Arc::new(KeyStore::new(Arc::new(InMemoryStorage::new()))),
        // Far below the production count so the demo finishes quickly
        BackupCodec::new(50_000),
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ahub_keyvault=info".into()),
        )
        .init();

    println!("=== A-hub Key Vault: Backup & Restore Demo ===\n");

    let backend = DemoBackend::default();

    // Step 1: First device creates an identity
    println!("Step 1: Device A generates an identity and publishes its public key...");
    let device_a = device(&backend);
    let identity = device_a.ensure_keys().await.expect("Failed to create keys");
    println!("  Public key:  {}", identity.public_key_base64());
    println!("  Fingerprint: {}", identity.fingerprint());
    println!("  State:       {:?}", device_a.state().expect("state"));
    println!();

    // Step 2: Back up the secret key
    println!("Step 2: Device A encrypts its secret key with a password...");
    println!();
    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                    BACKUP FLOW                              │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │  password + random salt ──► PBKDF2-HMAC-SHA256 ──► key      │");
    println!("  │  secret key + key + nonce ──► AES-256-GCM ──► ciphertext    │");
    println!("  │  {{ciphertext, nonce, salt}} ──► PATCH /user/encryption-keys  │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();
    let backup = device_a
        .enable_backup("Secret123")
        .await
        .expect("Failed to publish backup");
    println!("  Salt:  {}", backup.salt);
    println!("  Nonce: {}", backup.nonce);
    println!("  State: {:?}", device_a.state().expect("state"));
    println!();

    // Step 3: A new device with the wrong password
    println!("Step 3: Device B tries to restore with the wrong password...");
    let device_b = device(&backend);
    match device_b.fetch_and_restore("secret123").await {
        Err(Error::DecryptionFailed(reason)) => println!("  Rejected: {}", reason),
        other => println!("  Unexpected result: {:?}", other.map(|pair| pair.fingerprint())),
    }
    println!("  State: {:?}", device_b.state().expect("state"));
    println!();

    // Step 4: And with the right one
    println!("Step 4: Device B restores with the correct password...");
    let restored = device_b
        .fetch_and_restore("Secret123")
        .await
        .expect("Failed to restore");
    println!("  Fingerprint: {}", restored.fingerprint());
    println!(
        "  Same identity: {}",
        restored.public_key_base64() == identity.public_key_base64()
    );
    println!("  State: {:?}", device_b.state().expect("state"));
    println!();

    println!("=== Demo Complete ===");
}

//! # Messaging Demo
//!
//! Encrypts a direct message between two identities and a group message
//! under a shared conversation key.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example messaging_demo
//! ```

use std::sync::Arc;

use ahub_keyvault::crypto::{
    decrypt_direct, decrypt_group, encrypt_direct, encrypt_group, generate_group_key,
};
use ahub_keyvault::{IdentityKeyPair, InMemoryStorage, KeyStore};

fn main() {
    println!("=== A-hub Key Vault: Messaging Demo ===\n");

    // Step 1: Identities
    println!("Step 1: Creating identities for Alice and Bob...");
    let alice = IdentityKeyPair::generate().expect("Failed to create Alice's keys");
    let bob = IdentityKeyPair::generate().expect("Failed to create Bob's keys");
    println!("  Alice: {}", alice.fingerprint());
    println!("  Bob:   {}", bob.fingerprint());
    println!();

    // Step 2: Direct message
    println!("Step 2: Alice sends Bob a direct message...");
    let payload = encrypt_direct(
        "Hi Bob, see you at 10?",
        &alice.secret_key_base64(),
        &bob.public_key_base64(),
    )
    .expect("Encryption failed");
    println!("  Ciphertext: {}", payload.ciphertext);
    println!("  Nonce:      {}", payload.nonce);

    let received = decrypt_direct(
        &payload.ciphertext,
        &payload.nonce,
        &alice.public_key_base64(),
        &bob.secret_key_base64(),
    )
    .expect("Decryption failed");
    println!("  Bob reads:  {}", received);
    println!();

    // Step 3: Group key
    println!("Step 3: Creating a group key for conversation \"team\"...");
    let store = KeyStore::new(Arc::new(InMemoryStorage::new()));
    let group_key = generate_group_key().expect("Failed to create group key");
    store
        .save_group_key("team", &group_key, 1)
        .expect("Failed to store group key");
    println!("  Stored as version 1");
    println!();

    // Step 4: Group message
    println!("Step 4: Encrypting a group message...");
    let stored = store
        .get_group_key("team", 1)
        .expect("Storage error")
        .expect("Group key missing");
    let group_payload = encrypt_group("Standup moved to 11", &stored).expect("Encryption failed");
    let text = decrypt_group(&group_payload.ciphertext, &group_payload.nonce, &stored)
        .expect("Decryption failed");
    println!("  Members read: {}", text);
    println!();

    // Step 5: Rotation
    println!("Step 5: Rotating the group key...");
    let (version, rotated) = store
        .rotate_group_key("team", 1)
        .expect("Rotation failed");
    println!("  Now at version {}", version);
    let stale = decrypt_group(&group_payload.ciphertext, &group_payload.nonce, &rotated);
    let verdict = if stale.is_err() { "rejected" } else { "accepted" };
    println!("  Old message under new key: {}", verdict);
    println!();

    println!("=== Demo Complete ===");
}

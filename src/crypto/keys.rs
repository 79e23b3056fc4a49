//! # Key Management
//!
//! The device's identity key pair.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IdentityKeyPair (X25519)                                               │
//! │  ────────────────────────                                               │
//! │                                                                         │
//! │  • Secret key: 32 bytes (never leaves the device unencrypted,          │
//! │                zeroized on drop)                                        │
//! │  • Public key: 32 bytes (published to the backend, shared freely)      │
//! │                                                                         │
//! │  Both travel as standard padded base64 strings.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::encryption::random_bytes;
use super::kdf::compute_key_fingerprint;
use super::{decode_b64, encode_b64};
use crate::error::{Error, Result};

/// Size of X25519 keys in bytes
pub const X25519_KEY_SIZE: usize = 32;

/// Long-lived X25519 key pair representing a user's encryption identity
#[derive(Clone)]
pub struct IdentityKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl IdentityKeyPair {
    /// Generate a new random key pair from the OS CSPRNG
    ///
    /// Fails with `EntropyUnavailable` if the random source is unavailable.
    pub fn generate() -> Result<Self> {
        let seed = Zeroizing::new(random_bytes::<X25519_KEY_SIZE>()?);
        Ok(Self::from_secret_bytes(*seed))
    }

    /// Create from raw secret bytes
    pub fn from_secret_bytes(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from a base64 encoded secret key
    pub fn from_secret_base64(secret_key: &str) -> Result<Self> {
        let bytes = decode_secret_key(secret_key)?;
        Ok(Self::from_secret_bytes(*bytes))
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; X25519_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Get the secret key bytes
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; X25519_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Public key as base64
    pub fn public_key_base64(&self) -> String {
        encode_b64(self.public.as_bytes())
    }

    /// Secret key as base64
    pub fn secret_key_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(encode_b64(self.secret.as_bytes()))
    }

    /// Whether `public_key` (base64) is the public half of this pair
    pub fn matches_public_key(&self, public_key: &str) -> bool {
        decode_public_key(public_key)
            .map(|bytes| bytes == self.public_bytes())
            .unwrap_or(false)
    }

    /// Short fingerprint of the public key for out-of-band verification
    pub fn fingerprint(&self) -> String {
        compute_key_fingerprint(self.public.as_bytes())
    }

    /// Perform X25519 Diffie-Hellman with a peer's public key
    pub fn diffie_hellman(&self, their_public: &[u8; X25519_KEY_SIZE]) -> Zeroizing<[u8; 32]> {
        let their_public = X25519PublicKey::from(*their_public);
        Zeroizing::new(self.secret.diffie_hellman(&their_public).to_bytes())
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public_key_base64())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Decode a base64 X25519 public key
pub fn decode_public_key(public_key: &str) -> Result<[u8; X25519_KEY_SIZE]> {
    let bytes = decode_b64(public_key)
        .map_err(|e| Error::InvalidKey(format!("Public key is not valid base64: {}", e)))?;
    bytes.as_slice().try_into().map_err(|_| {
        Error::InvalidKey(format!(
            "Public key must be {} bytes, got {}",
            X25519_KEY_SIZE,
            bytes.len()
        ))
    })
}

/// Decode a base64 X25519 secret key
pub fn decode_secret_key(secret_key: &str) -> Result<Zeroizing<[u8; X25519_KEY_SIZE]>> {
    let bytes = Zeroizing::new(
        decode_b64(secret_key)
            .map_err(|_| Error::InvalidKey("Secret key is not valid base64".into()))?,
    );
    if bytes.len() != X25519_KEY_SIZE {
        return Err(Error::InvalidKey(format!(
            "Secret key must be {} bytes, got {}",
            X25519_KEY_SIZE,
            bytes.len()
        )));
    }
    let mut out = Zeroizing::new([0u8; X25519_KEY_SIZE]);
    out.copy_from_slice(&bytes);
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = IdentityKeyPair::generate().unwrap();
        let kp2 = IdentityKeyPair::generate().unwrap();

        assert_ne!(kp1.public_bytes(), kp2.public_bytes());
        assert_ne!(*kp1.secret_bytes(), *kp2.secret_bytes());
    }

    #[test]
    fn test_base64_lengths() {
        let kp = IdentityKeyPair::generate().unwrap();

        // 32 bytes → 44 base64 characters with padding
        assert_eq!(kp.public_key_base64().len(), 44);
        assert_eq!(kp.secret_key_base64().len(), 44);
    }

    #[test]
    fn test_restore_from_secret_base64() {
        let kp = IdentityKeyPair::generate().unwrap();
        let restored = IdentityKeyPair::from_secret_base64(&kp.secret_key_base64()).unwrap();

        assert_eq!(kp.public_bytes(), restored.public_bytes());
        assert!(restored.matches_public_key(&kp.public_key_base64()));
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(matches!(
            IdentityKeyPair::from_secret_base64("not base64!"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            IdentityKeyPair::from_secret_base64(&encode_b64(&[1u8; 16])),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_diffie_hellman() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();

        let alice_shared = alice.diffie_hellman(&bob.public_bytes());
        let bob_shared = bob.diffie_hellman(&alice.public_bytes());

        assert_eq!(*alice_shared, *bob_shared);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kp = IdentityKeyPair::generate().unwrap();
        let debug = format!("{:?}", kp);

        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(kp.secret_key_base64().as_str()));
    }

    #[test]
    fn test_matches_public_key_rejects_garbage() {
        let kp = IdentityKeyPair::generate().unwrap();
        let other = IdentityKeyPair::generate().unwrap();

        assert!(!kp.matches_public_key(&other.public_key_base64()));
        assert!(!kp.matches_public_key("garbage"));
    }
}

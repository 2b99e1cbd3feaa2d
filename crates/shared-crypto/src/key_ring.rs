//! # Key Ring
//!
//! A node's private signing key together with the public `PubKeyRing` it
//! advertises to trading peers.

use shared_types::{PubKeyRing, PublicKey};

use crate::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::CryptoError;

/// Private half of a node identity.
pub struct KeyRing {
    signature_key: Ed25519KeyPair,
    encryption_pub_key: PublicKey,
}

impl KeyRing {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        let encryption = Ed25519KeyPair::generate();
        Self {
            signature_key: Ed25519KeyPair::generate(),
            encryption_pub_key: *encryption.public_key().as_bytes(),
        }
    }

    /// Deterministic identity, for reproducible test fixtures.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let mut encryption_seed = seed;
        encryption_seed[0] ^= 0xFF;
        Self {
            signature_key: Ed25519KeyPair::from_seed(seed),
            encryption_pub_key: *Ed25519KeyPair::from_seed(encryption_seed)
                .public_key()
                .as_bytes(),
        }
    }

    /// The public ring advertised to peers.
    pub fn pub_key_ring(&self) -> PubKeyRing {
        PubKeyRing::new(
            *self.signature_key.public_key().as_bytes(),
            self.encryption_pub_key,
        )
    }

    /// Sign the SHA-256 digest of `data`.
    pub fn sign(&self, data: &[u8]) -> Ed25519Signature {
        self.signature_key.sign_digest(data)
    }
}

/// Verify that `signature` over the digest of `data` was made by the
/// signature key of `ring`.
pub fn verify_with_ring(ring: &PubKeyRing, data: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key = Ed25519PublicKey::from_bytes(ring.signature_pub_key)?;
    let signature = Ed25519Signature::from_slice(signature)?;
    key.verify_digest(data, &signature)
}

//! # Shared Crypto
//!
//! Cryptographic primitives used by the trade protocol.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256 | Contract digests, payload hashes |
//! | `signatures` | Ed25519 | Contract signatures, peer identity |
//! | `key_ring` | Ed25519 | A node's signing key plus its public `PubKeyRing` |
//!
//! ## Security Properties
//!
//! - **Ed25519**: deterministic nonces, no RNG dependency when signing
//! - **Key material**: signing seeds are zeroized on drop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod key_ring;
pub mod signatures;

// Re-exports
pub use errors::CryptoError;
pub use hashing::{sha256, sha256_hex, Sha256Hasher};
pub use key_ring::{verify_with_ring, KeyRing};
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

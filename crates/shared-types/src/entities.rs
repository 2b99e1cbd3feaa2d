//! # Core Entities
//!
//! Identifiers shared by the protocol engine, the network layer and the
//! wallet layer.
//!
//! ## Clusters
//!
//! - **Primitives**: `Hash`, `Signature`, `PublicKey`
//! - **Identity**: `TradeId`, `NodeAddress`, `PubKeyRing`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::errors::ParseError;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

// =============================================================================
// IDENTITY
// =============================================================================

/// Trade identifier. Equal to the id of the offer the trade was taken from
/// and immutable for the lifetime of the trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(String);

impl TradeId {
    /// Wrap an existing offer id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id (used when a maker places an offer).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TradeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Network address of a peer (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host_name: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host_name: impl Into<String>, port: u16) -> Self {
        Self {
            host_name: host_name.into(),
            port,
        }
    }

    /// Full `host:port` form.
    pub fn full_address(&self) -> String {
        format!("{}:{}", self.host_name, self.port)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_name, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseError::InvalidNodeAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(ParseError::InvalidNodeAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ParseError::InvalidNodeAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// A peer's public keys: one for signatures, one for message encryption.
///
/// The signature key is the identity the protocol checks contract
/// signatures and message senders against. Keys serialize as hex.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PubKeyRing {
    #[serde_as(as = "Hex")]
    pub signature_pub_key: PublicKey,
    #[serde_as(as = "Hex")]
    pub encryption_pub_key: PublicKey,
}

impl PubKeyRing {
    pub fn new(signature_pub_key: PublicKey, encryption_pub_key: PublicKey) -> Self {
        Self {
            signature_pub_key,
            encryption_pub_key,
        }
    }

    /// Short hex fingerprint of the signature key, for logs.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.signature_pub_key[..8])
    }
}

impl fmt::Display for PubKeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKeyRing({})", self.fingerprint())
    }
}

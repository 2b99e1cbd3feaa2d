//! # `TradeEnvelope` Network Wrapper
//!
//! Every message exchanged between trading peers travels inside this
//! envelope. The envelope, not the payload, is authoritative for the trade
//! id, the message uid and the sender's node address.
//!
//! ## Properties
//!
//! - **Versioning**: `version` is checked before a payload is processed.
//! - **Correlation**: `uid` is echoed back by acknowledgements and is reused
//!   verbatim when a message is resent, so receivers can suppress duplicates.

use serde::{Deserialize, Serialize};

use crate::entities::{NodeAddress, TradeId};

/// Envelope around a protocol payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEnvelope<T> {
    /// Protocol version for forward compatibility.
    pub version: u16,

    /// Unique message id; stable across resends.
    pub uid: String,

    /// Trade the payload belongs to.
    pub trade_id: TradeId,

    /// Address the sender can be reached at.
    pub sender_node_address: NodeAddress,

    /// Unix timestamp (seconds) when the message was first created.
    pub timestamp: u64,

    /// The protocol payload.
    pub payload: T,
}

impl<T> TradeEnvelope<T> {
    /// Current protocol version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Wrap `payload` with a fresh uid and the current time.
    pub fn new(trade_id: TradeId, sender_node_address: NodeAddress, payload: T) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            uid: uuid::Uuid::new_v4().to_string(),
            trade_id,
            sender_node_address,
            timestamp: unix_now(),
            payload,
        }
    }

    /// Whether this envelope was produced by a compatible protocol version.
    pub fn is_supported_version(&self) -> bool {
        self.version == Self::CURRENT_VERSION
    }
}

/// Seconds since the Unix epoch; zero if the clock is before the epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

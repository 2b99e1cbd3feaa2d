//! Outbound message log, persisted with the trade.

use serde::{Deserialize, Serialize};

use crate::domain::messages::{MessageKind, ProtocolEnvelope};
use crate::domain::role::PeerSlot;

/// Delivery progress of one sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Sent,
    Arrived,
    StoredInMailbox,
    Faulted,
    Acked,
    Nacked,
}

impl DeliveryStatus {
    /// Reached the peer or its mailbox.
    pub fn is_delivered(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Arrived
                | DeliveryStatus::StoredInMailbox
                | DeliveryStatus::Acked
                | DeliveryStatus::Nacked
        )
    }
}

/// One sent message. Resends reuse `envelope` verbatim, uid included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub uid: String,
    pub kind: MessageKind,
    pub recipient: PeerSlot,
    pub envelope: ProtocolEnvelope,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub resend_count: u32,
}

impl OutboundMessage {
    pub fn new(envelope: ProtocolEnvelope, recipient: PeerSlot) -> Self {
        Self {
            uid: envelope.uid.clone(),
            kind: envelope.payload.kind(),
            recipient,
            envelope,
            status: DeliveryStatus::Sent,
            error_message: None,
            resend_count: 0,
        }
    }

    /// Mailbox messages are resent until the recipient acknowledges them.
    pub fn needs_resend(&self) -> bool {
        self.kind.is_mailbox()
            && !matches!(self.status, DeliveryStatus::Acked | DeliveryStatus::Nacked)
    }
}

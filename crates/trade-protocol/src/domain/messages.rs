//! # Trade Messages
//!
//! Payloads exchanged between maker, taker and arbitrator. Every payload
//! travels in a [`ProtocolEnvelope`], which carries the trade id, the uid and
//! the sender address.
//!
//! | Kind | Sender → receivers | Delivery |
//! |------|--------------------|----------|
//! | `InitTradeRequest` | taker → arbitrator → maker → arbitrator | direct |
//! | `InitMultisigRequest` | each → the two others | direct |
//! | `SignContractRequest` | trader → other trader, arbitrator | direct |
//! | `SignContractResponse` | each → the two others | direct |
//! | `DepositRequest` | trader → arbitrator | mailbox |
//! | `DepositResponse` | arbitrator → traders | direct |
//! | `PaymentSent` | buyer → seller, arbitrator | mailbox |
//! | `PaymentReceived` | seller → buyer, arbitrator | mailbox |
//! | `MediatedPayoutSignature` | trader → other trader | mailbox |
//! | `MediatedPayoutPublished` | trader → other trader | mailbox |
//! | `Ack` | receiver → sender | direct |

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_types::{Hash, NodeAddress, PubKeyRing, TradeEnvelope, TradeId};

use crate::domain::peer::AccountAgeWitness;

/// Envelope type used on the wire.
pub type ProtocolEnvelope = TradeEnvelope<TradeMessage>;

/// Message kind, used for routing, logging and acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    InitTradeRequest,
    InitMultisigRequest,
    SignContractRequest,
    SignContractResponse,
    DepositRequest,
    DepositResponse,
    PaymentSent,
    PaymentReceived,
    MediatedPayoutSignature,
    MediatedPayoutPublished,
    Ack,
}

impl MessageKind {
    /// Mailbox messages survive an offline receiver and are resent on
    /// startup until acknowledged.
    pub fn is_mailbox(self) -> bool {
        matches!(
            self,
            MessageKind::DepositRequest
                | MessageKind::PaymentSent
                | MessageKind::PaymentReceived
                | MessageKind::MediatedPayoutSignature
                | MessageKind::MediatedPayoutPublished
        )
    }

    /// Class name echoed in acknowledgements.
    pub fn class_name(self) -> &'static str {
        match self {
            MessageKind::InitTradeRequest => "InitTradeRequest",
            MessageKind::InitMultisigRequest => "InitMultisigRequest",
            MessageKind::SignContractRequest => "SignContractRequest",
            MessageKind::SignContractResponse => "SignContractResponse",
            MessageKind::DepositRequest => "DepositRequest",
            MessageKind::DepositResponse => "DepositResponse",
            MessageKind::PaymentSent => "PaymentSentMessage",
            MessageKind::PaymentReceived => "PaymentReceivedMessage",
            MessageKind::MediatedPayoutSignature => "MediatedPayoutSignatureMessage",
            MessageKind::MediatedPayoutPublished => "MediatedPayoutPublishedMessage",
            MessageKind::Ack => "AckMessage",
        }
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Proof of a party's reserve transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveProof {
    pub tx_hash: String,
    pub tx_hex: String,
    pub tx_key: String,
    /// Address receiving the reserved deposit back (and later the payout).
    pub payout_address: String,
}

/// Opens a trade. Relayed taker → arbitrator → maker → arbitrator; each hop
/// adds what it knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitTradeRequest {
    pub trade_amount: u64,
    pub trade_price: u64,
    pub maker_node_address: NodeAddress,
    pub taker_node_address: NodeAddress,
    pub arbitrator_node_address: NodeAddress,
    pub maker_pub_key_ring: Option<PubKeyRing>,
    pub taker_pub_key_ring: Option<PubKeyRing>,
    /// Account id of the party whose reserve is attached.
    pub account_id: Option<String>,
    pub reserve: Option<ReserveProof>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitMultisigRequest {
    pub prepared_multisig_hex: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignContractRequest {
    pub account_id: String,
    #[serde_as(as = "Hex")]
    pub payment_account_payload_hash: Hash,
    pub payout_address: String,
    pub deposit_tx_hash: String,
    pub account_age_witness: Option<AccountAgeWitness>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignContractResponse {
    #[serde_as(as = "Hex")]
    pub contract_hash: Hash,
    #[serde_as(as = "Hex")]
    pub contract_signature: Vec<u8>,
    /// Sender's payment account payload (traders only).
    #[serde_as(as = "Option<Hex>")]
    pub payment_account_payload: Option<Vec<u8>>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    #[serde_as(as = "Hex")]
    pub contract_signature: Vec<u8>,
    pub deposit_tx_hex: String,
    pub deposit_tx_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositResponse {
    pub error_message: Option<String>,
    pub maker_deposit_tx_hash: Option<String>,
    pub taker_deposit_tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSentMessage {
    pub counter_currency_tx_id: Option<String>,
    /// Unsigned payout (or the seller-proposed one, signed by the buyer).
    pub payout_tx_hex: String,
    pub updated_multisig_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceivedMessage {
    pub signed_payout_tx_hex: String,
    pub payout_tx_hash: String,
    pub updated_multisig_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediatedPayoutSignature {
    pub payout_tx_hex: String,
    pub updated_multisig_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediatedPayoutPublished {
    pub payout_tx_hash: String,
    pub payout_tx_hex: String,
}

/// Acknowledgement of a processed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    pub source_type: MessageKind,
    pub source_msg_class_name: String,
    pub source_uid: String,
    pub source_id: TradeId,
    pub success: bool,
    pub error_message: Option<String>,
}

impl AckMessage {
    /// Acknowledge the message in `envelope`.
    pub fn for_message(envelope: &ProtocolEnvelope, success: bool, error_message: Option<String>) -> Self {
        let kind = envelope.payload.kind();
        Self {
            source_type: kind,
            source_msg_class_name: kind.class_name().to_string(),
            source_uid: envelope.uid.clone(),
            source_id: envelope.trade_id.clone(),
            success,
            error_message,
        }
    }
}

/// Every protocol payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeMessage {
    InitTradeRequest(InitTradeRequest),
    InitMultisigRequest(InitMultisigRequest),
    SignContractRequest(SignContractRequest),
    SignContractResponse(SignContractResponse),
    DepositRequest(DepositRequest),
    DepositResponse(DepositResponse),
    PaymentSent(PaymentSentMessage),
    PaymentReceived(PaymentReceivedMessage),
    MediatedPayoutSignature(MediatedPayoutSignature),
    MediatedPayoutPublished(MediatedPayoutPublished),
    Ack(AckMessage),
}

impl TradeMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            TradeMessage::InitTradeRequest(_) => MessageKind::InitTradeRequest,
            TradeMessage::InitMultisigRequest(_) => MessageKind::InitMultisigRequest,
            TradeMessage::SignContractRequest(_) => MessageKind::SignContractRequest,
            TradeMessage::SignContractResponse(_) => MessageKind::SignContractResponse,
            TradeMessage::DepositRequest(_) => MessageKind::DepositRequest,
            TradeMessage::DepositResponse(_) => MessageKind::DepositResponse,
            TradeMessage::PaymentSent(_) => MessageKind::PaymentSent,
            TradeMessage::PaymentReceived(_) => MessageKind::PaymentReceived,
            TradeMessage::MediatedPayoutSignature(_) => MessageKind::MediatedPayoutSignature,
            TradeMessage::MediatedPayoutPublished(_) => MessageKind::MediatedPayoutPublished,
            TradeMessage::Ack(_) => MessageKind::Ack,
        }
    }
}

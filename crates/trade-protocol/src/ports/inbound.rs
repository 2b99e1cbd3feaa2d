//! # Inbound Port
//!
//! API the protocol engine exposes to the network layer and to the user
//! facing layer.

use async_trait::async_trait;
use shared_types::{PubKeyRing, TradeId};

use crate::domain::errors::ProtocolError;
use crate::domain::escrow::MediationResult;
use crate::domain::messages::ProtocolEnvelope;
use crate::domain::offer::Offer;
use crate::domain::trade::Trade;
use crate::offer::PlaceOfferRequest;
use crate::protocol::DispatchOutcome;

/// A message received from the network with the sender's verified ring.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub envelope: ProtocolEnvelope,
    pub sender_ring: PubKeyRing,
}

/// Trade protocol API.
#[async_trait]
pub trait TradeProtocolApi: Send + Sync {
    /// Validate an offer, reserve its funds and publish it.
    async fn place_offer(&self, request: PlaceOfferRequest) -> Result<Offer, ProtocolError>;

    /// Take a public offer; returns once the init request was sent.
    async fn take_offer(&self, offer_id: &TradeId, amount: u64) -> Result<TradeId, ProtocolError>;

    /// Handle one inbound message.
    async fn on_network_message(&self, message: InboundMessage) -> DispatchOutcome;

    /// Buyer confirms the counter-currency payment was sent.
    async fn on_payment_sent(
        &self,
        trade_id: &TradeId,
        counter_currency_tx_id: Option<String>,
    ) -> Result<(), ProtocolError>;

    /// Seller confirms the counter-currency payment arrived.
    async fn on_payment_received(&self, trade_id: &TradeId) -> Result<(), ProtocolError>;

    /// Trader completes the trade after the payout.
    async fn on_withdraw(&self, trade_id: &TradeId) -> Result<(), ProtocolError>;

    async fn request_mediation(&self, trade_id: &TradeId) -> Result<(), ProtocolError>;

    /// Record the mediator's proposal (closes mediation).
    async fn set_mediation_result(
        &self,
        trade_id: &TradeId,
        result: MediationResult,
    ) -> Result<(), ProtocolError>;

    async fn accept_mediation_result(&self, trade_id: &TradeId) -> Result<(), ProtocolError>;

    /// Snapshot of an open or archived trade.
    async fn trade(&self, trade_id: &TradeId) -> Option<Trade>;
}

//! Acknowledgements.
//!
//! Every processed trade message is answered with an `AckMessage` carrying
//! its uid. Incoming acks update the outbound log and, for the payment
//! messages, the sender's state.

use shared_types::PubKeyRing;
use tracing::{info, warn};
use trade_telemetry::{log_message_event, metric_inc, ACKS_SENT};

use crate::domain::messages::{AckMessage, MessageKind, ProtocolEnvelope, TradeMessage};
use crate::domain::outbound::DeliveryStatus;
use crate::domain::phase::{TradePhase, TradeState};
use crate::domain::role::PeerSlot;
use crate::model::TradeModel;

/// Send a positive or negative ack for `source` to its sender.
///
/// Best effort: a failed ack is logged and the sender will redeliver
/// mailbox messages on its next start.
pub(crate) async fn send_ack(
    model: &TradeModel,
    source: &ProtocolEnvelope,
    sender_ring: &PubKeyRing,
    success: bool,
    error_message: Option<String>,
) {
    let ack = AckMessage::for_message(source, success, error_message);
    let envelope = ProtocolEnvelope::new(
        model.trade_id(),
        model.network().own_address(),
        TradeMessage::Ack(ack),
    );
    let result = model
        .network()
        .send_direct_message(&source.sender_node_address, sender_ring, envelope)
        .await;
    let label = if success { "ack" } else { "nack" };
    match result {
        Ok(_) => {
            metric_inc!(ACKS_SENT, &[label]);
            log_message_event!(
                debug,
                model.trade.id(),
                source.payload.kind(),
                source.uid,
                source.sender_node_address,
                "Ack sent",
                success = success
            );
        }
        Err(e) => {
            warn!(
                trade_id = %model.trade.id(),
                uid = %source.uid,
                error = %e,
                "Ack not delivered"
            );
        }
    }
}

/// What an incoming ack means for the trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AckEffect {
    None,
    /// A peer rejected a message while the trade was still initialising.
    InitRejected(String),
}

/// Apply an ack from `sender` to the outbound log.
pub(crate) fn apply_ack(model: &mut TradeModel, sender: PeerSlot, ack: &AckMessage) -> AckEffect {
    let trade_id = model.trade_id();
    let Some(message) = model.trade.outbound_mut(&ack.source_uid) else {
        warn!(trade_id = %trade_id, uid = %ack.source_uid, "Ack for unknown message");
        return AckEffect::None;
    };
    if message.recipient != sender {
        warn!(
            trade_id = %trade_id,
            uid = %ack.source_uid,
            recipient = ?message.recipient,
            sender = ?sender,
            "Ack from a peer the message was not sent to"
        );
        return AckEffect::None;
    }
    message.status = if ack.success {
        DeliveryStatus::Acked
    } else {
        DeliveryStatus::Nacked
    };
    message.error_message = ack.error_message.clone();
    let kind = message.kind;
    info!(
        trade_id = %trade_id,
        uid = %ack.source_uid,
        msg_kind = ?kind,
        success = ack.success,
        "Ack received"
    );

    if !ack.success {
        if model.trade.phase() == TradePhase::Init {
            let reason = ack
                .error_message
                .clone()
                .unwrap_or_else(|| format!("{} rejected", kind.class_name()));
            return AckEffect::InitRejected(reason);
        }
        return AckEffect::None;
    }

    if Some(sender) != model.trade.counterparty_slot() {
        return AckEffect::None;
    }
    let trade = &mut model.trade;
    let seen = match (kind, trade.state()) {
        (
            MessageKind::PaymentSent,
            TradeState::BuyerSentPaymentSentMsg | TradeState::BuyerStoredInMailboxPaymentSentMsg,
        ) => Some(TradeState::BuyerSawArrivedPaymentSentMsg),
        (
            MessageKind::PaymentReceived,
            TradeState::SellerSentPaymentReceivedMsg
            | TradeState::SellerStoredInMailboxPaymentReceivedMsg,
        ) => Some(TradeState::SellerSawArrivedPaymentReceivedMsg),
        _ => None,
    };
    if let Some(state) = seen {
        // Same phase, so this cannot regress.
        if trade.set_state(state).is_err() {
            warn!(trade_id = %trade_id, state = ?state, "Ack state not applied");
        }
    }
    AckEffect::None
}

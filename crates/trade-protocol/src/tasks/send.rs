//! Message sending shared by the tasks.
//!
//! Every sent message is recorded in the trade's outbound log before it
//! leaves, so acknowledgements can be correlated and mailbox messages can be
//! resent with the same uid.

use futures::future::join_all;
use shared_types::{NodeAddress, PubKeyRing};
use trade_telemetry::log_message_event;

use crate::domain::errors::{NetworkError, TaskError, TradeError};
use crate::domain::messages::{ProtocolEnvelope, TradeMessage};
use crate::domain::outbound::{DeliveryStatus, OutboundMessage};
use crate::domain::role::PeerSlot;
use crate::domain::trade::Trade;
use crate::engine::TaskHandle;
use crate::model::TradeModel;
use crate::ports::{NetworkService, SendOutcome};

/// A logged message ready to go out.
pub(crate) struct Outgoing {
    pub recipient: PeerSlot,
    pub address: NodeAddress,
    pub ring: PubKeyRing,
    pub envelope: ProtocolEnvelope,
}

/// Wrap `payload` for `recipient` and record it in the outbound log.
pub(crate) fn prepare(
    model: &mut TradeModel,
    recipient: PeerSlot,
    payload: TradeMessage,
) -> Result<Outgoing, TaskError> {
    let peer = model.trade.peer(recipient);
    let address = peer
        .node_address
        .clone()
        .ok_or(TradeError::MissingData("recipient address"))?;
    let ring = peer
        .pub_key_ring
        .ok_or(TradeError::MissingData("recipient key ring"))?;
    let envelope = ProtocolEnvelope::new(
        model.trade_id(),
        model.process.services.network.own_address(),
        payload,
    );
    model
        .trade
        .record_outbound(OutboundMessage::new(envelope.clone(), recipient));
    Ok(Outgoing {
        recipient,
        address,
        ring,
        envelope,
    })
}

/// Send over the channel the message kind calls for.
pub(crate) async fn deliver(
    network: &dyn NetworkService,
    address: &NodeAddress,
    ring: &PubKeyRing,
    envelope: ProtocolEnvelope,
) -> Result<SendOutcome, NetworkError> {
    if envelope.payload.kind().is_mailbox() {
        network.send_mailbox_message(address, ring, envelope).await
    } else {
        network.send_direct_message(address, ring, envelope).await
    }
}

/// Update the outbound log with a delivery result.
pub(crate) fn record_delivery(
    trade: &mut Trade,
    uid: &str,
    result: &Result<SendOutcome, NetworkError>,
) {
    if let Some(message) = trade.outbound_mut(uid) {
        // An ack may already have arrived.
        if matches!(message.status, DeliveryStatus::Acked | DeliveryStatus::Nacked) {
            return;
        }
        match result {
            Ok(SendOutcome::Arrived) => message.status = DeliveryStatus::Arrived,
            Ok(SendOutcome::StoredInMailbox) => message.status = DeliveryStatus::StoredInMailbox,
            Err(e) => {
                message.status = DeliveryStatus::Faulted;
                message.error_message = Some(e.to_string());
            }
        }
    }
}

/// Send one message and wait for the delivery result.
pub(crate) async fn send_to(
    model: &mut TradeModel,
    recipient: PeerSlot,
    payload: TradeMessage,
) -> Result<SendOutcome, TaskError> {
    let outgoing = prepare(model, recipient, payload)?;
    let network = model.network();
    let uid = outgoing.envelope.uid.clone();
    let kind = outgoing.envelope.payload.kind();
    let result = deliver(
        network.as_ref(),
        &outgoing.address,
        &outgoing.ring,
        outgoing.envelope,
    )
    .await;
    record_delivery(&mut model.trade, &uid, &result);
    log_message_event!(
        debug,
        model.trade.id(),
        kind,
        uid,
        outgoing.address,
        "Message sent",
        outcome = ?result
    );
    Ok(result?)
}

/// Send to several peers concurrently. Every fault is reported on `handle`;
/// the handle keeps only the first.
pub(crate) async fn send_to_all(
    model: &mut TradeModel,
    handle: &TaskHandle,
    outgoing: Vec<Outgoing>,
) -> Vec<(PeerSlot, Result<SendOutcome, NetworkError>)> {
    let network = model.network();
    let sends = outgoing.into_iter().map(|out| {
        let network = network.clone();
        let handle = handle.clone();
        async move {
            let uid = out.envelope.uid.clone();
            let kind = out.envelope.payload.kind();
            let result = deliver(network.as_ref(), &out.address, &out.ring, out.envelope).await;
            if let Err(e) = &result {
                handle.failed(e.clone());
            }
            (out.recipient, out.address, uid, kind, result)
        }
    });
    let results = join_all(sends).await;

    let trade_id = model.trade_id();
    results
        .into_iter()
        .map(|(recipient, address, uid, kind, result)| {
            record_delivery(&mut model.trade, &uid, &result);
            log_message_event!(
                debug,
                trade_id,
                kind,
                uid,
                address,
                "Message sent",
                recipient = ?recipient,
                outcome = ?result
            );
            (recipient, result)
        })
        .collect()
}

/// Prepare one message per recipient that has not received `payload`'s
/// kind yet.
pub(crate) fn prepare_for(
    model: &mut TradeModel,
    recipients: &[PeerSlot],
    payload: &TradeMessage,
) -> Result<Vec<Outgoing>, TaskError> {
    let kind = payload.kind();
    let mut outgoing = Vec::new();
    for recipient in recipients {
        if model.trade.delivered_to(kind, *recipient) {
            continue;
        }
        outgoing.push(prepare(model, *recipient, payload.clone())?);
    }
    Ok(outgoing)
}

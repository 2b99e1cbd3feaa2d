//! Redelivery of unacknowledged mailbox messages.

use tracing::{info, warn};
use trade_telemetry::{metric_inc, MAILBOX_RESENDS};

use crate::model::TradeModel;
use crate::tasks::send::{deliver, record_delivery};

/// Resend every mailbox message the recipient has not acknowledged yet,
/// reusing the original envelope and uid. Returns the number resent.
pub(crate) async fn resend_unacknowledged(model: &mut TradeModel) -> usize {
    let pending: Vec<_> = model
        .trade
        .outbound()
        .iter()
        .filter(|m| m.needs_resend())
        .map(|m| (m.recipient, m.envelope.clone()))
        .collect();
    if pending.is_empty() {
        return 0;
    }

    let network = model.network();
    let mut resent = 0;
    for (recipient, envelope) in pending {
        let peer = model.trade.peer(recipient);
        let (Some(address), Some(ring)) = (peer.node_address.clone(), peer.pub_key_ring) else {
            warn!(trade_id = %model.trade.id(), recipient = ?recipient, "Cannot resend, peer unknown");
            continue;
        };
        let uid = envelope.uid.clone();
        let result = deliver(network.as_ref(), &address, &ring, envelope).await;
        record_delivery(&mut model.trade, &uid, &result);
        if let Some(message) = model.trade.outbound_mut(&uid) {
            message.resend_count += 1;
        }
        metric_inc!(MAILBOX_RESENDS);
        match result {
            Ok(outcome) => {
                resent += 1;
                info!(trade_id = %model.trade.id(), uid = %uid, outcome = ?outcome, "Mailbox message resent");
            }
            Err(e) => {
                warn!(trade_id = %model.trade.id(), uid = %uid, error = %e, "Mailbox resend failed");
            }
        }
    }
    resent
}

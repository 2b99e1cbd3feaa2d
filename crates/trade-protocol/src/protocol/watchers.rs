//! Chain watchers.
//!
//! Deposit and payout progress is observed through the wallet event bus.
//! Each watcher first syncs from the wallet's current view, then follows
//! events until its goal is reached. Subscriptions are registered before
//! the sync so nothing published in between is lost.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use shared_bus::{EventStream, SubscriptionError, WalletEvent};
use tracing::{debug, info, warn};

use crate::domain::phase::PayoutState;
use crate::domain::role::PeerSlot;
use crate::ports::WalletService;
use crate::protocol::trade_protocol::TradeProtocol;

type Waiter = BoxFuture<'static, Result<WalletEvent, SubscriptionError>>;

/// Subscriptions for the two payout milestones.
pub(crate) struct PayoutWaiters {
    pub tx_hash: String,
    pub confirmed: Waiter,
    pub unlocked: Waiter,
}

/// Follow both deposits until they are unlocked.
pub(crate) async fn watch_deposits(
    protocol: Arc<TradeProtocol>,
    mut stream: EventStream,
    deposits: Vec<(PeerSlot, String)>,
    wallet: Arc<dyn WalletService>,
) {
    let trade_id = protocol.trade_id().clone();
    debug!(trade_id = %trade_id, deposits = deposits.len(), "Watching deposits");

    for (slot, hash) in &deposits {
        match wallet.get_tx_status(hash).await {
            Ok(Some(status)) if status.confirmations > 0 => {
                if protocol.on_deposit_status(*slot, status.is_locked).await {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(trade_id = %trade_id, tx_hash = %hash, error = %e, "Deposit status unavailable"),
        }
    }

    while let Some(event) = stream.next().await {
        let (tx_hash, locked) = match &event {
            WalletEvent::OutputReceived {
                tx_hash, is_locked, ..
            } => (tx_hash, *is_locked),
            WalletEvent::TxUnlocked { tx_hash, .. } => (tx_hash, false),
            WalletEvent::BalancesChanged { .. } => continue,
        };
        let Some((slot, _)) = deposits.iter().find(|(_, hash)| hash == tx_hash) else {
            continue;
        };
        if protocol.on_deposit_status(*slot, locked).await {
            info!(trade_id = %trade_id, "Deposit watcher finished");
            return;
        }
    }
}

/// Follow the payout until it is unlocked.
pub(crate) async fn watch_payout(
    protocol: Arc<TradeProtocol>,
    waiters: PayoutWaiters,
    wallet: Arc<dyn WalletService>,
    unlock_confirmations: u64,
) {
    let PayoutWaiters {
        tx_hash,
        confirmed,
        unlocked,
    } = waiters;
    let trade_id = protocol.trade_id().clone();

    match wallet.get_tx_status(&tx_hash).await {
        Ok(Some(status)) => {
            if status.confirmations > 0 {
                protocol.on_payout_state(PayoutState::Confirmed).await;
            }
            if status.confirmations >= unlock_confirmations && !status.is_locked {
                protocol.on_payout_state(PayoutState::Unlocked).await;
                return;
            }
        }
        Ok(None) => {}
        Err(e) => warn!(trade_id = %trade_id, tx_hash = %tx_hash, error = %e, "Payout status unavailable"),
    }

    if confirmed.await.is_ok() {
        protocol.on_payout_state(PayoutState::Confirmed).await;
    }
    match unlocked.await {
        Ok(_) => protocol.on_payout_state(PayoutState::Unlocked).await,
        Err(e) => warn!(trade_id = %trade_id, error = %e, "Payout watcher closed"),
    }
}

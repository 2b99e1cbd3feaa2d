//! Multisig sync helpers shared by the payment and mediation tasks.
//!
//! Each payout cycle a party exports its sync blob at most once and imports
//! every new peer blob exactly once:
//!
//! ```text
//! own slot:   Stale ──export──► Exported      (reset when the cycle changes)
//! peer slot:  Stale ──import──► Synced        (reset when a new blob arrives)
//! ```

use tracing::debug;

use crate::domain::errors::{TaskError, TradeError};
use crate::domain::escrow::{PayoutBreakdown, TxDestination};
use crate::domain::peer::MultisigSyncState;
use crate::domain::role::PeerSlot;
use crate::model::TradeModel;

/// Import the blob of `slot` if it has not been imported yet.
pub(crate) async fn import_peer_blob(model: &mut TradeModel, slot: PeerSlot) -> Result<bool, TaskError> {
    let peer = model.trade.peer(slot);
    let Some(blob) = peer.multisig_hex.clone() else {
        return Ok(false);
    };
    if peer.multisig_sync == MultisigSyncState::Synced {
        return Ok(false);
    }
    let trade_id = model.trade_id();
    model
        .wallet()
        .import_multisig_hex(&trade_id, vec![blob])
        .await?;
    model.trade.peer_mut(slot).multisig_sync = MultisigSyncState::Synced;
    debug!(trade_id = %trade_id, peer = ?slot, "Imported multisig blob");
    Ok(true)
}

/// The own blob for the current payout cycle, exporting it on first use.
pub(crate) async fn export_own_blob(model: &mut TradeModel) -> Result<String, TaskError> {
    let cycle = model.trade.payout_cycle;
    let own = model.trade.own_peer();
    if own.exported_in_cycle == Some(cycle) {
        if let Some(blob) = &own.multisig_hex {
            return Ok(blob.clone());
        }
    }
    let trade_id = model.trade_id();
    let blob = model.wallet().export_multisig_hex(&trade_id).await?;
    let own = model.trade.own_peer_mut();
    own.multisig_hex = Some(blob.clone());
    own.multisig_sync = MultisigSyncState::Exported;
    own.exported_in_cycle = Some(cycle);
    debug!(trade_id = %trade_id, cycle, "Exported multisig blob");
    Ok(blob)
}

/// Payout addresses of buyer and seller as fixed by the contract.
pub(crate) fn payout_addresses(model: &TradeModel) -> Result<(String, String), TaskError> {
    let contract = model
        .trade
        .contract()
        .ok_or(TradeError::MissingData("contract"))?;
    Ok((
        contract.buyer_payout_address().to_string(),
        contract.seller_payout_address().to_string(),
    ))
}

/// Outputs of the regular payout: the buyer gets the trade amount and its
/// security deposit back, the seller its security deposit.
pub(crate) fn standard_payout(model: &TradeModel) -> Result<Vec<TxDestination>, TaskError> {
    let (buyer, seller) = payout_addresses(model)?;
    let offer = model.trade.offer();
    Ok(PayoutBreakdown::standard_destinations(
        model.trade.amount,
        offer.buyer_security_deposit,
        offer.seller_security_deposit,
        &buyer,
        &seller,
    ))
}

/// Outputs of the mediated payout.
pub(crate) fn mediated_payout(model: &TradeModel) -> Result<Vec<TxDestination>, TaskError> {
    let result = model
        .trade
        .mediation_result
        .ok_or(TradeError::MissingData("mediation result"))?;
    let (buyer, seller) = payout_addresses(model)?;
    Ok(PayoutBreakdown::mediated_destinations(&result, &buyer, &seller))
}

/// Check that `tx_hex` pays `destinations` minus an even share of the miner
/// fee and nothing else.
pub(crate) async fn verify_payout(
    model: &TradeModel,
    tx_hex: &str,
    destinations: &[TxDestination],
) -> Result<(), TaskError> {
    let (buyer, seller) = payout_addresses(model)?;
    let description = model
        .wallet()
        .describe_tx(model.trade.id(), tx_hex)
        .await?;
    let gross_buyer = amount_to(destinations, &buyer);
    let gross_seller = amount_to(destinations, &seller);
    let breakdown = PayoutBreakdown::from_gross(gross_buyer, gross_seller, description.fee)?;
    breakdown.verify(&description, &buyer, &seller)?;
    Ok(())
}

/// Check a payout a peer reports as published: `tx_hex` is fully signed,
/// hashes to `announced_hash`, and the daemon knows the tx as relayed.
pub(crate) async fn confirm_published_payout(
    model: &TradeModel,
    tx_hex: &str,
    announced_hash: &str,
) -> Result<(), TaskError> {
    let wallet = model.wallet();
    let description = wallet.describe_tx(model.trade.id(), tx_hex).await?;
    if description.hash != announced_hash {
        return Err(TradeError::PayoutMismatch(format!(
            "hash {} does not match announced {}",
            description.hash, announced_hash
        ))
        .into());
    }
    if !description.fully_signed {
        return Err(TradeError::PayoutMismatch("payout not fully signed".to_string()).into());
    }
    match wallet.get_tx_status(announced_hash).await? {
        Some(status) if status.relayed => Ok(()),
        _ => Err(TradeError::PayoutMismatch(format!("payout {announced_hash} not relayed")).into()),
    }
}

fn amount_to(destinations: &[TxDestination], address: &str) -> u64 {
    destinations
        .iter()
        .filter(|d| d.address == address)
        .map(|d| d.amount)
        .sum()
}

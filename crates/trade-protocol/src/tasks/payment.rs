//! Payment confirmation and payout.
//!
//! ```text
//! buyer                          seller                       arbitrator
//!   │ export blob, create payout   │                              │
//!   ├──PaymentSent(tx, blob)──────►│ import, verify, sign, relay  │
//!   ├──────────────────────────────┼─────────────────────────────►│
//!   │◄──PaymentReceived(tx, blob)──┤                              │
//!   │                              ├─────────────────────────────►│
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::errors::{TaskError, TradeError};
use crate::domain::messages::{PaymentReceivedMessage, PaymentSentMessage, TradeMessage};
use crate::domain::phase::{PayoutState, TradeDisposition, TradeState};
use crate::domain::role::PeerSlot;
use crate::engine::Task;
use crate::model::TradeModel;
use crate::ports::SendOutcome;
use crate::tasks::payout::{
    confirm_published_payout, export_own_blob, import_peer_blob, standard_payout, verify_payout,
};
use crate::tasks::send::send_to;

// =============================================================================
// BUYER
// =============================================================================

/// Sync with the seller if possible, export the own blob and create the
/// payout transaction.
pub struct BuyerPreparePaymentSentMessage;

#[async_trait]
impl Task<TradeModel> for BuyerPreparePaymentSentMessage {
    fn name(&self) -> &'static str {
        "BuyerPreparePaymentSentMessage"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let seller = model.trade.seller_slot();
        import_peer_blob(model, seller).await?;
        export_own_blob(model).await?;

        if model.trade.payout_tx_hex.is_none() {
            let destinations = standard_payout(model)?;
            let trade_id = model.trade_id();
            let payout = model
                .wallet()
                .create_payout_tx(&trade_id, destinations)
                .await?;
            info!(trade_id = %trade_id, tx_hash = %payout.hash, "Payout tx created");
            model.trade.payout_tx_hex = Some(payout.hex);
        }
        model.trade.set_state(TradeState::BuyerConfirmedPaymentSent)?;
        Ok(())
    }
}

/// Send `PaymentSent` to the seller (required) and the arbitrator.
pub struct BuyerSendPaymentSentMessage;

#[async_trait]
impl Task<TradeModel> for BuyerSendPaymentSentMessage {
    fn name(&self) -> &'static str {
        "BuyerSendPaymentSentMessage"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let trade = &model.trade;
        let message = PaymentSentMessage {
            counter_currency_tx_id: trade.counter_currency_tx_id.clone(),
            payout_tx_hex: trade
                .payout_tx_hex
                .clone()
                .ok_or(TradeError::MissingData("payout tx"))?,
            updated_multisig_hex: trade
                .own_peer()
                .multisig_hex
                .clone()
                .ok_or(TradeError::MissingData("multisig blob"))?,
        };
        let seller = trade.seller_slot();
        let state = match send_to(model, seller, TradeMessage::PaymentSent(message.clone())).await {
            Ok(SendOutcome::Arrived) => TradeState::BuyerSentPaymentSentMsg,
            Ok(SendOutcome::StoredInMailbox) => TradeState::BuyerStoredInMailboxPaymentSentMsg,
            Err(e) => {
                model.trade.set_state(TradeState::BuyerSendFailedPaymentSentMsg)?;
                return Err(e);
            }
        };
        model.trade.set_state(state)?;
        notify_arbitrator(model, TradeMessage::PaymentSent(message)).await;
        Ok(())
    }
}

// =============================================================================
// SELLER
// =============================================================================

/// Sync with the buyer, check the proposed payout and export the own blob.
pub struct SellerPreparePaymentReceivedMessage;

#[async_trait]
impl Task<TradeModel> for SellerPreparePaymentReceivedMessage {
    fn name(&self) -> &'static str {
        "SellerPreparePaymentReceivedMessage"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let buyer = model.trade.buyer_slot();
        import_peer_blob(model, buyer).await?;
        let payout_hex = model
            .trade
            .payout_tx_hex
            .clone()
            .ok_or(TradeError::MissingData("payout tx"))?;
        let destinations = standard_payout(model)?;
        verify_payout(model, &payout_hex, &destinations).await?;
        export_own_blob(model).await?;
        model.trade.set_state(TradeState::SellerConfirmedPaymentReceipt)?;
        Ok(())
    }
}

/// Cosign and broadcast the buyer's payout transaction.
pub struct SellerPublishPayout;

#[async_trait]
impl Task<TradeModel> for SellerPublishPayout {
    fn name(&self) -> &'static str {
        "SellerPublishPayout"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let payout_hex = model
            .trade
            .payout_tx_hex
            .clone()
            .ok_or(TradeError::MissingData("payout tx"))?;
        let trade_id = model.trade_id();
        let wallet = model.wallet();
        let signed = wallet.sign_multisig_tx(&trade_id, &payout_hex).await?;
        if !signed.fully_signed {
            return Err(TradeError::PayoutMismatch("payout not fully signed".to_string()).into());
        }
        wallet.submit_multisig_tx(&trade_id, &signed.hex).await?;

        let trade = &mut model.trade;
        trade.payout_tx_hash = Some(signed.hash.clone());
        trade.payout_tx_hex = Some(signed.hex.clone());
        trade.advance_payout_state(PayoutState::Published);
        trade.set_state(TradeState::PayoutTxPublished)?;
        info!(trade_id = %trade_id, tx_hash = %signed.hash, "Payout tx published");
        model.process.signed_payout = Some(signed);
        Ok(())
    }
}

/// Send `PaymentReceived` with the signed payout to the buyer (required)
/// and the arbitrator.
pub struct SellerSendPaymentReceivedMessage;

#[async_trait]
impl Task<TradeModel> for SellerSendPaymentReceivedMessage {
    fn name(&self) -> &'static str {
        "SellerSendPaymentReceivedMessage"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let trade = &model.trade;
        let message = PaymentReceivedMessage {
            signed_payout_tx_hex: trade
                .payout_tx_hex
                .clone()
                .ok_or(TradeError::MissingData("payout tx"))?,
            payout_tx_hash: trade
                .payout_tx_hash
                .clone()
                .ok_or(TradeError::MissingData("payout tx hash"))?,
            updated_multisig_hex: trade
                .own_peer()
                .multisig_hex
                .clone()
                .ok_or(TradeError::MissingData("multisig blob"))?,
        };
        let buyer = trade.buyer_slot();
        let state = match send_to(model, buyer, TradeMessage::PaymentReceived(message.clone())).await {
            Ok(SendOutcome::Arrived) => TradeState::SellerSentPaymentReceivedMsg,
            Ok(SendOutcome::StoredInMailbox) => TradeState::SellerStoredInMailboxPaymentReceivedMsg,
            Err(e) => {
                model.trade.set_state(TradeState::SellerSendFailedPaymentReceivedMsg)?;
                return Err(e);
            }
        };
        model.trade.set_state(state)?;
        notify_arbitrator(model, TradeMessage::PaymentReceived(message)).await;
        Ok(())
    }
}

// =============================================================================
// RECEIVERS
// =============================================================================

/// Seller and arbitrator: record the buyer's payout proposal and blob.
pub struct ProcessPaymentSentMessage;

#[async_trait]
impl Task<TradeModel> for ProcessPaymentSentMessage {
    fn name(&self) -> &'static str {
        "ProcessPaymentSentMessage"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let message = model.payload("PaymentSentMessage", |m| match m {
            TradeMessage::PaymentSent(p) => Some(p),
            _ => None,
        })?;
        expect_sender(model, model.trade.buyer_slot())?;
        let trade = &mut model.trade;
        let buyer = trade.buyer_slot();
        trade
            .peer_mut(buyer)
            .receive_multisig_hex(message.updated_multisig_hex);
        trade.payout_tx_hex = Some(message.payout_tx_hex);
        trade.counter_currency_tx_id = message.counter_currency_tx_id;
        trade.set_state(TradeState::SellerReceivedPaymentSentMsg)?;
        Ok(())
    }
}

/// Buyer and arbitrator: verify the signed payout against the contract and
/// the chain, then record it.
pub struct ProcessPaymentReceivedMessage;

#[async_trait]
impl Task<TradeModel> for ProcessPaymentReceivedMessage {
    fn name(&self) -> &'static str {
        "ProcessPaymentReceivedMessage"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let message = model.payload("PaymentReceivedMessage", |m| match m {
            TradeMessage::PaymentReceived(p) => Some(p),
            _ => None,
        })?;
        let seller = model.trade.seller_slot();
        expect_sender(model, seller)?;
        let destinations = standard_payout(model)?;
        verify_payout(model, &message.signed_payout_tx_hex, &destinations).await?;
        confirm_published_payout(model, &message.signed_payout_tx_hex, &message.payout_tx_hash).await?;

        let is_arbitrator = model.strategy().is_arbitrator();
        let trade = &mut model.trade;
        trade
            .peer_mut(seller)
            .receive_multisig_hex(message.updated_multisig_hex);
        trade.payout_tx_hash = Some(message.payout_tx_hash);
        trade.payout_tx_hex = Some(message.signed_payout_tx_hex);
        trade.advance_payout_state(PayoutState::Published);
        trade.set_state(if is_arbitrator {
            TradeState::PayoutTxPublished
        } else {
            TradeState::BuyerReceivedPaymentReceivedMsg
        })?;
        Ok(())
    }
}

/// Traders close the trade once the payout is out.
pub struct CompleteTrade;

#[async_trait]
impl Task<TradeModel> for CompleteTrade {
    fn name(&self) -> &'static str {
        "CompleteTrade"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let trade = &mut model.trade;
        trade.set_state(TradeState::TradeCompleted)?;
        trade.set_disposition(TradeDisposition::Closed);
        info!(trade_id = %trade.id(), "Trade completed");
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn expect_sender(model: &TradeModel, expected: PeerSlot) -> Result<(), TaskError> {
    let (sender, _) = model.sender()?;
    if sender != expected {
        return Err(TradeError::UnexpectedSender {
            sender,
            role: model.trade.protocol_role(),
        }
        .into());
    }
    Ok(())
}

/// The arbitrator copy is best effort; unacknowledged copies are resent on
/// startup.
async fn notify_arbitrator(model: &mut TradeModel, message: TradeMessage) {
    if let Err(e) = send_to(model, PeerSlot::Arbitrator, message).await {
        warn!(trade_id = %model.trade.id(), error = %e, "Arbitrator not notified");
    }
}

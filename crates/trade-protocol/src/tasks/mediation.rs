//! Mediated payout.
//!
//! After mediation closes with a result, each trader accepts it. The first
//! to accept creates and signs the mediated payout and sends it with its
//! sync blob; the second imports the blob, cosigns, broadcasts and notifies
//! the others.

use async_trait::async_trait;
use tracing::info;

use crate::domain::errors::{TaskError, TradeError};
use crate::domain::messages::{MediatedPayoutPublished, MediatedPayoutSignature, TradeMessage};
use crate::domain::phase::{PayoutState, TradeState};
use crate::domain::role::PeerSlot;
use crate::engine::Task;
use crate::model::TradeModel;
use crate::tasks::payment::expect_sender;
use crate::tasks::payout::{
    confirm_published_payout, export_own_blob, import_peer_blob, mediated_payout, verify_payout,
};
use crate::tasks::send::send_to;

/// Payout cycle of mediated payouts; the regular payout uses cycle 0.
pub const MEDIATED_PAYOUT_CYCLE: u32 = 1;

fn counterparty(model: &TradeModel) -> Result<PeerSlot, TaskError> {
    model
        .trade
        .counterparty_slot()
        .ok_or_else(|| TradeError::MissingData("counterparty").into())
}

/// Create or cosign the mediated payout.
pub struct SignMediatedPayout;

#[async_trait]
impl Task<TradeModel> for SignMediatedPayout {
    fn name(&self) -> &'static str {
        "SignMediatedPayout"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        if model.trade.payout_cycle < MEDIATED_PAYOUT_CYCLE {
            model.trade.payout_cycle = MEDIATED_PAYOUT_CYCLE;
        }
        let peer = counterparty(model)?;
        import_peer_blob(model, peer).await?;
        export_own_blob(model).await?;

        let destinations = mediated_payout(model)?;
        let trade_id = model.trade_id();
        let wallet = model.wallet();
        let signed = match model.trade.mediated_payout_tx_hex.clone() {
            Some(proposed) => {
                verify_payout(model, &proposed, &destinations).await?;
                wallet.sign_multisig_tx(&trade_id, &proposed).await?
            }
            None => wallet.create_payout_tx(&trade_id, destinations).await?,
        };
        info!(
            trade_id = %trade_id,
            tx_hash = %signed.hash,
            fully_signed = signed.fully_signed,
            "Mediated payout signed"
        );
        model.process.signed_payout = Some(signed);
        Ok(())
    }
}

/// Broadcast the mediated payout if it carries both signatures.
pub struct MaybeFinalizeMediatedPayout;

#[async_trait]
impl Task<TradeModel> for MaybeFinalizeMediatedPayout {
    fn name(&self) -> &'static str {
        "MaybeFinalizeMediatedPayout"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let Some(signed) = model.process.signed_payout.clone() else {
            return Err(TradeError::MissingData("signed payout").into());
        };
        if !signed.fully_signed {
            return Ok(());
        }
        let trade_id = model.trade_id();
        model
            .wallet()
            .submit_multisig_tx(&trade_id, &signed.hex)
            .await?;
        let trade = &mut model.trade;
        trade.payout_tx_hash = Some(signed.hash.clone());
        trade.payout_tx_hex = Some(signed.hex);
        trade.advance_payout_state(PayoutState::Published);
        trade.set_state(TradeState::PayoutTxPublished)?;
        info!(trade_id = %trade_id, tx_hash = %signed.hash, "Mediated payout published");
        Ok(())
    }
}

/// Send the partially signed payout to the counterparty, or announce the
/// published one to the counterparty and the arbitrator.
pub struct SendMediatedPayoutMessage;

#[async_trait]
impl Task<TradeModel> for SendMediatedPayoutMessage {
    fn name(&self) -> &'static str {
        "SendMediatedPayoutMessage"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let signed = model
            .process
            .signed_payout
            .clone()
            .ok_or(TradeError::MissingData("signed payout"))?;
        let peer = counterparty(model)?;
        if signed.fully_signed {
            let published = TradeMessage::MediatedPayoutPublished(MediatedPayoutPublished {
                payout_tx_hash: signed.hash,
                payout_tx_hex: signed.hex,
            });
            send_to(model, peer, published.clone()).await?;
            send_to(model, PeerSlot::Arbitrator, published).await?;
        } else {
            let updated_multisig_hex = model
                .trade
                .own_peer()
                .multisig_hex
                .clone()
                .ok_or(TradeError::MissingData("multisig blob"))?;
            let signature = TradeMessage::MediatedPayoutSignature(MediatedPayoutSignature {
                payout_tx_hex: signed.hex,
                updated_multisig_hex,
            });
            send_to(model, peer, signature).await?;
        }
        Ok(())
    }
}

/// Store the counterparty's partially signed mediated payout.
pub struct ProcessMediatedPayoutSignature;

#[async_trait]
impl Task<TradeModel> for ProcessMediatedPayoutSignature {
    fn name(&self) -> &'static str {
        "ProcessMediatedPayoutSignature"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let message = model.payload("MediatedPayoutSignature", |m| match m {
            TradeMessage::MediatedPayoutSignature(s) => Some(s),
            _ => None,
        })?;
        let peer = counterparty(model)?;
        expect_sender(model, peer)?;
        let destinations = mediated_payout(model)?;
        verify_payout(model, &message.payout_tx_hex, &destinations).await?;
        model
            .trade
            .peer_mut(peer)
            .receive_multisig_hex(message.updated_multisig_hex);
        model.trade.mediated_payout_tx_hex = Some(message.payout_tx_hex);
        Ok(())
    }
}

/// Record a mediated payout published by the counterparty.
pub struct ProcessMediatedPayoutPublished;

#[async_trait]
impl Task<TradeModel> for ProcessMediatedPayoutPublished {
    fn name(&self) -> &'static str {
        "ProcessMediatedPayoutPublished"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let message = model.payload("MediatedPayoutPublished", |m| match m {
            TradeMessage::MediatedPayoutPublished(p) => Some(p),
            _ => None,
        })?;
        let (sender, _) = model.sender()?;
        if !sender.is_trader() {
            return Err(TradeError::UnexpectedSender {
                sender,
                role: model.trade.protocol_role(),
            }
            .into());
        }
        let destinations = mediated_payout(model)?;
        verify_payout(model, &message.payout_tx_hex, &destinations).await?;
        confirm_published_payout(model, &message.payout_tx_hex, &message.payout_tx_hash).await?;
        let trade = &mut model.trade;
        trade.payout_tx_hash = Some(message.payout_tx_hash);
        trade.payout_tx_hex = Some(message.payout_tx_hex);
        trade.advance_payout_state(PayoutState::Published);
        trade.set_state(TradeState::PayoutTxPublished)?;
        info!(trade_id = %trade.id(), "Mediated payout recorded");
        Ok(())
    }
}

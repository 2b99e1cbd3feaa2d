//! Deposit exchange. Traders hand their signed deposit to the arbitrator,
//! which verifies both and publishes them together.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::errors::{TaskError, TradeError};
use crate::domain::escrow::FundingExpectation;
use crate::domain::messages::{DepositRequest, DepositResponse, MessageKind, TradeMessage};
use crate::domain::phase::TradeState;
use crate::domain::role::PeerSlot;
use crate::engine::{Task, TaskHandle};
use crate::model::TradeModel;
use crate::tasks::init::verify_funding_tx;
use crate::tasks::send::{prepare_for, send_to, send_to_all};

// =============================================================================
// TRADERS
// =============================================================================

/// Once the contract is fully signed, send the own deposit to the arbitrator.
pub struct MaybeSendDepositRequest;

#[async_trait]
impl Task<TradeModel> for MaybeSendDepositRequest {
    fn name(&self) -> &'static str {
        "MaybeSendDepositRequest"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        if !model.strategy().is_trader()
            || model.trade.state() != TradeState::ContractSigned
            || model
                .trade
                .delivered_to(MessageKind::DepositRequest, PeerSlot::Arbitrator)
        {
            return Ok(());
        }
        let own = model.trade.own_peer();
        let deposit = own
            .deposit_tx
            .as_ref()
            .ok_or(TradeError::MissingData("deposit tx"))?;
        let request = DepositRequest {
            contract_signature: own
                .contract_signature
                .clone()
                .ok_or(TradeError::MissingData("contract signature"))?,
            deposit_tx_hex: deposit
                .hex
                .clone()
                .ok_or(TradeError::MissingData("deposit tx hex"))?,
            deposit_tx_key: deposit
                .key
                .clone()
                .ok_or(TradeError::MissingData("deposit tx key"))?,
        };
        send_to(model, PeerSlot::Arbitrator, TradeMessage::DepositRequest(request)).await?;
        model.trade.set_state(TradeState::SentDepositRequest)?;
        Ok(())
    }
}

/// Record the published deposits, or fail with the arbitrator's error.
pub struct ProcessDepositResponse;

#[async_trait]
impl Task<TradeModel> for ProcessDepositResponse {
    fn name(&self) -> &'static str {
        "ProcessDepositResponse"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let response = model.payload("DepositResponse", |m| match m {
            TradeMessage::DepositResponse(r) => Some(r),
            _ => None,
        })?;
        let (sender, _) = model.sender()?;
        if sender != PeerSlot::Arbitrator {
            return Err(TradeError::UnexpectedSender {
                sender,
                role: model.trade.protocol_role(),
            }
            .into());
        }
        if let Some(error) = response.error_message {
            return Err(TaskError::RejectedByPeer(error));
        }
        for (slot, announced) in [
            (PeerSlot::Maker, response.maker_deposit_tx_hash),
            (PeerSlot::Taker, response.taker_deposit_tx_hash),
        ] {
            let deposit = model
                .trade
                .peer_mut(slot)
                .deposit_tx
                .as_mut()
                .ok_or(TradeError::MissingData("deposit tx"))?;
            if announced.as_deref() != Some(deposit.hash.as_str()) {
                return Err(TradeError::DepositMismatch(format!(
                    "published {:?} instead of {}",
                    announced, deposit.hash
                ))
                .into());
            }
            deposit.relayed = true;
        }
        model.trade.set_state(TradeState::DepositTxsPublished)?;
        info!(trade_id = %model.trade.id(), "Deposit txs published");
        Ok(())
    }
}

/// Makers take the offer off the book once deposits are published.
pub struct MakerRemoveOpenOffer;

#[async_trait]
impl Task<TradeModel> for MakerRemoveOpenOffer {
    fn name(&self) -> &'static str {
        "MakerRemoveOpenOffer"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let trade_id = model.trade_id();
        model.offers().close_open_offer(&trade_id).await?;
        Ok(())
    }
}

// =============================================================================
// ARBITRATOR
// =============================================================================

/// Verify a trader's contract signature and deposit transaction.
pub struct ArbitratorProcessDepositRequest;

#[async_trait]
impl Task<TradeModel> for ArbitratorProcessDepositRequest {
    fn name(&self) -> &'static str {
        "ArbitratorProcessDepositRequest"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let request = model.payload("DepositRequest", |m| match m {
            TradeMessage::DepositRequest(r) => Some(r),
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

        let trade = &model.trade;
        let (Some(contract), Some(json)) = (trade.contract(), trade.contract_json()) else {
            return Err(TradeError::MissingData("contract").into());
        };
        contract.verify_signature(json, sender, &request.contract_signature)?;
        let multisig_address = trade
            .multisig_address
            .clone()
            .ok_or(TradeError::MissingData("multisig address"))?;
        let expected = FundingExpectation::deposit(
            trade.offer(),
            sender,
            trade.is_buyer_slot(sender),
            trade.amount,
        );
        let fee_address = trade.offer().fee_address.clone();

        let peer = model.trade.peer_mut(sender);
        peer.contract_signature = Some(request.contract_signature);
        let deposit = peer
            .deposit_tx
            .as_mut()
            .ok_or(TradeError::MissingData("deposit tx"))?;
        deposit.hex = Some(request.deposit_tx_hex);
        deposit.key = Some(request.deposit_tx_key);
        let deposit = deposit.clone();

        verify_funding_tx(
            model.wallet().as_ref(),
            &deposit,
            &expected,
            &fee_address,
            &multisig_address,
            TradeError::DepositMismatch,
        )
        .await?;
        info!(trade_id = %model.trade.id(), peer = ?sender, tx_hash = %deposit.hash, "Deposit tx verified");
        Ok(())
    }
}

/// Relay both deposits once both are verified, then tell the traders.
pub struct ArbitratorMaybePublishDeposits;

#[async_trait]
impl Task<TradeModel> for ArbitratorMaybePublishDeposits {
    fn name(&self) -> &'static str {
        "ArbitratorMaybePublishDeposits"
    }

    async fn run(&self, model: &mut TradeModel, handle: TaskHandle) {
        match self.publish(model).await {
            Ok(true) => {}
            Ok(false) => {
                handle.complete();
                return;
            }
            Err(e) => {
                handle.failed(e);
                return;
            }
        }
        let trade = &model.trade;
        let payload = TradeMessage::DepositResponse(DepositResponse {
            error_message: None,
            maker_deposit_tx_hash: trade.maker.deposit_hash().map(str::to_string),
            taker_deposit_tx_hash: trade.taker.deposit_hash().map(str::to_string),
        });
        match prepare_for(model, &[PeerSlot::Maker, PeerSlot::Taker], &payload) {
            Ok(outgoing) => {
                for (slot, result) in send_to_all(model, &handle, outgoing).await {
                    if let Err(e) = result {
                        warn!(trade_id = %model.trade.id(), peer = ?slot, error = %e, "Deposit response not delivered");
                    }
                }
                handle.complete();
            }
            Err(e) => {
                handle.failed(e);
            }
        }
    }
}

impl ArbitratorMaybePublishDeposits {
    /// Returns whether deposits are (now) published.
    async fn publish(&self, model: &mut TradeModel) -> Result<bool, TaskError> {
        let verified = [PeerSlot::Maker, PeerSlot::Taker].iter().all(|slot| {
            let peer = model.trade.peer(*slot);
            peer.contract_signature.is_some()
                && peer
                    .deposit_tx
                    .as_ref()
                    .map_or(false, |tx| tx.hex.is_some())
        });
        if !verified {
            return Ok(false);
        }
        let wallet = model.wallet();
        for slot in [PeerSlot::Maker, PeerSlot::Taker] {
            let Some(deposit) = model.trade.peer_mut(slot).deposit_tx.as_mut() else {
                continue;
            };
            if deposit.relayed {
                continue;
            }
            let hex = deposit
                .hex
                .clone()
                .ok_or(TradeError::MissingData("deposit tx hex"))?;
            let hash = wallet.relay_tx(&hex).await?;
            if hash != deposit.hash {
                return Err(TradeError::DepositMismatch(format!(
                    "relayed {} instead of {}",
                    hash, deposit.hash
                ))
                .into());
            }
            deposit.relayed = true;
        }
        model.trade.set_state(TradeState::DepositTxsPublished)?;
        info!(trade_id = %model.trade.id(), "Deposit txs relayed");
        Ok(true)
    }
}

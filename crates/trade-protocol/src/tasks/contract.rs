//! Contract exchange.
//!
//! ```text
//! maker ──SignContractRequest──► taker, arbitrator
//! taker ──SignContractRequest──► maker, arbitrator
//!        (each party builds the canonical contract and signs it)
//! every party ──SignContractResponse──► the other two
//! ```
//!
//! A contract is trusted only once the signatures of all three parties
//! verify against the local canonical JSON.

use async_trait::async_trait;
use shared_crypto::sha256;
use tracing::{debug, info};

use crate::domain::errors::{TaskError, TradeError};
use crate::domain::escrow::{FundingExpectation, TxDestination};
use crate::domain::messages::{SignContractRequest, SignContractResponse, TradeMessage};
use crate::domain::peer::TxRecord;
use crate::domain::phase::TradeState;
use crate::engine::{Task, TaskHandle};
use crate::model::TradeModel;
use crate::tasks::send::{prepare_for, send_to_all, Outgoing};

/// Traders: once the multisig wallet exists, replace the reserve with a
/// deposit transaction into it and request contract signatures.
pub struct MaybeSendSignContractRequest;

#[async_trait]
impl Task<TradeModel> for MaybeSendSignContractRequest {
    fn name(&self) -> &'static str {
        "MaybeSendSignContractRequest"
    }

    async fn run(&self, model: &mut TradeModel, handle: TaskHandle) {
        let outgoing = match self.prepare(model).await {
            Ok(outgoing) if !outgoing.is_empty() => outgoing,
            Ok(_) => {
                handle.complete();
                return;
            }
            Err(e) => {
                handle.failed(e);
                return;
            }
        };
        send_to_all(model, &handle, outgoing).await;
        match model.trade.set_state(TradeState::ContractSignatureRequested) {
            Ok(()) => handle.complete(),
            Err(e) => handle.failed(e),
        };
    }
}

impl MaybeSendSignContractRequest {
    async fn prepare(
        &self,
        model: &mut TradeModel,
    ) -> Result<Vec<Outgoing>, TaskError> {
        if !model.strategy().authors_contract() {
            return Ok(Vec::new());
        }
        let Some(multisig_address) = model.trade.multisig_address.clone() else {
            return Ok(Vec::new());
        };
        if model.trade.own_peer().deposit_tx.is_none() {
            create_deposit(model, &multisig_address).await?;
        }

        let own = model.trade.own_peer();
        let request = SignContractRequest {
            account_id: own
                .account_id
                .clone()
                .ok_or(TradeError::MissingData("account id"))?,
            payment_account_payload_hash: own
                .payment_account_payload_hash
                .ok_or(TradeError::MissingData("payment account payload hash"))?,
            payout_address: own
                .payout_address
                .clone()
                .ok_or(TradeError::MissingData("payout address"))?,
            deposit_tx_hash: own
                .deposit_hash()
                .ok_or(TradeError::MissingData("deposit tx"))?
                .to_string(),
            account_age_witness: own.account_age_witness.clone(),
        };
        let recipients = model.strategy().counterparty_and_arbitrator();
        prepare_for(
            model,
            &recipients,
            &TradeMessage::SignContractRequest(request),
        )
    }
}

async fn create_deposit(model: &mut TradeModel, multisig_address: &str) -> Result<(), TaskError> {
    let trade = &model.trade;
    let own_slot = trade.own_slot();
    let expected = FundingExpectation::deposit(
        trade.offer(),
        own_slot,
        trade.is_buyer_slot(own_slot),
        trade.amount,
    );
    let fee_address = trade.offer().fee_address.clone();
    let reserve_images = trade
        .own_peer()
        .reserve_tx
        .as_ref()
        .map(|tx| tx.key_images.clone())
        .unwrap_or_default();

    let wallet = model.wallet();
    if !reserve_images.is_empty() {
        wallet.thaw_outputs(&reserve_images).await?;
    }
    let deposit = wallet
        .create_tx(vec![
            TxDestination::new(fee_address, expected.trade_fee),
            TxDestination::new(multisig_address, expected.locked_amount()),
        ])
        .await?;

    let payload = model.identity().payment_account_payload();
    let own = model.trade.own_peer_mut();
    own.payment_account_payload_hash = Some(sha256(&payload));
    own.payment_account_payload = Some(payload);
    info!(
        trade_id = %model.trade.id(),
        tx_hash = %deposit.hash,
        amount = expected.total(),
        "Deposit tx created"
    );
    model.trade.own_peer_mut().deposit_tx = Some(deposit.into_record());
    Ok(())
}

/// Record the sender's contract data.
pub struct ProcessSignContractRequest;

#[async_trait]
impl Task<TradeModel> for ProcessSignContractRequest {
    fn name(&self) -> &'static str {
        "ProcessSignContractRequest"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let request = model.payload("SignContractRequest", |m| match m {
            TradeMessage::SignContractRequest(r) => Some(r),
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
        let peer = model.trade.peer_mut(sender);
        if let Some(recorded) = &peer.payout_address {
            if *recorded != request.payout_address {
                return Err(TradeError::ReserveMismatch(format!(
                    "payout address {} differs from reserve address {}",
                    request.payout_address, recorded
                ))
                .into());
            }
        }
        if let Some(deposit) = &peer.deposit_tx {
            if deposit.hash != request.deposit_tx_hash {
                return Err(TradeError::DepositMismatch(format!(
                    "deposit hash changed from {} to {}",
                    deposit.hash, request.deposit_tx_hash
                ))
                .into());
            }
        } else {
            peer.deposit_tx = Some(TxRecord::from_hash(request.deposit_tx_hash));
        }
        peer.payout_address = Some(request.payout_address);
        peer.account_id = Some(request.account_id);
        peer.payment_account_payload_hash = Some(request.payment_account_payload_hash);
        peer.account_age_witness = request.account_age_witness;
        Ok(())
    }
}

/// Build and sign the contract once every party's data is known.
pub struct MaybeSignContract;

#[async_trait]
impl Task<TradeModel> for MaybeSignContract {
    fn name(&self) -> &'static str {
        "MaybeSignContract"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        if model.trade.contract().is_some() {
            return Ok(());
        }
        let Some(contract) = model.trade.build_contract() else {
            debug!(trade_id = %model.trade.id(), "Contract data incomplete");
            return Ok(());
        };
        let hash = model.trade.set_contract(contract)?;
        let json = model
            .trade
            .contract_json()
            .ok_or(TradeError::MissingData("contract json"))?
            .to_string();
        let signature = model.identity().sign(json.as_bytes());
        model.trade.own_peer_mut().contract_signature = Some(signature);
        model.process.contract_ready.set(hash);
        info!(trade_id = %model.trade.id(), contract_hash = %hex::encode(hash), "Contract signed");
        Ok(())
    }
}

/// Send the own contract signature to the other two parties.
pub struct MaybeSendSignContractResponse;

#[async_trait]
impl Task<TradeModel> for MaybeSendSignContractResponse {
    fn name(&self) -> &'static str {
        "MaybeSendSignContractResponse"
    }

    async fn run(&self, model: &mut TradeModel, handle: TaskHandle) {
        let (Some(hash), Some(signature)) = (
            model.trade.contract_hash(),
            model.trade.own_peer().contract_signature.clone(),
        ) else {
            handle.complete();
            return;
        };
        let payment_account_payload = if model.strategy().is_trader() {
            model.trade.own_peer().payment_account_payload.clone()
        } else {
            None
        };
        let payload = TradeMessage::SignContractResponse(SignContractResponse {
            contract_hash: hash,
            contract_signature: signature,
            payment_account_payload,
        });
        let recipients = model.strategy().other_parties();
        match prepare_for(model, &recipients, &payload) {
            Ok(outgoing) => {
                send_to_all(model, &handle, outgoing).await;
                handle.complete();
            }
            Err(e) => {
                handle.failed(e);
            }
        }
    }
}

/// Verify a peer's contract signature against the local contract.
pub struct ProcessSignContractResponse;

#[async_trait]
impl Task<TradeModel> for ProcessSignContractResponse {
    fn name(&self) -> &'static str {
        "ProcessSignContractResponse"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let response = model.payload("SignContractResponse", |m| match m {
            TradeMessage::SignContractResponse(r) => Some(r),
            _ => None,
        })?;
        let (sender, _) = model.sender()?;
        let trade = &mut model.trade;
        let (Some(contract), Some(json)) = (trade.contract(), trade.contract_json()) else {
            return Err(TradeError::MissingData("contract").into());
        };
        if trade.contract_hash() != Some(response.contract_hash) {
            return Err(TradeError::ContractMismatch.into());
        }
        contract.verify_signature(json, sender, &response.contract_signature)?;

        if sender.is_trader() {
            let payload = response
                .payment_account_payload
                .ok_or(TradeError::MissingData("payment account payload"))?;
            if trade.peer(sender).payment_account_payload_hash != Some(sha256(&payload)) {
                return Err(TradeError::ContractMismatch.into());
            }
            trade.peer_mut(sender).payment_account_payload = Some(payload);
        }
        trade.peer_mut(sender).contract_signature = Some(response.contract_signature);

        if trade.verify_contract_signatures()? {
            trade.set_state(TradeState::ContractSigned)?;
            info!(trade_id = %trade.id(), "Contract signed by all parties");
        }
        Ok(())
    }
}

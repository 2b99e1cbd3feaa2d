//! Multisig wallet setup: every party prepares, exchanges its prepared hex
//! with the other two and makes the 2-of-3 wallet once both are known.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::errors::{TaskError, TradeError};
use crate::domain::messages::{InitMultisigRequest, TradeMessage};
use crate::domain::phase::TradeState;
use crate::engine::{Task, TaskHandle};
use crate::model::TradeModel;
use crate::tasks::send::{prepare_for, send_to_all};

/// Signatures required to spend from the escrow wallet.
pub const MULTISIG_THRESHOLD: u32 = 2;

/// Record the prepared multisig hex of the sender.
pub struct ProcessInitMultisigRequest;

#[async_trait]
impl Task<TradeModel> for ProcessInitMultisigRequest {
    fn name(&self) -> &'static str {
        "ProcessInitMultisigRequest"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let request = model.payload("InitMultisigRequest", |m| match m {
            TradeMessage::InitMultisigRequest(r) => Some(r),
            _ => None,
        })?;
        let (sender, _) = model.sender()?;
        model
            .trade
            .peer_mut(sender)
            .set_prepared_multisig_hex(sender, request.prepared_multisig_hex)?;
        Ok(())
    }
}

/// Prepare the own side of the multisig wallet (once).
pub struct PrepareMultisig;

#[async_trait]
impl Task<TradeModel> for PrepareMultisig {
    fn name(&self) -> &'static str {
        "PrepareMultisig"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        if model.trade.own_peer().prepared_multisig_hex.is_some() {
            return Ok(());
        }
        let trade_id = model.trade_id();
        let wallet = model.wallet();
        wallet.open_or_create_multisig_wallet(&trade_id).await?;
        let prepared = wallet.prepare_multisig(&trade_id).await?;
        let own_slot = model.trade.own_slot();
        model
            .trade
            .own_peer_mut()
            .set_prepared_multisig_hex(own_slot, prepared)?;
        model.trade.set_state(TradeState::MultisigPrepared)?;
        debug!(trade_id = %trade_id, "Multisig prepared");
        Ok(())
    }
}

/// Send the own prepared hex to every party that has not received it.
/// Both sends run concurrently and share the task handle.
pub struct SendInitMultisigRequests;

#[async_trait]
impl Task<TradeModel> for SendInitMultisigRequests {
    fn name(&self) -> &'static str {
        "SendInitMultisigRequests"
    }

    async fn run(&self, model: &mut TradeModel, handle: TaskHandle) {
        let Some(prepared) = model.trade.own_peer().prepared_multisig_hex.clone() else {
            handle.failed(TradeError::MissingData("prepared multisig hex"));
            return;
        };
        let payload = TradeMessage::InitMultisigRequest(InitMultisigRequest {
            prepared_multisig_hex: prepared,
        });
        let recipients = model.strategy().other_parties();
        let outgoing = match prepare_for(model, &recipients, &payload) {
            Ok(outgoing) => outgoing,
            Err(e) => {
                handle.failed(e);
                return;
            }
        };
        send_to_all(model, &handle, outgoing).await;
        handle.complete();
    }
}

/// Make the multisig wallet once both peers' prepared hexes are known.
pub struct MaybeMakeMultisig;

#[async_trait]
impl Task<TradeModel> for MaybeMakeMultisig {
    fn name(&self) -> &'static str {
        "MaybeMakeMultisig"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        if model.trade.multisig_address.is_some() {
            return Ok(());
        }
        let others = model.strategy().other_parties();
        let hexes: Option<Vec<String>> = others
            .iter()
            .map(|slot| model.trade.peer(*slot).prepared_multisig_hex.clone())
            .collect();
        let Some(hexes) = hexes else {
            debug!(trade_id = %model.trade.id(), "Waiting for prepared multisig hex");
            return Ok(());
        };
        let trade_id = model.trade_id();
        let address = model
            .wallet()
            .make_multisig(&trade_id, hexes, MULTISIG_THRESHOLD)
            .await?;
        info!(trade_id = %trade_id, multisig_address = %address, "Multisig wallet made");
        model.trade.multisig_address = Some(address);
        model.trade.set_state(TradeState::MultisigMade)?;
        Ok(())
    }
}

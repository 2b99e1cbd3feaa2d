//! Trade initialisation: reserve funds and relay the init request
//! taker → arbitrator → maker → arbitrator.

use async_trait::async_trait;
use shared_types::amounts::within_tolerance;
use tracing::{debug, info};

use crate::domain::errors::{TaskError, TradeError};
use crate::domain::escrow::{FundingExpectation, TxDestination};
use crate::domain::messages::{InitTradeRequest, ReserveProof, TradeMessage};
use crate::domain::peer::TxRecord;
use crate::domain::phase::TradeState;
use crate::domain::role::PeerSlot;
use crate::engine::Task;
use crate::model::TradeModel;
use crate::ports::WalletService;
use crate::tasks::send::send_to;

// =============================================================================
// TAKER
// =============================================================================

/// Create and freeze the taker's reserve transaction (fee + locked amount to
/// the own return address). Never relayed.
pub struct TakerReserveTradeFunds;

#[async_trait]
impl Task<TradeModel> for TakerReserveTradeFunds {
    fn name(&self) -> &'static str {
        "TakerReserveTradeFunds"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        if model.trade.own_peer().reserve_tx.is_some() {
            return Ok(());
        }
        let trade = &model.trade;
        let is_buyer = trade.is_buyer_slot(PeerSlot::Taker);
        let expected = FundingExpectation::reserve(trade.offer(), PeerSlot::Taker, is_buyer, trade.amount);
        let wallet = model.wallet();
        let return_address = wallet.primary_address();

        let reserve = wallet
            .create_tx(vec![
                TxDestination::new(trade.offer().fee_address.clone(), expected.trade_fee),
                TxDestination::new(return_address.clone(), expected.locked_amount()),
            ])
            .await?;
        wallet.freeze_outputs(&reserve.key_images).await?;

        let account_id = model.identity().account_id();
        let own = model.trade.own_peer_mut();
        own.reserve_tx = Some(reserve.into_record());
        own.payout_address = Some(return_address);
        own.account_id = Some(account_id);
        model.trade.set_state(TradeState::ReserveFundsCreated)?;
        Ok(())
    }
}

/// Open the trade at the arbitrator.
pub struct TakerSendInitTradeRequestToArbitrator;

#[async_trait]
impl Task<TradeModel> for TakerSendInitTradeRequestToArbitrator {
    fn name(&self) -> &'static str {
        "TakerSendInitTradeRequestToArbitrator"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let trade = &model.trade;
        let own = trade.own_peer();
        let request = InitTradeRequest {
            trade_amount: trade.amount,
            trade_price: trade.price,
            maker_node_address: trade.offer().maker_node_address.clone(),
            taker_node_address: model.network().own_address(),
            arbitrator_node_address: trade.offer().arbitrator_node_address.clone(),
            maker_pub_key_ring: Some(trade.offer().maker_pub_key_ring),
            taker_pub_key_ring: Some(model.identity().pub_key_ring()),
            account_id: own.account_id.clone(),
            reserve: Some(reserve_proof(own.reserve_tx.as_ref(), own.payout_address.as_ref())?),
        };
        send_to(model, PeerSlot::Arbitrator, TradeMessage::InitTradeRequest(request)).await?;
        model.trade.set_state(TradeState::SentInitTradeRequest)?;
        Ok(())
    }
}

// =============================================================================
// ALL ROLES
// =============================================================================

/// Validate an incoming init request against the offer and record what it
/// carries.
pub struct ProcessInitTradeRequest;

#[async_trait]
impl Task<TradeModel> for ProcessInitTradeRequest {
    fn name(&self) -> &'static str {
        "ProcessInitTradeRequest"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let request = model.payload("InitTradeRequest", |m| match m {
            TradeMessage::InitTradeRequest(r) => Some(r),
            _ => None,
        })?;
        let (sender, sender_ring) = model.sender()?;
        let role = model.trade.protocol_role();
        let offer = model.trade.offer().clone();

        // Addresses must agree with the offer and with what is on file.
        if request.maker_node_address != offer.maker_node_address {
            return Err(TradeError::PeerAddressMismatch {
                slot: PeerSlot::Maker,
                recorded: offer.maker_node_address.clone(),
                claimed: request.maker_node_address.clone(),
            }
            .into());
        }
        if request.arbitrator_node_address != offer.arbitrator_node_address {
            return Err(TradeError::PeerAddressMismatch {
                slot: PeerSlot::Arbitrator,
                recorded: offer.arbitrator_node_address.clone(),
                claimed: request.arbitrator_node_address.clone(),
            }
            .into());
        }
        if request.maker_pub_key_ring != Some(offer.maker_pub_key_ring) {
            return Err(TradeError::PeerKeyMismatch(PeerSlot::Maker).into());
        }
        let taker_ring = request
            .taker_pub_key_ring
            .ok_or(TradeError::MissingData("taker key ring"))?;

        // The sender must be the party expected to send this hop.
        match (role.is_arbitrator(), sender) {
            (true, PeerSlot::Taker) => {
                if taker_ring != sender_ring {
                    return Err(TradeError::PeerKeyMismatch(PeerSlot::Taker).into());
                }
                if let Some(address) = &model.process.temp_trading_peer_address {
                    if *address != request.taker_node_address {
                        return Err(TradeError::PeerAddressMismatch {
                            slot: PeerSlot::Taker,
                            recorded: address.clone(),
                            claimed: request.taker_node_address.clone(),
                        }
                        .into());
                    }
                }
            }
            (true, PeerSlot::Maker) => {
                if sender_ring != offer.maker_pub_key_ring {
                    return Err(TradeError::PeerKeyMismatch(PeerSlot::Maker).into());
                }
            }
            (false, PeerSlot::Arbitrator) if role.is_maker() => {
                let accepted = model
                    .identity()
                    .accepted_arbitrator(&offer.arbitrator_node_address);
                if accepted != Some(sender_ring) {
                    return Err(TradeError::PeerKeyMismatch(PeerSlot::Arbitrator).into());
                }
                model
                    .trade
                    .peer_mut(PeerSlot::Arbitrator)
                    .record_pub_key_ring(PeerSlot::Arbitrator, sender_ring)?;
            }
            _ => return Err(TradeError::UnexpectedSender { sender, role }.into()),
        }

        // Amount and price.
        offer.check_amount(request.trade_amount)?;
        if !within_tolerance(offer.price, request.trade_price, model.config().price_tolerance) {
            return Err(TradeError::PriceOutOfTolerance {
                offered: offer.price,
                requested: request.trade_price,
            }
            .into());
        }
        let trade = &mut model.trade;
        if trade.state() != TradeState::Preparation && trade.amount != request.trade_amount {
            return Err(TradeError::AmountMismatch {
                locked: trade.amount,
                requested: request.trade_amount,
            }
            .into());
        }
        trade.amount = request.trade_amount;
        trade.price = request.trade_price;

        let taker = trade.peer_mut(PeerSlot::Taker);
        taker.record_node_address(PeerSlot::Taker, &request.taker_node_address)?;
        taker.record_pub_key_ring(PeerSlot::Taker, taker_ring)?;

        // Reserve proof of the sending trader.
        if let Some(reserve) = request.reserve {
            let peer = trade.peer_mut(sender);
            peer.reserve_tx = Some(TxRecord {
                hash: reserve.tx_hash,
                hex: Some(reserve.tx_hex),
                key: Some(reserve.tx_key),
                key_images: Vec::new(),
                relayed: false,
            });
            peer.payout_address = Some(reserve.payout_address);
            peer.account_id = request.account_id.clone();
        } else if role.is_arbitrator() {
            return Err(TradeError::MissingData("reserve proof").into());
        }

        trade.set_state(TradeState::ReceivedInitTradeRequest)?;
        debug!(trade_id = %trade.id(), sender = ?sender, amount = trade.amount, "Init trade request accepted");
        Ok(())
    }
}

// =============================================================================
// ARBITRATOR
// =============================================================================

/// Independently verify the sender's reserve transaction.
pub struct ArbitratorProcessReserveTx;

#[async_trait]
impl Task<TradeModel> for ArbitratorProcessReserveTx {
    fn name(&self) -> &'static str {
        "ArbitratorProcessReserveTx"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let (sender, _) = model.sender()?;
        let trade = &model.trade;
        let peer = trade.peer(sender);
        let reserve = peer
            .reserve_tx
            .clone()
            .ok_or(TradeError::MissingData("reserve tx"))?;
        let payout_address = peer
            .payout_address
            .clone()
            .ok_or(TradeError::MissingData("reserve payout address"))?;
        let expected = FundingExpectation::reserve(
            trade.offer(),
            sender,
            trade.is_buyer_slot(sender),
            trade.amount,
        );
        let fee_address = trade.offer().fee_address.clone();

        verify_funding_tx(
            model.wallet().as_ref(),
            &reserve,
            &expected,
            &fee_address,
            &payout_address,
            TradeError::ReserveMismatch,
        )
        .await?;

        model.trade.peer_mut(sender).reserve_verified = true;
        info!(trade_id = %model.trade.id(), peer = ?sender, tx_hash = %reserve.hash, "Reserve tx verified");
        Ok(())
    }
}

/// Forward the verified taker request to the maker.
pub struct ArbitratorSendInitTradeRequestToMaker;

#[async_trait]
impl Task<TradeModel> for ArbitratorSendInitTradeRequestToMaker {
    fn name(&self) -> &'static str {
        "ArbitratorSendInitTradeRequestToMaker"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let trade = &model.trade;
        let request = InitTradeRequest {
            trade_amount: trade.amount,
            trade_price: trade.price,
            maker_node_address: trade.offer().maker_node_address.clone(),
            taker_node_address: trade
                .taker
                .node_address
                .clone()
                .ok_or(TradeError::MissingData("taker address"))?,
            arbitrator_node_address: trade.offer().arbitrator_node_address.clone(),
            maker_pub_key_ring: Some(trade.offer().maker_pub_key_ring),
            taker_pub_key_ring: trade.taker.pub_key_ring,
            account_id: None,
            reserve: None,
        };
        send_to(model, PeerSlot::Maker, TradeMessage::InitTradeRequest(request)).await?;
        model.trade.set_state(TradeState::SentInitTradeRequest)?;
        Ok(())
    }
}

// =============================================================================
// MAKER
// =============================================================================

/// Reserve the open offer for this trade and send the maker's request (with
/// the offer's reserve tx) to the arbitrator.
pub struct MakerSendInitTradeRequestToArbitrator;

#[async_trait]
impl Task<TradeModel> for MakerSendInitTradeRequestToArbitrator {
    fn name(&self) -> &'static str {
        "MakerSendInitTradeRequestToArbitrator"
    }

    async fn execute(&self, model: &mut TradeModel) -> Result<(), TaskError> {
        let trade_id = model.trade_id();
        let open_offer = model.offers().reserve_open_offer(&trade_id).await?;
        let account_id = model.identity().account_id();
        let own = model.trade.own_peer_mut();
        own.reserve_tx = Some(open_offer.reserve_tx.clone());
        own.payout_address = Some(open_offer.payout_address.clone());
        own.account_id = Some(account_id.clone());

        let trade = &model.trade;
        let request = InitTradeRequest {
            trade_amount: trade.amount,
            trade_price: trade.price,
            maker_node_address: trade.offer().maker_node_address.clone(),
            taker_node_address: trade
                .taker
                .node_address
                .clone()
                .ok_or(TradeError::MissingData("taker address"))?,
            arbitrator_node_address: trade.offer().arbitrator_node_address.clone(),
            maker_pub_key_ring: Some(trade.offer().maker_pub_key_ring),
            taker_pub_key_ring: trade.taker.pub_key_ring,
            account_id: Some(account_id),
            reserve: Some(reserve_proof(
                Some(&open_offer.reserve_tx),
                Some(&open_offer.payout_address),
            )?),
        };
        send_to(model, PeerSlot::Arbitrator, TradeMessage::InitTradeRequest(request)).await?;
        model.trade.set_state(TradeState::SentInitTradeRequest)?;
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn reserve_proof(
    reserve: Option<&TxRecord>,
    payout_address: Option<&String>,
) -> Result<ReserveProof, TradeError> {
    let reserve = reserve.ok_or(TradeError::MissingData("reserve tx"))?;
    Ok(ReserveProof {
        tx_hash: reserve.hash.clone(),
        tx_hex: reserve
            .hex
            .clone()
            .ok_or(TradeError::MissingData("reserve tx hex"))?,
        tx_key: reserve
            .key
            .clone()
            .ok_or(TradeError::MissingData("reserve tx key"))?,
        payout_address: payout_address
            .cloned()
            .ok_or(TradeError::MissingData("payout address"))?,
    })
}

/// Check a reserve or deposit transaction without relaying it: the daemon
/// accepts it, it is not a double spend, its hash is the one on file, and
/// the tx key proves the fee and locked outputs.
///
/// Shape deviations are reported through `mismatch`; wallet errors pass
/// through unchanged so RPC faults stay transient.
pub(crate) async fn verify_funding_tx(
    wallet: &dyn WalletService,
    tx: &TxRecord,
    expected: &FundingExpectation,
    fee_address: &str,
    locked_address: &str,
    mismatch: fn(String) -> TradeError,
) -> Result<(), TaskError> {
    let reject = |reason: String| -> TaskError { mismatch(reason).into() };
    let hex = tx.hex.as_deref().ok_or_else(|| reject("missing tx hex".to_string()))?;
    let key = tx.key.as_deref().ok_or_else(|| reject("missing tx key".to_string()))?;

    let submitted = wallet.submit_tx_hex(hex, false).await?;
    if submitted.is_double_spend {
        return Err(reject("double spend".to_string()));
    }
    if !submitted.is_good {
        return Err(reject(
            submitted
                .reason
                .unwrap_or_else(|| "rejected by daemon".to_string()),
        ));
    }
    if submitted.tx_hash != tx.hash {
        return Err(reject(format!(
            "hash {} does not match announced {}",
            submitted.tx_hash, tx.hash
        )));
    }

    let fee = wallet.check_tx_key(&tx.hash, key, fee_address).await?;
    let locked = wallet.check_tx_key(&tx.hash, key, locked_address).await?;
    expected.verify(fee.received, locked.received).map_err(reject)
}

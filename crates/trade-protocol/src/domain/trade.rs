//! # Trade Aggregate
//!
//! A trade is identified by the id of the offer it was taken from. It is
//! mutated only by protocol steps running under the trade's lock.
//!
//! ## Invariants
//!
//! - The trade id never changes.
//! - The phase only advances; `revert_for_dispute` is the single exception
//!   and requires an open dispute.
//! - Once a deposit has been relayed the trade is funds-locked.
//! - The contract hash is always the digest of the stored canonical JSON.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_types::{envelope::unix_now, Hash, NodeAddress, PubKeyRing, TradeId};

use crate::domain::contract::Contract;
use crate::domain::errors::TradeError;
use crate::domain::escrow::MediationResult;
use crate::domain::messages::MessageKind;
use crate::domain::offer::Offer;
use crate::domain::outbound::OutboundMessage;
use crate::domain::peer::TradingPeer;
use crate::domain::phase::{DisputeState, PayoutState, TradeDisposition, TradePhase, TradeState};
use crate::domain::role::{PeerSlot, ProtocolRole, TradeRole};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    id: TradeId,
    role: TradeRole,
    offer: Offer,
    /// Agreed trade amount (atomic units).
    pub amount: u64,
    /// Agreed price.
    pub price: u64,
    phase: TradePhase,
    state: TradeState,
    dispute_state: DisputeState,
    payout_state: PayoutState,
    disposition: TradeDisposition,
    pub maker: TradingPeer,
    pub taker: TradingPeer,
    pub arbitrator: TradingPeer,
    contract: Option<Contract>,
    contract_json: Option<String>,
    #[serde_as(as = "Option<Hex>")]
    contract_hash: Option<Hash>,
    pub multisig_address: Option<String>,
    pub payout_tx_hash: Option<String>,
    pub payout_tx_hex: Option<String>,
    /// Incremented each time a new payout transaction is negotiated.
    pub payout_cycle: u32,
    pub counter_currency_tx_id: Option<String>,
    pub mediation_result: Option<MediationResult>,
    /// Partially signed mediated payout received from the other trader.
    pub mediated_payout_tx_hex: Option<String>,
    pub error_message: Option<String>,
    outbound: Vec<OutboundMessage>,
    created_at: u64,
}

impl Trade {
    /// New trade for `offer`. The maker and arbitrator slots are seeded from
    /// the offer; the taker slot is filled by the first request.
    pub fn new(role: TradeRole, offer: Offer, amount: u64, price: u64) -> Self {
        let maker = TradingPeer::with_address(
            offer.maker_node_address.clone(),
            Some(offer.maker_pub_key_ring),
        );
        let arbitrator = TradingPeer::with_address(offer.arbitrator_node_address.clone(), None);
        Self {
            id: offer.id.clone(),
            role,
            offer,
            amount,
            price,
            phase: TradePhase::Init,
            state: TradeState::Preparation,
            dispute_state: DisputeState::NoDispute,
            payout_state: PayoutState::Unpublished,
            disposition: TradeDisposition::Active,
            maker,
            taker: TradingPeer::default(),
            arbitrator,
            contract: None,
            contract_json: None,
            contract_hash: None,
            multisig_address: None,
            payout_tx_hash: None,
            payout_tx_hex: None,
            payout_cycle: 0,
            counter_currency_tx_id: None,
            mediation_result: None,
            mediated_payout_tx_hex: None,
            error_message: None,
            outbound: Vec::new(),
            created_at: unix_now(),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn id(&self) -> &TradeId {
        &self.id
    }

    pub fn role(&self) -> TradeRole {
        self.role
    }

    pub fn protocol_role(&self) -> ProtocolRole {
        ProtocolRole::resolve(self.role, self.offer.direction)
    }

    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    pub fn phase(&self) -> TradePhase {
        self.phase
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn dispute_state(&self) -> DisputeState {
        self.dispute_state
    }

    pub fn payout_state(&self) -> PayoutState {
        self.payout_state
    }

    pub fn disposition(&self) -> TradeDisposition {
        self.disposition
    }

    pub fn contract(&self) -> Option<&Contract> {
        self.contract.as_ref()
    }

    pub fn contract_json(&self) -> Option<&str> {
        self.contract_json.as_deref()
    }

    pub fn contract_hash(&self) -> Option<Hash> {
        self.contract_hash
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    // =========================================================================
    // PEERS
    // =========================================================================

    pub fn own_slot(&self) -> PeerSlot {
        self.role.slot()
    }

    pub fn peer(&self, slot: PeerSlot) -> &TradingPeer {
        match slot {
            PeerSlot::Maker => &self.maker,
            PeerSlot::Taker => &self.taker,
            PeerSlot::Arbitrator => &self.arbitrator,
        }
    }

    pub fn peer_mut(&mut self, slot: PeerSlot) -> &mut TradingPeer {
        match slot {
            PeerSlot::Maker => &mut self.maker,
            PeerSlot::Taker => &mut self.taker,
            PeerSlot::Arbitrator => &mut self.arbitrator,
        }
    }

    pub fn own_peer(&self) -> &TradingPeer {
        self.peer(self.own_slot())
    }

    pub fn own_peer_mut(&mut self) -> &mut TradingPeer {
        let slot = self.own_slot();
        self.peer_mut(slot)
    }

    pub fn buyer_slot(&self) -> PeerSlot {
        if self.offer.is_buyer_maker() {
            PeerSlot::Maker
        } else {
            PeerSlot::Taker
        }
    }

    pub fn seller_slot(&self) -> PeerSlot {
        if self.offer.is_buyer_maker() {
            PeerSlot::Taker
        } else {
            PeerSlot::Maker
        }
    }

    pub fn is_buyer_slot(&self, slot: PeerSlot) -> bool {
        slot == self.buyer_slot()
    }

    /// Resolve which slot a message came from.
    ///
    /// The slot is found by address, falling back to the key ring. If a ring
    /// is on file for the slot it must equal the claimed one.
    pub fn identify_sender(
        &self,
        address: &NodeAddress,
        ring: &PubKeyRing,
    ) -> Result<PeerSlot, TradeError> {
        let by_address = PeerSlot::ALL
            .into_iter()
            .filter(|slot| *slot != self.own_slot())
            .find(|slot| self.peer(*slot).node_address.as_ref() == Some(address));
        let slot = match by_address {
            Some(slot) => slot,
            None => PeerSlot::ALL
                .into_iter()
                .filter(|slot| *slot != self.own_slot())
                .find(|slot| self.peer(*slot).pub_key_ring.as_ref() == Some(ring))
                .ok_or_else(|| TradeError::UnknownPeer(address.clone()))?,
        };
        match self.peer(slot).pub_key_ring {
            Some(existing) if existing != *ring => Err(TradeError::PeerKeyMismatch(slot)),
            _ => Ok(slot),
        }
    }

    // =========================================================================
    // PHASE AND STATE
    // =========================================================================

    /// Move to `state`; its phase must not be earlier than the current one.
    pub fn set_state(&mut self, state: TradeState) -> Result<(), TradeError> {
        let phase = state.phase();
        if phase < self.phase {
            return Err(TradeError::PhaseRegression {
                from: self.phase,
                to: phase,
            });
        }
        self.phase = phase;
        self.state = state;
        Ok(())
    }

    /// Explicit backward move while a dispute is open.
    pub fn revert_for_dispute(&mut self, phase: TradePhase) -> Result<(), TradeError> {
        if self.dispute_state != DisputeState::DisputeOpen {
            return Err(TradeError::DisputeNotOpen(self.dispute_state));
        }
        self.phase = phase;
        self.state = TradeState::entry_of(phase);
        Ok(())
    }

    pub fn set_dispute_state(&mut self, target: DisputeState) -> Result<(), TradeError> {
        self.dispute_state.transition_to(target)
    }

    /// Payout state only moves forward; returns whether it changed.
    pub fn advance_payout_state(&mut self, target: PayoutState) -> bool {
        if target > self.payout_state {
            self.payout_state = target;
            true
        } else {
            false
        }
    }

    pub fn set_disposition(&mut self, disposition: TradeDisposition) {
        self.disposition = disposition;
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Deposits are (or may be) in the multisig wallet.
    pub fn is_funds_locked(&self) -> bool {
        self.phase.funds_locked()
            || [&self.maker, &self.taker]
                .iter()
                .any(|p| p.deposit_tx.as_ref().map_or(false, |tx| tx.relayed))
    }

    /// Both deposits observed unlocked.
    pub fn deposits_unlocked(&self) -> bool {
        self.maker.deposit_locked == Some(false) && self.taker.deposit_locked == Some(false)
    }

    /// Slot of the trader that is not this node (traders only).
    pub fn counterparty_slot(&self) -> Option<PeerSlot> {
        match self.own_slot() {
            PeerSlot::Maker => Some(PeerSlot::Taker),
            PeerSlot::Taker => Some(PeerSlot::Maker),
            PeerSlot::Arbitrator => None,
        }
    }

    // =========================================================================
    // CONTRACT
    // =========================================================================

    /// Assemble the contract once every party's data is on file.
    pub fn build_contract(&self) -> Option<Contract> {
        let maker = &self.maker;
        let taker = &self.taker;
        Some(Contract {
            offer_id: self.id.clone(),
            trade_amount: self.amount,
            trade_price: self.price,
            currency_code: self.offer.currency_code.clone(),
            payment_method_id: self.offer.payment_method_id.clone(),
            is_buyer_maker_and_seller_taker: self.offer.is_buyer_maker(),
            maker_node_address: maker.node_address.clone()?,
            taker_node_address: taker.node_address.clone()?,
            arbitrator_node_address: self.arbitrator.node_address.clone()?,
            maker_pub_key_ring: maker.pub_key_ring?,
            taker_pub_key_ring: taker.pub_key_ring?,
            arbitrator_pub_key_ring: self.arbitrator.pub_key_ring?,
            maker_account_id: maker.account_id.clone()?,
            taker_account_id: taker.account_id.clone()?,
            maker_payment_account_payload_hash: hex::encode(maker.payment_account_payload_hash?),
            taker_payment_account_payload_hash: hex::encode(taker.payment_account_payload_hash?),
            maker_payout_address: maker.payout_address.clone()?,
            taker_payout_address: taker.payout_address.clone()?,
            maker_deposit_tx_hash: maker.deposit_hash()?.to_string(),
            taker_deposit_tx_hash: taker.deposit_hash()?.to_string(),
            buyer_security_deposit: self.offer.buyer_security_deposit,
            seller_security_deposit: self.offer.seller_security_deposit,
        })
    }

    /// Store the contract with its canonical JSON; returns the hash.
    pub fn set_contract(&mut self, contract: Contract) -> Result<Hash, TradeError> {
        let json = contract.canonical_json()?;
        let hash = Contract::hash_json(&json);
        self.contract = Some(contract);
        self.contract_json = Some(json);
        self.contract_hash = Some(hash);
        Ok(hash)
    }

    /// `Ok(true)` when all three signatures are present and valid,
    /// `Ok(false)` while some are missing, an error if one is invalid.
    pub fn verify_contract_signatures(&self) -> Result<bool, TradeError> {
        let (Some(contract), Some(json)) = (&self.contract, &self.contract_json) else {
            return Ok(false);
        };
        let mut complete = true;
        for slot in PeerSlot::ALL {
            match &self.peer(slot).contract_signature {
                Some(signature) => contract.verify_signature(json, slot, signature)?,
                None => complete = false,
            }
        }
        Ok(complete)
    }

    // =========================================================================
    // OUTBOUND LOG
    // =========================================================================

    pub fn outbound(&self) -> &[OutboundMessage] {
        &self.outbound
    }

    pub fn record_outbound(&mut self, message: OutboundMessage) {
        self.outbound.push(message);
    }

    pub fn outbound_mut(&mut self, uid: &str) -> Option<&mut OutboundMessage> {
        self.outbound.iter_mut().find(|m| m.uid == uid)
    }

    /// A message of `kind` reached `recipient` (or its mailbox).
    pub fn delivered_to(&self, kind: MessageKind, recipient: PeerSlot) -> bool {
        self.outbound
            .iter()
            .any(|m| m.kind == kind && m.recipient == recipient && m.status.is_delivered())
    }
}

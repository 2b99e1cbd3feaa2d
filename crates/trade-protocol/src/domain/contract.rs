//! # Trade Contract
//!
//! The contract is the agreement all three parties sign. It is serialized to
//! canonical JSON (sorted keys, no whitespace) and each party signs the
//! SHA-256 digest of those exact bytes. A contract is trusted only when the
//! maker, taker and arbitrator signatures all verify against the same JSON.

use serde::{Deserialize, Serialize};
use shared_crypto::{sha256, verify_with_ring};
use shared_types::{Hash, NodeAddress, PubKeyRing, TradeId};

use crate::domain::errors::TradeError;
use crate::domain::role::PeerSlot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub offer_id: TradeId,
    pub trade_amount: u64,
    pub trade_price: u64,
    pub currency_code: String,
    pub payment_method_id: String,
    pub is_buyer_maker_and_seller_taker: bool,
    pub maker_node_address: NodeAddress,
    pub taker_node_address: NodeAddress,
    pub arbitrator_node_address: NodeAddress,
    pub maker_pub_key_ring: PubKeyRing,
    pub taker_pub_key_ring: PubKeyRing,
    pub arbitrator_pub_key_ring: PubKeyRing,
    pub maker_account_id: String,
    pub taker_account_id: String,
    pub maker_payment_account_payload_hash: String,
    pub taker_payment_account_payload_hash: String,
    pub maker_payout_address: String,
    pub taker_payout_address: String,
    pub maker_deposit_tx_hash: String,
    pub taker_deposit_tx_hash: String,
    pub buyer_security_deposit: u64,
    pub seller_security_deposit: u64,
}

impl Contract {
    /// Canonical JSON: object keys sorted at every level, no whitespace.
    pub fn canonical_json(&self) -> Result<String, TradeError> {
        // serde_json::Value objects are BTreeMaps, so keys come out sorted.
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }

    /// SHA-256 of the canonical JSON.
    pub fn hash_json(json: &str) -> Hash {
        sha256(json.as_bytes())
    }

    pub fn pub_key_ring(&self, slot: PeerSlot) -> &PubKeyRing {
        match slot {
            PeerSlot::Maker => &self.maker_pub_key_ring,
            PeerSlot::Taker => &self.taker_pub_key_ring,
            PeerSlot::Arbitrator => &self.arbitrator_pub_key_ring,
        }
    }

    pub fn buyer_slot(&self) -> PeerSlot {
        if self.is_buyer_maker_and_seller_taker {
            PeerSlot::Maker
        } else {
            PeerSlot::Taker
        }
    }

    pub fn seller_slot(&self) -> PeerSlot {
        if self.is_buyer_maker_and_seller_taker {
            PeerSlot::Taker
        } else {
            PeerSlot::Maker
        }
    }

    pub fn payout_address(&self, slot: PeerSlot) -> Option<&str> {
        match slot {
            PeerSlot::Maker => Some(&self.maker_payout_address),
            PeerSlot::Taker => Some(&self.taker_payout_address),
            PeerSlot::Arbitrator => None,
        }
    }

    pub fn buyer_payout_address(&self) -> &str {
        if self.is_buyer_maker_and_seller_taker {
            &self.maker_payout_address
        } else {
            &self.taker_payout_address
        }
    }

    pub fn seller_payout_address(&self) -> &str {
        if self.is_buyer_maker_and_seller_taker {
            &self.taker_payout_address
        } else {
            &self.maker_payout_address
        }
    }

    /// Verify `signature` by `slot` over the canonical `json`.
    pub fn verify_signature(
        &self,
        json: &str,
        slot: PeerSlot,
        signature: &[u8],
    ) -> Result<(), TradeError> {
        verify_with_ring(self.pub_key_ring(slot), json.as_bytes(), signature)
            .map_err(|_| TradeError::InvalidContractSignature(slot))
    }
}

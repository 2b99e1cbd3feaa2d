//! Per-party protocol data.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_types::{Hash, NodeAddress, PubKeyRing};

use crate::domain::errors::TradeError;
use crate::domain::role::PeerSlot;

/// A transaction as far as the protocol knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub hash: String,
    pub hex: Option<String>,
    pub key: Option<String>,
    /// Key images of the spent outputs (own transactions only).
    pub key_images: Vec<String>,
    /// Broadcast to the network.
    pub relayed: bool,
}

impl TxRecord {
    /// A transaction known only by hash.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            hex: None,
            key: None,
            key_images: Vec::new(),
            relayed: false,
        }
    }
}

/// Multisig sync progress for one peer slot.
///
/// For the own slot `Exported` means our blob for the current payout cycle
/// exists; for a peer slot `Synced` means its latest blob was imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MultisigSyncState {
    #[default]
    Stale,
    Exported,
    Synced,
}

/// Account age witness data carried with the contract request.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAgeWitness {
    #[serde_as(as = "Hex")]
    pub hash: Hash,
    pub date: u64,
}

/// Everything one party (maker, taker or arbitrator) contributed so far.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingPeer {
    pub node_address: Option<NodeAddress>,
    pub pub_key_ring: Option<PubKeyRing>,
    pub account_id: Option<String>,
    #[serde_as(as = "Option<Hex>")]
    pub payment_account_payload_hash: Option<Hash>,
    #[serde_as(as = "Option<Hex>")]
    pub payment_account_payload: Option<Vec<u8>>,
    pub payout_address: Option<String>,
    pub reserve_tx: Option<TxRecord>,
    pub reserve_verified: bool,
    pub deposit_tx: Option<TxRecord>,
    /// `None` unknown, `Some(true)` locked, `Some(false)` unlocked.
    pub deposit_locked: Option<bool>,
    #[serde_as(as = "Option<Hex>")]
    pub contract_signature: Option<Vec<u8>>,
    pub prepared_multisig_hex: Option<String>,
    /// Latest multisig sync blob of this peer.
    pub multisig_hex: Option<String>,
    pub multisig_sync: MultisigSyncState,
    /// Payout cycle the blob in `multisig_hex` was exported for (own slot).
    pub exported_in_cycle: Option<u32>,
    pub account_age_witness: Option<AccountAgeWitness>,
}

impl TradingPeer {
    pub fn with_address(node_address: NodeAddress, pub_key_ring: Option<PubKeyRing>) -> Self {
        Self {
            node_address: Some(node_address),
            pub_key_ring,
            ..Self::default()
        }
    }

    /// Record the key ring on first contact; later it must match.
    pub fn record_pub_key_ring(&mut self, slot: PeerSlot, ring: PubKeyRing) -> Result<(), TradeError> {
        match self.pub_key_ring {
            Some(existing) if existing != ring => Err(TradeError::PeerKeyMismatch(slot)),
            Some(_) => Ok(()),
            None => {
                self.pub_key_ring = Some(ring);
                Ok(())
            }
        }
    }

    /// Record the address on first contact; later it must match.
    pub fn record_node_address(
        &mut self,
        slot: PeerSlot,
        address: &NodeAddress,
    ) -> Result<(), TradeError> {
        match &self.node_address {
            Some(existing) if existing != address => Err(TradeError::PeerAddressMismatch {
                slot,
                recorded: existing.clone(),
                claimed: address.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.node_address = Some(address.clone());
                Ok(())
            }
        }
    }

    /// Prepared multisig hex is immutable once set.
    pub fn set_prepared_multisig_hex(&mut self, slot: PeerSlot, hex: String) -> Result<(), TradeError> {
        match &self.prepared_multisig_hex {
            Some(existing) if *existing != hex => Err(TradeError::MultisigHexConflict(slot)),
            Some(_) => Ok(()),
            None => {
                self.prepared_multisig_hex = Some(hex);
                Ok(())
            }
        }
    }

    /// Store a peer's new sync blob; it must be imported again.
    pub fn receive_multisig_hex(&mut self, hex: String) {
        if self.multisig_hex.as_ref() != Some(&hex) {
            self.multisig_hex = Some(hex);
            self.multisig_sync = MultisigSyncState::Stale;
        }
    }

    pub fn deposit_hash(&self) -> Option<&str> {
        self.deposit_tx.as_ref().map(|tx| tx.hash.as_str())
    }
}

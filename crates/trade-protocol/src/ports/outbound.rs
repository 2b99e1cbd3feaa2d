//! # Outbound Ports
//!
//! Collaborators the protocol drives. Implementations live outside the
//! engine: the in-memory adapters of this crate and the simulated wallet and
//! network of the test suite.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{NodeAddress, PubKeyRing, TradeId};

use crate::domain::errors::{NetworkError, OfferBookError, PersistenceError, WalletError};
use crate::domain::escrow::{TxDescription, TxDestination};
use crate::domain::messages::ProtocolEnvelope;
use crate::domain::offer::Offer;
use crate::domain::peer::TxRecord;
use crate::domain::trade::Trade;

// =============================================================================
// WALLET
// =============================================================================

/// A transaction created but not relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTx {
    pub hash: String,
    pub hex: String,
    pub key: String,
    pub fee: u64,
    pub key_images: Vec<String>,
}

impl CreatedTx {
    pub fn into_record(self) -> TxRecord {
        TxRecord {
            hash: self.hash,
            hex: Some(self.hex),
            key: Some(self.key),
            key_images: self.key_images,
            relayed: false,
        }
    }
}

/// Daemon verdict on a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTxResult {
    pub is_good: bool,
    pub is_double_spend: bool,
    pub tx_hash: String,
    pub reason: Option<String>,
}

/// Amount a transaction pays an address, proven with the tx key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxKeyCheck {
    pub received: u64,
    pub in_pool: bool,
    pub confirmations: u64,
}

/// Chain status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
    pub relayed: bool,
    pub confirmations: u64,
    pub is_locked: bool,
}

/// A multisig transaction and its signing progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMultisigTx {
    pub hash: String,
    pub hex: String,
    pub fully_signed: bool,
}

/// Wallet operations used by protocol tasks.
///
/// Multisig operations are scoped to the trade's multisig wallet.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Address change and payouts are received at.
    fn primary_address(&self) -> String;

    async fn open_or_create_multisig_wallet(&self, trade_id: &TradeId) -> Result<(), WalletError>;

    /// Create a transaction without relaying it.
    async fn create_tx(&self, destinations: Vec<TxDestination>) -> Result<CreatedTx, WalletError>;

    async fn freeze_outputs(&self, key_images: &[String]) -> Result<(), WalletError>;

    async fn thaw_outputs(&self, key_images: &[String]) -> Result<(), WalletError>;

    /// Submit a raw transaction to the daemon, relaying it only if asked.
    async fn submit_tx_hex(&self, tx_hex: &str, relay: bool) -> Result<SubmitTxResult, WalletError>;

    async fn check_tx_key(
        &self,
        tx_hash: &str,
        tx_key: &str,
        address: &str,
    ) -> Result<TxKeyCheck, WalletError>;

    /// `None` if the transaction is unknown to the daemon.
    async fn get_tx_status(&self, tx_hash: &str) -> Result<Option<TxStatus>, WalletError>;

    /// Relay a previously created transaction; returns its hash.
    async fn relay_tx(&self, tx_hex: &str) -> Result<String, WalletError>;

    async fn prepare_multisig(&self, trade_id: &TradeId) -> Result<String, WalletError>;

    /// Combine prepared hexes into the shared wallet; returns its address.
    async fn make_multisig(
        &self,
        trade_id: &TradeId,
        peer_prepared_hexes: Vec<String>,
        threshold: u32,
    ) -> Result<String, WalletError>;

    async fn export_multisig_hex(&self, trade_id: &TradeId) -> Result<String, WalletError>;

    /// Import peer sync blobs; returns the number of outputs refreshed.
    async fn import_multisig_hex(
        &self,
        trade_id: &TradeId,
        hexes: Vec<String>,
    ) -> Result<usize, WalletError>;

    /// Create a payout from the multisig wallet, signed by this wallet. The
    /// miner fee is split evenly across `destinations`.
    async fn create_payout_tx(
        &self,
        trade_id: &TradeId,
        destinations: Vec<TxDestination>,
    ) -> Result<SignedMultisigTx, WalletError>;

    async fn describe_tx(&self, trade_id: &TradeId, tx_hex: &str) -> Result<TxDescription, WalletError>;

    async fn sign_multisig_tx(
        &self,
        trade_id: &TradeId,
        tx_hex: &str,
    ) -> Result<SignedMultisigTx, WalletError>;

    /// Relay a fully signed multisig transaction; returns the tx hashes.
    async fn submit_multisig_tx(&self, trade_id: &TradeId, tx_hex: &str) -> Result<Vec<String>, WalletError>;
}

// =============================================================================
// NETWORK
// =============================================================================

/// How a message reached its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendOutcome {
    Arrived,
    StoredInMailbox,
}

/// Message transport. Encryption and mailbox storage are the adapter's
/// concern; the ring identifies the recipient.
#[async_trait]
pub trait NetworkService: Send + Sync {
    fn own_address(&self) -> NodeAddress;

    async fn send_direct_message(
        &self,
        peer: &NodeAddress,
        peer_ring: &PubKeyRing,
        envelope: ProtocolEnvelope,
    ) -> Result<SendOutcome, NetworkError>;

    async fn send_mailbox_message(
        &self,
        peer: &NodeAddress,
        peer_ring: &PubKeyRing,
        envelope: ProtocolEnvelope,
    ) -> Result<SendOutcome, NetworkError>;
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Trade storage. Requests are asynchronous and coalesced.
#[async_trait]
pub trait TradePersistence: Send + Sync {
    fn request_persistence(&self, trade: &Trade);

    async fn load_trades(&self) -> Result<Vec<Trade>, PersistenceError>;
}

// =============================================================================
// IDENTITY
// =============================================================================

/// This node's keys and account data.
pub trait IdentityService: Send + Sync {
    fn pub_key_ring(&self) -> PubKeyRing;

    /// Sign the digest of `data`.
    fn sign(&self, data: &[u8]) -> Vec<u8>;

    /// Key ring of an accepted arbitrator, if `address` is one.
    fn accepted_arbitrator(&self, address: &NodeAddress) -> Option<PubKeyRing>;

    fn account_id(&self) -> String;

    /// Payment account payload shared with the counterparty.
    fn payment_account_payload(&self) -> Vec<u8>;
}

// =============================================================================
// OFFERS
// =============================================================================

/// Lifecycle of an own offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenOfferState {
    Available,
    Reserved,
    Closed,
}

/// An own offer with the reserve transaction backing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOffer {
    pub offer: Offer,
    pub reserve_tx: TxRecord,
    pub payout_address: String,
    pub state: OpenOfferState,
}

/// Offer book: public offers and this node's open offers.
#[async_trait]
pub trait OpenOfferService: Send + Sync {
    /// Public offer by id.
    fn find_offer(&self, offer_id: &TradeId) -> Option<Offer>;

    /// Own open offer by id.
    fn open_offer(&self, offer_id: &TradeId) -> Option<OpenOffer>;

    async fn add_open_offer(&self, open_offer: OpenOffer) -> Result<(), OfferBookError>;

    /// Reserve an available offer for a trade.
    async fn reserve_open_offer(&self, offer_id: &TradeId) -> Result<OpenOffer, OfferBookError>;

    /// Make a reserved offer available again.
    async fn release_open_offer(&self, offer_id: &TradeId) -> Result<(), OfferBookError>;

    /// Close the offer and remove it from the public book.
    async fn close_open_offer(&self, offer_id: &TradeId) -> Result<(), OfferBookError>;
}

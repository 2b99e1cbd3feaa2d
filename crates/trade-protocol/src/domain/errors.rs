//! # Error Types
//!
//! One enum per layer:
//!
//! | Enum | Layer | Raised by |
//! |------|-------|-----------|
//! | `TradeError` | domain | aggregate invariants and validation |
//! | `WalletError` | port | `WalletService` implementations |
//! | `NetworkError` | port | `NetworkService` implementations |
//! | `OfferBookError` | port | `OpenOfferService` implementations |
//! | `PersistenceError` | port | `TradePersistence` implementations |
//! | `TaskError` | engine | causes passed to `TaskHandle::failed` |
//! | `ProtocolError` | API | `TradeProtocol` and `TradeManager` callers |

use shared_crypto::CryptoError;
use shared_types::{NodeAddress, TradeId};
use thiserror::Error;

use crate::domain::phase::{DisputeState, TradeDisposition, TradePhase, TradeState};
use crate::domain::role::{PeerSlot, ProtocolRole};
use crate::engine::TaskFailure;

/// Domain errors: invariant violations and failed validations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TradeError {
    /// Attempted to move the trade to an earlier phase.
    #[error("Phase regression from {from:?} to {to:?}")]
    PhaseRegression { from: TradePhase, to: TradePhase },

    /// A state was set that does not belong to the requested phase.
    #[error("State {state:?} does not belong to phase {phase:?}")]
    StateOutsidePhase { state: TradeState, phase: TradePhase },

    /// Dispute state transition not allowed.
    #[error("Invalid dispute transition from {from:?} to {to:?}")]
    InvalidDisputeTransition { from: DisputeState, to: DisputeState },

    /// Operation requires an open dispute.
    #[error("Dispute not open (state {0:?})")]
    DisputeNotOpen(DisputeState),

    /// Disposition does not allow the operation.
    #[error("Trade is {0:?}")]
    InvalidDisposition(TradeDisposition),

    /// Message carried another trade's id.
    #[error("Trade id mismatch: expected {expected}, got {actual}")]
    TradeIdMismatch { expected: TradeId, actual: TradeId },

    /// Claimed sender's key ring differs from the ring on file.
    #[error("Key ring mismatch for {0:?}")]
    PeerKeyMismatch(PeerSlot),

    /// Peer disagrees with an address recorded for a slot.
    #[error("Address mismatch for {slot:?}: recorded {recorded}, got {claimed}")]
    PeerAddressMismatch {
        slot: PeerSlot,
        recorded: NodeAddress,
        claimed: NodeAddress,
    },

    /// Sender is not a party of this trade.
    #[error("Unknown peer {0}")]
    UnknownPeer(NodeAddress),

    /// A message came from a party not allowed to send it in this role.
    #[error("Unexpected sender {sender:?} for role {role:?}")]
    UnexpectedSender { sender: PeerSlot, role: ProtocolRole },

    /// Trade amount outside the offer's range.
    #[error("Amount {amount} outside offer range {min}..={max}")]
    AmountOutOfRange { amount: u64, min: u64, max: u64 },

    /// Trade amount disagrees with the amount already locked in.
    #[error("Amount mismatch: locked {locked}, requested {requested}")]
    AmountMismatch { locked: u64, requested: u64 },

    /// Requested price deviates from the offer price beyond tolerance.
    #[error("Price {requested} outside tolerance of offer price {offered}")]
    PriceOutOfTolerance { offered: u64, requested: u64 },

    /// Reserve transaction does not have the expected shape.
    #[error("Reserve tx rejected: {0}")]
    ReserveMismatch(String),

    /// Deposit transaction does not have the expected shape.
    #[error("Deposit tx rejected: {0}")]
    DepositMismatch(String),

    /// Payout transaction does not pay what the contract says.
    #[error("Payout tx rejected: {0}")]
    PayoutMismatch(String),

    /// Peer's contract hash differs from ours.
    #[error("Contract hash mismatch")]
    ContractMismatch,

    /// A contract signature failed to verify against the canonical JSON.
    #[error("Invalid contract signature from {0:?}")]
    InvalidContractSignature(PeerSlot),

    /// Prepared multisig hex changed after it was recorded.
    #[error("Conflicting prepared multisig hex from {0:?}")]
    MultisigHexConflict(PeerSlot),

    /// Data required by a step is not available.
    #[error("Missing {0}")]
    MissingData(&'static str),

    /// Offer parameters are invalid.
    #[error("Invalid offer: {0}")]
    InvalidOffer(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TradeError {
    fn from(e: serde_json::Error) -> Self {
        TradeError::Serialization(e.to_string())
    }
}

/// Wallet collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    /// Wallet RPC unreachable or failed.
    #[error("Wallet RPC error: {0}")]
    Rpc(String),

    /// Not enough unlocked funds.
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// Transaction could not be decoded.
    #[error("Malformed transaction: {0}")]
    MalformedTx(String),

    /// Transaction unknown to the wallet or daemon.
    #[error("Unknown transaction {0}")]
    UnknownTx(String),

    /// Tx key does not prove the transaction.
    #[error("Invalid tx key for {0}")]
    InvalidTxKey(String),

    /// Daemon rejected the transaction.
    #[error("Transaction rejected: {0}")]
    TxRejected(String),

    /// Multisig wallet is missing a peer's sync data.
    #[error("Multisig wallet not synced: {0}")]
    MultisigNotSynced(String),

    /// Multisig wallet not set up for the operation.
    #[error("Multisig not ready: {0}")]
    MultisigNotReady(String),
}

/// Network collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Peer is not reachable for a direct message.
    #[error("Peer {0} offline")]
    PeerOffline(NodeAddress),

    /// Message could not be sent.
    #[error("Send failed: {0}")]
    SendFault(String),
}

/// Offer book collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OfferBookError {
    /// No open offer with this id.
    #[error("Open offer {0} not found")]
    NotFound(TradeId),

    /// Offer is reserved by another trade or closed.
    #[error("Open offer {0} not available")]
    NotAvailable(TradeId),

    /// Offer with this id already exists.
    #[error("Offer {0} already exists")]
    AlreadyExists(TradeId),
}

/// Persistence collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// Stored data could not be read.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Cause of a task failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    OfferBook(#[from] OfferBookError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A peer reported an error instead of the expected data.
    #[error("Rejected by peer: {0}")]
    RejectedByPeer(String),

    /// The current message is not the one the task handles.
    #[error("Unexpected message {0}")]
    UnexpectedMessage(&'static str),

    /// Every handle of a task was dropped without a signal.
    #[error("Task {0} finished without signalling")]
    Abandoned(&'static str),
}

impl TaskError {
    /// Transient I/O causes leave the trade at its last good phase so the
    /// step can be triggered again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TaskError::Wallet(WalletError::Rpc(_)) | TaskError::Network(_)
        )
    }
}

/// Errors returned to callers of the protocol engine.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No open trade with this id.
    #[error("Unknown trade {0}")]
    UnknownTrade(TradeId),

    /// A trade with this id already exists.
    #[error("Trade {0} already exists")]
    TradeExists(TradeId),

    /// No route for the action in this role.
    #[error("Action {action} not available for {role:?}")]
    ActionNotAvailable {
        action: &'static str,
        role: ProtocolRole,
    },

    /// Step rejected before running.
    #[error("Step {step} rejected: {reason}")]
    Rejected { step: &'static str, reason: String },

    /// A task of the pipeline failed.
    #[error(transparent)]
    Task(#[from] TaskFailure),

    /// The step timer fired first.
    #[error("Step {0} timed out")]
    Timeout(String),

    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    OfferBook(#[from] OfferBookError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The spawned action task was cancelled.
    #[error("Action cancelled")]
    Cancelled,
}

//! # Trade Phases and States
//!
//! ```text
//! Init ──→ DepositsPublished ──→ DepositsConfirmed ──→ PaymentSent
//!                                                          │
//!      Withdrawn ←── PayoutPublished ←── PaymentReceived ←─┘
//! ```
//!
//! Phases are ordered and only move forward, except for the explicit
//! dispute-revert path. Each fine-grained `TradeState` belongs to exactly one
//! phase; setting a state implies its phase.

use serde::{Deserialize, Serialize};

use crate::domain::errors::TradeError;

/// Coarse protocol position. Ordering follows the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TradePhase {
    Init,
    DepositsPublished,
    DepositsConfirmed,
    PaymentSent,
    PaymentReceived,
    PayoutPublished,
    Withdrawn,
}

impl TradePhase {
    /// Every phase, in protocol order.
    pub const ALL: [TradePhase; 7] = [
        TradePhase::Init,
        TradePhase::DepositsPublished,
        TradePhase::DepositsConfirmed,
        TradePhase::PaymentSent,
        TradePhase::PaymentReceived,
        TradePhase::PayoutPublished,
        TradePhase::Withdrawn,
    ];

    /// From this phase on the deposits are in the multisig wallet.
    pub fn funds_locked(self) -> bool {
        self >= TradePhase::DepositsPublished
    }
}

/// Fine-grained protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeState {
    // Init
    Preparation,
    ReserveFundsCreated,
    SentInitTradeRequest,
    ReceivedInitTradeRequest,
    MultisigPrepared,
    MultisigMade,
    ContractSignatureRequested,
    ContractSigned,
    SentDepositRequest,
    // DepositsPublished
    DepositTxsPublished,
    // DepositsConfirmed
    DepositTxsUnlocked,
    // PaymentSent
    BuyerConfirmedPaymentSent,
    BuyerSentPaymentSentMsg,
    BuyerStoredInMailboxPaymentSentMsg,
    BuyerSawArrivedPaymentSentMsg,
    BuyerSendFailedPaymentSentMsg,
    SellerReceivedPaymentSentMsg,
    // PaymentReceived
    SellerConfirmedPaymentReceipt,
    // PayoutPublished
    SellerSentPaymentReceivedMsg,
    SellerStoredInMailboxPaymentReceivedMsg,
    SellerSawArrivedPaymentReceivedMsg,
    SellerSendFailedPaymentReceivedMsg,
    BuyerReceivedPaymentReceivedMsg,
    PayoutTxPublished,
    // Withdrawn
    TradeCompleted,
}

impl TradeState {
    /// Phase this state belongs to.
    pub fn phase(self) -> TradePhase {
        use TradeState::*;
        match self {
            Preparation
            | ReserveFundsCreated
            | SentInitTradeRequest
            | ReceivedInitTradeRequest
            | MultisigPrepared
            | MultisigMade
            | ContractSignatureRequested
            | ContractSigned
            | SentDepositRequest => TradePhase::Init,
            DepositTxsPublished => TradePhase::DepositsPublished,
            DepositTxsUnlocked => TradePhase::DepositsConfirmed,
            BuyerConfirmedPaymentSent
            | BuyerSentPaymentSentMsg
            | BuyerStoredInMailboxPaymentSentMsg
            | BuyerSawArrivedPaymentSentMsg
            | BuyerSendFailedPaymentSentMsg
            | SellerReceivedPaymentSentMsg => TradePhase::PaymentSent,
            SellerConfirmedPaymentReceipt => TradePhase::PaymentReceived,
            SellerSentPaymentReceivedMsg
            | SellerStoredInMailboxPaymentReceivedMsg
            | SellerSawArrivedPaymentReceivedMsg
            | SellerSendFailedPaymentReceivedMsg
            | BuyerReceivedPaymentReceivedMsg
            | PayoutTxPublished => TradePhase::PayoutPublished,
            TradeCompleted => TradePhase::Withdrawn,
        }
    }

    /// First state of a phase, used when a phase is entered without a more
    /// specific state (dispute revert).
    pub fn entry_of(phase: TradePhase) -> TradeState {
        match phase {
            TradePhase::Init => TradeState::Preparation,
            TradePhase::DepositsPublished => TradeState::DepositTxsPublished,
            TradePhase::DepositsConfirmed => TradeState::DepositTxsUnlocked,
            TradePhase::PaymentSent => TradeState::BuyerConfirmedPaymentSent,
            TradePhase::PaymentReceived => TradeState::SellerConfirmedPaymentReceipt,
            TradePhase::PayoutPublished => TradeState::PayoutTxPublished,
            TradePhase::Withdrawn => TradeState::TradeCompleted,
        }
    }
}

/// Mediation and arbitration progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeState {
    NoDispute,
    MediationRequested,
    MediationOpen,
    MediationClosed,
    DisputeOpen,
    DisputeClosed,
}

impl DisputeState {
    /// Check if transition to `target` is allowed.
    pub fn can_transition_to(&self, target: DisputeState) -> bool {
        use DisputeState::*;
        matches!(
            (self, target),
            (NoDispute, MediationRequested)
                | (NoDispute, DisputeOpen)
                | (MediationRequested, MediationOpen)
                | (MediationRequested, MediationClosed)
                | (MediationOpen, MediationClosed)
                | (MediationClosed, DisputeOpen)
                | (DisputeOpen, DisputeClosed)
        )
    }

    /// Transition to `target` if allowed.
    pub fn transition_to(&mut self, target: DisputeState) -> Result<(), TradeError> {
        if !self.can_transition_to(target) {
            return Err(TradeError::InvalidDisputeTransition {
                from: *self,
                to: target,
            });
        }
        *self = target;
        Ok(())
    }

    /// Any mediation or dispute has been started.
    pub fn is_started(&self) -> bool {
        *self != DisputeState::NoDispute
    }
}

/// Payout transaction progress, independent of the phase (mediated payouts
/// publish without passing the payment phases).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PayoutState {
    Unpublished,
    Published,
    Confirmed,
    Unlocked,
}

/// Lifecycle classification of a trade outside its protocol position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeDisposition {
    /// Protocol running normally.
    Active,
    /// A step timed out; late triggers are dropped until an operator acts.
    Errored,
    /// A failure after deposits; flagged for manual recovery.
    FundsLocked,
    /// Failed before any funds were locked; archived.
    Failed,
    /// Completed; archived.
    Closed,
}

impl TradeDisposition {
    /// Normal protocol steps run only on active trades.
    pub fn accepts_protocol_steps(self) -> bool {
        self == TradeDisposition::Active
    }

    /// Dispute and mediated-payout steps also run on errored and
    /// funds-locked trades, which is how those trades are recovered.
    pub fn accepts_dispute_steps(self) -> bool {
        matches!(
            self,
            TradeDisposition::Active | TradeDisposition::Errored | TradeDisposition::FundsLocked
        )
    }

    /// Archived trades are no longer driven by a protocol.
    pub fn is_archived(self) -> bool {
        matches!(self, TradeDisposition::Failed | TradeDisposition::Closed)
    }
}

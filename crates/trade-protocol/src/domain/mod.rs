//! Domain layer: the trade aggregate, its peers, contract and messages.

pub mod contract;
pub mod errors;
pub mod escrow;
pub mod messages;
pub mod offer;
pub mod outbound;
pub mod peer;
pub mod phase;
pub mod role;
pub mod trade;

pub use contract::Contract;
pub use errors::{
    NetworkError, OfferBookError, PersistenceError, ProtocolError, TaskError, TradeError,
    WalletError,
};
pub use escrow::{
    fee_share, FundingExpectation, MediationResult, PayoutBreakdown, TxDescription, TxDestination,
};
pub use messages::{
    AckMessage, DepositRequest, DepositResponse, InitMultisigRequest, InitTradeRequest,
    MediatedPayoutPublished, MediatedPayoutSignature, MessageKind, PaymentReceivedMessage,
    PaymentSentMessage, ProtocolEnvelope, ReserveProof, SignContractRequest,
    SignContractResponse, TradeMessage,
};
pub use offer::{Offer, OfferDirection};
pub use outbound::{DeliveryStatus, OutboundMessage};
pub use peer::{AccountAgeWitness, MultisigSyncState, TradingPeer, TxRecord};
pub use phase::{DisputeState, PayoutState, TradeDisposition, TradePhase, TradeState};
pub use role::{PeerSlot, ProtocolRole, TradeRole};
pub use trade::Trade;

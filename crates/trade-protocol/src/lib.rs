//! # Trade Protocol
//!
//! Three-party (maker, taker, arbitrator) escrow trade protocol over a
//! 2-of-3 multisig wallet.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Drive one trade from offer take to payout:
//! - reserve and deposit transactions, verified by the arbitrator
//! - a signed contract shared by all three parties
//! - regular payout after the counter-currency payment
//! - mediated payout when traders disagree
//!
//! ## Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | Phases never regress | `Trade::set_state` rejects lower phases |
//! | Messages handled once | per-node processed uid cache |
//! | One step at a time per trade | per-trade model lock |
//! | No lost messages | acks plus mailbox resend on startup |
//!
//! ## Module Structure
//!
//! ```text
//! trade-protocol/
//! ├── domain/       # Trade aggregate, phases, contract, messages, errors
//! ├── engine/       # Task, TaskRunner, StepTimer, AwaitedField
//! ├── protocol/     # Conditions, fluent steps, routing table, TradeProtocol
//! ├── tasks/        # Protocol tasks per stage
//! ├── reliability/  # Acks and mailbox redelivery
//! ├── offer/        # Offer placement pipeline
//! ├── ports/        # TradeProtocolApi, wallet/network/persistence/identity
//! ├── adapters/     # In-memory offer book, trade store, key ring identity
//! └── manager.rs    # TradeManager: registry, dispatch, startup
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod manager;
pub mod model;
pub mod offer;
pub mod ports;
pub mod protocol;
pub(crate) mod reliability;
pub mod tasks;


// Re-exports
pub use adapters::{InMemoryOfferBook, InMemoryTradeStore, KeyRingIdentity, PublicOfferBook};
pub use config::ProtocolConfig;
pub use domain::{
    Contract, DisputeState, MediationResult, Offer, OfferDirection, PayoutState, PeerSlot,
    ProtocolEnvelope, ProtocolError, TaskError, Trade, TradeDisposition, TradeError,
    TradeMessage, TradePhase, TradeRole, TradeState, TxDestination,
};
pub use manager::TradeManager;
pub use model::ProtocolServices;
pub use offer::{place_offer, PlaceOfferRequest};
pub use ports::{
    CreatedTx, IdentityService, InboundMessage, NetworkService, OpenOffer, OpenOfferService,
    OpenOfferState, SendOutcome, SignedMultisigTx, SubmitTxResult, TradePersistence,
    TradeProtocolApi, TxKeyCheck, TxStatus, WalletService,
};
pub use protocol::{DispatchOutcome, RoutingTable, TradeProtocol, UserAction};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

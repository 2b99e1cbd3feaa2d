//! Ports: the engine's inbound API and the collaborators it drives.

pub mod inbound;
pub mod outbound;

pub use inbound::{InboundMessage, TradeProtocolApi};
pub use outbound::{
    CreatedTx, IdentityService, NetworkService, OpenOffer, OpenOfferService, OpenOfferState,
    SendOutcome, SignedMultisigTx, SubmitTxResult, TradePersistence, TxKeyCheck, TxStatus,
    WalletService,
};

//! # Protocol Tasks
//!
//! | Module | Tasks |
//! |--------|-------|
//! | `init` | reserve funds, relay and validate `InitTradeRequest`, verify reserves |
//! | `multisig` | prepare, exchange and make the 2-of-3 wallet |
//! | `contract` | deposit creation, contract request, signing and verification |
//! | `deposit` | deposit request, arbitrator verification and publication |
//! | `payment` | payment confirmation and the regular payout |
//! | `mediation` | mediated payout |
//!
//! `send` and `payout` hold helpers shared by the tasks.

pub mod contract;
pub mod deposit;
pub mod init;
pub mod mediation;
pub mod multisig;
pub mod payment;
pub(crate) mod payout;
pub(crate) mod send;

pub use contract::{
    MaybeSendSignContractRequest, MaybeSendSignContractResponse, MaybeSignContract,
    ProcessSignContractRequest, ProcessSignContractResponse,
};
pub use deposit::{
    ArbitratorMaybePublishDeposits, ArbitratorProcessDepositRequest, MakerRemoveOpenOffer,
    MaybeSendDepositRequest, ProcessDepositResponse,
};
pub use init::{
    ArbitratorProcessReserveTx, ArbitratorSendInitTradeRequestToMaker,
    MakerSendInitTradeRequestToArbitrator, ProcessInitTradeRequest, TakerReserveTradeFunds,
    TakerSendInitTradeRequestToArbitrator,
};
pub use mediation::{
    MaybeFinalizeMediatedPayout, ProcessMediatedPayoutPublished, ProcessMediatedPayoutSignature,
    SendMediatedPayoutMessage, SignMediatedPayout,
};
pub use multisig::{MaybeMakeMultisig, PrepareMultisig, ProcessInitMultisigRequest, SendInitMultisigRequests};
pub use payment::{
    BuyerPreparePaymentSentMessage, BuyerSendPaymentSentMessage, CompleteTrade,
    ProcessPaymentReceivedMessage, ProcessPaymentSentMessage, SellerPreparePaymentReceivedMessage,
    SellerPublishPayout, SellerSendPaymentReceivedMessage,
};

//! # Adapters Layer (Hexagonal Architecture)
//!
//! In-memory implementations of the outbound ports that need no external
//! system. Wallet and network adapters live with their transports.

mod identity;
mod offer_book;
mod persistence;

pub use identity::KeyRingIdentity;
pub use offer_book::{InMemoryOfferBook, PublicOfferBook};
pub use persistence::InMemoryTradeStore;

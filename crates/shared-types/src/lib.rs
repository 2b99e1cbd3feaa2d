//! # Shared Types Crate
//!
//! Identifiers, amounts and the `TradeEnvelope<T>` network wrapper used by
//! the trade protocol engine and its collaborators.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: identifiers that cross crate boundaries
//!   (trade ids, node addresses, key rings) are defined here.
//! - **Envelope Authority**: payloads never repeat the trade id or sender;
//!   the envelope carries them.
//! - **Atomic Units**: every amount is a `u64` in atomic units, never a float.

pub mod amounts;
pub mod entities;
pub mod envelope;
pub mod errors;

pub use amounts::*;
pub use entities::*;
pub use envelope::TradeEnvelope;
pub use errors::*;

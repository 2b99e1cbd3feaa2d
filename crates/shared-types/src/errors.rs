//! # Error Types
//!
//! Errors raised while parsing shared identifiers and amounts.

use thiserror::Error;

/// Errors produced when parsing shared types from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Node address was not of the form `host:port`.
    #[error("Invalid node address: {0}")]
    InvalidNodeAddress(String),

    /// Amount string could not be converted to atomic units.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Hex string had the wrong length or alphabet.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

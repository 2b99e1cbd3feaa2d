//! Offers as seen by the protocol.

use serde::{Deserialize, Serialize};
use shared_types::{NodeAddress, PubKeyRing, TradeId};

use crate::domain::errors::TradeError;

/// Side the maker takes. A `Buy` offer is a maker buying XMR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferDirection {
    Buy,
    Sell,
}

/// A published offer. Its id becomes the trade id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: TradeId,
    pub direction: OfferDirection,
    /// Maximum trade amount (atomic units).
    pub amount: u64,
    /// Minimum trade amount (atomic units).
    pub min_amount: u64,
    /// Counter-currency price per XMR, in 1/10_000 units.
    pub price: u64,
    pub buyer_security_deposit: u64,
    pub seller_security_deposit: u64,
    pub maker_fee: u64,
    pub taker_fee: u64,
    pub fee_address: String,
    pub currency_code: String,
    pub payment_method_id: String,
    pub maker_node_address: NodeAddress,
    pub maker_pub_key_ring: PubKeyRing,
    pub arbitrator_node_address: NodeAddress,
}

impl Offer {
    /// Check the offer's own consistency.
    pub fn validate(&self) -> Result<(), TradeError> {
        if self.amount == 0 {
            return Err(TradeError::InvalidOffer("amount must be positive".into()));
        }
        if self.min_amount == 0 || self.min_amount > self.amount {
            return Err(TradeError::InvalidOffer(format!(
                "min amount {} not in 1..={}",
                self.min_amount, self.amount
            )));
        }
        if self.price == 0 {
            return Err(TradeError::InvalidOffer("price must be positive".into()));
        }
        if self.buyer_security_deposit == 0 || self.seller_security_deposit == 0 {
            return Err(TradeError::InvalidOffer(
                "security deposits must be positive".into(),
            ));
        }
        if self.fee_address.is_empty() {
            return Err(TradeError::InvalidOffer("missing fee address".into()));
        }
        Ok(())
    }

    /// Check a requested trade amount against the offer's range.
    pub fn check_amount(&self, amount: u64) -> Result<(), TradeError> {
        if amount < self.min_amount || amount > self.amount {
            return Err(TradeError::AmountOutOfRange {
                amount,
                min: self.min_amount,
                max: self.amount,
            });
        }
        Ok(())
    }

    /// Whether the maker is the XMR buyer.
    pub fn is_buyer_maker(&self) -> bool {
        self.direction == OfferDirection::Buy
    }
}

//! # Escrow Amounts
//!
//! What each party must lock up and what the payout must pay back.
//!
//! | Party | Trade fee | Locked in multisig |
//! |-------|-----------|--------------------|
//! | buyer | maker or taker fee | buyer security deposit |
//! | seller | maker or taker fee | trade amount + seller security deposit |
//!
//! A standard payout returns trade amount + buyer deposit to the buyer and
//! the seller deposit to the seller. The miner fee is split evenly, the
//! seller paying the odd atomic unit.

use serde::{Deserialize, Serialize};

use crate::domain::errors::TradeError;
use crate::domain::offer::Offer;
use crate::domain::role::PeerSlot;

/// One output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDestination {
    pub address: String,
    pub amount: u64,
}

impl TxDestination {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// Decoded hash, outputs, fee and signing progress of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDescription {
    pub hash: String,
    pub destinations: Vec<TxDestination>,
    pub fee: u64,
    /// Carries enough signatures to be relayed.
    pub fully_signed: bool,
}

impl TxDescription {
    /// Sum of all outputs paying `address`.
    pub fn amount_to(&self, address: &str) -> u64 {
        self.destinations
            .iter()
            .filter(|d| d.address == address)
            .map(|d| d.amount)
            .sum()
    }
}

/// Share of `fee` paid by output `index` of `count` outputs.
pub fn fee_share(fee: u64, count: usize, index: usize) -> u64 {
    if count == 0 {
        return 0;
    }
    let base = fee / count as u64;
    if index + 1 == count {
        fee - base * (count as u64 - 1)
    } else {
        base
    }
}

/// Amounts one party's reserve or deposit transaction must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingExpectation {
    pub trade_fee: u64,
    pub send_amount: u64,
    pub security_deposit: u64,
}

impl FundingExpectation {
    /// Expected reserve of `slot`. A maker reserves for the full offer
    /// amount when placing the offer; a taker for the amount it takes.
    pub fn reserve(offer: &Offer, slot: PeerSlot, is_buyer: bool, trade_amount: u64) -> Self {
        let basis = if slot == PeerSlot::Maker {
            offer.amount
        } else {
            trade_amount
        };
        Self::for_amount(offer, slot, is_buyer, basis)
    }

    /// Expected deposit of `slot` for the agreed trade amount.
    pub fn deposit(offer: &Offer, slot: PeerSlot, is_buyer: bool, trade_amount: u64) -> Self {
        Self::for_amount(offer, slot, is_buyer, trade_amount)
    }

    fn for_amount(offer: &Offer, slot: PeerSlot, is_buyer: bool, amount: u64) -> Self {
        let trade_fee = if slot == PeerSlot::Maker {
            offer.maker_fee
        } else {
            offer.taker_fee
        };
        if is_buyer {
            Self {
                trade_fee,
                send_amount: 0,
                security_deposit: offer.buyer_security_deposit,
            }
        } else {
            Self {
                trade_fee,
                send_amount: amount,
                security_deposit: offer.seller_security_deposit,
            }
        }
    }

    /// Amount going to the return (reserve) or multisig (deposit) address.
    pub fn locked_amount(&self) -> u64 {
        self.send_amount + self.security_deposit
    }

    pub fn total(&self) -> u64 {
        self.trade_fee + self.locked_amount()
    }

    /// Check the fee output, the locked output and their total.
    pub fn verify(&self, fee_received: u64, locked_received: u64) -> Result<(), String> {
        if fee_received != self.trade_fee {
            return Err(format!(
                "fee output {} != expected {}",
                fee_received, self.trade_fee
            ));
        }
        if locked_received != self.locked_amount() {
            return Err(format!(
                "locked output {} != expected {}",
                locked_received,
                self.locked_amount()
            ));
        }
        if fee_received + locked_received != self.total() {
            return Err("total does not match".to_string());
        }
        Ok(())
    }
}

/// Result of a mediation: gross amounts paid to each trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediationResult {
    pub buyer_payout: u64,
    pub seller_payout: u64,
}

/// Net payout per trader after the miner fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutBreakdown {
    pub buyer_amount: u64,
    pub seller_amount: u64,
}

impl PayoutBreakdown {
    /// Gross outputs of the standard (non-disputed) payout.
    pub fn standard_destinations(
        trade_amount: u64,
        buyer_security_deposit: u64,
        seller_security_deposit: u64,
        buyer_address: &str,
        seller_address: &str,
    ) -> Vec<TxDestination> {
        vec![
            TxDestination::new(buyer_address, trade_amount + buyer_security_deposit),
            TxDestination::new(seller_address, seller_security_deposit),
        ]
    }

    /// Gross outputs of a mediated payout.
    pub fn mediated_destinations(
        result: &MediationResult,
        buyer_address: &str,
        seller_address: &str,
    ) -> Vec<TxDestination> {
        vec![
            TxDestination::new(buyer_address, result.buyer_payout),
            TxDestination::new(seller_address, result.seller_payout),
        ]
    }

    /// Net amounts once `fee` is split across the gross outputs.
    pub fn from_gross(gross_buyer: u64, gross_seller: u64, fee: u64) -> Result<Self, TradeError> {
        let buyer_fee = fee_share(fee, 2, 0);
        let seller_fee = fee_share(fee, 2, 1);
        let buyer_amount = gross_buyer.checked_sub(buyer_fee).ok_or_else(|| {
            TradeError::PayoutMismatch(format!("buyer amount {gross_buyer} below fee share"))
        })?;
        let seller_amount = gross_seller.checked_sub(seller_fee).ok_or_else(|| {
            TradeError::PayoutMismatch(format!("seller amount {gross_seller} below fee share"))
        })?;
        Ok(Self {
            buyer_amount,
            seller_amount,
        })
    }

    /// Check a decoded payout transaction against these amounts.
    pub fn verify(
        &self,
        description: &TxDescription,
        buyer_address: &str,
        seller_address: &str,
    ) -> Result<(), TradeError> {
        let to_buyer = description.amount_to(buyer_address);
        let to_seller = description.amount_to(seller_address);
        if to_buyer != self.buyer_amount {
            return Err(TradeError::PayoutMismatch(format!(
                "buyer receives {} instead of {}",
                to_buyer, self.buyer_amount
            )));
        }
        if to_seller != self.seller_amount {
            return Err(TradeError::PayoutMismatch(format!(
                "seller receives {} instead of {}",
                to_seller, self.seller_amount
            )));
        }
        let others = description
            .destinations
            .iter()
            .filter(|d| d.address != buyer_address && d.address != seller_address)
            .count();
        if others > 0 {
            return Err(TradeError::PayoutMismatch(
                "payout pays a third address".into(),
            ));
        }
        Ok(())
    }
}

//! Role strategies.
//!
//! The five protocol variants share one routing table. What differs per
//! variant is answered here: who the other parties are and which optional
//! duties the role has.

use crate::domain::role::{PeerSlot, ProtocolRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleStrategy {
    role: ProtocolRole,
}

impl RoleStrategy {
    pub fn for_role(role: ProtocolRole) -> Self {
        Self { role }
    }

    pub fn role(&self) -> ProtocolRole {
        self.role
    }

    pub fn own_slot(&self) -> PeerSlot {
        self.role.trade_role().slot()
    }

    pub fn is_trader(&self) -> bool {
        !self.role.is_arbitrator()
    }

    pub fn is_arbitrator(&self) -> bool {
        self.role.is_arbitrator()
    }

    pub fn is_buyer(&self) -> bool {
        self.role.is_buyer()
    }

    pub fn is_seller(&self) -> bool {
        self.role.is_seller()
    }

    /// Takers reserve funds first and open the trade.
    pub fn initiates_trade(&self) -> bool {
        self.role.is_taker()
    }

    /// Makers close their offer once deposits are published.
    pub fn closes_offer_on_deposit(&self) -> bool {
        self.role.is_maker()
    }

    /// Traders contribute contract content; the arbitrator only signs.
    pub fn authors_contract(&self) -> bool {
        self.is_trader()
    }

    /// The other trader, if this node is one.
    pub fn counterparty(&self) -> Option<PeerSlot> {
        match self.own_slot() {
            PeerSlot::Maker => Some(PeerSlot::Taker),
            PeerSlot::Taker => Some(PeerSlot::Maker),
            PeerSlot::Arbitrator => None,
        }
    }

    /// Parties this node exchanges multisig and signatures with.
    pub fn other_parties(&self) -> [PeerSlot; 2] {
        self.own_slot().others()
    }

    /// Receivers of this trader's contract request and payment messages.
    pub fn counterparty_and_arbitrator(&self) -> Vec<PeerSlot> {
        match self.counterparty() {
            Some(counterparty) => vec![counterparty, PeerSlot::Arbitrator],
            None => Vec::new(),
        }
    }
}

//! Trade roles and peer slots.

use serde::{Deserialize, Serialize};

use crate::domain::offer::OfferDirection;

/// Which side of the offer this node is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeRole {
    Maker,
    Taker,
    Arbitrator,
}

impl TradeRole {
    /// Peer slot holding this role's data.
    pub fn slot(self) -> PeerSlot {
        match self {
            TradeRole::Maker => PeerSlot::Maker,
            TradeRole::Taker => PeerSlot::Taker,
            TradeRole::Arbitrator => PeerSlot::Arbitrator,
        }
    }
}

/// One of the three trading-peer slots of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeerSlot {
    Maker,
    Taker,
    Arbitrator,
}

impl PeerSlot {
    pub const ALL: [PeerSlot; 3] = [PeerSlot::Maker, PeerSlot::Taker, PeerSlot::Arbitrator];

    pub fn is_trader(self) -> bool {
        self != PeerSlot::Arbitrator
    }

    /// The two other slots.
    pub fn others(self) -> [PeerSlot; 2] {
        match self {
            PeerSlot::Maker => [PeerSlot::Taker, PeerSlot::Arbitrator],
            PeerSlot::Taker => [PeerSlot::Maker, PeerSlot::Arbitrator],
            PeerSlot::Arbitrator => [PeerSlot::Maker, PeerSlot::Taker],
        }
    }
}

/// Role combined with trade side; selects the protocol strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolRole {
    MakerAsBuyer,
    MakerAsSeller,
    TakerAsBuyer,
    TakerAsSeller,
    Arbitrator,
}

impl ProtocolRole {
    /// Resolve from the node's role and the maker's offer direction.
    pub fn resolve(role: TradeRole, direction: OfferDirection) -> Self {
        match (role, direction) {
            (TradeRole::Maker, OfferDirection::Buy) => ProtocolRole::MakerAsBuyer,
            (TradeRole::Maker, OfferDirection::Sell) => ProtocolRole::MakerAsSeller,
            (TradeRole::Taker, OfferDirection::Buy) => ProtocolRole::TakerAsSeller,
            (TradeRole::Taker, OfferDirection::Sell) => ProtocolRole::TakerAsBuyer,
            (TradeRole::Arbitrator, _) => ProtocolRole::Arbitrator,
        }
    }

    pub fn trade_role(self) -> TradeRole {
        match self {
            ProtocolRole::MakerAsBuyer | ProtocolRole::MakerAsSeller => TradeRole::Maker,
            ProtocolRole::TakerAsBuyer | ProtocolRole::TakerAsSeller => TradeRole::Taker,
            ProtocolRole::Arbitrator => TradeRole::Arbitrator,
        }
    }

    pub fn is_buyer(self) -> bool {
        matches!(self, ProtocolRole::MakerAsBuyer | ProtocolRole::TakerAsBuyer)
    }

    pub fn is_seller(self) -> bool {
        matches!(self, ProtocolRole::MakerAsSeller | ProtocolRole::TakerAsSeller)
    }

    pub fn is_maker(self) -> bool {
        self.trade_role() == TradeRole::Maker
    }

    pub fn is_taker(self) -> bool {
        self.trade_role() == TradeRole::Taker
    }

    pub fn is_arbitrator(self) -> bool {
        self == ProtocolRole::Arbitrator
    }
}

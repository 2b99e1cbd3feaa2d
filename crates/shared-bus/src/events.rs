//! # Wallet Events
//!
//! Notifications a wallet publishes while it observes the chain.

use serde::{Deserialize, Serialize};

/// All events that can be published to the wallet event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    /// An output of `tx_hash` paying this wallet was seen or gained a
    /// confirmation.
    OutputReceived {
        tx_hash: String,
        amount: u64,
        confirmations: u64,
        is_locked: bool,
    },

    /// Balance totals changed.
    BalancesChanged { balance: u64, unlocked_balance: u64 },

    /// A transaction this wallet watches passed the unlock depth.
    TxUnlocked { tx_hash: String, confirmations: u64 },
}

impl WalletEvent {
    /// Get the topic for this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::OutputReceived { .. } | Self::TxUnlocked { .. } => EventTopic::Outputs,
            Self::BalancesChanged { .. } => EventTopic::Balances,
        }
    }

    /// Transaction hash the event refers to, if any.
    #[must_use]
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Self::OutputReceived { tx_hash, .. } | Self::TxUnlocked { tx_hash, .. } => Some(tx_hash),
            Self::BalancesChanged { .. } => None,
        }
    }
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Outputs,
    Balances,
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to subscribe to. Empty means all.
    pub topics: Vec<EventTopic>,

    /// Only events about these tx hashes. Empty means any.
    pub tx_hashes: Vec<String>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            tx_hashes: Vec::new(),
        }
    }

    /// Output events about any of `hashes`.
    #[must_use]
    pub fn tx_hashes<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: vec![EventTopic::Outputs],
            tx_hashes: hashes.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &WalletEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let hash_match = self.tx_hashes.is_empty()
            || event
                .tx_hash()
                .is_some_and(|hash| self.tx_hashes.iter().any(|h| h == hash));

        topic_match && hash_match
    }
}

//! # Shared Bus - Wallet Event Bus
//!
//! Carries wallet notifications (outputs received, balances changed, txs
//! unlocked) from the wallet adapter to trade protocols.
//!
//! ## Subscription Styles
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐  subscribe(filter)    ┌──────────────┐
//! │ Wallet       │ ────────────▶ │ Event Bus    │ ────────────────────▶ │ Deposit      │
//! │ adapter      │               │              │                       │ watcher      │
//! └──────────────┘               │              │  subscribe_once(pred) ├──────────────┤
//!                                │              │ ────────────────────▶ │ Payout       │
//!                                └──────────────┘                       │ watcher      │
//!                                                                       └──────────────┘
//! ```
//!
//! A one-shot subscription resolves with the first matching event and
//! deregisters itself. Dropping any subscription deregisters it.
//!
//! `ProcessedUidCache` remembers recently handled message uids so a resent
//! or duplicated message is acknowledged without being processed twice.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod processed_uids;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventTopic, WalletEvent};
pub use processed_uids::{ProcessedUid, ProcessedUidCache, UidError};
pub use publisher::{EventPublisher, WalletEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

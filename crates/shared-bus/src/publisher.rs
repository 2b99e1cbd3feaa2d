//! # Event Publisher
//!
//! The publishing side of the wallet event bus.

use crate::events::{EventFilter, WalletEvent};
use crate::subscriber::{EventStream, Subscription, SubscriptionError, SubscriptionGuard};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing wallet events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event. Returns the number of receivers it reached.
    async fn publish(&self, event: WalletEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory wallet event bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer
/// semantics. One bus exists per wallet.
pub struct WalletEventBus {
    /// Broadcast sender for events.
    sender: broadcast::Sender<WalletEvent>,

    /// Live subscriptions (filtered, streaming and one-shot).
    active: Arc<AtomicUsize>,

    /// Total events published.
    events_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl WalletEventBus {
    /// Create a new bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            active: Arc::new(AtomicUsize::new(0)),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        debug!(topics = ?filter.topics, hashes = ?filter.tx_hashes, "New wallet subscription");
        Subscription::new(receiver, filter, SubscriptionGuard::register(self.active.clone()))
    }

    /// Get a stream of events matching a filter.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        let receiver = self.sender.subscribe();
        EventStream::new(receiver, filter, SubscriptionGuard::register(self.active.clone()))
    }

    /// Resolve with the first event matching both `filter` and `predicate`.
    ///
    /// The subscription is registered before this returns, so events
    /// published after the call are never missed. It deregisters itself
    /// once the future resolves or is dropped.
    pub fn subscribe_once<P>(
        &self,
        filter: EventFilter,
        mut predicate: P,
    ) -> impl Future<Output = Result<WalletEvent, SubscriptionError>> + Send + 'static
    where
        P: FnMut(&WalletEvent) -> bool + Send + 'static,
    {
        let mut subscription = self.subscribe(filter);
        async move {
            loop {
                match subscription.recv().await {
                    Some(event) if predicate(&event) => return Ok(event),
                    Some(_) => continue,
                    None => return Err(SubscriptionError::Closed),
                }
            }
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for WalletEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for WalletEventBus {
    async fn publish(&self, event: WalletEvent) -> usize {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(topic = ?topic, receivers, "Wallet event published");
                receivers
            }
            Err(_) => {
                trace!(topic = ?topic, "Wallet event dropped (no receivers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

//! Trade Store Adapter
//!
//! Implements `TradePersistence` with coalesced writes: requests only mark
//! the latest snapshot dirty, a flush writes each dirty trade once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::TradeId;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::errors::PersistenceError;
use crate::domain::trade::Trade;
use crate::ports::TradePersistence;

/// In-memory trade storage.
#[derive(Default)]
pub struct InMemoryTradeStore {
    /// Snapshots requested since the last flush, latest wins.
    pending: Mutex<HashMap<TradeId, Trade>>,
    stored: RwLock<HashMap<TradeId, Trade>>,
    writes: AtomicU64,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every pending snapshot. Returns the number written.
    pub fn flush(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return 0;
        }
        let count = pending.len();
        self.stored.write().extend(pending);
        self.writes.fetch_add(count as u64, Ordering::Relaxed);
        debug!(trades = count, "Trades persisted");
        count
    }

    /// Flush periodically until the store is dropped.
    pub fn start_flusher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.flush();
                    }
                    None => return,
                }
            }
        })
    }

    /// Stored snapshot of a trade, without flushing.
    pub fn stored(&self, trade_id: &TradeId) -> Option<Trade> {
        self.stored.read().get(trade_id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Total number of trade writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TradePersistence for InMemoryTradeStore {
    fn request_persistence(&self, trade: &Trade) {
        self.pending.lock().insert(trade.id().clone(), trade.clone());
    }

    async fn load_trades(&self) -> Result<Vec<Trade>, PersistenceError> {
        self.flush();
        let mut trades: Vec<Trade> = self.stored.read().values().cloned().collect();
        trades.sort_by_key(Trade::created_at);
        Ok(trades)
    }
}

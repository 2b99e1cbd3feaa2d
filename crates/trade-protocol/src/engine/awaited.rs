//! One-shot awaited values.
//!
//! A step that needs data a peer has not supplied yet does not poll: it
//! waits on an `AwaitedField` outside the trade lock, with a timeout.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AwaitError {
    #[error("Value not set within {0:?}")]
    Timeout(Duration),

    #[error("Awaited field dropped")]
    Closed,
}

/// Value set once (later sets replace it) and awaited by any number of
/// waiters. Clones share the value.
#[derive(Clone)]
pub struct AwaitedField<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T: Clone + Send + Sync> AwaitedField<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until the value is set.
    pub async fn wait(&self, timeout: Duration) -> Result<T, AwaitError> {
        let mut rx = self.tx.subscribe();
        let wait = async move {
            loop {
                let current = rx.borrow_and_update().clone();
                if let Some(value) = current {
                    return Ok(value);
                }
                if rx.changed().await.is_err() {
                    return Err(AwaitError::Closed);
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| AwaitError::Timeout(timeout))?
    }
}

impl<T: Clone + Send + Sync> Default for AwaitedField<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Single-shot cancellable step timer.

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Fires at most once after `duration` unless cancelled first. Dropping the
/// timer cancels it.
pub struct StepTimer {
    duration: Duration,
    expired: Option<oneshot::Receiver<()>>,
    fired: Arc<AtomicBool>,
    sleeper: JoinHandle<()>,
}

impl StepTimer {
    pub fn start(duration: Duration) -> Self {
        let (tx, rx) = oneshot::channel();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let sleeper = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if !flag.swap(true, Ordering::SeqCst) {
                let _ = tx.send(());
            }
        });
        Self {
            duration,
            expired: Some(rx),
            fired,
            sleeper,
        }
    }

    /// Resolves when the timer fires; never resolves once cancelled.
    pub async fn expired(&mut self) {
        if let Some(rx) = self.expired.as_mut() {
            let fired = rx.await.is_ok();
            self.expired = None;
            if fired {
                return;
            }
        }
        future::pending::<()>().await
    }

    /// Cancel; returns false if the timer had already fired.
    pub fn cancel(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::SeqCst);
        self.sleeper.abort();
        first
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Drop for StepTimer {
    fn drop(&mut self) {
        self.sleeper.abort();
    }
}

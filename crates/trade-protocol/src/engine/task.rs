//! # Tasks
//!
//! A task is one unit of work in a pipeline. `run` is invoked once and the
//! task signals exactly one of `complete()` / `failed()` on its handle,
//! possibly from spawned work after `run` returned.
//!
//! Most tasks only implement `execute`; the default `run` maps its result
//! onto the handle. Tasks that fan out (send to two peers at once) override
//! `run` and share clones of the handle with their spawned work.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::errors::TaskError;

/// Result delivered by a task handle.
pub(crate) type TaskSignal = Result<(), TaskError>;

/// Settle-once completion handle. Clones share the same slot; the first
/// signal wins and later ones are logged and ignored.
#[derive(Clone)]
pub struct TaskHandle {
    task: &'static str,
    slot: Arc<Mutex<Option<oneshot::Sender<TaskSignal>>>>,
}

impl TaskHandle {
    pub(crate) fn new(task: &'static str) -> (Self, oneshot::Receiver<TaskSignal>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                task,
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Signal success. Returns false if the task had already settled.
    pub fn complete(&self) -> bool {
        self.settle(Ok(()))
    }

    /// Signal failure. Returns false if the task had already settled.
    pub fn failed(&self, cause: impl Into<TaskError>) -> bool {
        self.settle(Err(cause.into()))
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }

    pub fn task_name(&self) -> &'static str {
        self.task
    }

    fn settle(&self, signal: TaskSignal) -> bool {
        let sender = self.slot.lock().take();
        match sender {
            Some(tx) => {
                // The runner may have been dropped by a step timeout.
                let _ = tx.send(signal);
                true
            }
            None => {
                debug!(task = self.task, signal = ?signal, "Ignoring signal of settled task");
                false
            }
        }
    }
}

/// A unit of pipeline work over the aggregate `M`.
#[async_trait]
pub trait Task<M: Send>: Send + Sync {
    /// Name used in logs, metrics and failure reports.
    fn name(&self) -> &'static str;

    /// Run the task and eventually signal `handle`.
    async fn run(&self, model: &mut M, handle: TaskHandle) {
        match self.execute(model).await {
            Ok(()) => {
                handle.complete();
            }
            Err(cause) => {
                handle.failed(cause);
            }
        }
    }

    /// Work of a task that settles when it returns.
    async fn execute(&self, _model: &mut M) -> Result<(), TaskError> {
        Ok(())
    }
}

/// The failure that aborted a pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{pipeline}: task {task} failed: {cause}")]
pub struct TaskFailure {
    pub pipeline: String,
    pub task: &'static str,
    pub cause: TaskError,
}

//! # Task Runner
//!
//! Executes a task list strictly in order against one aggregate. The first
//! failure aborts the remaining tasks. Exactly one handler runs, exactly
//! once: the runner is consumed by `run` and both handlers are `FnOnce`.

use tracing::{debug, trace, warn};

use crate::domain::errors::TaskError;
use crate::engine::task::{Task, TaskFailure, TaskHandle};

type SuccessHandler<M> = Box<dyn FnOnce(&mut M) + Send>;
type FailureHandler<M> = Box<dyn FnOnce(&mut M, &TaskFailure) + Send>;

/// Ordered pipeline of tasks over `M`.
pub struct TaskRunner<M: Send> {
    pipeline: String,
    tasks: Vec<Box<dyn Task<M>>>,
    on_success: Option<SuccessHandler<M>>,
    on_failure: Option<FailureHandler<M>>,
}

impl<M: Send> TaskRunner<M> {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            tasks: Vec::new(),
            on_success: None,
            on_failure: None,
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Box<dyn Task<M>>>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn add_task(&mut self, task: Box<dyn Task<M>>) {
        self.tasks.push(task);
    }

    pub fn on_success(mut self, handler: impl FnOnce(&mut M) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(handler));
        self
    }

    pub fn on_failure(mut self, handler: impl FnOnce(&mut M, &TaskFailure) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(handler));
        self
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Run every task in order.
    pub async fn run(self, model: &mut M) -> Result<(), TaskFailure> {
        let TaskRunner {
            pipeline,
            tasks,
            on_success,
            on_failure,
        } = self;

        for task in tasks {
            let name = task.name();
            trace!(pipeline = %pipeline, task = name, "Running task");
            let (handle, signal) = TaskHandle::new(name);
            task.run(model, handle).await;

            // Waits for spawned work still holding a handle clone.
            let result = match signal.await {
                Ok(result) => result,
                Err(_) => Err(TaskError::Abandoned(name)),
            };

            if let Err(cause) = result {
                let failure = TaskFailure {
                    pipeline: pipeline.clone(),
                    task: name,
                    cause,
                };
                warn!(pipeline = %pipeline, task = name, error = %failure.cause, "Pipeline aborted");
                if let Some(handler) = on_failure {
                    handler(model, &failure);
                }
                return Err(failure);
            }
        }

        debug!(pipeline = %pipeline, "Pipeline completed");
        if let Some(handler) = on_success {
            handler(model);
        }
        Ok(())
    }
}

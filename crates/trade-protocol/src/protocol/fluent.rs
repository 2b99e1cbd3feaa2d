//! # Fluent Protocol
//!
//! Binds a condition to a task list and runs it:
//!
//! ```rust,ignore
//! let outcome = FluentProtocol::expect(&mut model, condition)
//!     .setup(StepSetup::tasks("SignContractResponse", tasks).with_timeout(timeout))
//!     .execute_tasks()
//!     .await;
//! ```
//!
//! A timed step races its runner against a single-shot `StepTimer`. The
//! timer is cancelled as soon as the runner finishes; if the timer wins the
//! runner is dropped and the step reports `TimedOut`.

use std::time::Duration;

use trade_telemetry::{log_trade_event, metric_inc, time_histogram};
use trade_telemetry::{PIPELINES_FINISHED, PIPELINES_STARTED, PIPELINE_DURATION};

use crate::engine::{StepTimer, Task, TaskFailure, TaskRunner};
use crate::model::TradeModel;
use crate::protocol::condition::{Condition, ConditionResult};

type PreConditionHandler = Box<dyn FnOnce(&mut TradeModel, &ConditionResult) + Send>;

/// Task list and timeout of one step.
pub struct StepSetup {
    name: &'static str,
    tasks: Vec<Box<dyn Task<TradeModel>>>,
    timeout: Option<Duration>,
}

impl StepSetup {
    pub fn tasks(name: &'static str, tasks: Vec<Box<dyn Task<TradeModel>>>) -> Self {
        Self {
            name,
            tasks,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Failed(TaskFailure),
    TimedOut { step: &'static str, after: Duration },
    Rejected(ConditionResult),
}

impl StepOutcome {
    fn label(&self) -> &'static str {
        match self {
            StepOutcome::Completed => "completed",
            StepOutcome::Failed(_) => "failed",
            StepOutcome::TimedOut { .. } => "timed_out",
            StepOutcome::Rejected(_) => "rejected",
        }
    }
}

/// Condition-gated step execution against a trade model.
pub struct FluentProtocol<'a> {
    model: &'a mut TradeModel,
    condition: Condition,
    setup: Option<StepSetup>,
    on_pre_condition_failed: Option<PreConditionHandler>,
}

impl<'a> FluentProtocol<'a> {
    pub fn expect(model: &'a mut TradeModel, condition: Condition) -> Self {
        Self {
            model,
            condition,
            setup: None,
            on_pre_condition_failed: None,
        }
    }

    pub fn setup(mut self, setup: StepSetup) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn on_pre_condition_failed(
        mut self,
        handler: impl FnOnce(&mut TradeModel, &ConditionResult) + Send + 'static,
    ) -> Self {
        self.on_pre_condition_failed = Some(Box::new(handler));
        self
    }

    pub async fn execute_tasks(self) -> StepOutcome {
        let FluentProtocol {
            model,
            condition,
            setup,
            on_pre_condition_failed,
        } = self;
        let step = setup.as_ref().map_or("unnamed", StepSetup::name);

        let result = condition.evaluate(&model.trade);
        if !result.is_valid() {
            log_trade_event!(
                info,
                model.trade.id(),
                model.trade.phase(),
                model.trade.state(),
                "Step not applicable",
                step = step,
                reason = ?result
            );
            if result.is_pre_condition_failure() {
                if let Some(handler) = on_pre_condition_failed {
                    handler(model, &result);
                }
            }
            return StepOutcome::Rejected(result);
        }

        if let Some(sender) = condition.sender() {
            model.process.temp_trading_peer_address = Some(sender.clone());
        }
        let Some(setup) = setup else {
            return StepOutcome::Completed;
        };

        metric_inc!(PIPELINES_STARTED, &[setup.name]);
        let _duration = time_histogram!(PIPELINE_DURATION);
        let runner = TaskRunner::new(setup.name).with_tasks(setup.tasks);

        let outcome = match setup.timeout {
            Some(timeout) => {
                let mut timer = StepTimer::start(timeout);
                let finished = tokio::select! {
                    result = runner.run(model) => Some(result),
                    _ = timer.expired() => None,
                };
                timer.cancel();
                match finished {
                    Some(result) => result.into(),
                    None => StepOutcome::TimedOut {
                        step: setup.name,
                        after: timeout,
                    },
                }
            }
            None => runner.run(model).await.into(),
        };

        metric_inc!(PIPELINES_FINISHED, &[setup.name, outcome.label()]);
        log_trade_event!(
            debug,
            model.trade.id(),
            model.trade.phase(),
            model.trade.state(),
            "Step finished",
            step = setup.name,
            outcome = outcome.label()
        );
        outcome
    }
}

impl From<Result<(), TaskFailure>> for StepOutcome {
    fn from(result: Result<(), TaskFailure>) -> Self {
        match result {
            Ok(()) => StepOutcome::Completed,
            Err(failure) => StepOutcome::Failed(failure),
        }
    }
}

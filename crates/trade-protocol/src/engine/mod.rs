//! Pipeline engine: tasks, the ordered runner, step timers and awaited
//! fields. Generic over the aggregate so trade pipelines and offer
//! placement share it.

pub mod awaited;
pub mod runner;
pub mod task;
pub mod timer;

pub use awaited::{AwaitError, AwaitedField};
pub use runner::TaskRunner;
pub use task::{Task, TaskFailure, TaskHandle};
pub use timer::StepTimer;

//! # Protocol Layer
//!
//! ```text
//! RoutingTable ──► Route ──► Condition ──► FluentProtocol ──► TaskRunner
//!                    │
//!                    └── RoleStrategy picks the tasks for the node's role
//! ```

pub mod condition;
pub mod fluent;
pub mod routing;
pub mod strategy;
pub mod trade_protocol;
pub(crate) mod watchers;

pub use condition::{Condition, ConditionResult};
pub use fluent::{FluentProtocol, StepOutcome, StepSetup};
pub use routing::{Roles, Route, RoutingTable, Trigger, UserAction};
pub use strategy::RoleStrategy;
pub use trade_protocol::{DispatchOutcome, TradeProtocol};

//! # Protocol Conditions
//!
//! A condition gates a pipeline on the trade's current situation. Checks
//! run in a fixed order and stop at the first miss:
//!
//! | # | Check | On miss |
//! |---|-------|---------|
//! | 1 | disposition accepts the step | drop |
//! | 2 | phase in the expected set | drop |
//! | 3 | message trade id equals the trade id | drop |
//! | 4 | preconditions | failure handler, NACK |
//!
//! ```rust,ignore
//! let condition = Condition::any_phase(&[TradePhase::Init])
//!     .with_message(&envelope)
//!     .from(&envelope.sender_node_address)
//!     .pre_condition(trade.contract().is_some(), "contract built");
//! ```

use shared_types::{NodeAddress, TradeId};

use crate::domain::messages::ProtocolEnvelope;
use crate::domain::phase::{TradeDisposition, TradePhase};
use crate::domain::trade::Trade;

/// Outcome of evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionResult {
    Valid,
    InvalidDisposition(TradeDisposition),
    InvalidPhase {
        expected: Vec<TradePhase>,
        actual: TradePhase,
    },
    TradeIdMismatch {
        expected: TradeId,
        actual: TradeId,
    },
    PreConditionFailed(&'static str),
}

impl ConditionResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ConditionResult::Valid)
    }

    /// Label used for dropped-message metrics.
    pub fn drop_reason(&self) -> &'static str {
        match self {
            ConditionResult::Valid => "valid",
            ConditionResult::InvalidDisposition(_) => "disposition",
            ConditionResult::InvalidPhase { .. } => "phase",
            ConditionResult::TradeIdMismatch { .. } => "trade_id",
            ConditionResult::PreConditionFailed(_) => "pre_condition",
        }
    }

    /// Preconditions are the only miss reported back to the sender.
    pub fn is_pre_condition_failure(&self) -> bool {
        matches!(self, ConditionResult::PreConditionFailed(_))
    }
}

/// Builder for the checks a step requires.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    phases: Vec<TradePhase>,
    message_trade_id: Option<TradeId>,
    sender: Option<NodeAddress>,
    pre_conditions: Vec<(bool, &'static str)>,
    dispute_step: bool,
}

impl Condition {
    /// Expect the trade in one of `phases`.
    pub fn any_phase(phases: &[TradePhase]) -> Self {
        Self {
            phases: phases.to_vec(),
            ..Self::default()
        }
    }

    /// Check the trade id carried by the triggering message.
    pub fn with_message(mut self, envelope: &ProtocolEnvelope) -> Self {
        self.message_trade_id = Some(envelope.trade_id.clone());
        self
    }

    /// Record the sender address of the triggering message.
    pub fn from(mut self, address: &NodeAddress) -> Self {
        self.sender = Some(address.clone());
        self
    }

    pub fn pre_condition(mut self, holds: bool, name: &'static str) -> Self {
        self.pre_conditions.push((holds, name));
        self
    }

    /// Dispute steps also run on errored and funds-locked trades.
    pub fn for_dispute(mut self) -> Self {
        self.dispute_step = true;
        self
    }

    pub fn sender(&self) -> Option<&NodeAddress> {
        self.sender.as_ref()
    }

    pub fn evaluate(&self, trade: &Trade) -> ConditionResult {
        let disposition = trade.disposition();
        let accepts = if self.dispute_step {
            disposition.accepts_dispute_steps()
        } else {
            disposition.accepts_protocol_steps()
        };
        if !accepts {
            return ConditionResult::InvalidDisposition(disposition);
        }

        if !self.phases.contains(&trade.phase()) {
            return ConditionResult::InvalidPhase {
                expected: self.phases.clone(),
                actual: trade.phase(),
            };
        }

        if let Some(actual) = &self.message_trade_id {
            if actual != trade.id() {
                return ConditionResult::TradeIdMismatch {
                    expected: trade.id().clone(),
                    actual: actual.clone(),
                };
            }
        }

        match self.pre_conditions.iter().find(|(holds, _)| !holds) {
            Some((_, name)) => ConditionResult::PreConditionFailed(name),
            None => ConditionResult::Valid,
        }
    }
}

//! # Routing Table
//!
//! Declarative binding of triggers (inbound messages and user actions) to
//! pipelines, per role. One table serves all five protocol variants; the
//! `RoleStrategy` answers the per-variant questions at run time.
//!
//! | Trigger | Receiver | Phases | Timed |
//! |---------|----------|--------|-------|
//! | take offer | taker | Init | yes |
//! | `InitTradeRequest` from taker | arbitrator | Init | yes |
//! | `InitTradeRequest` from arbitrator | maker | Init | yes |
//! | `InitTradeRequest` from maker | arbitrator | Init | yes |
//! | `InitMultisigRequest` | all | Init | yes |
//! | `SignContractRequest` | all | Init | yes |
//! | `SignContractResponse` | all | Init, contract built | yes |
//! | `DepositRequest` | arbitrator | Init | yes |
//! | `DepositResponse` | traders | Init | no |
//! | payment sent | buyer | DepositsConfirmed, PaymentSent (retry) | yes |
//! | `PaymentSent` | seller, arbitrator | DepositsPublished, DepositsConfirmed | no |
//! | payment received | seller | PaymentSent, PayoutPublished (retry) | yes |
//! | `PaymentReceived` | buyer, arbitrator | DepositsConfirmed, PaymentSent | no |
//! | withdraw | traders | PayoutPublished | no |
//! | accept mediation result | traders | DepositsConfirmed..PaymentReceived | yes |
//! | `MediatedPayoutSignature` | traders | DepositsConfirmed..PaymentReceived | no |
//! | `MediatedPayoutPublished` | all | DepositsConfirmed..PaymentReceived | no |

use crate::domain::messages::MessageKind;
use crate::domain::phase::{DisputeState, PayoutState, TradePhase, TradeState};
use crate::domain::role::{PeerSlot, ProtocolRole};
use crate::domain::trade::Trade;
use crate::engine::Task;
use crate::model::TradeModel;
use crate::protocol::strategy::RoleStrategy;
use crate::tasks::*;

/// Actions a user (or the trade manager on the user's behalf) can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserAction {
    TakeOffer,
    PaymentSent,
    PaymentReceived,
    Withdraw,
    AcceptMediationResult,
}

impl UserAction {
    pub fn name(self) -> &'static str {
        match self {
            UserAction::TakeOffer => "take_offer",
            UserAction::PaymentSent => "payment_sent",
            UserAction::PaymentReceived => "payment_received",
            UserAction::Withdraw => "withdraw",
            UserAction::AcceptMediationResult => "accept_mediation_result",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Message(MessageKind),
    Action(UserAction),
}

/// Roles a route applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Roles {
    All,
    Traders,
    Maker,
    Taker,
    Arbitrator,
    Buyer,
    Seller,
    BuyerAndArbitrator,
    SellerAndArbitrator,
}

impl Roles {
    pub fn matches(self, role: ProtocolRole) -> bool {
        match self {
            Roles::All => true,
            Roles::Traders => !role.is_arbitrator(),
            Roles::Maker => role.is_maker(),
            Roles::Taker => role.is_taker(),
            Roles::Arbitrator => role.is_arbitrator(),
            Roles::Buyer => role.is_buyer(),
            Roles::Seller => role.is_seller(),
            Roles::BuyerAndArbitrator => role.is_buyer() || role.is_arbitrator(),
            Roles::SellerAndArbitrator => role.is_seller() || role.is_arbitrator(),
        }
    }
}

pub type TaskList = Vec<Box<dyn Task<TradeModel>>>;
pub type PreCondition = fn(&Trade) -> Result<(), &'static str>;

/// One row of the routing table.
pub struct Route {
    pub name: &'static str,
    pub trigger: Trigger,
    /// Required sender slot for message triggers.
    pub from: Option<PeerSlot>,
    pub roles: Roles,
    pub phases: &'static [TradePhase],
    pub timed: bool,
    /// Defer the message until the local contract exists.
    pub awaits_contract: bool,
    /// Runs on errored and funds-locked trades too.
    pub dispute_step: bool,
    pub pre_condition: Option<PreCondition>,
    pub tasks: fn(&RoleStrategy) -> TaskList,
}

impl Route {
    fn applies(&self, trigger: Trigger, role: ProtocolRole, from: Option<PeerSlot>) -> bool {
        self.trigger == trigger
            && self.roles.matches(role)
            && (self.from.is_none() || self.from == from)
    }
}

// =============================================================================
// PRECONDITIONS
// =============================================================================

fn not_started(trade: &Trade) -> Result<(), &'static str> {
    if trade.state() == TradeState::Preparation {
        Ok(())
    } else {
        Err("trade already started")
    }
}

fn payment_sendable(trade: &Trade) -> Result<(), &'static str> {
    match trade.phase() {
        TradePhase::DepositsConfirmed => Ok(()),
        _ if trade.state() == TradeState::BuyerSendFailedPaymentSentMsg => Ok(()),
        _ => Err("payment already sent"),
    }
}

fn receipt_confirmable(trade: &Trade) -> Result<(), &'static str> {
    match trade.phase() {
        TradePhase::PaymentSent => Ok(()),
        _ if trade.state() == TradeState::SellerSendFailedPaymentReceivedMsg => Ok(()),
        _ => Err("payment receipt already confirmed"),
    }
}

fn payout_published(trade: &Trade) -> Result<(), &'static str> {
    if trade.payout_state() >= PayoutState::Published {
        Ok(())
    } else {
        Err("payout not published")
    }
}

fn mediation_closed(trade: &Trade) -> Result<(), &'static str> {
    if trade.payout_state() != PayoutState::Unpublished {
        return Err("payout already published");
    }
    if trade.dispute_state() != DisputeState::MediationClosed {
        return Err("mediation not closed");
    }
    if trade.mediation_result.is_none() {
        return Err("no mediation result");
    }
    Ok(())
}

// =============================================================================
// TASK LISTS
// =============================================================================

fn take_offer(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(TakerReserveTradeFunds),
        Box::new(TakerSendInitTradeRequestToArbitrator),
    ]
}

fn arbitrator_init_from_taker(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(ProcessInitTradeRequest),
        Box::new(ArbitratorProcessReserveTx),
        Box::new(ArbitratorSendInitTradeRequestToMaker),
    ]
}

fn maker_init(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(ProcessInitTradeRequest),
        Box::new(MakerSendInitTradeRequestToArbitrator),
    ]
}

fn arbitrator_init_from_maker(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(ProcessInitTradeRequest),
        Box::new(ArbitratorProcessReserveTx),
        Box::new(PrepareMultisig),
        Box::new(SendInitMultisigRequests),
    ]
}

fn init_multisig(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(ProcessInitMultisigRequest),
        Box::new(PrepareMultisig),
        Box::new(SendInitMultisigRequests),
        Box::new(MaybeMakeMultisig),
        Box::new(MaybeSendSignContractRequest),
        // The counterparty's request may already be on file.
        Box::new(MaybeSignContract),
        Box::new(MaybeSendSignContractResponse),
    ]
}

fn sign_contract_request(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(ProcessSignContractRequest),
        Box::new(MaybeSignContract),
        Box::new(MaybeSendSignContractResponse),
    ]
}

fn sign_contract_response(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(ProcessSignContractResponse),
        Box::new(MaybeSendDepositRequest),
    ]
}

fn deposit_request(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(ArbitratorProcessDepositRequest),
        Box::new(ArbitratorMaybePublishDeposits),
    ]
}

fn deposit_response(strategy: &RoleStrategy) -> TaskList {
    let mut tasks: TaskList = vec![Box::new(ProcessDepositResponse)];
    if strategy.closes_offer_on_deposit() {
        tasks.push(Box::new(MakerRemoveOpenOffer));
    }
    tasks
}

fn payment_sent(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(BuyerPreparePaymentSentMessage),
        Box::new(BuyerSendPaymentSentMessage),
    ]
}

fn process_payment_sent(_: &RoleStrategy) -> TaskList {
    vec![Box::new(ProcessPaymentSentMessage)]
}

fn payment_received(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(SellerPreparePaymentReceivedMessage),
        Box::new(SellerPublishPayout),
        Box::new(SellerSendPaymentReceivedMessage),
    ]
}

fn resend_payment_received(_: &RoleStrategy) -> TaskList {
    vec![Box::new(SellerSendPaymentReceivedMessage)]
}

fn process_payment_received(_: &RoleStrategy) -> TaskList {
    vec![Box::new(ProcessPaymentReceivedMessage)]
}

fn withdraw(_: &RoleStrategy) -> TaskList {
    vec![Box::new(CompleteTrade)]
}

fn accept_mediation(_: &RoleStrategy) -> TaskList {
    vec![
        Box::new(SignMediatedPayout),
        Box::new(MaybeFinalizeMediatedPayout),
        Box::new(SendMediatedPayoutMessage),
    ]
}

fn mediated_signature(_: &RoleStrategy) -> TaskList {
    vec![Box::new(ProcessMediatedPayoutSignature)]
}

fn mediated_published(_: &RoleStrategy) -> TaskList {
    vec![Box::new(ProcessMediatedPayoutPublished)]
}

// =============================================================================
// TABLE
// =============================================================================

const INIT: &[TradePhase] = &[TradePhase::Init];
const DISPUTABLE: &[TradePhase] = &[
    TradePhase::DepositsConfirmed,
    TradePhase::PaymentSent,
    TradePhase::PaymentReceived,
];

#[allow(clippy::too_many_arguments)]
fn route(
    name: &'static str,
    trigger: Trigger,
    from: Option<PeerSlot>,
    roles: Roles,
    phases: &'static [TradePhase],
    timed: bool,
    tasks: fn(&RoleStrategy) -> TaskList,
) -> Route {
    Route {
        name,
        trigger,
        from,
        roles,
        phases,
        timed,
        awaits_contract: false,
        dispute_step: false,
        pre_condition: None,
        tasks,
    }
}

/// Ordered routes; the first applicable one wins.
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn standard() -> Self {
        use MessageKind as K;
        use Trigger::{Action, Message};

        let routes = vec![
            Route {
                pre_condition: Some(not_started),
                ..route("TakeOffer", Action(UserAction::TakeOffer), None, Roles::Taker, INIT, true, take_offer)
            },
            route(
                "ArbitratorInitFromTaker",
                Message(K::InitTradeRequest),
                Some(PeerSlot::Taker),
                Roles::Arbitrator,
                INIT,
                true,
                arbitrator_init_from_taker,
            ),
            route(
                "MakerInit",
                Message(K::InitTradeRequest),
                Some(PeerSlot::Arbitrator),
                Roles::Maker,
                INIT,
                true,
                maker_init,
            ),
            route(
                "ArbitratorInitFromMaker",
                Message(K::InitTradeRequest),
                Some(PeerSlot::Maker),
                Roles::Arbitrator,
                INIT,
                true,
                arbitrator_init_from_maker,
            ),
            route(
                "InitMultisig",
                Message(K::InitMultisigRequest),
                None,
                Roles::All,
                INIT,
                true,
                init_multisig,
            ),
            route(
                "SignContractRequest",
                Message(K::SignContractRequest),
                None,
                Roles::All,
                INIT,
                true,
                sign_contract_request,
            ),
            Route {
                awaits_contract: true,
                ..route(
                    "SignContractResponse",
                    Message(K::SignContractResponse),
                    None,
                    Roles::All,
                    INIT,
                    true,
                    sign_contract_response,
                )
            },
            route(
                "DepositRequest",
                Message(K::DepositRequest),
                None,
                Roles::Arbitrator,
                INIT,
                true,
                deposit_request,
            ),
            route(
                "DepositResponse",
                Message(K::DepositResponse),
                Some(PeerSlot::Arbitrator),
                Roles::Traders,
                INIT,
                false,
                deposit_response,
            ),
            Route {
                pre_condition: Some(payment_sendable),
                ..route(
                    "PaymentSent",
                    Action(UserAction::PaymentSent),
                    None,
                    Roles::Buyer,
                    &[TradePhase::DepositsConfirmed, TradePhase::PaymentSent],
                    true,
                    payment_sent,
                )
            },
            route(
                "ProcessPaymentSent",
                Message(K::PaymentSent),
                None,
                Roles::SellerAndArbitrator,
                &[TradePhase::DepositsPublished, TradePhase::DepositsConfirmed],
                false,
                process_payment_sent,
            ),
            Route {
                pre_condition: Some(receipt_confirmable),
                ..route(
                    "PaymentReceived",
                    Action(UserAction::PaymentReceived),
                    None,
                    Roles::Seller,
                    &[TradePhase::PaymentSent],
                    true,
                    payment_received,
                )
            },
            Route {
                pre_condition: Some(receipt_confirmable),
                ..route(
                    "ResendPaymentReceived",
                    Action(UserAction::PaymentReceived),
                    None,
                    Roles::Seller,
                    &[TradePhase::PayoutPublished],
                    true,
                    resend_payment_received,
                )
            },
            route(
                "ProcessPaymentReceived",
                Message(K::PaymentReceived),
                None,
                Roles::BuyerAndArbitrator,
                &[TradePhase::DepositsConfirmed, TradePhase::PaymentSent],
                false,
                process_payment_received,
            ),
            Route {
                pre_condition: Some(payout_published),
                ..route(
                    "Withdraw",
                    Action(UserAction::Withdraw),
                    None,
                    Roles::Traders,
                    &[TradePhase::PayoutPublished],
                    false,
                    withdraw,
                )
            },
            Route {
                dispute_step: true,
                pre_condition: Some(mediation_closed),
                ..route(
                    "AcceptMediationResult",
                    Action(UserAction::AcceptMediationResult),
                    None,
                    Roles::Traders,
                    DISPUTABLE,
                    true,
                    accept_mediation,
                )
            },
            Route {
                dispute_step: true,
                ..route(
                    "MediatedPayoutSignature",
                    Message(K::MediatedPayoutSignature),
                    None,
                    Roles::Traders,
                    DISPUTABLE,
                    false,
                    mediated_signature,
                )
            },
            Route {
                dispute_step: true,
                ..route(
                    "MediatedPayoutPublished",
                    Message(K::MediatedPayoutPublished),
                    None,
                    Roles::All,
                    DISPUTABLE,
                    false,
                    mediated_published,
                )
            },
        ];
        Self { routes }
    }

    /// First route for `trigger` applying to `role` and sender slot `from`.
    pub fn resolve(
        &self,
        trigger: Trigger,
        role: ProtocolRole,
        from: Option<PeerSlot>,
    ) -> Option<&Route> {
        self.routes.iter().find(|r| r.applies(trigger, role, from))
    }

    /// Like `resolve`, preferring a route that accepts `phase`. Falls back to
    /// the first applicable route so the rejection names a real step.
    pub fn select(
        &self,
        trigger: Trigger,
        role: ProtocolRole,
        from: Option<PeerSlot>,
        phase: TradePhase,
    ) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|r| r.applies(trigger, role, from))
            .find(|r| r.phases.contains(&phase))
            .or_else(|| self.resolve(trigger, role, from))
    }

    /// Every route for `trigger` and `role`, whatever the sender.
    pub fn routes_for(&self, trigger: Trigger, role: ProtocolRole) -> impl Iterator<Item = &Route> {
        self.routes
            .iter()
            .filter(move |r| r.trigger == trigger && r.roles.matches(role))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

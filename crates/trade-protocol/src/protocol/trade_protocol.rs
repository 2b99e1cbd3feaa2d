//! # Trade Protocol
//!
//! One instance per open trade. Owns the trade model behind a per-trade
//! lock and drives it through the routing table.
//!
//! ```text
//! inbound message ──┬─ Ack ──────────────► outbound log
//!                   ├─ duplicate uid ────► re-ack, drop
//!                   └─ sender check ─► route ─┬─ contract missing ─► defer
//!                                             └─ FluentProtocol ─► finish
//!
//! finish: Completed → ACK, persist, watchers
//!         Rejected  → drop (NACK on failed precondition)
//!         Failed    → NACK, reclassify (transient | FundsLocked | Failed)
//!         TimedOut  → NACK, Errored, re-check deposits
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use shared_bus::{EventFilter, ProcessedUid, ProcessedUidCache, UidError, WalletEvent, WalletEventBus};
use shared_types::{Hash, PubKeyRing, TradeId};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use futures::FutureExt;
use tracing::{debug, error, info, warn};
use trade_telemetry::{log_trade_event, metric_inc, MESSAGES_DROPPED, MESSAGES_RECEIVED, STEP_TIMEOUTS};

use crate::domain::errors::{ProtocolError, TaskError, TradeError};
use crate::domain::escrow::MediationResult;
use crate::domain::messages::{AckMessage, MessageKind, ProtocolEnvelope, TradeMessage};
use crate::domain::phase::{DisputeState, PayoutState, TradeDisposition, TradePhase, TradeState};
use crate::domain::role::{PeerSlot, ProtocolRole};
use crate::domain::trade::Trade;
use crate::engine::AwaitedField;
use crate::model::{ProtocolServices, TradeModel};
use crate::ports::InboundMessage;
use crate::protocol::condition::Condition;
use crate::protocol::fluent::{FluentProtocol, StepOutcome, StepSetup};
use crate::protocol::routing::{Route, RoutingTable, Trigger, UserAction};
use crate::protocol::watchers;
use crate::reliability::{apply_ack, resend_unacknowledged, send_ack, AckEffect};

/// How an inbound message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The step ran to completion.
    Processed,
    /// The step failed; the sender was NACKed.
    Failed(String),
    /// The uid was seen before.
    Duplicate,
    /// Waiting for local data; processed later on its own task.
    Deferred,
    /// Not applicable to the trade; nothing changed.
    Dropped(&'static str),
    /// The step timer fired first.
    TimedOut,
}

#[derive(Default)]
struct Watchers {
    deposits: Option<JoinHandle<()>>,
    payout: Option<JoinHandle<()>>,
}

impl Watchers {
    fn running(handle: &Option<JoinHandle<()>>) -> bool {
        handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn abort(&mut self) {
        for handle in [self.deposits.take(), self.payout.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

/// Protocol driver of one trade.
pub struct TradeProtocol {
    trade_id: TradeId,
    role: ProtocolRole,
    model: Mutex<TradeModel>,
    contract_ready: AwaitedField<Hash>,
    processed: Arc<SyncMutex<ProcessedUidCache>>,
    routes: Arc<RoutingTable>,
    watchers: SyncMutex<Watchers>,
    wallet_events: Arc<WalletEventBus>,
    archive: mpsc::UnboundedSender<TradeId>,
}

impl TradeProtocol {
    pub fn new(
        trade: Trade,
        services: ProtocolServices,
        routes: Arc<RoutingTable>,
        processed: Arc<SyncMutex<ProcessedUidCache>>,
        archive: mpsc::UnboundedSender<TradeId>,
    ) -> Arc<Self> {
        let wallet_events = services.wallet_events.clone();
        let model = TradeModel::new(trade, services);
        if let Some(hash) = model.trade.contract_hash() {
            model.process.contract_ready.set(hash);
        }
        Arc::new(Self {
            trade_id: model.trade_id(),
            role: model.trade.protocol_role(),
            contract_ready: model.process.contract_ready.clone(),
            model: Mutex::new(model),
            processed,
            routes,
            watchers: SyncMutex::new(Watchers::default()),
            wallet_events,
            archive,
        })
    }

    pub fn trade_id(&self) -> &TradeId {
        &self.trade_id
    }

    pub fn role(&self) -> ProtocolRole {
        self.role
    }

    /// Copy of the current trade.
    pub async fn snapshot(&self) -> Trade {
        self.model.lock().await.trade.clone()
    }

    // =========================================================================
    // INBOUND MESSAGES
    // =========================================================================

    pub async fn handle_message(self: &Arc<Self>, message: InboundMessage) -> DispatchOutcome {
        let InboundMessage {
            envelope,
            sender_ring,
        } = message;
        let kind = envelope.payload.kind();
        metric_inc!(MESSAGES_RECEIVED, &[kind.class_name()]);

        if !envelope.is_supported_version() {
            metric_inc!(MESSAGES_DROPPED, &["version"]);
            return DispatchOutcome::Dropped("version");
        }
        if let TradeMessage::Ack(ack) = &envelope.payload {
            return self.handle_ack(&envelope, &sender_ring, ack).await;
        }

        let admitted = self.processed.lock().check_and_insert(&envelope.uid);
        if let Err(UidError::Duplicate { outcome, .. }) = admitted {
            metric_inc!(MESSAGES_DROPPED, &["duplicate"]);
            debug!(trade_id = %self.trade_id, uid = %envelope.uid, outcome = ?outcome, "Duplicate message");
            if outcome != ProcessedUid::InFlight {
                let model = self.model.lock().await;
                send_ack(
                    &model,
                    &envelope,
                    &sender_ring,
                    outcome == ProcessedUid::Succeeded,
                    None,
                )
                .await;
            }
            return DispatchOutcome::Duplicate;
        }

        let mut model = self.model.lock().await;
        let sender = match self.resolve_sender(&model.trade, &envelope, &sender_ring) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(trade_id = %self.trade_id, uid = %envelope.uid, error = %e, "Message from unverified sender");
                metric_inc!(MESSAGES_DROPPED, &["sender"]);
                self.processed.lock().record_outcome(&envelope.uid, false);
                return DispatchOutcome::Dropped("sender");
            }
        };

        let trigger = Trigger::Message(kind);
        let Some(route) = self
            .routes
            .select(trigger, self.role, Some(sender), model.trade.phase())
        else {
            debug!(trade_id = %self.trade_id, msg_kind = ?kind, sender = ?sender, "No route for message");
            metric_inc!(MESSAGES_DROPPED, &["no_route"]);
            self.processed.lock().record_outcome(&envelope.uid, false);
            return DispatchOutcome::Dropped("no_route");
        };

        if route.awaits_contract && !self.contract_ready.is_set() {
            let timeout = model.config().contract_await_timeout;
            drop(model);
            self.defer(envelope, sender, sender_ring, timeout);
            return DispatchOutcome::Deferred;
        }

        let outcome = self
            .run_route(&mut model, route, Some((&envelope, sender, sender_ring)))
            .await;
        self.finish_message(&mut model, &envelope, &sender_ring, outcome)
            .await
    }

    /// Resolve the sender slot, checking the ring on file. The arbitrator
    /// learns the taker from its first request.
    fn resolve_sender(
        &self,
        trade: &Trade,
        envelope: &ProtocolEnvelope,
        ring: &PubKeyRing,
    ) -> Result<PeerSlot, TradeError> {
        match trade.identify_sender(&envelope.sender_node_address, ring) {
            Err(TradeError::UnknownPeer(_))
                if self.role.is_arbitrator()
                    && envelope.payload.kind() == MessageKind::InitTradeRequest
                    && trade.taker.node_address.is_none() =>
            {
                Ok(PeerSlot::Taker)
            }
            other => other,
        }
    }

    /// Process the message on its own task once the contract is built.
    fn defer(
        self: &Arc<Self>,
        envelope: ProtocolEnvelope,
        sender: PeerSlot,
        sender_ring: PubKeyRing,
        timeout: Duration,
    ) {
        debug!(trade_id = %self.trade_id, uid = %envelope.uid, "Message deferred until contract is built");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.contract_ready.wait(timeout).await {
                Ok(_) => {
                    this.process_deferred(envelope, sender, sender_ring).await;
                }
                Err(e) => {
                    warn!(trade_id = %this.trade_id, uid = %envelope.uid, error = %e, "Deferred message expired");
                    metric_inc!(MESSAGES_DROPPED, &["contract_timeout"]);
                    this.processed.lock().forget(&envelope.uid);
                }
            }
        });
    }

    async fn process_deferred(
        self: &Arc<Self>,
        envelope: ProtocolEnvelope,
        sender: PeerSlot,
        sender_ring: PubKeyRing,
    ) -> DispatchOutcome {
        let mut model = self.model.lock().await;
        let trigger = Trigger::Message(envelope.payload.kind());
        let Some(route) = self
            .routes
            .select(trigger, self.role, Some(sender), model.trade.phase())
        else {
            return DispatchOutcome::Dropped("no_route");
        };
        let outcome = self
            .run_route(&mut model, route, Some((&envelope, sender, sender_ring)))
            .await;
        self.finish_message(&mut model, &envelope, &sender_ring, outcome)
            .await
    }

    async fn handle_ack(
        self: &Arc<Self>,
        envelope: &ProtocolEnvelope,
        sender_ring: &PubKeyRing,
        ack: &AckMessage,
    ) -> DispatchOutcome {
        let mut model = self.model.lock().await;
        let sender = match model
            .trade
            .identify_sender(&envelope.sender_node_address, sender_ring)
        {
            Ok(slot) => slot,
            Err(e) => {
                warn!(trade_id = %self.trade_id, error = %e, "Ack from unverified sender");
                metric_inc!(MESSAGES_DROPPED, &["sender"]);
                return DispatchOutcome::Dropped("sender");
            }
        };
        match apply_ack(&mut model, sender, ack) {
            AckEffect::None => {}
            AckEffect::InitRejected(reason) => {
                if model.trade.disposition() == TradeDisposition::Active {
                    self.handle_failure(&mut model, &TaskError::RejectedByPeer(reason))
                        .await;
                }
            }
        }
        self.after_step(&mut model);
        DispatchOutcome::Processed
    }

    // =========================================================================
    // USER ACTIONS
    // =========================================================================

    /// Run the pipeline bound to `action`. `prepare` records action input on
    /// the trade; it is rolled back if the step is rejected.
    pub async fn handle_action(
        self: &Arc<Self>,
        action: UserAction,
        prepare: Option<Box<dyn FnOnce(&mut Trade) + Send>>,
    ) -> Result<(), ProtocolError> {
        let mut model = self.model.lock().await;
        let trigger = Trigger::Action(action);
        let route = self
            .routes
            .select(trigger, self.role, None, model.trade.phase())
            .ok_or(ProtocolError::ActionNotAvailable {
                action: action.name(),
                role: self.role,
            })?;

        let before = prepare.map(|prepare| {
            let before = model.trade.clone();
            prepare(&mut model.trade);
            before
        });
        let outcome = self.run_route(&mut model, route, None).await;
        match outcome {
            StepOutcome::Completed => {
                self.after_step(&mut model);
                Ok(())
            }
            StepOutcome::Rejected(result) => {
                if let Some(before) = before {
                    model.trade = before;
                }
                Err(ProtocolError::Rejected {
                    step: route.name,
                    reason: format!("{result:?}"),
                })
            }
            StepOutcome::Failed(failure) => {
                self.handle_failure(&mut model, &failure.cause).await;
                Err(ProtocolError::Task(failure))
            }
            StepOutcome::TimedOut { step, after } => {
                self.handle_timeout(&mut model, step, after).await;
                Err(ProtocolError::Timeout(step.to_string()))
            }
        }
    }

    // =========================================================================
    // STEPS
    // =========================================================================

    async fn run_route(
        &self,
        model: &mut TradeModel,
        route: &Route,
        inbound: Option<(&ProtocolEnvelope, PeerSlot, PubKeyRing)>,
    ) -> StepOutcome {
        model.process.clear_step();
        let mut condition = Condition::any_phase(route.phases);
        if let Some((envelope, slot, ring)) = inbound {
            model.process.trade_message = Some(envelope.clone());
            model.process.sender_slot = Some(slot);
            model.process.sender_ring = Some(ring);
            condition = condition
                .with_message(envelope)
                .from(&envelope.sender_node_address);
        }
        if route.dispute_step {
            condition = condition.for_dispute();
        }
        if let Some(check) = route.pre_condition {
            condition = match check(&model.trade) {
                Ok(()) => condition.pre_condition(true, route.name),
                Err(reason) => condition.pre_condition(false, reason),
            };
        }

        let tasks = (route.tasks)(&model.strategy());
        let mut setup = StepSetup::tasks(route.name, tasks);
        if route.timed {
            setup = setup.with_timeout(model.config().step_timeout);
        }
        FluentProtocol::expect(model, condition)
            .setup(setup)
            .execute_tasks()
            .await
    }

    async fn finish_message(
        self: &Arc<Self>,
        model: &mut TradeModel,
        envelope: &ProtocolEnvelope,
        sender_ring: &PubKeyRing,
        outcome: StepOutcome,
    ) -> DispatchOutcome {
        let uid = envelope.uid.as_str();
        match outcome {
            StepOutcome::Completed => {
                self.processed.lock().record_outcome(uid, true);
                send_ack(model, envelope, sender_ring, true, None).await;
                self.after_step(model);
                DispatchOutcome::Processed
            }
            StepOutcome::Rejected(result) => {
                metric_inc!(MESSAGES_DROPPED, &[result.drop_reason()]);
                if result.is_pre_condition_failure() {
                    self.processed.lock().record_outcome(uid, false);
                    send_ack(model, envelope, sender_ring, false, Some(format!("{result:?}"))).await;
                } else {
                    self.processed.lock().forget(uid);
                }
                DispatchOutcome::Dropped(result.drop_reason())
            }
            StepOutcome::Failed(failure) => {
                self.processed.lock().record_outcome(uid, false);
                send_ack(model, envelope, sender_ring, false, Some(failure.cause.to_string())).await;
                self.handle_failure(model, &failure.cause).await;
                DispatchOutcome::Failed(failure.to_string())
            }
            StepOutcome::TimedOut { step, after } => {
                self.processed.lock().record_outcome(uid, false);
                send_ack(model, envelope, sender_ring, false, Some(format!("{step} timed out"))).await;
                self.handle_timeout(model, step, after).await;
                DispatchOutcome::TimedOut
            }
        }
    }

    /// Reclassify after a failed step.
    async fn handle_failure(self: &Arc<Self>, model: &mut TradeModel, cause: &TaskError) {
        model.trade.set_error_message(cause.to_string());
        if cause.is_transient() {
            log_trade_event!(
                warn,
                self.trade_id,
                model.trade.phase(),
                model.trade.state(),
                "Step failed on transient error, trade stays active",
                error = %cause
            );
            self.after_step(model);
            return;
        }

        if model.trade.is_funds_locked() {
            model.trade.set_disposition(TradeDisposition::FundsLocked);
            log_trade_event!(
                error,
                self.trade_id,
                model.trade.phase(),
                model.trade.state(),
                "Step failed with funds locked, manual recovery required",
                error = %cause
            );
            self.after_step(model);
            return;
        }

        model.trade.set_disposition(TradeDisposition::Failed);
        log_trade_event!(
            warn,
            self.trade_id,
            model.trade.phase(),
            model.trade.state(),
            "Trade failed before funds were locked",
            error = %cause
        );
        self.release_reserve(model).await;
        self.after_step(model);
    }

    /// Give reserved funds back: makers release the offer, takers thaw
    /// their reserve outputs.
    async fn release_reserve(&self, model: &mut TradeModel) {
        if self.role.is_maker() {
            if let Err(e) = model.offers().release_open_offer(&self.trade_id).await {
                warn!(trade_id = %self.trade_id, error = %e, "Open offer not released");
            }
            return;
        }
        let key_images = model
            .trade
            .own_peer()
            .reserve_tx
            .as_ref()
            .map(|tx| tx.key_images.clone())
            .unwrap_or_default();
        if key_images.is_empty() {
            return;
        }
        match model.wallet().thaw_outputs(&key_images).await {
            Ok(()) => info!(trade_id = %self.trade_id, outputs = key_images.len(), "Reserve outputs thawed"),
            Err(e) => error!(trade_id = %self.trade_id, error = %e, "Reserve outputs not thawed"),
        }
    }

    /// A step timer fired: the trade is errored unless the deposits turn
    /// out to be on chain, in which case funds are locked.
    async fn handle_timeout(self: &Arc<Self>, model: &mut TradeModel, step: &'static str, after: Duration) {
        metric_inc!(STEP_TIMEOUTS);
        model
            .trade
            .set_error_message(format!("{step} timed out after {after:?}"));
        model.trade.set_disposition(TradeDisposition::Errored);

        let wallet = model.wallet();
        for slot in [PeerSlot::Maker, PeerSlot::Taker] {
            let Some(hash) = model.trade.peer(slot).deposit_hash().map(str::to_string) else {
                continue;
            };
            match wallet.get_tx_status(&hash).await {
                Ok(Some(status)) if status.relayed => {
                    if let Some(deposit) = model.trade.peer_mut(slot).deposit_tx.as_mut() {
                        deposit.relayed = true;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(trade_id = %self.trade_id, tx_hash = %hash, error = %e, "Deposit status unknown"),
            }
        }
        if model.trade.is_funds_locked() {
            model.trade.set_disposition(TradeDisposition::FundsLocked);
        }
        log_trade_event!(
            warn,
            self.trade_id,
            model.trade.phase(),
            model.trade.state(),
            "Step timed out",
            step = step,
            disposition = ?model.trade.disposition()
        );
        self.after_step(model);
    }

    /// Persist, start or stop watchers, and hand archived trades over.
    fn after_step(self: &Arc<Self>, model: &mut TradeModel) {
        model.process.services.persistence.request_persistence(&model.trade);
        let trade = &model.trade;
        if trade.disposition().is_archived() {
            self.watchers.lock().abort();
            if self.archive.send(self.trade_id.clone()).is_err() {
                debug!(trade_id = %self.trade_id, "Archive closed");
            }
            return;
        }
        if trade.phase() == TradePhase::DepositsPublished && !trade.deposits_unlocked() {
            self.ensure_deposit_watcher(model);
        }
        if matches!(
            trade.payout_state(),
            PayoutState::Published | PayoutState::Confirmed
        ) {
            self.ensure_payout_watcher(model);
        }
    }

    // =========================================================================
    // WATCHERS
    // =========================================================================

    fn ensure_deposit_watcher(self: &Arc<Self>, model: &TradeModel) {
        let mut watchers = self.watchers.lock();
        if Watchers::running(&watchers.deposits) {
            return;
        }
        let deposits: Vec<(PeerSlot, String)> = [PeerSlot::Maker, PeerSlot::Taker]
            .into_iter()
            .filter_map(|slot| {
                model
                    .trade
                    .peer(slot)
                    .deposit_hash()
                    .map(|hash| (slot, hash.to_string()))
            })
            .collect();
        if deposits.len() < 2 {
            warn!(trade_id = %self.trade_id, "Deposit hashes incomplete, not watching");
            return;
        }
        // Registered before the initial status sync so no event is missed.
        let stream = self
            .wallet_events
            .event_stream(EventFilter::tx_hashes(deposits.iter().map(|(_, h)| h.clone())));
        watchers.deposits = Some(tokio::spawn(watchers::watch_deposits(
            Arc::clone(self),
            stream,
            deposits,
            model.wallet(),
        )));
    }

    fn ensure_payout_watcher(self: &Arc<Self>, model: &TradeModel) {
        let mut watchers = self.watchers.lock();
        if Watchers::running(&watchers.payout) {
            return;
        }
        let Some(hash) = model.trade.payout_tx_hash.clone() else {
            return;
        };
        let filter = EventFilter::tx_hashes([hash.clone()]);
        let confirmed = self
            .wallet_events
            .subscribe_once(filter.clone(), |event| match event {
                WalletEvent::OutputReceived { confirmations, .. } => *confirmations > 0,
                WalletEvent::TxUnlocked { .. } => true,
                WalletEvent::BalancesChanged { .. } => false,
            })
            .boxed();
        let unlocked = self
            .wallet_events
            .subscribe_once(filter, |event| {
                matches!(
                    event,
                    WalletEvent::TxUnlocked { .. }
                        | WalletEvent::OutputReceived {
                            is_locked: false,
                            ..
                        }
                )
            })
            .boxed();
        watchers.payout = Some(tokio::spawn(watchers::watch_payout(
            Arc::clone(self),
            watchers::PayoutWaiters {
                tx_hash: hash,
                confirmed,
                unlocked,
            },
            model.wallet(),
            model.config().unlock_confirmations,
        )));
    }

    /// Record a deposit lock status. Returns true once both are unlocked.
    pub(crate) async fn on_deposit_status(self: &Arc<Self>, slot: PeerSlot, locked: bool) -> bool {
        let mut model = self.model.lock().await;
        let peer = model.trade.peer_mut(slot);
        if peer.deposit_locked != Some(false) {
            peer.deposit_locked = Some(locked);
        }
        let unlocked = model.trade.deposits_unlocked();
        if unlocked
            && model.trade.phase() < TradePhase::DepositsConfirmed
            && model.trade.disposition().accepts_protocol_steps()
        {
            match model.trade.set_state(TradeState::DepositTxsUnlocked) {
                Ok(()) => log_trade_event!(
                    info,
                    self.trade_id,
                    model.trade.phase(),
                    model.trade.state(),
                    "Deposits unlocked"
                ),
                Err(e) => warn!(trade_id = %self.trade_id, error = %e, "Deposit unlock not applied"),
            }
        }
        self.after_step(&mut model);
        unlocked
    }

    /// Record payout progress. The arbitrator's part ends when the payout
    /// unlocks.
    pub(crate) async fn on_payout_state(self: &Arc<Self>, state: PayoutState) {
        let mut model = self.model.lock().await;
        if model.trade.advance_payout_state(state) {
            log_trade_event!(
                info,
                self.trade_id,
                model.trade.phase(),
                model.trade.state(),
                "Payout state advanced",
                payout_state = ?state
            );
        }
        if state == PayoutState::Unlocked
            && self.role.is_arbitrator()
            && model.trade.phase() < TradePhase::Withdrawn
        {
            if let Err(e) = model.trade.set_state(TradeState::TradeCompleted) {
                warn!(trade_id = %self.trade_id, error = %e, "Arbitrator completion not applied");
            }
            model.trade.set_disposition(TradeDisposition::Closed);
        }
        self.after_step(&mut model);
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Resume after a restart: optionally resend unacknowledged mailbox
    /// messages, then restart watchers.
    pub async fn resume(self: &Arc<Self>, resend: bool) -> usize {
        let mut model = self.model.lock().await;
        let resent = if resend {
            resend_unacknowledged(&mut model).await
        } else {
            0
        };
        self.after_step(&mut model);
        resent
    }

    pub async fn resend_unacknowledged(self: &Arc<Self>) -> usize {
        let mut model = self.model.lock().await;
        let resent = resend_unacknowledged(&mut model).await;
        if resent > 0 {
            self.after_step(&mut model);
        }
        resent
    }

    /// Stop watchers; the trade is no longer driven.
    pub fn shutdown(&self) {
        self.watchers.lock().abort();
    }

    // =========================================================================
    // DISPUTES
    // =========================================================================

    pub async fn request_mediation(self: &Arc<Self>) -> Result<(), ProtocolError> {
        let mut model = self.model.lock().await;
        Self::check_disputable(&model.trade, "request_mediation")?;
        model
            .trade
            .set_dispute_state(DisputeState::MediationRequested)?;
        info!(trade_id = %self.trade_id, "Mediation requested");
        self.after_step(&mut model);
        Ok(())
    }

    /// Record the mediator's proposal; closes mediation.
    pub async fn set_mediation_result(
        self: &Arc<Self>,
        result: MediationResult,
    ) -> Result<(), ProtocolError> {
        let mut model = self.model.lock().await;
        Self::check_disputable(&model.trade, "set_mediation_result")?;
        let trade = &mut model.trade;
        if trade.dispute_state() == DisputeState::NoDispute {
            trade.set_dispute_state(DisputeState::MediationRequested)?;
        }
        trade.set_dispute_state(DisputeState::MediationClosed)?;
        trade.mediation_result = Some(result);
        info!(
            trade_id = %self.trade_id,
            buyer_payout = result.buyer_payout,
            seller_payout = result.seller_payout,
            "Mediation result recorded"
        );
        self.after_step(&mut model);
        Ok(())
    }

    /// Open a dispute, optionally moving the trade back to `revert_to`.
    pub async fn open_dispute(
        self: &Arc<Self>,
        revert_to: Option<TradePhase>,
    ) -> Result<(), ProtocolError> {
        let mut model = self.model.lock().await;
        Self::check_disputable(&model.trade, "open_dispute")?;
        model.trade.set_dispute_state(DisputeState::DisputeOpen)?;
        if let Some(phase) = revert_to {
            model.trade.revert_for_dispute(phase)?;
        }
        log_trade_event!(
            warn,
            self.trade_id,
            model.trade.phase(),
            model.trade.state(),
            "Dispute opened"
        );
        self.after_step(&mut model);
        Ok(())
    }

    fn check_disputable(trade: &Trade, step: &'static str) -> Result<(), ProtocolError> {
        if trade.payout_state() >= PayoutState::Published {
            return Err(ProtocolError::Rejected {
                step,
                reason: "payout already published".into(),
            });
        }
        if !trade.disposition().accepts_dispute_steps() {
            return Err(TradeError::InvalidDisposition(trade.disposition()).into());
        }
        Ok(())
    }
}

impl Drop for TradeProtocol {
    fn drop(&mut self) {
        self.watchers.get_mut().abort();
    }
}

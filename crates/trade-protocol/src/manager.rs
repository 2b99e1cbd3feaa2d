//! # Trade Manager
//!
//! Registry of the node's trades and entry point of the inbound API.
//!
//! ```text
//! network ──► on_network_message ──► spawn ──► TradeProtocol::handle_message
//!                   │                               (per-trade lock)
//!                   └─ unknown trade + InitTradeRequest ──► create trade
//!
//! user ──► take_offer / on_payment_sent / ... ──► spawn ──► handle_action
//!
//! TradeProtocol ──archive──► archiver task ──► closed | failed
//! ```
//!
//! Every inbound message and user action runs on its own task; callers
//! await the returned outcome, so slow wallet I/O never blocks the
//! network context.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_bus::ProcessedUidCache;
use shared_types::TradeId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trade_telemetry::{metric_inc, MESSAGES_DROPPED, OPEN_TRADES, TRADES_ARCHIVED};

use crate::domain::errors::{OfferBookError, ProtocolError, TradeError};
use crate::domain::escrow::MediationResult;
use crate::domain::messages::{InitTradeRequest, TradeMessage};
use crate::domain::offer::Offer;
use crate::domain::peer::TradingPeer;
use crate::domain::phase::{TradeDisposition, TradePhase};
use crate::domain::role::TradeRole;
use crate::domain::trade::Trade;
use crate::model::ProtocolServices;
use crate::offer::{self, PlaceOfferRequest};
use crate::ports::{InboundMessage, OpenOfferState, TradeProtocolApi};
use crate::protocol::{DispatchOutcome, RoutingTable, TradeProtocol, UserAction};

struct ManagerInner {
    services: ProtocolServices,
    routes: Arc<RoutingTable>,
    protocols: RwLock<HashMap<TradeId, Arc<TradeProtocol>>>,
    closed: RwLock<HashMap<TradeId, Trade>>,
    failed: RwLock<HashMap<TradeId, Trade>>,
    /// Shared by every trade of the node.
    processed: Arc<Mutex<ProcessedUidCache>>,
    archive: mpsc::UnboundedSender<TradeId>,
}

/// Registry of open and archived trades.
#[derive(Clone)]
pub struct TradeManager {
    inner: Arc<ManagerInner>,
}

impl TradeManager {
    /// Create a manager. Must be called within a Tokio runtime: the archiver
    /// task is spawned here.
    pub fn new(services: ProtocolServices) -> Self {
        let (archive, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ManagerInner {
            services,
            routes: Arc::new(RoutingTable::standard()),
            protocols: RwLock::new(HashMap::new()),
            closed: RwLock::new(HashMap::new()),
            failed: RwLock::new(HashMap::new()),
            processed: Arc::new(Mutex::new(ProcessedUidCache::new())),
            archive,
        });
        tokio::spawn(archiver(Arc::downgrade(&inner), rx));
        Self { inner }
    }

    pub fn services(&self) -> &ProtocolServices {
        &self.inner.services
    }

    // =========================================================================
    // REGISTRY
    // =========================================================================

    fn protocol(&self, trade_id: &TradeId) -> Result<Arc<TradeProtocol>, ProtocolError> {
        self.inner
            .protocols
            .read()
            .get(trade_id)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownTrade(trade_id.clone()))
    }

    fn is_archived(&self, trade_id: &TradeId) -> bool {
        self.inner.closed.read().contains_key(trade_id)
            || self.inner.failed.read().contains_key(trade_id)
    }

    fn new_protocol(&self, trade: Trade) -> Arc<TradeProtocol> {
        TradeProtocol::new(
            trade,
            self.inner.services.clone(),
            self.inner.routes.clone(),
            self.inner.processed.clone(),
            self.inner.archive.clone(),
        )
    }

    /// Register a new trade; fails if the id is taken.
    fn register(&self, trade: Trade) -> Result<Arc<TradeProtocol>, ProtocolError> {
        let trade_id = trade.id().clone();
        if self.is_archived(&trade_id) {
            return Err(ProtocolError::TradeExists(trade_id));
        }
        let mut protocols = self.inner.protocols.write();
        if protocols.contains_key(&trade_id) {
            return Err(ProtocolError::TradeExists(trade_id));
        }
        let protocol = self.new_protocol(trade);
        protocols.insert(trade_id.clone(), protocol.clone());
        metric_inc!(OPEN_TRADES);
        info!(trade_id = %trade_id, role = ?protocol.role(), "Trade registered");
        Ok(protocol)
    }

    /// Ids of the open trades.
    pub fn open_trades(&self) -> Vec<TradeId> {
        self.inner.protocols.read().keys().cloned().collect()
    }

    pub fn closed_trades(&self) -> Vec<Trade> {
        self.inner.closed.read().values().cloned().collect()
    }

    pub fn failed_trades(&self) -> Vec<Trade> {
        self.inner.failed.read().values().cloned().collect()
    }

    // =========================================================================
    // INBOUND MESSAGES
    // =========================================================================

    /// Handle a message on its own task without waiting for it.
    pub fn dispatch(&self, message: InboundMessage) -> JoinHandle<DispatchOutcome> {
        let manager = self.clone();
        tokio::spawn(async move { manager.route_message(message).await })
    }

    async fn route_message(&self, message: InboundMessage) -> DispatchOutcome {
        let trade_id = message.envelope.trade_id.clone();
        let existing = self.inner.protocols.read().get(&trade_id).cloned();
        if let Some(protocol) = existing {
            return protocol.handle_message(message).await;
        }
        if self.is_archived(&trade_id) {
            debug!(trade_id = %trade_id, uid = %message.envelope.uid, "Message for archived trade");
            metric_inc!(MESSAGES_DROPPED, &["archived"]);
            return DispatchOutcome::Dropped("archived");
        }
        let protocol = match &message.envelope.payload {
            TradeMessage::InitTradeRequest(request) => self.open_from_request(&message, request),
            _ => None,
        };
        match protocol {
            Some(protocol) => protocol.handle_message(message).await,
            None => {
                debug!(trade_id = %trade_id, uid = %message.envelope.uid, "Message for unknown trade");
                metric_inc!(MESSAGES_DROPPED, &["unknown_trade"]);
                DispatchOutcome::Dropped("unknown_trade")
            }
        }
    }

    /// Create the trade an `InitTradeRequest` opens at the arbitrator or
    /// the maker. Returns the existing protocol if a concurrent request
    /// created it first.
    fn open_from_request(
        &self,
        message: &InboundMessage,
        request: &InitTradeRequest,
    ) -> Option<Arc<TradeProtocol>> {
        let services = &self.inner.services;
        let trade_id = &message.envelope.trade_id;
        let own_address = services.network.own_address();

        let trade = if request.arbitrator_node_address == own_address {
            let offer = services.offers.find_offer(trade_id)?;
            if offer.arbitrator_node_address != own_address {
                return None;
            }
            let mut trade = Trade::new(
                TradeRole::Arbitrator,
                offer,
                request.trade_amount,
                request.trade_price,
            );
            trade.arbitrator.pub_key_ring = Some(services.identity.pub_key_ring());
            trade
        } else {
            let open_offer = services.offers.open_offer(trade_id)?;
            let sender = &message.envelope.sender_node_address;
            let accepted = services.identity.accepted_arbitrator(sender);
            if open_offer.state != OpenOfferState::Available
                || *sender != open_offer.offer.arbitrator_node_address
                || accepted != Some(message.sender_ring)
            {
                warn!(trade_id = %trade_id, sender = %sender, "Init request for own offer rejected");
                return None;
            }
            Trade::new(
                TradeRole::Maker,
                open_offer.offer,
                request.trade_amount,
                request.trade_price,
            )
        };

        let mut protocols = self.inner.protocols.write();
        if let Some(existing) = protocols.get(trade_id) {
            return Some(existing.clone());
        }
        let protocol = self.new_protocol(trade);
        protocols.insert(trade_id.clone(), protocol.clone());
        metric_inc!(OPEN_TRADES);
        info!(trade_id = %trade_id, role = ?protocol.role(), "Trade opened by init request");
        Some(protocol)
    }

    // =========================================================================
    // USER ACTIONS
    // =========================================================================

    async fn run_action(
        &self,
        trade_id: &TradeId,
        action: UserAction,
        prepare: Option<Box<dyn FnOnce(&mut Trade) + Send>>,
    ) -> Result<(), ProtocolError> {
        let protocol = self.protocol(trade_id)?;
        tokio::spawn(async move { protocol.handle_action(action, prepare).await })
            .await
            .map_err(|e| {
                warn!(trade_id = %trade_id, action = action.name(), error = %e, "Action task ended abnormally");
                ProtocolError::Cancelled
            })?
    }

    async fn take(&self, offer_id: &TradeId, amount: u64) -> Result<TradeId, ProtocolError> {
        let services = &self.inner.services;
        let offer: Offer = services
            .offers
            .find_offer(offer_id)
            .ok_or_else(|| OfferBookError::NotFound(offer_id.clone()))?;
        offer.check_amount(amount)?;
        let arbitrator_ring = services
            .identity
            .accepted_arbitrator(&offer.arbitrator_node_address)
            .ok_or_else(|| {
                TradeError::InvalidOffer(format!(
                    "arbitrator {} not accepted",
                    offer.arbitrator_node_address
                ))
            })?;

        let price = offer.price;
        let mut trade = Trade::new(TradeRole::Taker, offer, amount, price);
        trade.taker = TradingPeer::with_address(
            services.network.own_address(),
            Some(services.identity.pub_key_ring()),
        );
        trade.arbitrator.pub_key_ring = Some(arbitrator_ring);
        let trade_id = trade.id().clone();
        self.register(trade)?;

        self.run_action(&trade_id, UserAction::TakeOffer, None).await?;
        Ok(trade_id)
    }

    /// Open a dispute, optionally reverting the trade to `revert_to`.
    pub async fn open_dispute(
        &self,
        trade_id: &TradeId,
        revert_to: Option<TradePhase>,
    ) -> Result<(), ProtocolError> {
        self.protocol(trade_id)?.open_dispute(revert_to).await
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Load persisted trades, archive the finished ones and resume the
    /// rest. Returns the number of mailbox messages resent.
    pub async fn on_startup(&self) -> Result<usize, ProtocolError> {
        let trades = self.inner.services.persistence.load_trades().await?;
        let resend = self.inner.services.config.resend_on_startup;
        let mut resent = 0;
        for trade in trades {
            let trade_id = trade.id().clone();
            match trade.disposition() {
                TradeDisposition::Closed => {
                    self.inner.closed.write().insert(trade_id, trade);
                    continue;
                }
                TradeDisposition::Failed => {
                    self.inner.failed.write().insert(trade_id, trade);
                    continue;
                }
                _ => {}
            }
            let protocol = match self.register(trade) {
                Ok(protocol) => protocol,
                Err(ProtocolError::TradeExists(_)) => continue,
                Err(e) => return Err(e),
            };
            resent += protocol.resume(resend).await;
        }
        info!(
            open = self.inner.protocols.read().len(),
            resent = resent,
            "Trade manager started"
        );
        Ok(resent)
    }

    /// Stop every watcher; trades stay registered.
    pub fn shutdown(&self) {
        for protocol in self.inner.protocols.read().values() {
            protocol.shutdown();
        }
    }
}

impl ManagerInner {
    async fn archive(&self, trade_id: &TradeId) {
        let protocol = self.protocols.write().remove(trade_id);
        let Some(protocol) = protocol else {
            return;
        };
        let trade = protocol.snapshot().await;
        let (archive, label) = match trade.disposition() {
            TradeDisposition::Closed => (&self.closed, "closed"),
            TradeDisposition::Failed => (&self.failed, "failed"),
            other => {
                debug!(trade_id = %trade_id, disposition = ?other, "Trade no longer archivable");
                self.protocols.write().insert(trade_id.clone(), protocol);
                return;
            }
        };
        protocol.shutdown();
        archive.write().insert(trade_id.clone(), trade);
        OPEN_TRADES.dec();
        metric_inc!(TRADES_ARCHIVED, &[label]);
        info!(trade_id = %trade_id, disposition = label, "Trade archived");
    }
}

/// Moves finished trades into the archives until the manager is dropped.
async fn archiver(inner: Weak<ManagerInner>, mut rx: mpsc::UnboundedReceiver<TradeId>) {
    while let Some(trade_id) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.archive(&trade_id).await;
    }
}

#[async_trait]
impl TradeProtocolApi for TradeManager {
    async fn place_offer(&self, request: PlaceOfferRequest) -> Result<Offer, ProtocolError> {
        offer::place_offer(self.inner.services.clone(), request).await
    }

    async fn take_offer(&self, offer_id: &TradeId, amount: u64) -> Result<TradeId, ProtocolError> {
        self.take(offer_id, amount).await
    }

    async fn on_network_message(&self, message: InboundMessage) -> DispatchOutcome {
        match self.dispatch(message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Message task ended abnormally");
                DispatchOutcome::Dropped("cancelled")
            }
        }
    }

    async fn on_payment_sent(
        &self,
        trade_id: &TradeId,
        counter_currency_tx_id: Option<String>,
    ) -> Result<(), ProtocolError> {
        let prepare: Box<dyn FnOnce(&mut Trade) + Send> = Box::new(move |trade: &mut Trade| {
            trade.counter_currency_tx_id = counter_currency_tx_id;
        });
        self.run_action(trade_id, UserAction::PaymentSent, Some(prepare))
            .await
    }

    async fn on_payment_received(&self, trade_id: &TradeId) -> Result<(), ProtocolError> {
        self.run_action(trade_id, UserAction::PaymentReceived, None)
            .await
    }

    async fn on_withdraw(&self, trade_id: &TradeId) -> Result<(), ProtocolError> {
        self.run_action(trade_id, UserAction::Withdraw, None).await
    }

    async fn request_mediation(&self, trade_id: &TradeId) -> Result<(), ProtocolError> {
        self.protocol(trade_id)?.request_mediation().await
    }

    async fn set_mediation_result(
        &self,
        trade_id: &TradeId,
        result: MediationResult,
    ) -> Result<(), ProtocolError> {
        self.protocol(trade_id)?.set_mediation_result(result).await
    }

    async fn accept_mediation_result(&self, trade_id: &TradeId) -> Result<(), ProtocolError> {
        self.run_action(trade_id, UserAction::AcceptMediationResult, None)
            .await
    }

    async fn trade(&self, trade_id: &TradeId) -> Option<Trade> {
        let existing = self.inner.protocols.read().get(trade_id).cloned();
        if let Some(protocol) = existing {
            return Some(protocol.snapshot().await);
        }
        if let Some(trade) = self.inner.closed.read().get(trade_id) {
            return Some(trade.clone());
        }
        self.inner.failed.read().get(trade_id).cloned()
    }
}

//! # Trade Model
//!
//! The single aggregate a trade pipeline runs against:
//!
//! ```text
//! TradeModel
//! ├── trade:   Trade         persisted protocol state
//! └── process: ProcessModel  per-load scratch data and collaborators
//! ```

use std::sync::Arc;

use shared_bus::WalletEventBus;
use shared_types::{Hash, NodeAddress, PubKeyRing, TradeId};

use crate::config::ProtocolConfig;
use crate::domain::errors::{TaskError, TradeError};
use crate::domain::messages::{ProtocolEnvelope, TradeMessage};
use crate::domain::role::PeerSlot;
use crate::domain::trade::Trade;
use crate::engine::AwaitedField;
use crate::ports::{
    IdentityService, NetworkService, OpenOfferService, SignedMultisigTx, TradePersistence,
    WalletService,
};
use crate::protocol::strategy::RoleStrategy;

/// Handles to every collaborator of the engine.
#[derive(Clone)]
pub struct ProtocolServices {
    pub wallet: Arc<dyn WalletService>,
    pub network: Arc<dyn NetworkService>,
    pub persistence: Arc<dyn TradePersistence>,
    pub identity: Arc<dyn IdentityService>,
    pub offers: Arc<dyn OpenOfferService>,
    pub wallet_events: Arc<WalletEventBus>,
    pub config: ProtocolConfig,
}

/// Transient per-trade data. Recreated whenever a trade is loaded.
pub struct ProcessModel {
    pub services: ProtocolServices,
    pub strategy: RoleStrategy,
    /// Message that triggered the running step.
    pub trade_message: Option<ProtocolEnvelope>,
    pub sender_slot: Option<PeerSlot>,
    pub sender_ring: Option<PubKeyRing>,
    pub temp_trading_peer_address: Option<NodeAddress>,
    /// Set to the contract hash once the contract is built.
    pub contract_ready: AwaitedField<Hash>,
    /// Latest payout transaction signed in this step.
    pub signed_payout: Option<SignedMultisigTx>,
}

impl ProcessModel {
    pub fn new(services: ProtocolServices, strategy: RoleStrategy) -> Self {
        Self {
            services,
            strategy,
            trade_message: None,
            sender_slot: None,
            sender_ring: None,
            temp_trading_peer_address: None,
            contract_ready: AwaitedField::new(),
            signed_payout: None,
        }
    }

    /// Forget the data of the previous step.
    pub fn clear_step(&mut self) {
        self.trade_message = None;
        self.sender_slot = None;
        self.sender_ring = None;
        self.signed_payout = None;
    }
}

/// Trade plus process model behind the per-trade lock.
pub struct TradeModel {
    pub trade: Trade,
    pub process: ProcessModel,
}

impl TradeModel {
    pub fn new(trade: Trade, services: ProtocolServices) -> Self {
        let strategy = RoleStrategy::for_role(trade.protocol_role());
        Self {
            trade,
            process: ProcessModel::new(services, strategy),
        }
    }

    pub fn trade_id(&self) -> TradeId {
        self.trade.id().clone()
    }

    pub fn strategy(&self) -> RoleStrategy {
        self.process.strategy
    }

    pub fn services(&self) -> &ProtocolServices {
        &self.process.services
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.process.services.config
    }

    pub fn wallet(&self) -> Arc<dyn WalletService> {
        self.process.services.wallet.clone()
    }

    pub fn network(&self) -> Arc<dyn NetworkService> {
        self.process.services.network.clone()
    }

    pub fn identity(&self) -> Arc<dyn IdentityService> {
        self.process.services.identity.clone()
    }

    pub fn offers(&self) -> Arc<dyn OpenOfferService> {
        self.process.services.offers.clone()
    }

    /// The message that triggered the running step.
    pub fn message(&self) -> Result<&ProtocolEnvelope, TaskError> {
        self.process
            .trade_message
            .as_ref()
            .ok_or(TaskError::Trade(TradeError::MissingData("trade message")))
    }

    /// Slot and ring of the message sender.
    pub fn sender(&self) -> Result<(PeerSlot, PubKeyRing), TaskError> {
        match (self.process.sender_slot, self.process.sender_ring) {
            (Some(slot), Some(ring)) => Ok((slot, ring)),
            _ => Err(TradeError::MissingData("message sender").into()),
        }
    }

    /// Extract the typed payload of the current message.
    pub fn payload<T: Clone>(
        &self,
        expected: &'static str,
        extract: impl FnOnce(&TradeMessage) -> Option<&T>,
    ) -> Result<T, TaskError> {
        extract(&self.message()?.payload)
            .cloned()
            .ok_or(TaskError::UnexpectedMessage(expected))
    }
}

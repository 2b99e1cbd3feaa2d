//! Three-node cluster: maker, taker and arbitrator over one simulated
//! chain and network, each with its own wallet, store and event bus.

use std::sync::Arc;
use std::time::Duration;

use shared_bus::WalletEventBus;
use shared_crypto::KeyRing;
use shared_types::amounts::ATOMIC_UNITS_PER_XMR;
use shared_types::{NodeAddress, PubKeyRing, TradeId};
use trade_protocol::{
    InMemoryOfferBook, InMemoryTradeStore, KeyRingIdentity, Offer, OfferDirection,
    PlaceOfferRequest, ProtocolConfig, ProtocolError, ProtocolServices, PublicOfferBook, Trade,
    TradeManager, TradePhase, TradeProtocolApi, WalletService,
};

use crate::sim::chain::SimChain;
use crate::sim::network::SimNetwork;
use crate::sim::wallet::SimWallet;

/// Funds every wallet starts with.
pub const STARTING_BALANCE: u64 = 10 * ATOMIC_UNITS_PER_XMR;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const POLL_ROUNDS: usize = 1_000;

/// One simulated node.
pub struct SimNode {
    pub label: &'static str,
    pub address: NodeAddress,
    pub ring: PubKeyRing,
    pub manager: TradeManager,
    pub wallet: Arc<SimWallet>,
    pub store: Arc<InMemoryTradeStore>,
    pub events: Arc<WalletEventBus>,
}

impl SimNode {
    pub async fn trade(&self, trade_id: &TradeId) -> Option<Trade> {
        self.manager.trade(trade_id).await
    }

    /// Poll the node's view of a trade until `check` holds.
    pub async fn wait_for(
        &self,
        trade_id: &TradeId,
        what: &str,
        check: impl Fn(&Trade) -> bool,
    ) -> Trade {
        for _ in 0..POLL_ROUNDS {
            if let Some(trade) = self.manager.trade(trade_id).await {
                if check(&trade) {
                    return trade;
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        let last = self
            .manager
            .trade(trade_id)
            .await
            .map(|t| (t.state(), t.disposition(), t.error_message.clone()));
        panic!("{}: gave up waiting for {what}, last seen {last:?}", self.label);
    }

    /// Poll until the trade has been moved to an archive.
    pub async fn wait_archived(&self, trade_id: &TradeId) {
        for _ in 0..POLL_ROUNDS {
            let archived = self
                .manager
                .closed_trades()
                .iter()
                .chain(self.manager.failed_trades().iter())
                .any(|t| t.id() == trade_id);
            if archived {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        panic!("{}: trade {trade_id} never archived", self.label);
    }
}

/// Maker, taker and arbitrator sharing one chain, network and offer book.
pub struct SimCluster {
    pub chain: Arc<SimChain>,
    pub network: Arc<SimNetwork>,
    pub offers: PublicOfferBook,
    pub config: ProtocolConfig,
    pub maker: SimNode,
    pub taker: SimNode,
    pub arbitrator: SimNode,
}

struct Shared<'a> {
    chain: &'a Arc<SimChain>,
    network: &'a Arc<SimNetwork>,
    offers: &'a PublicOfferBook,
    config: &'a ProtocolConfig,
    arbitrator: (&'a NodeAddress, PubKeyRing),
}

impl SimCluster {
    /// Must be called within a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    pub fn with_config(config: ProtocolConfig) -> Self {
        let chain = Arc::new(SimChain::new(config.unlock_confirmations));
        let network = SimNetwork::new();
        let offers = PublicOfferBook::new();

        let arbitrator_keys = KeyRing::from_seed([3; 32]);
        let arbitrator_address = NodeAddress::new("arbitrator.onion", 9003);
        let arbitrator_ring = arbitrator_keys.pub_key_ring();
        let shared = Shared {
            chain: &chain,
            network: &network,
            offers: &offers,
            config: &config,
            arbitrator: (&arbitrator_address, arbitrator_ring),
        };

        let maker = build_node("maker", 9001, KeyRing::from_seed([1; 32]), &shared);
        let taker = build_node("taker", 9002, KeyRing::from_seed([2; 32]), &shared);
        let arbitrator = build_node("arbitrator", 9003, arbitrator_keys, &shared);

        Self {
            chain,
            network,
            offers,
            config,
            maker,
            taker,
            arbitrator,
        }
    }

    pub fn nodes(&self) -> [&SimNode; 3] {
        [&self.maker, &self.taker, &self.arbitrator]
    }

    /// Offer of the cluster's maker: sell 1 XMR, at least 0.5 XMR per
    /// trade, 0.15 XMR security deposit on each side.
    pub fn sell_request(&self) -> PlaceOfferRequest {
        PlaceOfferRequest {
            direction: OfferDirection::Sell,
            amount: ATOMIC_UNITS_PER_XMR,
            min_amount: ATOMIC_UNITS_PER_XMR / 2,
            price: 1_500_000,
            buyer_security_deposit: 15 * ATOMIC_UNITS_PER_XMR / 100,
            seller_security_deposit: 15 * ATOMIC_UNITS_PER_XMR / 100,
            currency_code: "EUR".to_string(),
            payment_method_id: "SEPA".to_string(),
            arbitrator_node_address: self.arbitrator.address.clone(),
        }
    }

    pub async fn place_sell_offer(&self) -> Offer {
        match self.maker.manager.place_offer(self.sell_request()).await {
            Ok(offer) => offer,
            Err(e) => panic!("offer placement failed: {e}"),
        }
    }

    pub async fn take(&self, offer_id: &TradeId, amount: u64) -> Result<TradeId, ProtocolError> {
        self.taker.manager.take_offer(offer_id, amount).await
    }

    /// Place a sell offer and take it in full. Returns the trade id.
    pub async fn open_trade(&self) -> (Offer, TradeId) {
        let offer = self.place_sell_offer().await;
        match self.take(&offer.id, offer.amount).await {
            Ok(trade_id) => (offer, trade_id),
            Err(e) => panic!("take offer failed: {e}"),
        }
    }

    /// Wait for the deposits at every node, then mine them unlocked.
    pub async fn confirm_deposits(&self, trade_id: &TradeId) {
        self.wait_all(trade_id, "deposits published", |t| {
            t.phase() >= TradePhase::DepositsPublished
        })
        .await;
        self.mine(self.config.unlock_confirmations).await;
        self.wait_all(trade_id, "deposits unlocked", |t| {
            t.phase() >= TradePhase::DepositsConfirmed
        })
        .await;
    }

    /// Open a full trade and run it to unlocked deposits.
    pub async fn confirmed_trade(&self) -> (Offer, TradeId) {
        let (offer, trade_id) = self.open_trade().await;
        self.confirm_deposits(&trade_id).await;
        (offer, trade_id)
    }

    /// Wait until every node satisfies `check`.
    pub async fn wait_all(&self, trade_id: &TradeId, what: &str, check: impl Fn(&Trade) -> bool) {
        for node in self.nodes() {
            node.wait_for(trade_id, what, &check).await;
        }
    }

    pub async fn mine(&self, blocks: u64) {
        self.chain.mine(blocks).await;
    }

    pub async fn settle(&self) {
        self.network.settle().await;
    }
}

fn build_node(label: &'static str, port: u16, keys: KeyRing, shared: &Shared<'_>) -> SimNode {
    let address = NodeAddress::new(format!("{label}.onion"), port);
    let ring = keys.pub_key_ring();
    let identity = KeyRingIdentity::new(keys, format!("{label}-account"));
    let (arbitrator_address, arbitrator_ring) = shared.arbitrator;
    identity.accept_arbitrator(arbitrator_address.clone(), arbitrator_ring);

    let wallet = Arc::new(SimWallet::new(label, shared.chain.clone()));
    shared.chain.fund(&wallet.primary_address(), STARTING_BALANCE);
    let events = Arc::new(WalletEventBus::new());
    shared.chain.attach(events.clone());
    let store = Arc::new(InMemoryTradeStore::new());

    let services = ProtocolServices {
        wallet: wallet.clone(),
        network: Arc::new(shared.network.endpoint(address.clone(), ring)),
        persistence: store.clone(),
        identity: Arc::new(identity),
        offers: Arc::new(InMemoryOfferBook::new(shared.offers.clone())),
        wallet_events: events.clone(),
        config: shared.config.clone(),
    };
    let manager = TradeManager::new(services);
    shared
        .network
        .register(address.clone(), ring, manager.clone());

    SimNode {
        label,
        address,
        ring,
        manager,
        wallet,
        store,
        events,
    }
}

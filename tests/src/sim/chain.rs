//! Simulated daemon.
//!
//! Keeps every submitted transaction, tracks spent key images of relayed
//! ones and mines blocks on demand. Each block publishes output events to
//! the event bus of every attached node:
//!
//! | Depth | Event |
//! |-------|-------|
//! | 1 | `OutputReceived { is_locked: true }` |
//! | unlock depth | `TxUnlocked` |

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use shared_bus::{EventPublisher, WalletEvent, WalletEventBus};
use shared_crypto::sha256_hex;
use trade_protocol::domain::WalletError;
use trade_protocol::{SubmitTxResult, TxDestination, TxStatus};

/// Flat miner fee of every simulated transaction.
pub const SIM_TX_FEE: u64 = 20_000_000;

/// A simulated transaction. Its hash ignores the signer list so cosigning
/// does not change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimTx {
    pub nonce: String,
    /// Key images of the spent outputs.
    pub inputs: Vec<String>,
    pub outputs: Vec<TxDestination>,
    pub fee: u64,
    pub key: String,
    pub signers: Vec<String>,
}

impl SimTx {
    pub fn hash(&self) -> String {
        let body = serde_json::json!({
            "nonce": self.nonce,
            "inputs": self.inputs,
            "outputs": self.outputs,
            "fee": self.fee,
        });
        sha256_hex(body.to_string().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn from_hex(tx_hex: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(tx_hex).map_err(|e| WalletError::MalformedTx(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| WalletError::MalformedTx(e.to_string()))
    }

    /// Sum of the outputs paying `address`.
    pub fn amount_to(&self, address: &str) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.address == address)
            .map(|o| o.amount)
            .sum()
    }
}

/// Key image of output `index` of `tx_hash`.
pub fn key_image(tx_hash: &str, index: usize) -> String {
    format!("ki:{tx_hash}:{index}")
}

/// An unspent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimOutput {
    pub key_image: String,
    pub amount: u64,
}

struct Relayed {
    tx: SimTx,
    /// Height of the including block; `None` while in the pool.
    height: Option<u64>,
}

#[derive(Default)]
struct ChainState {
    height: u64,
    known: HashMap<String, SimTx>,
    relayed: HashMap<String, Relayed>,
    /// Relay order, for deterministic output selection.
    order: Vec<String>,
    spent: HashSet<String>,
}

/// Shared daemon of a simulated cluster.
pub struct SimChain {
    state: Mutex<ChainState>,
    buses: RwLock<Vec<Arc<WalletEventBus>>>,
    unlock_depth: u64,
}

impl SimChain {
    pub fn new(unlock_depth: u64) -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
            buses: RwLock::new(Vec::new()),
            unlock_depth,
        }
    }

    pub fn unlock_depth(&self) -> u64 {
        self.unlock_depth
    }

    pub fn height(&self) -> u64 {
        self.state.lock().height
    }

    /// Publish this chain's events to `bus`.
    pub fn attach(&self, bus: Arc<WalletEventBus>) {
        self.buses.write().push(bus);
    }

    /// Credit `address` with an already unlocked output.
    pub fn fund(&self, address: &str, amount: u64) -> String {
        let mut state = self.state.lock();
        let tx = SimTx {
            nonce: format!("coinbase-{}", state.order.len()),
            inputs: Vec::new(),
            outputs: vec![TxDestination::new(address, amount)],
            fee: 0,
            key: String::new(),
            signers: Vec::new(),
        };
        let hash = tx.hash();
        let height = state.height;
        state.known.insert(hash.clone(), tx.clone());
        state.relayed.insert(
            hash.clone(),
            Relayed {
                tx,
                height: Some(height.saturating_sub(self.unlock_depth)),
            },
        );
        state.order.push(hash.clone());
        hash
    }

    /// Accept `tx` into the pool if `relay`, otherwise only check it.
    pub fn submit(&self, tx: SimTx, relay: bool) -> SubmitTxResult {
        let hash = tx.hash();
        let mut state = self.state.lock();
        state.known.insert(hash.clone(), tx.clone());
        if state.relayed.contains_key(&hash) {
            return SubmitTxResult {
                is_good: true,
                is_double_spend: false,
                tx_hash: hash,
                reason: None,
            };
        }
        if tx.inputs.iter().any(|ki| state.spent.contains(ki)) {
            return SubmitTxResult {
                is_good: false,
                is_double_spend: true,
                tx_hash: hash,
                reason: Some("double spend".to_string()),
            };
        }
        if tx.inputs.is_empty() {
            return SubmitTxResult {
                is_good: false,
                is_double_spend: false,
                tx_hash: hash,
                reason: Some("no inputs".to_string()),
            };
        }
        if relay {
            state.spent.extend(tx.inputs.iter().cloned());
            state.relayed.insert(hash.clone(), Relayed { tx, height: None });
            state.order.push(hash.clone());
        }
        SubmitTxResult {
            is_good: true,
            is_double_spend: false,
            tx_hash: hash,
            reason: None,
        }
    }

    /// Any transaction submitted so far, relayed or not.
    pub fn tx(&self, tx_hash: &str) -> Option<SimTx> {
        self.state.lock().known.get(tx_hash).cloned()
    }

    /// Status of a relayed transaction.
    pub fn status(&self, tx_hash: &str) -> Option<TxStatus> {
        let state = self.state.lock();
        let relayed = state.relayed.get(tx_hash)?;
        let confirmations = relayed
            .height
            .map_or(0, |height| state.height - height + 1);
        Some(TxStatus {
            relayed: true,
            confirmations,
            is_locked: confirmations < self.unlock_depth,
        })
    }

    pub fn is_relayed(&self, tx_hash: &str) -> bool {
        self.state.lock().relayed.contains_key(tx_hash)
    }

    /// Unspent outputs paying one of `addresses`, oldest first.
    pub fn unspent(&self, addresses: &[String]) -> Vec<SimOutput> {
        let state = self.state.lock();
        let mut outputs = Vec::new();
        for hash in &state.order {
            let Some(relayed) = state.relayed.get(hash) else {
                continue;
            };
            for (index, output) in relayed.tx.outputs.iter().enumerate() {
                let image = key_image(hash, index);
                if addresses.contains(&output.address) && !state.spent.contains(&image) {
                    outputs.push(SimOutput {
                        key_image: image,
                        amount: output.amount,
                    });
                }
            }
        }
        outputs
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.unspent(&[address.to_string()])
            .iter()
            .map(|o| o.amount)
            .sum()
    }

    /// Mine `blocks` blocks, publishing events after each.
    pub async fn mine(&self, blocks: u64) {
        for _ in 0..blocks {
            let events = self.mine_block();
            let buses = self.buses.read().clone();
            for event in events {
                for bus in &buses {
                    bus.publish(event.clone()).await;
                }
            }
            tokio::task::yield_now().await;
        }
    }

    fn mine_block(&self) -> Vec<WalletEvent> {
        let mut state = self.state.lock();
        state.height += 1;
        let height = state.height;
        let mut events = Vec::new();
        let order = state.order.clone();
        for hash in order {
            let Some(relayed) = state.relayed.get_mut(&hash) else {
                continue;
            };
            let included = *relayed.height.get_or_insert(height);
            let confirmations = height - included + 1;
            if confirmations == 1 {
                events.push(WalletEvent::OutputReceived {
                    tx_hash: hash.clone(),
                    amount: relayed.tx.outputs.iter().map(|o| o.amount).sum(),
                    confirmations,
                    is_locked: confirmations < self.unlock_depth,
                });
            }
            if confirmations == self.unlock_depth {
                events.push(WalletEvent::TxUnlocked {
                    tx_hash: hash.clone(),
                    confirmations,
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spend(chain: &SimChain, from: &str, to: &str, amount: u64) -> SimTx {
        let inputs = chain.unspent(&[from.to_string()]);
        SimTx {
            nonce: format!("{from}-{to}"),
            inputs: inputs.iter().map(|o| o.key_image.clone()).collect(),
            outputs: vec![TxDestination::new(to, amount)],
            fee: SIM_TX_FEE,
            key: "key".into(),
            signers: Vec::new(),
        }
    }

    #[test]
    fn test_hash_ignores_signers() {
        let chain = SimChain::new(10);
        chain.fund("alice", 100);
        let mut tx = spend(&chain, "alice", "bob", 50);
        let hash = tx.hash();
        tx.signers.push("alice".into());
        assert_eq!(tx.hash(), hash);
        assert_eq!(SimTx::from_hex(&tx.to_hex()).unwrap(), tx);
    }

    #[test]
    fn test_unrelayed_tx_spends_nothing() {
        let chain = SimChain::new(10);
        chain.fund("alice", 100);
        let tx = spend(&chain, "alice", "bob", 50);
        assert!(chain.submit(tx.clone(), false).is_good);
        assert!(chain.status(&tx.hash()).is_none());
        assert_eq!(chain.balance("alice"), 100);

        assert!(chain.submit(tx.clone(), true).is_good);
        assert_eq!(chain.balance("alice"), 0);
        assert_eq!(chain.balance("bob"), 50);
    }

    #[test]
    fn test_double_spend_detected() {
        let chain = SimChain::new(10);
        chain.fund("alice", 100);
        let first = spend(&chain, "alice", "bob", 50);
        let mut second = first.clone();
        second.nonce = "other".into();
        assert!(chain.submit(first, true).is_good);
        let verdict = chain.submit(second, false);
        assert!(verdict.is_double_spend);
        assert!(!verdict.is_good);
    }

    #[tokio::test]
    async fn test_mining_publishes_receipt_and_unlock() {
        let chain = SimChain::new(3);
        let bus = Arc::new(WalletEventBus::new());
        chain.attach(bus.clone());
        chain.fund("alice", 100);
        let tx = spend(&chain, "alice", "bob", 50);
        let hash = tx.hash();
        chain.submit(tx, true);

        let mut sub = bus.subscribe(shared_bus::EventFilter::tx_hashes([hash.clone()]));
        chain.mine(3).await;
        match sub.recv().await {
            Some(WalletEvent::OutputReceived { is_locked, confirmations, .. }) => {
                assert!(is_locked);
                assert_eq!(confirmations, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            sub.recv().await,
            Some(WalletEvent::TxUnlocked { confirmations: 3, .. })
        ));
        let status = chain.status(&hash).unwrap();
        assert_eq!(status.confirmations, 3);
        assert!(!status.is_locked);
    }
}

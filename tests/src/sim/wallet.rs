//! Simulated wallet over the shared `SimChain`.
//!
//! Owns outputs paying its primary or change address. Multisig wallets are
//! keyed by trade id; their address is derived from the sorted prepared
//! hexes of all three parties, so every party computes the same one.
//! Sync blobs are tagged with their owner; cosigning requires the creator's
//! blob to have been imported first.

use std::collections::{HashMap, HashSet};
use std::future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_crypto::sha256_hex;
use shared_types::TradeId;
use tracing::debug;
use trade_protocol::domain::{fee_share, TxDescription, WalletError};
use trade_protocol::{
    CreatedTx, SignedMultisigTx, SubmitTxResult, TxDestination, TxKeyCheck, TxStatus,
    WalletService,
};

use crate::sim::chain::{SimChain, SimTx, SIM_TX_FEE};

/// Wallet operations faults can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletOp {
    CreateTx,
    SubmitTxHex,
    RelayTx,
    MakeMultisig,
    ExportMultisigHex,
    CreatePayoutTx,
    SignMultisigTx,
    SubmitMultisigTx,
}

#[derive(Default)]
struct MultisigWallet {
    prepared: Option<String>,
    address: Option<String>,
    /// Owners whose sync blobs were imported.
    imported: HashSet<String>,
    exports: usize,
    imports: usize,
}

#[derive(Default)]
struct WalletState {
    frozen: HashSet<String>,
    multisig: HashMap<TradeId, MultisigWallet>,
    created: u64,
}

#[derive(Default)]
struct Faults {
    hang: HashSet<WalletOp>,
    fail: HashMap<WalletOp, usize>,
    /// One-shot rewrite of an output address in the next created tx.
    redirect: Option<(String, String)>,
}

/// One party's wallet.
pub struct SimWallet {
    name: String,
    address: String,
    change_address: String,
    chain: Arc<SimChain>,
    state: Mutex<WalletState>,
    faults: Mutex<Faults>,
}

impl SimWallet {
    pub fn new(name: &str, chain: Arc<SimChain>) -> Self {
        Self {
            name: name.to_string(),
            address: format!("{name}-primary"),
            change_address: format!("{name}-change"),
            chain,
            state: Mutex::new(WalletState::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn own_addresses(&self) -> Vec<String> {
        vec![self.address.clone(), self.change_address.clone()]
    }

    /// Unspent funds, frozen ones included.
    pub fn balance(&self) -> u64 {
        self.chain
            .unspent(&self.own_addresses())
            .iter()
            .map(|o| o.amount)
            .sum()
    }

    /// Unspent funds available for new transactions.
    pub fn spendable_balance(&self) -> u64 {
        let state = self.state.lock();
        self.chain
            .unspent(&self.own_addresses())
            .iter()
            .filter(|o| !state.frozen.contains(&o.key_image))
            .map(|o| o.amount)
            .sum()
    }

    pub fn frozen_count(&self) -> usize {
        self.state.lock().frozen.len()
    }

    pub fn multisig_address(&self, trade_id: &TradeId) -> Option<String> {
        self.state
            .lock()
            .multisig
            .get(trade_id)
            .and_then(|w| w.address.clone())
    }

    /// Sync blobs exported for `trade_id`.
    pub fn export_count(&self, trade_id: &TradeId) -> usize {
        self.state
            .lock()
            .multisig
            .get(trade_id)
            .map_or(0, |w| w.exports)
    }

    /// Sync blobs imported for `trade_id`.
    pub fn import_count(&self, trade_id: &TradeId) -> usize {
        self.state
            .lock()
            .multisig
            .get(trade_id)
            .map_or(0, |w| w.imports)
    }

    // =========================================================================
    // FAULT INJECTION
    // =========================================================================

    /// Make every call of `op` wait forever.
    pub fn hang(&self, op: WalletOp) {
        self.faults.lock().hang.insert(op);
    }

    /// Fail the next `times` calls of `op` with an RPC error.
    pub fn fail(&self, op: WalletOp, times: usize) {
        self.faults.lock().fail.insert(op, times);
    }

    /// Pay `to` instead of `from` in the next tx created with an output to
    /// `from`.
    pub fn redirect_next_output(&self, from: &str, to: &str) {
        self.faults.lock().redirect = Some((from.to_string(), to.to_string()));
    }

    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.hang.clear();
        faults.fail.clear();
        faults.redirect = None;
    }

    fn apply_redirect(&self, outputs: &mut [TxDestination]) {
        let mut faults = self.faults.lock();
        let Some((from, to)) = faults.redirect.clone() else {
            return;
        };
        let mut hit = false;
        for output in outputs.iter_mut().filter(|o| o.address == from) {
            output.address = to.clone();
            hit = true;
        }
        if hit {
            debug!(wallet = %self.name, %from, %to, "Redirected tx output");
            faults.redirect = None;
        }
    }

    async fn gate(&self, op: WalletOp) -> Result<(), WalletError> {
        let hang = {
            let mut faults = self.faults.lock();
            if let Some(remaining) = faults.fail.get_mut(&op) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(WalletError::Rpc(format!("{op:?} unavailable")));
                }
            }
            faults.hang.contains(&op)
        };
        if hang {
            debug!(wallet = %self.name, op = ?op, "Wallet call hangs");
            future::pending::<()>().await;
        }
        Ok(())
    }

    fn next_nonce(&self) -> String {
        let mut state = self.state.lock();
        state.created += 1;
        format!("{}-{}", self.name, state.created)
    }

    fn multisig_address_of(&self, trade_id: &TradeId) -> Result<String, WalletError> {
        self.multisig_address(trade_id)
            .ok_or_else(|| WalletError::MultisigNotReady(trade_id.to_string()))
    }
}

#[async_trait]
impl WalletService for SimWallet {
    fn primary_address(&self) -> String {
        self.address.clone()
    }

    async fn open_or_create_multisig_wallet(&self, trade_id: &TradeId) -> Result<(), WalletError> {
        self.state
            .lock()
            .multisig
            .entry(trade_id.clone())
            .or_default();
        Ok(())
    }

    async fn create_tx(&self, destinations: Vec<TxDestination>) -> Result<CreatedTx, WalletError> {
        self.gate(WalletOp::CreateTx).await?;
        let needed = destinations.iter().map(|d| d.amount).sum::<u64>() + SIM_TX_FEE;
        let available = {
            let state = self.state.lock();
            self.chain
                .unspent(&self.own_addresses())
                .into_iter()
                .filter(|o| !state.frozen.contains(&o.key_image))
                .collect::<Vec<_>>()
        };

        let mut inputs = Vec::new();
        let mut total = 0;
        for output in available {
            if total >= needed {
                break;
            }
            total += output.amount;
            inputs.push(output.key_image);
        }
        if total < needed {
            return Err(WalletError::InsufficientFunds {
                needed,
                available: total,
            });
        }

        let mut outputs = destinations;
        self.apply_redirect(&mut outputs);
        if total > needed {
            outputs.push(TxDestination::new(self.change_address.clone(), total - needed));
        }
        let nonce = self.next_nonce();
        let tx = SimTx {
            key: format!("txkey-{nonce}"),
            nonce,
            inputs,
            outputs,
            fee: SIM_TX_FEE,
            signers: vec![self.name.clone()],
        };
        Ok(CreatedTx {
            hash: tx.hash(),
            hex: tx.to_hex(),
            key: tx.key.clone(),
            fee: tx.fee,
            key_images: tx.inputs.clone(),
        })
    }

    async fn freeze_outputs(&self, key_images: &[String]) -> Result<(), WalletError> {
        self.state.lock().frozen.extend(key_images.iter().cloned());
        Ok(())
    }

    async fn thaw_outputs(&self, key_images: &[String]) -> Result<(), WalletError> {
        let mut state = self.state.lock();
        for image in key_images {
            state.frozen.remove(image);
        }
        Ok(())
    }

    async fn submit_tx_hex(&self, tx_hex: &str, relay: bool) -> Result<SubmitTxResult, WalletError> {
        self.gate(WalletOp::SubmitTxHex).await?;
        let tx = SimTx::from_hex(tx_hex)?;
        Ok(self.chain.submit(tx, relay))
    }

    async fn check_tx_key(
        &self,
        tx_hash: &str,
        tx_key: &str,
        address: &str,
    ) -> Result<TxKeyCheck, WalletError> {
        let tx = self
            .chain
            .tx(tx_hash)
            .ok_or_else(|| WalletError::UnknownTx(tx_hash.to_string()))?;
        if tx.key != tx_key {
            return Err(WalletError::InvalidTxKey(tx_hash.to_string()));
        }
        let status = self.chain.status(tx_hash);
        Ok(TxKeyCheck {
            received: tx.amount_to(address),
            in_pool: status.map_or(false, |s| s.confirmations == 0),
            confirmations: status.map_or(0, |s| s.confirmations),
        })
    }

    async fn get_tx_status(&self, tx_hash: &str) -> Result<Option<TxStatus>, WalletError> {
        Ok(self.chain.status(tx_hash))
    }

    async fn relay_tx(&self, tx_hex: &str) -> Result<String, WalletError> {
        self.gate(WalletOp::RelayTx).await?;
        let tx = SimTx::from_hex(tx_hex)?;
        let verdict = self.chain.submit(tx, true);
        if !verdict.is_good {
            return Err(WalletError::TxRejected(
                verdict.reason.unwrap_or_else(|| "rejected".to_string()),
            ));
        }
        Ok(verdict.tx_hash)
    }

    async fn prepare_multisig(&self, trade_id: &TradeId) -> Result<String, WalletError> {
        let prepared = format!("prepared:{}:{}", self.name, trade_id);
        self.state
            .lock()
            .multisig
            .entry(trade_id.clone())
            .or_default()
            .prepared = Some(prepared.clone());
        Ok(prepared)
    }

    async fn make_multisig(
        &self,
        trade_id: &TradeId,
        peer_prepared_hexes: Vec<String>,
        threshold: u32,
    ) -> Result<String, WalletError> {
        self.gate(WalletOp::MakeMultisig).await?;
        let mut state = self.state.lock();
        let wallet = state
            .multisig
            .get_mut(trade_id)
            .ok_or_else(|| WalletError::MultisigNotReady(trade_id.to_string()))?;
        let own = wallet
            .prepared
            .clone()
            .ok_or_else(|| WalletError::MultisigNotReady("not prepared".to_string()))?;
        let mut all = peer_prepared_hexes;
        all.push(own);
        all.sort();
        let digest = sha256_hex(format!("{threshold}|{}", all.join("|")).as_bytes());
        let address = format!("multisig-{}", &digest[..16]);
        wallet.address = Some(address.clone());
        Ok(address)
    }

    async fn export_multisig_hex(&self, trade_id: &TradeId) -> Result<String, WalletError> {
        self.gate(WalletOp::ExportMultisigHex).await?;
        let mut state = self.state.lock();
        let wallet = state
            .multisig
            .get_mut(trade_id)
            .ok_or_else(|| WalletError::MultisigNotReady(trade_id.to_string()))?;
        wallet.exports += 1;
        Ok(format!("blob:{}:{}:{}", self.name, trade_id, wallet.exports))
    }

    async fn import_multisig_hex(
        &self,
        trade_id: &TradeId,
        hexes: Vec<String>,
    ) -> Result<usize, WalletError> {
        let mut state = self.state.lock();
        let wallet = state
            .multisig
            .get_mut(trade_id)
            .ok_or_else(|| WalletError::MultisigNotReady(trade_id.to_string()))?;
        for blob in &hexes {
            let owner = blob
                .strip_prefix("blob:")
                .and_then(|rest| rest.split(':').next())
                .ok_or_else(|| WalletError::MultisigNotSynced(format!("bad blob {blob}")))?;
            wallet.imported.insert(owner.to_string());
        }
        wallet.imports += hexes.len();
        Ok(hexes.len())
    }

    async fn create_payout_tx(
        &self,
        trade_id: &TradeId,
        destinations: Vec<TxDestination>,
    ) -> Result<SignedMultisigTx, WalletError> {
        self.gate(WalletOp::CreatePayoutTx).await?;
        let multisig = self.multisig_address_of(trade_id)?;
        let funds = self.chain.unspent(&[multisig.clone()]);
        let balance: u64 = funds.iter().map(|o| o.amount).sum();
        let gross: u64 = destinations.iter().map(|d| d.amount).sum();
        if funds.is_empty() || gross != balance {
            return Err(WalletError::TxRejected(format!(
                "payout of {gross} does not spend multisig balance {balance}"
            )));
        }
        let count = destinations.len();
        let mut outputs = Vec::with_capacity(count);
        for (index, destination) in destinations.into_iter().enumerate() {
            let share = fee_share(SIM_TX_FEE, count, index);
            let amount = destination.amount.checked_sub(share).ok_or_else(|| {
                WalletError::InsufficientFunds {
                    needed: share,
                    available: destination.amount,
                }
            })?;
            outputs.push(TxDestination::new(destination.address, amount));
        }
        let nonce = self.next_nonce();
        let tx = SimTx {
            key: format!("txkey-{nonce}"),
            nonce,
            inputs: funds.into_iter().map(|o| o.key_image).collect(),
            outputs,
            fee: SIM_TX_FEE,
            signers: vec![self.name.clone()],
        };
        Ok(SignedMultisigTx {
            hash: tx.hash(),
            hex: tx.to_hex(),
            fully_signed: false,
        })
    }

    async fn describe_tx(&self, _trade_id: &TradeId, tx_hex: &str) -> Result<TxDescription, WalletError> {
        let tx = SimTx::from_hex(tx_hex)?;
        Ok(TxDescription {
            hash: tx.hash(),
            fully_signed: tx.signers.len() >= 2,
            destinations: tx.outputs,
            fee: tx.fee,
        })
    }

    async fn sign_multisig_tx(
        &self,
        trade_id: &TradeId,
        tx_hex: &str,
    ) -> Result<SignedMultisigTx, WalletError> {
        self.gate(WalletOp::SignMultisigTx).await?;
        let mut tx = SimTx::from_hex(tx_hex)?;
        let creator = tx
            .signers
            .first()
            .cloned()
            .ok_or_else(|| WalletError::MalformedTx("unsigned multisig tx".to_string()))?;
        let synced = self
            .state
            .lock()
            .multisig
            .get(trade_id)
            .map_or(false, |w| w.imported.contains(&creator));
        if creator != self.name && !synced {
            return Err(WalletError::MultisigNotSynced(format!(
                "blob of {creator} not imported"
            )));
        }
        if !tx.signers.contains(&self.name) {
            tx.signers.push(self.name.clone());
        }
        Ok(SignedMultisigTx {
            hash: tx.hash(),
            fully_signed: tx.signers.len() >= 2,
            hex: tx.to_hex(),
        })
    }

    async fn submit_multisig_tx(&self, _trade_id: &TradeId, tx_hex: &str) -> Result<Vec<String>, WalletError> {
        self.gate(WalletOp::SubmitMultisigTx).await?;
        let tx = SimTx::from_hex(tx_hex)?;
        if tx.signers.len() < 2 {
            return Err(WalletError::TxRejected("missing signatures".to_string()));
        }
        let verdict = self.chain.submit(tx, true);
        if !verdict.is_good {
            return Err(WalletError::TxRejected(
                verdict.reason.unwrap_or_else(|| "rejected".to_string()),
            ));
        }
        Ok(vec![verdict.tx_hash])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(name: &str, chain: &Arc<SimChain>, amount: u64) -> SimWallet {
        let wallet = SimWallet::new(name, chain.clone());
        chain.fund(&wallet.primary_address(), amount);
        wallet
    }

    #[tokio::test]
    async fn test_frozen_outputs_not_spent() {
        let chain = Arc::new(SimChain::new(10));
        let wallet = funded("alice", &chain, 1_000_000_000);
        let reserve = wallet
            .create_tx(vec![TxDestination::new("bob", 100)])
            .await
            .unwrap();
        wallet.freeze_outputs(&reserve.key_images).await.unwrap();
        assert_eq!(wallet.spendable_balance(), 0);
        assert!(matches!(
            wallet.create_tx(vec![TxDestination::new("bob", 100)]).await,
            Err(WalletError::InsufficientFunds { .. })
        ));
        wallet.thaw_outputs(&reserve.key_images).await.unwrap();
        assert!(wallet.create_tx(vec![TxDestination::new("bob", 100)]).await.is_ok());
    }

    #[tokio::test]
    async fn test_tx_key_proves_outputs() {
        let chain = Arc::new(SimChain::new(10));
        let alice = funded("alice", &chain, 1_000_000_000);
        let checker = SimWallet::new("carol", chain.clone());
        let tx = alice
            .create_tx(vec![TxDestination::new("bob", 500)])
            .await
            .unwrap();
        checker.submit_tx_hex(&tx.hex, false).await.unwrap();

        let check = checker.check_tx_key(&tx.hash, &tx.key, "bob").await.unwrap();
        assert_eq!(check.received, 500);
        assert!(matches!(
            checker.check_tx_key(&tx.hash, "forged", "bob").await,
            Err(WalletError::InvalidTxKey(_))
        ));
    }

    #[tokio::test]
    async fn test_redirect_applies_to_next_matching_tx_only() {
        let chain = Arc::new(SimChain::new(10));
        let alice = funded("alice", &chain, 1_000_000_000);
        alice.redirect_next_output("bob", "mallory");

        let unrelated = alice
            .create_tx(vec![TxDestination::new("carol", 100)])
            .await
            .unwrap();
        let redirected = alice
            .create_tx(vec![TxDestination::new("bob", 500)])
            .await
            .unwrap();
        let honest = alice
            .create_tx(vec![TxDestination::new("bob", 500)])
            .await
            .unwrap();

        let amount_to = |hex: &str, address: &str| SimTx::from_hex(hex).unwrap().amount_to(address);
        assert_eq!(amount_to(&unrelated.hex, "carol"), 100);
        assert_eq!(amount_to(&redirected.hex, "bob"), 0);
        assert_eq!(amount_to(&redirected.hex, "mallory"), 500);
        assert_eq!(amount_to(&honest.hex, "bob"), 500);
    }

    #[tokio::test]
    async fn test_multisig_address_agrees() {
        let chain = Arc::new(SimChain::new(10));
        let trade_id = TradeId::new("trade-1");
        let wallets: Vec<SimWallet> = ["maker", "taker", "arbitrator"]
            .iter()
            .map(|name| SimWallet::new(name, chain.clone()))
            .collect();
        let mut prepared = Vec::new();
        for wallet in &wallets {
            wallet.open_or_create_multisig_wallet(&trade_id).await.unwrap();
            prepared.push(wallet.prepare_multisig(&trade_id).await.unwrap());
        }
        let mut addresses = HashSet::new();
        for (index, wallet) in wallets.iter().enumerate() {
            let peers: Vec<String> = prepared
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, hex)| hex.clone())
                .collect();
            addresses.insert(wallet.make_multisig(&trade_id, peers, 2).await.unwrap());
        }
        assert_eq!(addresses.len(), 1);
    }

    #[tokio::test]
    async fn test_cosign_requires_imported_blob() {
        let chain = Arc::new(SimChain::new(10));
        let trade_id = TradeId::new("trade-1");
        let buyer = SimWallet::new("buyer", chain.clone());
        let seller = SimWallet::new("seller", chain.clone());
        for (wallet, peer) in [(&buyer, "seller"), (&seller, "buyer")] {
            wallet.open_or_create_multisig_wallet(&trade_id).await.unwrap();
            wallet.prepare_multisig(&trade_id).await.unwrap();
            let peers = vec![
                "prepared:arbitrator:trade-1".to_string(),
                format!("prepared:{peer}:trade-1"),
            ];
            wallet.make_multisig(&trade_id, peers, 2).await.unwrap();
        }
        assert_eq!(buyer.multisig_address(&trade_id), seller.multisig_address(&trade_id));
        let multisig = buyer.multisig_address(&trade_id).unwrap();
        chain.fund(&multisig, 1_000_000_000);

        let blob = buyer.export_multisig_hex(&trade_id).await.unwrap();
        let payout = buyer
            .create_payout_tx(
                &trade_id,
                vec![
                    TxDestination::new("buyer-primary", 600_000_000),
                    TxDestination::new("seller-primary", 400_000_000),
                ],
            )
            .await
            .unwrap();
        assert!(!payout.fully_signed);
        assert!(matches!(
            seller.sign_multisig_tx(&trade_id, &payout.hex).await,
            Err(WalletError::MultisigNotSynced(_))
        ));

        seller.import_multisig_hex(&trade_id, vec![blob]).await.unwrap();
        let signed = seller.sign_multisig_tx(&trade_id, &payout.hex).await.unwrap();
        assert!(signed.fully_signed);
        assert_eq!(signed.hash, payout.hash);

        let description = seller.describe_tx(&trade_id, &signed.hex).await.unwrap();
        assert_eq!(description.amount_to("buyer-primary"), 600_000_000 - SIM_TX_FEE / 2);
        seller.submit_multisig_tx(&trade_id, &signed.hex).await.unwrap();
        assert_eq!(chain.balance(&multisig), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_transient() {
        let chain = Arc::new(SimChain::new(10));
        let wallet = funded("alice", &chain, 1_000_000_000);
        wallet.fail(WalletOp::CreateTx, 1);
        assert!(matches!(
            wallet.create_tx(vec![TxDestination::new("bob", 1)]).await,
            Err(WalletError::Rpc(_))
        ));
        assert!(wallet.create_tx(vec![TxDestination::new("bob", 1)]).await.is_ok());
    }
}

//! Identity Adapter
//!
//! Implements `IdentityService` over a local Ed25519 key ring.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared_crypto::KeyRing;
use shared_types::{NodeAddress, PubKeyRing};

use crate::ports::IdentityService;

/// Node identity backed by a `KeyRing`.
pub struct KeyRingIdentity {
    key_ring: KeyRing,
    account_id: String,
    payment_account_payload: Vec<u8>,
    /// Arbitrators this node accepts, by address.
    arbitrators: RwLock<HashMap<NodeAddress, PubKeyRing>>,
}

impl KeyRingIdentity {
    pub fn new(key_ring: KeyRing, account_id: impl Into<String>) -> Self {
        let account_id = account_id.into();
        let payment_account_payload = format!("payment-account:{account_id}").into_bytes();
        Self {
            key_ring,
            account_id,
            payment_account_payload,
            arbitrators: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_payment_account_payload(mut self, payload: Vec<u8>) -> Self {
        self.payment_account_payload = payload;
        self
    }

    pub fn accept_arbitrator(&self, address: NodeAddress, ring: PubKeyRing) {
        self.arbitrators.write().insert(address, ring);
    }
}

impl IdentityService for KeyRingIdentity {
    fn pub_key_ring(&self) -> PubKeyRing {
        self.key_ring.pub_key_ring()
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.key_ring.sign(data).to_vec()
    }

    fn accepted_arbitrator(&self, address: &NodeAddress) -> Option<PubKeyRing> {
        self.arbitrators.read().get(address).copied()
    }

    fn account_id(&self) -> String {
        self.account_id.clone()
    }

    fn payment_account_payload(&self) -> Vec<u8> {
        self.payment_account_payload.clone()
    }
}

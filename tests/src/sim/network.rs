//! Simulated P2P network.
//!
//! `SimNetwork` is the hub every node registers with; each node talks to it
//! through its own `SimEndpoint`. A delivered message is handed to the
//! recipient's `TradeManager` on a fresh task, and the send reports
//! `Arrived` right away. Offline recipients queue mailbox messages and
//! reject direct ones.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{NodeAddress, PubKeyRing};
use tracing::debug;
use trade_protocol::domain::{MessageKind, NetworkError};
use trade_protocol::{
    DispatchOutcome, InboundMessage, NetworkService, ProtocolEnvelope, SendOutcome,
    TradeManager, TradeMessage, TradeProtocolApi,
};

/// One send attempt as seen by the hub.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: NodeAddress,
    pub to: NodeAddress,
    pub kind: MessageKind,
    pub envelope: ProtocolEnvelope,
    pub mailbox: bool,
    pub result: Result<SendOutcome, NetworkError>,
}

impl Delivery {
    /// Success flag if this is an ack.
    pub fn ack_success(&self) -> Option<bool> {
        match &self.envelope.payload {
            TradeMessage::Ack(ack) => Some(ack.success),
            _ => None,
        }
    }
}

/// Outcome reported by the recipient's manager.
#[derive(Debug, Clone)]
pub struct Handled {
    pub node: NodeAddress,
    pub kind: MessageKind,
    pub uid: String,
    pub outcome: DispatchOutcome,
}

struct Peer {
    manager: TradeManager,
    ring: PubKeyRing,
    online: bool,
    mailbox: Vec<(PubKeyRing, ProtocolEnvelope)>,
}

#[derive(Default)]
struct Faults {
    /// Sends of a kind from a node fail with a send fault.
    failing: HashSet<(NodeAddress, MessageKind)>,
    /// Next sends of a kind are reported sent but never delivered.
    dropping: HashMap<MessageKind, usize>,
    /// Next sends of a kind are delivered twice.
    duplicating: HashMap<MessageKind, usize>,
}

/// Hub connecting the simulated nodes.
#[derive(Default)]
pub struct SimNetwork {
    peers: RwLock<HashMap<NodeAddress, Peer>>,
    faults: Mutex<Faults>,
    deliveries: Mutex<Vec<Delivery>>,
    handled: Arc<Mutex<Vec<Handled>>>,
    in_flight: Arc<AtomicUsize>,
}

impl SimNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Endpoint for a node; register the node once its manager exists.
    pub fn endpoint(self: &Arc<Self>, own: NodeAddress, ring: PubKeyRing) -> SimEndpoint {
        SimEndpoint {
            hub: Arc::clone(self),
            own,
            ring,
        }
    }

    pub fn register(&self, address: NodeAddress, ring: PubKeyRing, manager: TradeManager) {
        self.peers.write().insert(
            address,
            Peer {
                manager,
                ring,
                online: true,
                mailbox: Vec::new(),
            },
        );
    }

    // =========================================================================
    // FAULT INJECTION
    // =========================================================================

    pub fn fail_sends(&self, from: &NodeAddress, kind: MessageKind) {
        self.faults.lock().failing.insert((from.clone(), kind));
    }

    pub fn heal_sends(&self, from: &NodeAddress, kind: MessageKind) {
        self.faults.lock().failing.remove(&(from.clone(), kind));
    }

    pub fn drop_next(&self, kind: MessageKind, times: usize) {
        self.faults.lock().dropping.insert(kind, times);
    }

    pub fn duplicate_next(&self, kind: MessageKind, times: usize) {
        self.faults.lock().duplicating.insert(kind, times);
    }

    pub fn take_offline(&self, address: &NodeAddress) {
        if let Some(peer) = self.peers.write().get_mut(address) {
            peer.online = false;
        }
    }

    /// Bring a node back and hand it its queued mailbox messages.
    pub fn bring_online(&self, address: &NodeAddress) {
        let (manager, queued) = {
            let mut peers = self.peers.write();
            let Some(peer) = peers.get_mut(address) else {
                return;
            };
            peer.online = true;
            (peer.manager.clone(), std::mem::take(&mut peer.mailbox))
        };
        for (sender_ring, envelope) in queued {
            self.spawn_delivery(address.clone(), manager.clone(), sender_ring, envelope);
        }
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Sends of `kind` from `from` to `to`.
    pub fn sent(&self, from: &NodeAddress, to: &NodeAddress, kind: MessageKind) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| d.from == *from && d.to == *to && d.kind == kind)
            .cloned()
            .collect()
    }

    /// Acks from `from` to `to` with the given success flag.
    pub fn acks(&self, from: &NodeAddress, to: &NodeAddress, success: bool) -> Vec<Delivery> {
        self.sent(from, to, MessageKind::Ack)
            .into_iter()
            .filter(|d| d.ack_success() == Some(success))
            .collect()
    }

    pub fn handled(&self) -> Vec<Handled> {
        self.handled.lock().clone()
    }

    /// Outcomes at `node` for messages of `kind`.
    pub fn outcomes(&self, node: &NodeAddress, kind: MessageKind) -> Vec<DispatchOutcome> {
        self.handled
            .lock()
            .iter()
            .filter(|h| h.node == *node && h.kind == kind)
            .map(|h| h.outcome.clone())
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no delivered message is still being handled.
    pub async fn settle(&self) {
        loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.in_flight() == 0 {
                return;
            }
        }
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    fn send(
        &self,
        from: &NodeAddress,
        sender_ring: PubKeyRing,
        to: &NodeAddress,
        envelope: ProtocolEnvelope,
        mailbox: bool,
    ) -> Result<SendOutcome, NetworkError> {
        let kind = envelope.payload.kind();
        let result = self.route(from, sender_ring, to, envelope.clone(), mailbox);
        debug!(from = %from, to = %to, msg_kind = ?kind, uid = %envelope.uid, result = ?result, "Simulated send");
        self.deliveries.lock().push(Delivery {
            from: from.clone(),
            to: to.clone(),
            kind,
            envelope,
            mailbox,
            result: result.clone(),
        });
        result
    }

    fn route(
        &self,
        from: &NodeAddress,
        sender_ring: PubKeyRing,
        to: &NodeAddress,
        envelope: ProtocolEnvelope,
        mailbox: bool,
    ) -> Result<SendOutcome, NetworkError> {
        let kind = envelope.payload.kind();
        let (dropped, duplicated) = {
            let mut faults = self.faults.lock();
            if faults.failing.contains(&(from.clone(), kind)) {
                return Err(NetworkError::SendFault(format!("{kind:?} to {to} refused")));
            }
            (
                take_one(&mut faults.dropping, kind),
                take_one(&mut faults.duplicating, kind),
            )
        };

        let manager = {
            let mut peers = self.peers.write();
            let peer = peers
                .get_mut(to)
                .ok_or_else(|| NetworkError::PeerOffline(to.clone()))?;
            if !peer.online {
                if mailbox {
                    peer.mailbox.push((sender_ring, envelope));
                    return Ok(SendOutcome::StoredInMailbox);
                }
                return Err(NetworkError::PeerOffline(to.clone()));
            }
            peer.manager.clone()
        };
        if dropped {
            return Ok(SendOutcome::Arrived);
        }
        if duplicated {
            self.spawn_delivery(to.clone(), manager.clone(), sender_ring, envelope.clone());
        }
        self.spawn_delivery(to.clone(), manager, sender_ring, envelope);
        Ok(SendOutcome::Arrived)
    }

    fn spawn_delivery(
        &self,
        node: NodeAddress,
        manager: TradeManager,
        sender_ring: PubKeyRing,
        envelope: ProtocolEnvelope,
    ) {
        let in_flight = Arc::clone(&self.in_flight);
        let handled = Arc::clone(&self.handled);
        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let kind = envelope.payload.kind();
            let uid = envelope.uid.clone();
            let outcome = manager
                .on_network_message(InboundMessage {
                    envelope,
                    sender_ring,
                })
                .await;
            handled.lock().push(Handled {
                node,
                kind,
                uid,
                outcome,
            });
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Key ring registered for `address`.
    pub fn ring_of(&self, address: &NodeAddress) -> Option<PubKeyRing> {
        self.peers.read().get(address).map(|peer| peer.ring)
    }
}

fn take_one(counts: &mut HashMap<MessageKind, usize>, kind: MessageKind) -> bool {
    match counts.get_mut(&kind) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

/// A node's connection to the hub. Its ring is attached to every message
/// it sends.
pub struct SimEndpoint {
    hub: Arc<SimNetwork>,
    own: NodeAddress,
    ring: PubKeyRing,
}

#[async_trait]
impl NetworkService for SimEndpoint {
    fn own_address(&self) -> NodeAddress {
        self.own.clone()
    }

    async fn send_direct_message(
        &self,
        peer: &NodeAddress,
        _peer_ring: &PubKeyRing,
        envelope: ProtocolEnvelope,
    ) -> Result<SendOutcome, NetworkError> {
        self.hub.send(&self.own, self.ring, peer, envelope, false)
    }

    async fn send_mailbox_message(
        &self,
        peer: &NodeAddress,
        _peer_ring: &PubKeyRing,
        envelope: ProtocolEnvelope,
    ) -> Result<SendOutcome, NetworkError> {
        self.hub.send(&self.own, self.ring, peer, envelope, true)
    }
}

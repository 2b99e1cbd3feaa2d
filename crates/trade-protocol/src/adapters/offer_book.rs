//! Offer Book Adapter
//!
//! Implements `OpenOfferService`. The public book is shared between nodes;
//! open offers (with their reserve transactions) are private to one node.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::TradeId;
use tracing::{debug, info};

use crate::domain::errors::OfferBookError;
use crate::domain::offer::Offer;
use crate::ports::{OpenOffer, OpenOfferService, OpenOfferState};

/// Offers visible to every node.
#[derive(Clone, Default)]
pub struct PublicOfferBook {
    offers: Arc<RwLock<HashMap<TradeId, Offer>>>,
}

impl PublicOfferBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, offer: Offer) {
        self.offers.write().insert(offer.id.clone(), offer);
    }

    pub fn remove(&self, offer_id: &TradeId) -> Option<Offer> {
        self.offers.write().remove(offer_id)
    }

    pub fn get(&self, offer_id: &TradeId) -> Option<Offer> {
        self.offers.read().get(offer_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.offers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.read().is_empty()
    }
}

/// One node's view: the shared public book plus its own open offers.
pub struct InMemoryOfferBook {
    public: PublicOfferBook,
    open: RwLock<HashMap<TradeId, OpenOffer>>,
}

impl InMemoryOfferBook {
    pub fn new(public: PublicOfferBook) -> Self {
        Self {
            public,
            open: RwLock::new(HashMap::new()),
        }
    }

    pub fn public(&self) -> &PublicOfferBook {
        &self.public
    }

    fn transition(
        &self,
        offer_id: &TradeId,
        from: OpenOfferState,
        to: OpenOfferState,
    ) -> Result<OpenOffer, OfferBookError> {
        let mut open = self.open.write();
        let entry = open
            .get_mut(offer_id)
            .ok_or_else(|| OfferBookError::NotFound(offer_id.clone()))?;
        if entry.state != from {
            return Err(OfferBookError::NotAvailable(offer_id.clone()));
        }
        entry.state = to;
        Ok(entry.clone())
    }
}

#[async_trait]
impl OpenOfferService for InMemoryOfferBook {
    fn find_offer(&self, offer_id: &TradeId) -> Option<Offer> {
        self.public.get(offer_id)
    }

    fn open_offer(&self, offer_id: &TradeId) -> Option<OpenOffer> {
        self.open.read().get(offer_id).cloned()
    }

    async fn add_open_offer(&self, open_offer: OpenOffer) -> Result<(), OfferBookError> {
        let offer_id = open_offer.offer.id.clone();
        {
            let mut open = self.open.write();
            if open.contains_key(&offer_id) {
                return Err(OfferBookError::AlreadyExists(offer_id));
            }
            open.insert(offer_id.clone(), open_offer.clone());
        }
        self.public.publish(open_offer.offer);
        info!(offer_id = %offer_id, "Offer published");
        Ok(())
    }

    async fn reserve_open_offer(&self, offer_id: &TradeId) -> Result<OpenOffer, OfferBookError> {
        let reserved = self.transition(offer_id, OpenOfferState::Available, OpenOfferState::Reserved)?;
        debug!(offer_id = %offer_id, "Offer reserved");
        Ok(reserved)
    }

    async fn release_open_offer(&self, offer_id: &TradeId) -> Result<(), OfferBookError> {
        self.transition(offer_id, OpenOfferState::Reserved, OpenOfferState::Available)?;
        debug!(offer_id = %offer_id, "Offer available again");
        Ok(())
    }

    async fn close_open_offer(&self, offer_id: &TradeId) -> Result<(), OfferBookError> {
        {
            let mut open = self.open.write();
            let entry = open
                .get_mut(offer_id)
                .ok_or_else(|| OfferBookError::NotFound(offer_id.clone()))?;
            entry.state = OpenOfferState::Closed;
        }
        self.public.remove(offer_id);
        info!(offer_id = %offer_id, "Offer closed");
        Ok(())
    }
}

//! Offer placement aggregate.

use serde::{Deserialize, Serialize};
use shared_types::NodeAddress;

use crate::domain::offer::{Offer, OfferDirection};
use crate::model::ProtocolServices;
use crate::ports::CreatedTx;

/// What the maker asks to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOfferRequest {
    pub direction: OfferDirection,
    pub amount: u64,
    pub min_amount: u64,
    pub price: u64,
    pub buyer_security_deposit: u64,
    pub seller_security_deposit: u64,
    pub currency_code: String,
    pub payment_method_id: String,
    pub arbitrator_node_address: NodeAddress,
}

/// State of one placement run.
pub struct PlaceOfferModel {
    pub request: PlaceOfferRequest,
    pub services: ProtocolServices,
    pub offer: Option<Offer>,
    pub reserve: Option<CreatedTx>,
    pub payout_address: Option<String>,
    pub error: Option<String>,
}

impl PlaceOfferModel {
    pub fn new(request: PlaceOfferRequest, services: ProtocolServices) -> Self {
        Self {
            request,
            services,
            offer: None,
            reserve: None,
            payout_address: None,
            error: None,
        }
    }
}

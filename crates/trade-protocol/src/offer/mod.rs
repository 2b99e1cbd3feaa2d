//! # Offer Placement
//!
//! ```text
//! PlaceOfferRequest ──► ValidateOffer ──► MakerReserveOfferFunds ──► AddToOfferBook
//! ```
//!
//! Runs on the same `TaskRunner` as the trade pipelines, against its own
//! aggregate. The reserve transaction created here backs every trade taken
//! from the offer.

pub mod model;
pub mod tasks;

pub use model::{PlaceOfferModel, PlaceOfferRequest};
pub use tasks::{place_offer, AddToOfferBook, MakerReserveOfferFunds, ValidateOffer};

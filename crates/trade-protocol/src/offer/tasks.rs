//! Offer placement tasks.

use async_trait::async_trait;
use shared_types::TradeId;
use tracing::{info, warn};

use crate::domain::errors::{ProtocolError, TaskError, TradeError};
use crate::domain::escrow::{FundingExpectation, TxDestination};
use crate::domain::offer::Offer;
use crate::domain::role::PeerSlot;
use crate::engine::{Task, TaskRunner};
use crate::model::ProtocolServices;
use crate::offer::model::{PlaceOfferModel, PlaceOfferRequest};
use crate::ports::{OpenOffer, OpenOfferState};

/// Build the offer from the request and check it.
pub struct ValidateOffer;

#[async_trait]
impl Task<PlaceOfferModel> for ValidateOffer {
    fn name(&self) -> &'static str {
        "ValidateOffer"
    }

    async fn execute(&self, model: &mut PlaceOfferModel) -> Result<(), TaskError> {
        let request = &model.request;
        let services = &model.services;
        if services
            .identity
            .accepted_arbitrator(&request.arbitrator_node_address)
            .is_none()
        {
            return Err(TradeError::InvalidOffer(format!(
                "arbitrator {} not accepted",
                request.arbitrator_node_address
            ))
            .into());
        }
        let offer = Offer {
            id: TradeId::generate(),
            direction: request.direction,
            amount: request.amount,
            min_amount: request.min_amount,
            price: request.price,
            buyer_security_deposit: request.buyer_security_deposit,
            seller_security_deposit: request.seller_security_deposit,
            maker_fee: services.config.maker_fee,
            taker_fee: services.config.taker_fee,
            fee_address: services.config.fee_address.clone(),
            currency_code: request.currency_code.clone(),
            payment_method_id: request.payment_method_id.clone(),
            maker_node_address: services.network.own_address(),
            maker_pub_key_ring: services.identity.pub_key_ring(),
            arbitrator_node_address: request.arbitrator_node_address.clone(),
        };
        offer.validate()?;
        model.offer = Some(offer);
        Ok(())
    }
}

/// Create and freeze the maker's reserve for the full offer amount.
pub struct MakerReserveOfferFunds;

#[async_trait]
impl Task<PlaceOfferModel> for MakerReserveOfferFunds {
    fn name(&self) -> &'static str {
        "MakerReserveOfferFunds"
    }

    async fn execute(&self, model: &mut PlaceOfferModel) -> Result<(), TaskError> {
        let offer = model
            .offer
            .as_ref()
            .ok_or(TradeError::MissingData("offer"))?;
        let expected =
            FundingExpectation::reserve(offer, PeerSlot::Maker, offer.is_buyer_maker(), offer.amount);
        let wallet = model.services.wallet.clone();
        let return_address = wallet.primary_address();

        let reserve = wallet
            .create_tx(vec![
                TxDestination::new(offer.fee_address.clone(), expected.trade_fee),
                TxDestination::new(return_address.clone(), expected.locked_amount()),
            ])
            .await?;
        // Recorded first so a failed freeze still thaws whatever was frozen.
        model.reserve = Some(reserve.clone());
        model.payout_address = Some(return_address);
        wallet.freeze_outputs(&reserve.key_images).await?;
        Ok(())
    }
}

/// Publish the offer with its reserve.
pub struct AddToOfferBook;

#[async_trait]
impl Task<PlaceOfferModel> for AddToOfferBook {
    fn name(&self) -> &'static str {
        "AddToOfferBook"
    }

    async fn execute(&self, model: &mut PlaceOfferModel) -> Result<(), TaskError> {
        let (Some(offer), Some(reserve), Some(payout_address)) = (
            model.offer.clone(),
            model.reserve.clone(),
            model.payout_address.clone(),
        ) else {
            return Err(TradeError::MissingData("reserved offer").into());
        };
        model
            .services
            .offers
            .add_open_offer(OpenOffer {
                offer,
                reserve_tx: reserve.into_record(),
                payout_address,
                state: OpenOfferState::Available,
            })
            .await?;
        Ok(())
    }
}

/// Validate, reserve and publish an offer. Reserved outputs are thawed if
/// placement fails after the reserve was made.
pub async fn place_offer(
    services: ProtocolServices,
    request: PlaceOfferRequest,
) -> Result<Offer, ProtocolError> {
    let mut model = PlaceOfferModel::new(request, services);
    let result = TaskRunner::<PlaceOfferModel>::new("PlaceOffer")
        .with_tasks(vec![
            Box::new(ValidateOffer),
            Box::new(MakerReserveOfferFunds),
            Box::new(AddToOfferBook),
        ])
        .on_failure(|model, failure| {
            model.error = Some(failure.to_string());
        })
        .run(&mut model)
        .await;

    match result {
        Ok(()) => {
            let offer = model
                .offer
                .ok_or(TradeError::MissingData("offer"))?;
            info!(offer_id = %offer.id, amount = offer.amount, direction = ?offer.direction, "Offer placed");
            Ok(offer)
        }
        Err(failure) => {
            if let Some(reserve) = &model.reserve {
                if let Err(e) = model.services.wallet.thaw_outputs(&reserve.key_images).await {
                    warn!(error = %e, "Reserve outputs not thawed after failed placement");
                }
            }
            warn!(error = ?model.error, "Offer placement failed");
            Err(failure.into())
        }
    }
}

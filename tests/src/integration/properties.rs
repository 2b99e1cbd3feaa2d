//! Property tests for the arithmetic and bookkeeping the scenarios rely on.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use shared_bus::{ProcessedUid, ProcessedUidCache, UidError};
    use shared_types::amounts::within_tolerance;
    use shared_types::{NodeAddress, PubKeyRing, TradeId};
    use trade_protocol::domain::{fee_share, TxDestination};
    use trade_protocol::{Offer, OfferDirection, Trade, TradeRole, TradeState};

    use crate::sim::SimTx;

    fn proptest_config() -> ProptestConfig {
        let cases = std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(64);
        ProptestConfig {
            cases,
            ..ProptestConfig::default()
        }
    }

    const STATES: [TradeState; 25] = [
        TradeState::Preparation,
        TradeState::ReserveFundsCreated,
        TradeState::SentInitTradeRequest,
        TradeState::ReceivedInitTradeRequest,
        TradeState::MultisigPrepared,
        TradeState::MultisigMade,
        TradeState::ContractSignatureRequested,
        TradeState::ContractSigned,
        TradeState::SentDepositRequest,
        TradeState::DepositTxsPublished,
        TradeState::DepositTxsUnlocked,
        TradeState::BuyerConfirmedPaymentSent,
        TradeState::BuyerSentPaymentSentMsg,
        TradeState::BuyerStoredInMailboxPaymentSentMsg,
        TradeState::BuyerSawArrivedPaymentSentMsg,
        TradeState::BuyerSendFailedPaymentSentMsg,
        TradeState::SellerReceivedPaymentSentMsg,
        TradeState::SellerConfirmedPaymentReceipt,
        TradeState::SellerSentPaymentReceivedMsg,
        TradeState::SellerStoredInMailboxPaymentReceivedMsg,
        TradeState::SellerSawArrivedPaymentReceivedMsg,
        TradeState::SellerSendFailedPaymentReceivedMsg,
        TradeState::BuyerReceivedPaymentReceivedMsg,
        TradeState::PayoutTxPublished,
        TradeState::TradeCompleted,
    ];

    fn offer() -> Offer {
        Offer {
            id: TradeId::new("prop-offer"),
            direction: OfferDirection::Sell,
            amount: 1_000,
            min_amount: 500,
            price: 10_000,
            buyer_security_deposit: 150,
            seller_security_deposit: 150,
            maker_fee: 15,
            taker_fee: 4,
            fee_address: "fee".into(),
            currency_code: "EUR".into(),
            payment_method_id: "SEPA".into(),
            maker_node_address: NodeAddress::new("maker", 1),
            maker_pub_key_ring: PubKeyRing::new([1; 32], [1; 32]),
            arbitrator_node_address: NodeAddress::new("arbitrator", 3),
        }
    }

    proptest! {
        #![proptest_config(proptest_config())]

        #[test]
        fn test_fee_shares_sum_to_fee(fee in 0u64..10_000_000_000, count in 1usize..8) {
            let total: u64 = (0..count).map(|i| fee_share(fee, count, i)).sum();
            prop_assert_eq!(total, fee);
            for i in 0..count.saturating_sub(1) {
                prop_assert!(fee_share(fee, count, i) <= fee_share(fee, count, count - 1));
            }
        }

        #[test]
        fn test_exact_price_always_within_tolerance(price in 1u64..u64::MAX / 2, tolerance in 0.0f64..0.5) {
            prop_assert!(within_tolerance(price, price, tolerance));
            prop_assert!(!within_tolerance(price, price * 2 + 1, tolerance));
        }

        #[test]
        fn test_uid_admitted_once(uids in prop::collection::vec("[a-z0-9]{1,12}", 1..40)) {
            let mut cache = ProcessedUidCache::new();
            let mut seen = std::collections::HashSet::new();
            for uid in &uids {
                let admitted = cache.check_and_insert(uid);
                if seen.insert(uid.clone()) {
                    prop_assert!(admitted.is_ok());
                    cache.record_outcome(uid, true);
                } else {
                    let is_succeeded_duplicate = matches!(
                        admitted,
                        Err(UidError::Duplicate { outcome: ProcessedUid::Succeeded, .. })
                    );
                    prop_assert!(is_succeeded_duplicate);
                }
            }
            prop_assert_eq!(cache.len(), seen.len());
        }

        #[test]
        fn test_phase_never_regresses(steps in prop::collection::vec(0..STATES.len(), 1..60)) {
            let mut trade = Trade::new(TradeRole::Taker, offer(), 1_000, 10_000);
            for step in steps {
                let target = STATES[step];
                let (phase, state) = (trade.phase(), trade.state());
                match trade.set_state(target) {
                    Ok(()) => {
                        prop_assert!(trade.phase() >= phase);
                        prop_assert_eq!(trade.state(), target);
                    }
                    Err(_) => {
                        prop_assert!(target.phase() < phase);
                        prop_assert_eq!(trade.state(), state);
                        prop_assert_eq!(trade.phase(), phase);
                    }
                }
            }
        }

        #[test]
        fn test_cosigning_keeps_tx_hash(signers in prop::collection::vec("[a-z]{1,8}", 0..4), amount in 1u64..1_000_000) {
            let mut tx = SimTx {
                nonce: "n".into(),
                inputs: vec!["ki:a:0".into()],
                outputs: vec![TxDestination::new("buyer", amount)],
                fee: 1,
                key: "k".into(),
                signers: Vec::new(),
            };
            let hash = tx.hash();
            tx.signers = signers;
            prop_assert_eq!(tx.hash(), hash);
        }
    }
}

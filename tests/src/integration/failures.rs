//! # Failure Classification
//!
//! | Cause | Before deposits | After deposits |
//! |-------|-----------------|----------------|
//! | step timer | Errored | FundsLocked |
//! | NACK during init | Failed (offer released) | n/a |
//! | funding tx rejected | Failed (reserve thawed) | n/a |
//! | forged payout | n/a | FundsLocked |
//! | network fault | stays Active, error recorded | stays Active |

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shared_types::TradeId;
    use trade_protocol::domain::{
        InitMultisigRequest, MessageKind, PaymentReceivedMessage, PayoutState, ProtocolEnvelope,
        TradeMessage,
    };
    use trade_protocol::{
        DispatchOutcome, InboundMessage, OpenOfferService, OpenOfferState, ProtocolConfig,
        ProtocolError, TradeDisposition, TradePhase, TradeProtocolApi, TradeState,
    };

    use crate::sim::{SimCluster, SimTx, WalletOp};

    // =========================================================================
    // TIMEOUTS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_timeout_before_deposits_errors_trade() {
        let cluster = SimCluster::new();
        let offer = cluster.place_sell_offer().await;
        cluster.taker.wallet.hang(WalletOp::CreateTx);

        let result = cluster.take(&offer.id, offer.amount).await;
        assert!(matches!(result, Err(ProtocolError::Timeout(_))), "{result:?}");

        let trade = cluster.taker.trade(&offer.id).await.expect("taker trade");
        assert_eq!(trade.disposition(), TradeDisposition::Errored);
        assert_eq!(trade.phase(), TradePhase::Init);
        assert!(trade
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("timed out")));
        // Nothing reached the arbitrator.
        assert!(cluster
            .network
            .sent(&cluster.taker.address, &cluster.arbitrator.address, MessageKind::InitTradeRequest)
            .is_empty());

        // The timer does not fire again once the step is over.
        tokio::time::sleep(cluster.config.step_timeout * 3).await;
        let later = cluster.taker.trade(&offer.id).await.expect("taker trade");
        assert_eq!(later.error_message, trade.error_message);
        assert_eq!(later.disposition(), TradeDisposition::Errored);

        // An errored trade ignores late peer messages.
        let late = ProtocolEnvelope::new(
            offer.id.clone(),
            cluster.arbitrator.address.clone(),
            TradeMessage::InitMultisigRequest(InitMultisigRequest {
                prepared_multisig_hex: "late-prepared".into(),
            }),
        );
        let outcome = cluster
            .taker
            .manager
            .on_network_message(InboundMessage {
                envelope: late,
                sender_ring: cluster.arbitrator.ring,
            })
            .await;
        assert_eq!(outcome, DispatchOutcome::Dropped("disposition"));
        let after = cluster.taker.trade(&offer.id).await.expect("taker trade");
        assert_eq!(after.state(), trade.state());
        assert!(cluster.taker.wallet.multisig_address(&offer.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_step_timer_fires_once() {
        let cluster = SimCluster::with_config(
            ProtocolConfig::default().with_step_timeout(Duration::from_secs(5)),
        );
        cluster.arbitrator.wallet.hang(WalletOp::SubmitTxHex);
        let (_, trade_id) = cluster.open_trade().await;

        cluster
            .arbitrator
            .wait_for(&trade_id, "step timeout", |t| {
                t.disposition() == TradeDisposition::Errored
            })
            .await;
        tokio::time::sleep(cluster.config.step_timeout * 3).await;
        cluster.settle().await;

        let outcomes = cluster
            .network
            .outcomes(&cluster.arbitrator.address, MessageKind::InitTradeRequest);
        assert_eq!(outcomes, vec![DispatchOutcome::TimedOut]);
        let nacks = cluster
            .network
            .acks(&cluster.arbitrator.address, &cluster.taker.address, false);
        assert_eq!(nacks.len(), 1);

        let arbitrated = cluster.arbitrator.trade(&trade_id).await.expect("arbitrator trade");
        assert_eq!(arbitrated.disposition(), TradeDisposition::Errored);
        assert_eq!(arbitrated.phase(), TradePhase::Init);
        assert!(arbitrated
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("timed out")));
        // The maker was never asked.
        assert!(cluster
            .network
            .sent(&cluster.arbitrator.address, &cluster.maker.address, MessageKind::InitTradeRequest)
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_deposits_locks_funds() {
        let cluster = SimCluster::new();
        let (_, trade_id) = cluster.confirmed_trade().await;
        cluster
            .taker
            .manager
            .on_payment_sent(&trade_id, None)
            .await
            .expect("payment sent");
        cluster
            .maker
            .wait_for(&trade_id, "payment sent message", |t| {
                t.state() == TradeState::SellerReceivedPaymentSentMsg
            })
            .await;

        cluster.maker.wallet.hang(WalletOp::SignMultisigTx);
        let result = cluster.maker.manager.on_payment_received(&trade_id).await;
        assert!(matches!(result, Err(ProtocolError::Timeout(_))), "{result:?}");
        let seller = cluster.maker.trade(&trade_id).await.expect("seller trade");
        assert_eq!(seller.disposition(), TradeDisposition::FundsLocked);
        assert!(seller.payout_tx_hash.is_none());

        // A locked trade ignores further protocol messages.
        let sent = cluster.network.sent(
            &cluster.taker.address,
            &cluster.maker.address,
            MessageKind::PaymentSent,
        );
        let mut envelope = sent[0].envelope.clone();
        envelope.uid = format!("{}-late", envelope.uid);
        let outcome = cluster
            .maker
            .manager
            .on_network_message(InboundMessage {
                envelope,
                sender_ring: cluster.taker.ring,
            })
            .await;
        assert_eq!(outcome, DispatchOutcome::Dropped("disposition"));
        let after = cluster.maker.trade(&trade_id).await.expect("seller trade");
        assert_eq!(after.state(), seller.state());
    }

    // =========================================================================
    // PEER REJECTION
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_reserve_paying_wrong_fee_address_fails_taker() {
        let cluster = SimCluster::new();
        let offer = cluster.place_sell_offer().await;
        cluster
            .taker
            .wallet
            .redirect_next_output(&offer.fee_address, "taker-pocket");

        let _ = cluster.take(&offer.id, offer.amount).await;
        cluster.taker.wait_archived(&offer.id).await;
        cluster.settle().await;

        let outcomes = cluster
            .network
            .outcomes(&cluster.arbitrator.address, MessageKind::InitTradeRequest);
        assert_eq!(outcomes.len(), 1);
        assert!(
            matches!(&outcomes[0], DispatchOutcome::Failed(cause) if cause.contains("Reserve tx rejected")),
            "{outcomes:?}"
        );
        let nacks = cluster
            .network
            .acks(&cluster.arbitrator.address, &cluster.taker.address, false);
        assert_eq!(nacks.len(), 1);

        let failed = cluster.taker.manager.failed_trades();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].disposition(), TradeDisposition::Failed);
        assert_eq!(failed[0].phase(), TradePhase::Init);
        assert_eq!(cluster.taker.wallet.frozen_count(), 0);

        // The trade never got past the arbitrator.
        for kind in [MessageKind::InitTradeRequest, MessageKind::InitMultisigRequest] {
            assert!(cluster
                .network
                .sent(&cluster.arbitrator.address, &cluster.maker.address, kind)
                .is_empty());
        }
        assert!(cluster
            .network
            .sent(&cluster.arbitrator.address, &cluster.taker.address, MessageKind::InitMultisigRequest)
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nack_during_init_fails_maker_and_releases_offer() {
        let cluster = SimCluster::new();
        cluster
            .network
            .fail_sends(&cluster.arbitrator.address, MessageKind::InitMultisigRequest);
        let (offer, trade_id) = cluster.open_trade().await;

        cluster.maker.wait_archived(&trade_id).await;
        cluster.settle().await;

        let nacks = cluster
            .network
            .acks(&cluster.arbitrator.address, &cluster.maker.address, false);
        assert_eq!(nacks.len(), 1);

        let failed = cluster.maker.manager.failed_trades();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id(), &trade_id);
        assert_eq!(failed[0].disposition(), TradeDisposition::Failed);
        assert_eq!(
            cluster
                .maker
                .manager
                .services()
                .offers
                .open_offer(&offer.id)
                .map(|o| o.state),
            Some(OpenOfferState::Available)
        );

        // A send fault is transient for the arbitrator.
        let arbitrated = cluster.arbitrator.trade(&trade_id).await.expect("arbitrator trade");
        assert_eq!(arbitrated.disposition(), TradeDisposition::Active);
        assert!(arbitrated.error_message.is_some());
        assert!(cluster.arbitrator.manager.failed_trades().is_empty());
    }

    // =========================================================================
    // FORGED PAYOUT
    // =========================================================================

    /// Run a trade to the seller holding the buyer's payout and return that
    /// unsigned payout.
    async fn payout_pending(cluster: &SimCluster) -> (TradeId, String) {
        let (_, trade_id) = cluster.confirmed_trade().await;
        cluster
            .taker
            .manager
            .on_payment_sent(&trade_id, None)
            .await
            .expect("payment sent");
        cluster
            .maker
            .wait_for(&trade_id, "payment sent message", |t| {
                t.state() == TradeState::SellerReceivedPaymentSentMsg
            })
            .await;
        let sent = cluster.network.sent(
            &cluster.taker.address,
            &cluster.maker.address,
            MessageKind::PaymentSent,
        );
        let TradeMessage::PaymentSent(message) = &sent[0].envelope.payload else {
            panic!("expected a payment sent message");
        };
        (trade_id, message.payout_tx_hex.clone())
    }

    /// Hand the buyer a payment received message in the seller's name.
    async fn deliver_payment_received(
        cluster: &SimCluster,
        trade_id: &TradeId,
        signed_payout_tx_hex: String,
        payout_tx_hash: String,
    ) -> DispatchOutcome {
        let envelope = ProtocolEnvelope::new(
            trade_id.clone(),
            cluster.maker.address.clone(),
            TradeMessage::PaymentReceived(PaymentReceivedMessage {
                signed_payout_tx_hex,
                payout_tx_hash,
                updated_multisig_hex: "forged-multisig".into(),
            }),
        );
        cluster
            .taker
            .manager
            .on_network_message(InboundMessage {
                envelope,
                sender_ring: cluster.maker.ring,
            })
            .await
    }

    async fn assert_payout_not_recorded(cluster: &SimCluster, trade_id: &TradeId, outcome: DispatchOutcome) {
        assert!(
            matches!(&outcome, DispatchOutcome::Failed(cause) if cause.contains("Payout tx rejected")),
            "{outcome:?}"
        );
        let buyer = cluster.taker.trade(trade_id).await.expect("buyer trade");
        assert_eq!(buyer.payout_state(), PayoutState::Unpublished);
        assert!(buyer.payout_tx_hash.is_none());
        assert_ne!(buyer.state(), TradeState::BuyerReceivedPaymentReceivedMsg);
        assert_eq!(buyer.disposition(), TradeDisposition::FundsLocked);
        assert!(cluster.taker.manager.on_withdraw(trade_id).await.is_err());
        assert!(cluster.taker.manager.closed_trades().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_payout_with_unknown_hash_rejected() {
        let cluster = SimCluster::new();
        let (trade_id, own_payout) = payout_pending(&cluster).await;

        let outcome =
            deliver_payment_received(&cluster, &trade_id, own_payout, "never-relayed".into()).await;
        assert_payout_not_recorded(&cluster, &trade_id, outcome).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_payout_without_seller_signature_rejected() {
        let cluster = SimCluster::new();
        let (trade_id, own_payout) = payout_pending(&cluster).await;
        let hash = SimTx::from_hex(&own_payout).expect("payout tx").hash();

        let outcome = deliver_payment_received(&cluster, &trade_id, own_payout, hash).await;
        assert_payout_not_recorded(&cluster, &trade_id, outcome).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_payout_never_relayed_rejected() {
        let cluster = SimCluster::new();
        let (trade_id, own_payout) = payout_pending(&cluster).await;
        let mut tx = SimTx::from_hex(&own_payout).expect("payout tx");
        tx.signers.push("maker".into());
        let hash = tx.hash();
        assert!(!cluster.chain.is_relayed(&hash));

        let outcome = deliver_payment_received(&cluster, &trade_id, tx.to_hex(), hash).await;
        assert_payout_not_recorded(&cluster, &trade_id, outcome).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_outside_their_phase_are_refused() {
        let cluster = SimCluster::new();
        let (_, trade_id) = cluster.open_trade().await;
        cluster
            .wait_all(&trade_id, "deposits published", |t| {
                t.phase() >= TradePhase::DepositsPublished
            })
            .await;

        // Deposits are not unlocked yet.
        let early = cluster
            .taker
            .manager
            .on_payment_sent(&trade_id, Some("too-early".to_string()))
            .await;
        assert!(early.is_err());
        let taker = cluster.taker.trade(&trade_id).await.expect("taker trade");
        assert_eq!(taker.counter_currency_tx_id, None);
        assert_eq!(taker.disposition(), TradeDisposition::Active);

        // Only the seller confirms receipt.
        assert!(cluster
            .taker
            .manager
            .on_payment_received(&trade_id)
            .await
            .is_err());
        assert!(cluster.maker.manager.on_withdraw(&trade_id).await.is_err());
    }
}

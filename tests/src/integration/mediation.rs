//! # Mediated Payout
//!
//! ```text
//! request mediation → result set on every node
//!   → buyer accepts: partial payout ──MediatedPayoutSignature──► seller
//!   → seller accepts: cosign + publish ──MediatedPayoutPublished──► buyer, arbitrator
//! ```

#[cfg(test)]
mod tests {
    use shared_types::amounts::ATOMIC_UNITS_PER_XMR;
    use trade_protocol::domain::{fee_share, MessageKind};
    use trade_protocol::{
        DisputeState, MediationResult, PayoutState, ProtocolError, TradePhase, TradeProtocolApi,
        TradeState,
    };

    use crate::sim::{SimCluster, SIM_TX_FEE, STARTING_BALANCE};

    #[tokio::test(start_paused = true)]
    async fn test_mediated_payout_splits_escrow() {
        let cluster = SimCluster::new();
        let (offer, trade_id) = cluster.confirmed_trade().await;
        let escrowed = offer.amount + offer.buyer_security_deposit + offer.seller_security_deposit;

        cluster
            .taker
            .manager
            .request_mediation(&trade_id)
            .await
            .expect("request mediation");
        let taker = cluster.taker.trade(&trade_id).await.expect("taker trade");
        assert_eq!(taker.dispute_state(), DisputeState::MediationRequested);

        // Buyer gets 0.65 XMR plus its deposit, the seller the rest.
        let buyer_payout = 65 * ATOMIC_UNITS_PER_XMR / 100 + offer.buyer_security_deposit;
        let result = MediationResult {
            buyer_payout,
            seller_payout: escrowed - buyer_payout,
        };
        for node in cluster.nodes() {
            node.manager
                .set_mediation_result(&trade_id, result)
                .await
                .expect("mediation result");
            let trade = node.trade(&trade_id).await.expect("trade");
            assert_eq!(trade.dispute_state(), DisputeState::MediationClosed);
        }

        cluster
            .taker
            .manager
            .accept_mediation_result(&trade_id)
            .await
            .expect("buyer accepts");
        let seller = cluster
            .maker
            .wait_for(&trade_id, "mediated signature", |t| {
                t.mediated_payout_tx_hex.is_some()
            })
            .await;
        assert_eq!(seller.payout_state(), PayoutState::Unpublished);
        assert_eq!(
            cluster
                .network
                .sent(
                    &cluster.taker.address,
                    &cluster.maker.address,
                    MessageKind::MediatedPayoutSignature
                )
                .len(),
            1
        );

        cluster
            .maker
            .manager
            .accept_mediation_result(&trade_id)
            .await
            .expect("seller accepts");
        let seller = cluster.maker.trade(&trade_id).await.expect("seller trade");
        assert_eq!(seller.state(), TradeState::PayoutTxPublished);
        let payout_hash = seller.payout_tx_hash.clone().expect("payout hash");
        assert!(cluster.chain.is_relayed(&payout_hash));

        for node in [&cluster.taker, &cluster.arbitrator] {
            let trade = node
                .wait_for(&trade_id, "mediated payout", |t| {
                    t.phase() == TradePhase::PayoutPublished
                })
                .await;
            assert_eq!(trade.payout_tx_hash.as_deref(), Some(payout_hash.as_str()));
        }

        let multisig = cluster
            .maker
            .wallet
            .multisig_address(&trade_id)
            .expect("multisig");
        assert_eq!(cluster.chain.balance(&multisig), 0);
        assert_eq!(
            cluster.taker.wallet.balance(),
            STARTING_BALANCE - offer.taker_fee - SIM_TX_FEE - offer.buyer_security_deposit
                + result.buyer_payout
                - fee_share(SIM_TX_FEE, 2, 0)
        );
        assert_eq!(
            cluster.maker.wallet.balance(),
            STARTING_BALANCE
                - offer.maker_fee
                - SIM_TX_FEE
                - offer.amount
                - offer.seller_security_deposit
                + result.seller_payout
                - fee_share(SIM_TX_FEE, 2, 1)
        );

        cluster.mine(cluster.config.unlock_confirmations).await;
        cluster.arbitrator.wait_archived(&trade_id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_without_result_is_refused() {
        let cluster = SimCluster::new();
        let (_, trade_id) = cluster.confirmed_trade().await;
        cluster
            .taker
            .manager
            .request_mediation(&trade_id)
            .await
            .expect("request mediation");

        let result = cluster.taker.manager.accept_mediation_result(&trade_id).await;
        assert!(matches!(result, Err(ProtocolError::Rejected { .. })), "{result:?}");
        let taker = cluster.taker.trade(&trade_id).await.expect("taker trade");
        assert_eq!(taker.payout_state(), PayoutState::Unpublished);
        assert!(cluster
            .network
            .sent(
                &cluster.taker.address,
                &cluster.maker.address,
                MessageKind::MediatedPayoutSignature
            )
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mediation_closed_after_payout() {
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
        cluster
            .maker
            .manager
            .on_payment_received(&trade_id)
            .await
            .expect("payment received");

        let late = cluster.maker.manager.request_mediation(&trade_id).await;
        assert!(matches!(late, Err(ProtocolError::Rejected { .. })), "{late:?}");
    }
}

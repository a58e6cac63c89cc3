//! End-to-end swap scenarios over the wired deployment.

#[cfg(test)]
mod tests {
    use crate::harness::{wait_for, wait_htlc_params, wait_settlement, SwapNet};
    use bt_03_negotiation::{CreateOrderParams, NegotiationError};
    use bt_04_chain_connectors::ChainConnector;
    use bt_06_api_gateway::{ActionInput, SettlementActions, SwapLeg};
    use shared_crypto::hash_lock;
    use shared_types::{
        ErrorKind, Order, OrderPhase, Proposal, ProposalStatus, SettlementStatus, SwapSecret,
    };

    fn order_params() -> CreateOrderParams {
        CreateOrderParams {
            amount: 100,
            quote_asset_tag: "usdq".into(),
            min_price: 10,
            max_price: 15,
            settlement_chain_tag: "acct-main".into(),
            target_taker: None,
        }
    }

    /// Run negotiation through acceptance and wait for the coordinator's
    /// `ready` status to land on both parties.
    async fn negotiate_and_accept(
        maker: &crate::harness::Party,
        taker: &crate::harness::Party,
        secret: &SwapSecret,
    ) -> (Order, Proposal) {
        let order = maker
            .negotiation
            .create_order(order_params())
            .await
            .expect("create order");
        wait_for("order mirror", || taker.store.order(&order.order_id)).await;

        let proposal = taker
            .negotiation
            .propose(order.order_id.clone(), 12, 100)
            .await
            .expect("propose");
        wait_for("proposal at maker", || {
            maker.store.proposal(&proposal.proposal_id)
        })
        .await;

        maker
            .negotiation
            .accept(proposal.proposal_id.clone(), secret.clone())
            .await
            .expect("accept");
        wait_for("acceptance at taker", || {
            taker
                .store
                .proposal(&proposal.proposal_id)
                .filter(|p| p.status == ProposalStatus::Accepted)
        })
        .await;

        wait_settlement(maker, &proposal.proposal_id, SettlementStatus::Ready).await;
        wait_settlement(taker, &proposal.proposal_id, SettlementStatus::Ready).await;
        wait_htlc_params(maker, &proposal.proposal_id).await;
        wait_htlc_params(taker, &proposal.proposal_id).await;
        (order, proposal)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_happy_path_walks_to_complete() {
        let net = SwapNet::start();
        let maker = net.spawn_party("maker");
        let taker = net.spawn_party("taker");
        let secret = SwapSecret::new([0x01u8; 32]);

        let (_order, proposal) = negotiate_and_accept(&maker, &taker, &secret).await;

        // The agreed hash-lock is `RIPEMD160(SHA256(secret))`.
        let accepted = maker.store.proposal(&proposal.proposal_id).unwrap();
        assert_eq!(accepted.hash_lock, Some(hash_lock(&secret)));

        // Wallets.
        let maker_base = net.base_address(500).await;
        let taker_base = net.base_address(0).await;
        let taker_quote = net.quote_address(2_000).await;
        let maker_quote = net.quote_address(0).await;

        // Maker locks the base leg.
        maker
            .glue
            .lock(
                proposal.proposal_id.clone(),
                SwapLeg::Base,
                ActionInput {
                    recipient_address: Some(taker_base.address.clone()),
                    refund_address: Some(maker_base.address.clone()),
                    pubkey_hash: Some(maker_base.pubkey_hash.to_string()),
                    funding_address: Some(maker_base.address.clone()),
                    signing_ref: "wif:maker".into(),
                    secret_hex: None,
                },
            )
            .await
            .expect("maker lock");
        wait_settlement(&taker, &proposal.proposal_id, SettlementStatus::MakerLocked).await;

        // Taker locks the quote leg; both legs locked releases the secret.
        taker
            .glue
            .lock(
                proposal.proposal_id.clone(),
                SwapLeg::Quote,
                ActionInput {
                    recipient_address: Some(maker_quote.address.clone()),
                    refund_address: Some(taker_quote.address.clone()),
                    pubkey_hash: Some(taker_quote.pubkey_hash.to_string()),
                    funding_address: Some(taker_quote.address.clone()),
                    signing_ref: "wif:taker".into(),
                    secret_hex: None,
                },
            )
            .await
            .expect("taker lock");
        wait_settlement(&maker, &proposal.proposal_id, SettlementStatus::BothLocked).await;
        wait_settlement(&taker, &proposal.proposal_id, SettlementStatus::BothLocked).await;

        // Maker claims quote with its own preimage: the only path that
        // reveals the secret on-chain.
        maker
            .glue
            .claim(
                proposal.proposal_id.clone(),
                SwapLeg::Quote,
                ActionInput {
                    recipient_address: Some(maker_quote.address.clone()),
                    signing_ref: "wif:maker".into(),
                    secret_hex: Some(hex::encode(secret.expose())),
                    ..ActionInput::default()
                },
            )
            .await
            .expect("maker claim quote");
        wait_settlement(&taker, &proposal.proposal_id, SettlementStatus::QuoteClaimed).await;

        // Taker claims base with the now-public preimage.
        taker
            .glue
            .claim(
                proposal.proposal_id.clone(),
                SwapLeg::Base,
                ActionInput {
                    recipient_address: Some(taker_base.address.clone()),
                    signing_ref: "wif:taker".into(),
                    ..ActionInput::default()
                },
            )
            .await
            .expect("taker claim base");

        wait_settlement(&maker, &proposal.proposal_id, SettlementStatus::Complete).await;
        wait_settlement(&taker, &proposal.proposal_id, SettlementStatus::Complete).await;

        // Money moved: 100 base maker→taker, 1200 quote taker→maker.
        assert_eq!(net.base.balance_of(&taker_base.address).await.unwrap(), 100);
        assert_eq!(net.base.balance_of(&maker_base.address).await.unwrap(), 400);
        assert_eq!(
            net.quote.balance_of(&maker_quote.address).await.unwrap(),
            1_200
        );
        assert_eq!(
            net.quote.balance_of(&taker_quote.address).await.unwrap(),
            800
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_taker_never_locks_refunds_maker() {
        let net = SwapNet::start();
        let maker = net.spawn_party("maker");
        let taker = net.spawn_party("taker");
        let secret = SwapSecret::new([0x02u8; 32]);

        let (_order, proposal) = negotiate_and_accept(&maker, &taker, &secret).await;

        let maker_base = net.base_address(500).await;
        let taker_base = net.base_address(0).await;

        maker
            .glue
            .lock(
                proposal.proposal_id.clone(),
                SwapLeg::Base,
                ActionInput {
                    recipient_address: Some(taker_base.address.clone()),
                    refund_address: Some(maker_base.address.clone()),
                    signing_ref: "wif:maker".into(),
                    ..ActionInput::default()
                },
            )
            .await
            .expect("maker lock");
        wait_settlement(&maker, &proposal.proposal_id, SettlementStatus::MakerLocked).await;

        // The taker never locks. Cross the quote locktime.
        net.clock.advance(12 * 3600 + 60);

        // The coordinator surfaces refund_ready; the maker's client
        // broadcasts the refund once the base locktime branch opens.
        net.clock.advance(12 * 3600 + 3600);
        maker
            .glue
            .refund(
                proposal.proposal_id.clone(),
                SwapLeg::Base,
                ActionInput {
                    refund_address: Some(maker_base.address.clone()),
                    signing_ref: "wif:maker".into(),
                    ..ActionInput::default()
                },
            )
            .await
            .expect("maker refund");

        wait_settlement(&maker, &proposal.proposal_id, SettlementStatus::RefundedMaker).await;
        wait_settlement(&taker, &proposal.proposal_id, SettlementStatus::RefundedMaker).await;
        assert_eq!(net.base.balance_of(&maker_base.address).await.unwrap(), 500);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_targeted_order_hides_details() {
        let net = SwapNet::start();
        let maker = net.spawn_party("maker");
        let target = net.spawn_party("target");
        let outsider = net.spawn_party("outsider");

        let order = maker
            .negotiation
            .create_order(CreateOrderParams {
                target_taker: Some(target.peer.clone()),
                ..order_params()
            })
            .await
            .expect("create targeted order");

        // Everyone sees the stub; the terms are zeroed.
        let stub = wait_for("stub at outsider", || {
            outsider.store.order(&order.order_id)
        })
        .await;
        assert!(stub.stub);
        assert_eq!((stub.amount, stub.min_price, stub.max_price), (0, 0, 0));

        // Proposing without details is a precondition failure.
        let err = outsider
            .negotiation
            .propose(order.order_id.clone(), 12, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::DetailsMissing(_)));
        assert_eq!(err.kind(), ErrorKind::Precondition);

        // The target requests and decrypts the full record.
        wait_for("stub at target", || target.store.order(&order.order_id)).await;
        target
            .negotiation
            .request_details(order.order_id.clone())
            .await
            .expect("request details");
        let disclosed = wait_for("details at target", || {
            target.store.order(&order.order_id).filter(|o| !o.stub)
        })
        .await;
        assert_eq!(disclosed.amount, 100);
        assert_eq!(disclosed.min_price, 10);
        assert_eq!(disclosed.max_price, 15);

        // The outsider still holds only the stub.
        assert!(outsider.store.order(&order.order_id).unwrap().stub);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_double_acceptance_single_winner() {
        let net = SwapNet::start();
        let maker = net.spawn_party("maker");
        let taker1 = net.spawn_party("taker1");
        let taker2 = net.spawn_party("taker2");

        let order = maker
            .negotiation
            .create_order(order_params())
            .await
            .expect("create order");
        wait_for("mirror 1", || taker1.store.order(&order.order_id)).await;
        wait_for("mirror 2", || taker2.store.order(&order.order_id)).await;

        let p1 = taker1
            .negotiation
            .propose(order.order_id.clone(), 12, 100)
            .await
            .expect("propose 1");
        let p2 = taker2
            .negotiation
            .propose(order.order_id.clone(), 14, 100)
            .await
            .expect("propose 2");
        wait_for("p1 at maker", || maker.store.proposal(&p1.proposal_id)).await;
        wait_for("p2 at maker", || maker.store.proposal(&p2.proposal_id)).await;

        let first = maker
            .negotiation
            .accept(p1.proposal_id.clone(), SwapSecret::new([0x0Au8; 32]))
            .await;
        let second = maker
            .negotiation
            .accept(p2.proposal_id.clone(), SwapSecret::new([0x0Bu8; 32]))
            .await;

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(NegotiationError::OrderAlreadyAccepted(_))
        ));

        // The losing proposal never crosses into settlement.
        let loser = maker.store.proposal(&p2.proposal_id).unwrap();
        assert_eq!(loser.settlement_status, None);
        assert_eq!(
            maker.store.order(&order.order_id).unwrap().phase,
            OrderPhase::Accepted
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_secret_claim_is_rejected() {
        let net = SwapNet::start();
        let maker = net.spawn_party("maker");
        let taker = net.spawn_party("taker");
        let secret = SwapSecret::new([0x03u8; 32]);

        let (_order, proposal) = negotiate_and_accept(&maker, &taker, &secret).await;

        let maker_base = net.base_address(500).await;
        let taker_base = net.base_address(0).await;
        let taker_quote = net.quote_address(2_000).await;
        let maker_quote = net.quote_address(0).await;

        maker
            .glue
            .lock(
                proposal.proposal_id.clone(),
                SwapLeg::Base,
                ActionInput {
                    recipient_address: Some(taker_base.address.clone()),
                    refund_address: Some(maker_base.address.clone()),
                    signing_ref: "wif:maker".into(),
                    ..ActionInput::default()
                },
            )
            .await
            .expect("maker lock");
        taker
            .glue
            .lock(
                proposal.proposal_id.clone(),
                SwapLeg::Quote,
                ActionInput {
                    recipient_address: Some(maker_quote.address.clone()),
                    refund_address: Some(taker_quote.address.clone()),
                    signing_ref: "wif:taker".into(),
                    ..ActionInput::default()
                },
            )
            .await
            .expect("taker lock");
        wait_settlement(&taker, &proposal.proposal_id, SettlementStatus::BothLocked).await;

        // A preimage whose double-hash does not match the stored lock.
        let err = taker
            .glue
            .claim(
                proposal.proposal_id.clone(),
                SwapLeg::Base,
                ActionInput {
                    recipient_address: Some(taker_base.address.clone()),
                    signing_ref: "wif:taker".into(),
                    secret_hex: Some(hex::encode([0xEEu8; 32])),
                    ..ActionInput::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Chain);
        assert!(err.message.contains("invalid secret"));

        // State unchanged on both sides.
        assert_eq!(
            taker
                .store
                .proposal(&proposal.proposal_id)
                .unwrap()
                .settlement_status,
            Some(SettlementStatus::BothLocked)
        );
        assert_eq!(net.base.balance_of(&taker_base.address).await.unwrap(), 0);
    }
}

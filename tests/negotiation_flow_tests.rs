use paynego::domain::amount::MonetaryAmount;
use paynego::error::NegotiationError;
use paynego::infrastructure::sandbox::Operation;
use paynego::domain::ports::NegotiationStore;
use rust_decimal_macros::dec;

mod common;
use common::{ALICE, BOB, CAROL, Harness, id};

#[tokio::test]
async fn test_start_then_resume_end_to_end() {
    let h = Harness::new().await;

    let started = h
        .orchestrator
        .start(id("tx-1"), ALICE, BOB, dec!(10.00))
        .await
        .unwrap();

    // Receiver scale 2: 10.00 becomes 1000 minor units.
    let incoming = h.sandbox.calls_of(Operation::CreateIncomingPayment).await;
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].detail["incomingAmount"]["value"], 1000);
    assert_eq!(incoming[0].detail["walletAddress"], BOB);

    assert!(!started.interaction_url.as_str().is_empty());
    assert!(!started.continue_token.is_empty());
    assert_eq!(started.quote.receive_amount, MonetaryAmount::new("USD", 2, 1000));
    assert_eq!(started.quote.debit_amount, MonetaryAmount::new("USD", 2, 1000));
    assert_eq!(h.store.len().await.unwrap(), 1);

    h.consent("tx-1", "ref-abc").await;
    let completed = h.orchestrator.resume(id("tx-1"), "ref-abc").await.unwrap();

    assert!(completed.payment_id.as_str().contains("outgoing-payments"));
    assert_eq!(completed.sent_amount.value, 1000);
    assert_eq!(completed.received_amount.value, 1000);
    assert!(h.store.peek(&id("tx-1")).await.unwrap().is_none());

    let outgoing = h.sandbox.outgoing_payments().await;
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].quote_id, started.quote.id);
}

#[tokio::test]
async fn test_protocol_steps_run_in_order() {
    let h = Harness::new().await;
    h.orchestrator
        .start(id("tx-order"), ALICE, BOB, dec!(1))
        .await
        .unwrap();
    h.consent("tx-order", "ref").await;
    h.orchestrator.resume(id("tx-order"), "ref").await.unwrap();

    let operations: Vec<Operation> = h
        .sandbox
        .calls()
        .await
        .into_iter()
        .map(|call| call.operation)
        .collect();
    assert_eq!(
        operations,
        vec![
            Operation::ResolveEndpoint,
            Operation::ResolveEndpoint,
            Operation::RequestGrant,
            Operation::CreateIncomingPayment,
            Operation::RequestGrant,
            Operation::CreateQuote,
            Operation::RequestGrant,
            Operation::ContinueGrant,
            Operation::CreateOutgoingPayment,
        ]
    );
}

#[tokio::test]
async fn test_outgoing_grant_requests_interactive_consent() {
    let h = Harness::new().await;
    let started = h
        .orchestrator
        .start(id("tx-interact"), ALICE, BOB, dec!(2.50))
        .await
        .unwrap();

    let grants = h.sandbox.calls_of(Operation::RequestGrant).await;
    assert_eq!(grants.len(), 3);
    assert!(grants[0].detail["interact"].is_null());
    assert!(grants[1].detail["interact"].is_null());

    let outgoing = &grants[2].detail;
    assert_eq!(outgoing["access"]["access_type"], "outgoing-payment");
    assert_eq!(outgoing["access"]["identifier"], ALICE);
    assert_eq!(outgoing["access"]["debit_limit"]["value"], 250);
    assert_eq!(outgoing["interact"]["start"][0], "redirect");
    assert_eq!(outgoing["interact"]["finish"]["method"], "redirect");
    assert_eq!(outgoing["interact"]["finish"]["nonce"], "tx-interact");
    assert_eq!(
        outgoing["interact"]["finish"]["uri"],
        "http://127.0.0.1:5000/payment-callback/tx-interact"
    );
    assert_eq!(grants[2].target.as_str(), "https://alpha.example/auth/");
    assert_eq!(started.quote.debit_amount.value, 250);
}

#[tokio::test]
async fn test_resume_succeeds_exactly_once() {
    let h = Harness::new().await;
    h.orchestrator
        .start(id("tx-once"), ALICE, BOB, dec!(5))
        .await
        .unwrap();
    h.consent("tx-once", "ref-abc").await;

    assert!(h.orchestrator.resume(id("tx-once"), "ref-abc").await.is_ok());
    let second = h.orchestrator.resume(id("tx-once"), "ref-abc").await;
    assert!(matches!(second, Err(NegotiationError::NegotiationNotFound(_))));
    assert_eq!(h.sandbox.outgoing_payments().await.len(), 1);
}

#[tokio::test]
async fn test_resume_unknown_negotiation() {
    let h = Harness::new().await;
    let result = h.orchestrator.resume(id("never-started"), "ref").await;
    assert!(matches!(result, Err(NegotiationError::NegotiationNotFound(_))));
    assert!(h.sandbox.calls().await.is_empty());
}

#[tokio::test]
async fn test_status_reports_pending_negotiation() {
    let h = Harness::new().await;
    let started = h
        .orchestrator
        .start(id("tx-status"), ALICE, BOB, dec!(7.25))
        .await
        .unwrap();

    let status = h.orchestrator.status(&id("tx-status")).await.unwrap();
    assert_eq!(status.requested_amount, MonetaryAmount::new("USD", 2, 725));
    assert_eq!(status.interaction_url, Some(started.interaction_url));
    assert_eq!(status.quote, started.quote);

    // Status does not consume the negotiation.
    h.consent("tx-status", "ref").await;
    assert!(h.orchestrator.resume(id("tx-status"), "ref").await.is_ok());
    assert!(matches!(
        h.orchestrator.status(&id("tx-status")).await,
        Err(NegotiationError::NegotiationNotFound(_))
    ));
}

#[tokio::test]
async fn test_payment_pointers_and_bare_references_are_accepted() {
    let h = Harness::new().await;
    let started = h
        .orchestrator
        .start(id("tx-pointer"), "$alpha.example/alice", "beta.example/bob", dec!(3))
        .await
        .unwrap();
    assert_eq!(started.quote.wallet_address.as_str(), ALICE);

    let resolved = h.sandbox.calls_of(Operation::ResolveEndpoint).await;
    assert_eq!(resolved[0].target.as_str(), ALICE);
    assert_eq!(resolved[1].target.as_str(), BOB);
}

#[tokio::test]
async fn test_cross_asset_quote_is_passed_through() {
    let h = Harness::new().await;
    h.sandbox.set_rate("USD", "EUR", dec!(0.8)).await;

    let started = h
        .orchestrator
        .start(id("tx-fx"), ALICE, CAROL, dec!(10.00))
        .await
        .unwrap();

    // The receiver is credited in its own asset; the quote sets the debit.
    assert_eq!(started.quote.receive_amount, MonetaryAmount::new("EUR", 2, 1000));
    assert_eq!(started.quote.debit_amount, MonetaryAmount::new("USD", 2, 1250));
    assert_eq!(started.quote.exchange_rate, Some(dec!(0.8)));

    h.consent("tx-fx", "ref").await;
    let completed = h.orchestrator.resume(id("tx-fx"), "ref").await.unwrap();
    assert_eq!(completed.sent_amount, MonetaryAmount::new("USD", 2, 1250));
    assert_eq!(completed.received_amount, MonetaryAmount::new("EUR", 2, 1000));
}

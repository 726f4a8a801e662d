mod common;

use common::*;
use course_pay::domain::error::PipelineError;
use course_pay::domain::id::{GatewaySessionId, ProductId, UserId};
use course_pay::domain::payment::{PaymentStatus, SettleOutcome, Settlement};
use course_pay::services::registry::PushFrame;
use rust_decimal_macros::dec;
use std::sync::Arc;

// ── 1. create_pending_splits_listed_price ─────────────────────────────────
// 100.00 listed with the 1/3-of-gross policy: buyer pays 150.00.

#[tokio::test]
async fn create_pending_splits_listed_price() {
    let app = TestApp::new().await;

    let payment = app.state.ledger.create_pending(CLIENT, course()).await.unwrap();

    assert_eq!(payment.status(), PaymentStatus::Pending);
    assert_eq!(payment.split().gross().value(), dec!(150.00));
    assert_eq!(payment.split().commission().value(), dec!(50.00));
    assert_eq!(payment.split().net().value(), dec!(100.00));
    assert!(payment.gateway_ref().is_none());
}

// ── 2. unknown_product_is_rejected ────────────────────────────────────────

#[tokio::test]
async fn unknown_product_is_rejected() {
    let app = TestApp::new().await;

    let err = app
        .state
        .ledger
        .create_pending(CLIENT, ProductId::new(999))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidProduct(_)), "got {err:?}");
}

// ── 3. scenario_a_paid_settlement_applies_every_effect ────────────────────

#[tokio::test]
async fn scenario_a_paid_settlement_applies_every_effect() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;

    let payment = ledger.create_pending(CLIENT, course()).await.unwrap();
    let session = GatewaySessionId::new("gw-a").unwrap();
    ledger.attach_gateway_ref(payment.id(), &session).await.unwrap();

    let settlement = ledger
        .settle(payment.id(), SettleOutcome::Paid, Some("gw-a".into()))
        .await
        .unwrap();

    let Settlement::Transitioned { payment: settled, credit: Some(credit) } = settlement else {
        panic!("expected a paid transition with credit");
    };
    assert_eq!(settled.status(), PaymentStatus::Paid);
    assert_eq!(settled.transaction_ref(), Some("gw-a"));
    assert_eq!(credit.provider, PROVIDER);
    assert_eq!(credit.notification.kind, "payment");
    assert_eq!(credit.enrollment.user_id, CLIENT);
    assert_eq!(credit.enrollment.course_id, course());

    let provider = ledger.account(PROVIDER).await.unwrap();
    assert_eq!(provider.balance.value(), dec!(100.00));

    let enrolled = ledger.enrollments(CLIENT).await.unwrap();
    assert_eq!(enrolled.len(), 1);
    assert_eq!(enrolled[0].course_id, course());

    let notes = ledger.notifications(PROVIDER).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].content.contains(COURSE_TITLE));
}

// ── 4. already_purchased_blocks_new_payment ───────────────────────────────

#[tokio::test]
async fn already_purchased_blocks_new_payment() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;

    let payment = ledger.create_pending(CLIENT, course()).await.unwrap();
    ledger.settle(payment.id(), SettleOutcome::Paid, None).await.unwrap();

    let err = ledger.create_pending(CLIENT, course()).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyPurchased { .. }), "got {err:?}");

    // Another buyer is unaffected.
    ledger.create_pending(OTHER_CLIENT, course()).await.unwrap();
}

// ── 5. settle_is_idempotent ───────────────────────────────────────────────

#[tokio::test]
async fn settle_is_idempotent() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;

    let payment = ledger.create_pending(CLIENT, course()).await.unwrap();
    let first = ledger.settle(payment.id(), SettleOutcome::Paid, None).await.unwrap();
    let second = ledger.settle(payment.id(), SettleOutcome::Paid, None).await.unwrap();

    assert!(!first.is_noop());
    assert!(second.is_noop());
    assert_eq!(second.payment().status(), PaymentStatus::Paid);

    let provider = ledger.account(PROVIDER).await.unwrap();
    assert_eq!(provider.balance.value(), dec!(100.00));
    assert_eq!(ledger.notifications(PROVIDER).await.unwrap().len(), 1);
}

// ── 6. failed_is_terminal ─────────────────────────────────────────────────
// A late success after a cancel must not credit anything.

#[tokio::test]
async fn failed_is_terminal() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;

    let payment = ledger.create_pending(CLIENT, course()).await.unwrap();
    let failed = ledger.settle(payment.id(), SettleOutcome::Failed, None).await.unwrap();
    assert!(matches!(failed, Settlement::Transitioned { credit: None, .. }));

    let late = ledger.settle(payment.id(), SettleOutcome::Paid, None).await.unwrap();
    assert!(late.is_noop());
    assert_eq!(late.payment().status(), PaymentStatus::Failed);

    assert!(ledger.account(PROVIDER).await.unwrap().balance.is_zero());
    assert!(ledger.enrollments(CLIENT).await.unwrap().is_empty());
}

// ── 7. concurrent_settles_credit_once ─────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_settles_credit_once() {
    let app = TestApp::new().await;
    let payment = app.state.ledger.create_pending(CLIENT, course()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = Arc::clone(&app.state.ledger);
        let id = payment.id();
        handles.push(tokio::spawn(async move {
            ledger.settle(id, SettleOutcome::Paid, None).await.unwrap()
        }));
    }

    let mut transitioned = 0;
    for h in handles {
        if !h.await.unwrap().is_noop() {
            transitioned += 1;
        }
    }

    assert_eq!(transitioned, 1, "exactly one settle applies effects");
    let provider = app.state.ledger.account(PROVIDER).await.unwrap();
    assert_eq!(provider.balance.value(), dec!(100.00));
    assert_eq!(app.state.ledger.notifications(PROVIDER).await.unwrap().len(), 1);
}

// ── 8. second_paid_payment_for_pair_is_failed ─────────────────────────────
// Two checkouts opened before either was paid: only the first paid one counts.

#[tokio::test]
async fn second_paid_payment_for_pair_is_failed() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;

    let first = ledger.create_pending(CLIENT, course()).await.unwrap();
    let second = ledger.create_pending(CLIENT, course()).await.unwrap();

    ledger.settle(first.id(), SettleOutcome::Paid, None).await.unwrap();
    let dup = ledger.settle(second.id(), SettleOutcome::Paid, None).await.unwrap();

    assert_eq!(dup.payment().status(), PaymentStatus::Failed);
    assert_eq!(ledger.account(PROVIDER).await.unwrap().balance.value(), dec!(100.00));
    assert_eq!(ledger.enrollments(CLIENT).await.unwrap().len(), 1);
}

// ── 9. paid_settlement_pushes_notification_to_provider ────────────────────

#[tokio::test]
async fn paid_settlement_pushes_notification_to_provider() {
    let app = TestApp::new().await;
    let (channel, mut rx) = app.state.registry.open_channel();
    app.state.registry.register(PROVIDER, channel);

    let payment = app.state.ledger.create_pending(CLIENT, course()).await.unwrap();
    app.state
        .ledger
        .settle(payment.id(), SettleOutcome::Paid, None)
        .await
        .unwrap();

    let Some(PushFrame::Text(frame)) = rx.recv().await else {
        panic!("expected a text frame");
    };
    let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["type"], "notification");
    assert_eq!(frame["data"]["type"], "payment");
    assert_eq!(frame["data"]["user_id"], PROVIDER.get());
}

// ── 10. payout_moves_balance ──────────────────────────────────────────────

#[tokio::test]
async fn payout_moves_balance() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;

    let payment = ledger.create_pending(CLIENT, course()).await.unwrap();
    ledger.settle(payment.id(), SettleOutcome::Paid, None).await.unwrap();

    let account = ledger.payout(PROVIDER, amount("40.00")).await.unwrap();
    assert_eq!(account.balance.value(), dec!(60.00));
    assert_eq!(account.payout_amount.value(), dec!(40.00));

    let err = ledger.payout(PROVIDER, amount("60.01")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "got {err:?}");

    let err = ledger.payout(PROVIDER, amount("0")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "got {err:?}");

    let err = ledger.payout(CLIENT_WITHOUT_ACCOUNT, amount("1")).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "got {err:?}");
}

const CLIENT_WITHOUT_ACCOUNT: UserId = UserId::new(404);

// ── 11. attach_rejected_after_settlement ──────────────────────────────────

#[tokio::test]
async fn attach_rejected_after_settlement() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;

    let payment = ledger.create_pending(CLIENT, course()).await.unwrap();
    ledger.settle(payment.id(), SettleOutcome::Failed, None).await.unwrap();

    let session = GatewaySessionId::new("gw-late").unwrap();
    let err = ledger.attach_gateway_ref(payment.id(), &session).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "got {err:?}");
}

//! Cron sweep endpoint integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;

use partnerpay_core::{Commission, CommissionType, PartnerId, ProgramId};
use partnerpay_store::Ledger;

#[tokio::test]
async fn sweep_rejects_missing_signature() {
    let harness = TestHarness::new();

    let response = harness.server.post("/cron/payouts").text("{}").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sweep_rejects_bad_signature() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/cron/payouts")
        .add_header("x-cron-signature", "0".repeat(64))
        .text("{}")
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_sweep_on_empty_ledger_reports_nothing() {
    let harness = TestHarness::new();
    let body = r#"{"cursor":null}"#;

    let response = harness
        .server
        .post("/cron/payouts")
        .add_header("x-cron-signature", harness.cron_signature(body))
        .text(body)
        .await;

    response.assert_status_ok();
    let summary: serde_json::Value = response.json();
    assert_eq!(summary["pairs"], 0);
    assert_eq!(summary["next_cursor"], serde_json::Value::Null);
    assert_eq!(summary["requeued"], false);
}

#[tokio::test]
async fn signed_sweep_aggregates_pending_commissions() {
    let harness = TestHarness::new();

    let program = ProgramId::generate();
    let partner = PartnerId::generate();
    harness
        .ledger
        .insert_commission(&Commission::new(
            program,
            partner,
            CommissionType::Sale,
            2,
            4500,
        ))
        .await
        .unwrap();

    // An empty body means a fresh, cursor-less sweep.
    let body = "";
    let response = harness
        .server
        .post("/cron/payouts")
        .add_header("x-cron-signature", harness.cron_signature(body))
        .text(body)
        .await;

    response.assert_status_ok();
    let summary: serde_json::Value = response.json();
    assert_eq!(summary["pairs"], 1);
    assert_eq!(summary["rolled_up"], 1);
    assert_eq!(summary["failed"], 0);

    let payouts = harness
        .ledger
        .payouts_for_pair(&program, &partner)
        .await
        .unwrap();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].amount, 4500);
}

#[tokio::test]
async fn repeated_sweep_is_idempotent() {
    let harness = TestHarness::new();

    let program = ProgramId::generate();
    let partner = PartnerId::generate();
    harness
        .ledger
        .insert_commission(&Commission::new(
            program,
            partner,
            CommissionType::Lead,
            1,
            900,
        ))
        .await
        .unwrap();

    let body = "";
    for _ in 0..2 {
        harness
            .server
            .post("/cron/payouts")
            .add_header("x-cron-signature", harness.cron_signature(body))
            .text(body)
            .await
            .assert_status_ok();
    }

    let payouts = harness
        .ledger
        .payouts_for_pair(&program, &partner)
        .await
        .unwrap();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].amount, 900);
}

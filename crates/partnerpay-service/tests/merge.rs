//! Partner merge endpoint integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

use partnerpay_core::{
    Commission, CommissionType, Partner, Program, ProgramEnrollment, UserId,
};
use partnerpay_store::Ledger;

async fn seed_duplicate_accounts(harness: &TestHarness) -> (Program, Partner, Partner) {
    let program = Program::new("Acme Affiliates");
    let source = Partner::new("dup@example.com");
    let target = Partner::new("canonical@example.com");

    harness.ledger.put_program(&program).await.unwrap();
    harness.ledger.put_partner(&source).await.unwrap();
    harness.ledger.put_partner(&target).await.unwrap();
    harness
        .ledger
        .put_enrollment(&ProgramEnrollment::new(program.id, source.id))
        .await
        .unwrap();
    harness
        .ledger
        .insert_commission(&Commission::new(
            program.id,
            source.id,
            CommissionType::Sale,
            1,
            1200,
        ))
        .await
        .unwrap();

    (program, source, target)
}

fn merge_body(source: &str, target: &str) -> serde_json::Value {
    json!({
        "initiator_user_id": UserId::generate(),
        "source_email": source,
        "target_email": target,
    })
}

#[tokio::test]
async fn merge_requires_admin_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/partners/merge")
        .json(&merge_body("a@example.com", "b@example.com"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn merge_rejects_wrong_admin_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/partners/merge")
        .add_header("x-admin-key", "wrong-key")
        .json(&merge_body("a@example.com", "b@example.com"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn merge_rejects_identical_emails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/partners/merge")
        .add_header("x-admin-key", harness.admin_key.clone())
        .json(&merge_body("same@example.com", "Same@Example.com"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn merge_moves_records_to_target() {
    let harness = TestHarness::new();
    let (program, source, target) = seed_duplicate_accounts(&harness).await;

    let response = harness
        .server
        .post("/v1/partners/merge")
        .add_header("x-admin-key", harness.admin_key.clone())
        .json(&merge_body("dup@example.com", "canonical@example.com"))
        .await;

    response.assert_status_ok();
    let outcome: serde_json::Value = response.json();
    assert_eq!(outcome["outcome"], "merged");
    assert_eq!(outcome["detail"]["commissions_moved"], 1);
    assert_eq!(outcome["detail"]["enrollments_moved"], 1);

    let commissions = harness
        .ledger
        .commissions_for_pair(&program.id, &target.id)
        .await
        .unwrap();
    assert_eq!(commissions.len(), 1);
    assert!(harness
        .ledger
        .get_partner(&source.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn merge_with_unknown_source_is_soft_not_found() {
    let harness = TestHarness::new();
    let target = Partner::new("canonical@example.com");
    harness.ledger.put_partner(&target).await.unwrap();

    let response = harness
        .server
        .post("/v1/partners/merge")
        .add_header("x-admin-key", harness.admin_key.clone())
        .json(&merge_body("missing@example.com", "canonical@example.com"))
        .await;

    response.assert_status_ok();
    let outcome: serde_json::Value = response.json();
    assert_eq!(outcome["outcome"], "not_found");
}

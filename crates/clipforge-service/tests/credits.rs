//! Credit balance and transactions integration tests.

mod common;

use common::{TestHarness, ADMIN_KEY};
use serde_json::json;

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn get_balance_success() {
    let harness = TestHarness::new();
    harness.open_account().await;

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"], 3);
    assert_eq!(body["plan"], "free");
    assert_eq!(body["monthly_allotment"], 3);
}

#[tokio::test]
async fn get_balance_without_account_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn get_balance_without_auth_fails() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/credits/balance").await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn list_transactions_shows_welcome_bonus() {
    let harness = TestHarness::new();
    harness.open_account().await;

    let response = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["transaction_type"], "BONUS");
    assert_eq!(transactions[0]["amount"], 3);
    assert_eq!(transactions[0]["balance_after"], 3);
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn list_transactions_paginates() {
    let harness = TestHarness::new();
    harness.open_account().await;

    for amount in [5, 7] {
        harness
            .server
            .post("/v1/credits/add")
            .add_header("x-api-key", ADMIN_KEY.to_string())
            .json(&json!({
                "user_id": harness.test_user_id.to_string(),
                "amount": amount,
                "reason": "support"
            }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get("/v1/credits/transactions")
        .add_query_param("limit", 2)
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
}

// ============================================================================
// Admin grants
// ============================================================================

#[tokio::test]
async fn admin_add_credits_success() {
    let harness = TestHarness::new();
    harness.open_account().await;

    let response = harness
        .server
        .post("/v1/credits/add")
        .add_header("x-api-key", ADMIN_KEY.to_string())
        .add_header("x-admin-id", "ops@clipforge.test".to_string())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 10,
            "kind": "purchase",
            "reason": "invoice 42"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"], 13);
    assert_eq!(harness.balance().await, 13);
}

#[tokio::test]
async fn admin_add_credits_rejects_non_positive_amount() {
    let harness = TestHarness::new();
    harness.open_account().await;

    let response = harness
        .server
        .post("/v1/credits/add")
        .add_header("x-api-key", ADMIN_KEY.to_string())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 0,
            "reason": "nothing"
        }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(harness.balance().await, 3);
}

#[tokio::test]
async fn admin_add_credits_requires_admin_key() {
    let harness = TestHarness::new();
    harness.open_account().await;

    let body = json!({
        "user_id": harness.test_user_id.to_string(),
        "amount": 10,
        "reason": "free money"
    });

    harness
        .server
        .post("/v1/credits/add")
        .json(&body)
        .await
        .assert_status_unauthorized();

    harness
        .server
        .post("/v1/credits/add")
        .add_header("x-api-key", "wrong-key".to_string())
        .json(&body)
        .await
        .assert_status_unauthorized();

    assert_eq!(harness.balance().await, 3);
}

#[tokio::test]
async fn admin_add_credits_unknown_user_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/add")
        .add_header("x-api-key", ADMIN_KEY.to_string())
        .json(&json!({
            "user_id": clipforge_core::UserId::generate().to_string(),
            "amount": 10,
            "reason": "typo"
        }))
        .await;

    response.assert_status_not_found();
}

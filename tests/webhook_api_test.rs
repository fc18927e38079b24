//! Integration tests for POST /webhooks/worldpay

mod common;

use axum::body::Body;
use common::{body_json, test_config, TestApp, PROVIDER_ID};
use http::{Request, StatusCode};
use serde_json::json;
use settlement_backend::database::repository::{ActivityTarget, TransactionStore};
use settlement_backend::payments::types::TransactionState;
use sqlx::types::BigDecimal;
use std::str::FromStr;
use std::time::Duration;
use tower::util::ServiceExt;

const UNUSED_ACQUIRER: &str = "http://127.0.0.1:9";

fn webhook(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/worldpay")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn event(reference: &str, kind: &str) -> serde_json::Value {
    json!({
        "eventId": "4e1f3a",
        "eventDetails": {
            "transactionReference": reference,
            "type": kind,
        }
    })
}

fn gbp(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

#[tokio::test]
async fn disallowed_origin_is_forbidden_before_parsing() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));

    let response = app
        .router_from("10.9.9.9")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/worldpay")
                .body(Body::from("this is not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["status"], 403);
    assert_eq!(body["error"], "ORIGIN_REJECTED");
    assert!(!body["message"].as_str().unwrap().contains("key"));
}

#[tokio::test]
async fn missing_event_details_is_bad_request() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));

    let response = app
        .router()
        .oneshot(webhook(json!({"eventId": "x"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], 400);
}

#[tokio::test]
async fn unknown_reference_is_acknowledged() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));

    let response = app
        .router()
        .oneshot(webhook(event("SNSVT-NOSUCH", "authorized")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"message": "OK"}));
}

#[tokio::test]
async fn sent_for_settlement_leaves_state_untouched() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));
    let tx = app
        .transactions
        .seed("S0100", PROVIDER_ID, TransactionState::Pending, gbp("25.00"), "GBP")
        .await;

    let response = app
        .router()
        .oneshot(webhook(event("SNSVT-S0100", "sentForSettlement")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let after = app.transactions.get(tx.id).await.unwrap().unwrap();
    assert_eq!(after.state, TransactionState::Pending);
    assert_eq!(after.amount, tx.amount);
}

#[tokio::test]
async fn refused_event_marks_transaction_declined() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));
    let tx = app
        .transactions
        .seed("S0101", PROVIDER_ID, TransactionState::Pending, gbp("25.00"), "GBP")
        .await;

    let response = app
        .router()
        .oneshot(webhook(event("SNSVT-S0101", "refused")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let after = app.transactions.get(tx.id).await.unwrap().unwrap();
    assert_eq!(after.state, TransactionState::Error);
    assert_eq!(after.state_message.as_deref(), Some("Payment declined."));
}

#[tokio::test(start_paused = true)]
async fn authorized_event_settles_once_transaction_is_pending() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));
    let tx = app
        .transactions
        .seed("T-1", PROVIDER_ID, TransactionState::Draft, gbp("10.00"), "GBP")
        .await;

    let router = app.router();
    let request = tokio::spawn(router.oneshot(webhook(json!({
        "eventDetails": {
            "transactionReference": "SNSVT-T-1",
            "type": "authorized",
            "amount": {"value": 1000, "currencyCode": "GBP"}
        }
    }))));

    // the initiation flow lands its pending write while the webhook waits
    tokio::time::sleep(Duration::from_millis(2500)).await;
    app.services.settlement.mark_pending(tx.id).await.unwrap();

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let after = app.transactions.get(tx.id).await.unwrap().unwrap();
    assert_eq!(after.state, TransactionState::Done);
    assert_eq!(after.amount, gbp("10.00"));
    assert_eq!(after.provider_reference.as_deref(), Some("worldpay-T-1"));
}

#[tokio::test]
async fn authorized_event_uses_acquirer_amount() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));
    let tx = app
        .transactions
        .seed("S0102", PROVIDER_ID, TransactionState::Pending, gbp("10.00"), "GBP")
        .await;

    let response = app
        .router()
        .oneshot(webhook(json!({
            "eventDetails": {
                "transactionReference": "SNSVT-S0102",
                "type": "authorized",
                "amount": {"value": 950, "currencyCode": "GBP"}
            }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let after = app.transactions.get(tx.id).await.unwrap().unwrap();
    assert_eq!(after.state, TransactionState::Done);
    assert_eq!(after.amount, gbp("9.50"));
}

#[tokio::test]
async fn event_with_unreadable_amount_is_still_applied() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));
    let tx = app
        .transactions
        .seed("S0103", PROVIDER_ID, TransactionState::Pending, gbp("10.00"), "GBP")
        .await;

    let response = app
        .router()
        .oneshot(webhook(json!({
            "eventDetails": {
                "transactionReference": "SNSVT-S0103",
                "type": "cancelled",
                "amount": {"value": 1000}
            }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"message": "OK"}));
    let after = app.transactions.get(tx.id).await.unwrap().unwrap();
    assert_eq!(after.state, TransactionState::Cancelled);
}

#[tokio::test]
async fn late_cancellation_escalates_and_keeps_done() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));
    app.records.add_order(41, "S0200", None).await;
    let tx = app
        .transactions
        .seed("S0200-1", PROVIDER_ID, TransactionState::Done, gbp("30.00"), "GBP")
        .await;

    for _ in 0..2 {
        let response = app
            .router()
            .oneshot(webhook(event("SNSVT-S0200-1", "cancelled")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let after = app.transactions.get(tx.id).await.unwrap().unwrap();
    assert_eq!(after.state, TransactionState::Done);

    let tasks = app.scheduler.scheduled().await;
    assert!(!tasks.is_empty());
    assert_eq!(tasks[0].target, ActivityTarget::SaleOrder(41));
    assert_eq!(tasks[0].assignee_user_id, Some(99));
}

#[tokio::test]
async fn tokenization_notice_is_acknowledged() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));

    let response = app
        .router()
        .oneshot(webhook(json!({
            "eventDetails": {
                "transactionReference": "SNSVT-S0300",
                "tokenPaymentInstrument": {"href": "https://try.access.worldpay.com/tokens/abc"}
            }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new(test_config(UNUSED_ACQUIRER));

    let response = app
        .router()
        .oneshot(webhook(event("SNSVT-NOSUCH", "authorized")))
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

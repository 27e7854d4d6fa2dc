//! Router tests against the in-memory harness.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use ticket_ledger_core::providers::ProviderPaymentStatus;
use ticket_ledger_core::store::LedgerStore;
use ticket_ledger_core::{Money, TicketOrigin, UserId};
use ticket_ledger_engine::ReservationRequest;
use ticket_ledger_testing::TestHarness;
use ticket_ledger_web::{AppState, CORRELATION_ID_HEADER, router};
use tower::ServiceExt;

fn app(harness: &TestHarness) -> Router {
    ticket_ledger_testing::init_tracing();
    router(AppState::new(harness.ledger.clone(), harness.store.clone()))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_endpoints() {
    let harness = TestHarness::new();

    let response = app(&harness)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));

    let (status, body) = send(app(&harness), Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_free_checkout_issues_ticket() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 5, 0).await;
    let buyer = UserId::new();

    let (status, body) = send(
        app(&harness),
        Method::POST,
        "/api/checkout",
        Some(json!({
            "buyer_id": buyer,
            "event_id": event.id,
            "tier_id": tier.id,
            "quantity": 2,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "issued");
    assert_eq!(body["quantity"], 2);
    assert_eq!(harness.store.get_tier(tier.id).await.unwrap().unwrap().remaining_quantity, 3);
}

#[tokio::test]
async fn test_sold_out_checkout_is_conflict() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 1, 2_000).await;

    let (status, body) = send(
        app(&harness),
        Method::POST,
        "/api/checkout",
        Some(json!({
            "buyer_id": UserId::new(),
            "event_id": event.id,
            "tier_id": tier.id,
            "quantity": 3,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SOLD_OUT");
}

#[tokio::test]
async fn test_pending_payment_is_payment_required() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 5, 1_000).await;
    let buyer = UserId::new();
    harness.approve_ticket_payment("pay-1", buyer, &tier, 1, Money::from_cents(1_000));
    harness
        .payments
        .set_status("pay-1", ProviderPaymentStatus::Pending);

    let (status, body) = send(
        app(&harness),
        Method::POST,
        "/api/payments/pay-1/finalize",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "PAYMENT_NOT_APPROVED");
}

#[tokio::test]
async fn test_finalize_by_another_user_is_not_found() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 5, 1_000).await;
    harness.approve_ticket_payment("pay-2", UserId::new(), &tier, 1, Money::from_cents(1_000));

    let uri = format!("/api/payments/pay-2/finalize?user_id={}", UserId::new());
    let (status, _) = send(app(&harness), Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_always_acknowledges() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 5, 1_000).await;
    let buyer = UserId::new();
    harness.approve_ticket_payment("pay-3", buyer, &tier, 1, Money::from_cents(1_000));

    let notification = json!({ "type": "payment", "data": { "id": "pay-3" } });
    for _ in 0..2 {
        let (status, body) = send(
            app(&harness),
            Method::POST,
            "/webhooks/payments",
            Some(notification.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "received": true }));
    }
    assert_eq!(harness.store.tickets_by_user(buyer).await.unwrap().len(), 1);

    let request = Request::post("/webhooks/payments")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_redeem_reports_counts_and_rejections() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 10, 0).await;
    let issued = harness
        .ledger
        .reservations
        .create_reservation(ReservationRequest::new(
            UserId::new(),
            tier.id,
            event.id,
            5,
            TicketOrigin::Purchase,
        ))
        .await
        .unwrap();
    let uri = format!("/api/tickets/{}/redeem", issued.ticket.id);

    let (status, body) = send(app(&harness), Method::POST, &uri, Some(json!({ "units": 3 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["redeemed"], 3);
    assert_eq!(body["total"], 5);

    let (status, body) = send(app(&harness), Method::POST, &uri, Some(json!({ "units": 4 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "OVER_REDEEM");

    let (status, _) = send(app(&harness), Method::POST, &uri, Some(json!({ "units": 2 }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app(&harness), Method::POST, &uri, Some(json!({ "units": 1 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "FULLY_REDEEMED");

    let scans = format!("/api/events/{}/scans", event.id);
    let (status, body) = send(app(&harness), Method::GET, &scans, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_unknown_ticket_is_not_found() {
    let harness = TestHarness::new();
    let uri = format!("/api/tickets/{}", ticket_ledger_core::TicketId::new());
    let (status, body) = send(app(&harness), Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_admin_print_gift_and_void() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 0, 1_500).await;
    let owner = UserId::new();

    let print = format!("/api/admin/tiers/{}/print", tier.id);
    let (status, body) = send(
        app(&harness),
        Method::POST,
        &print,
        Some(json!({ "count": 3, "requested_by": owner })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(3));

    let gift = format!("/api/admin/tiers/{}/gift", tier.id);
    let (status, _) = send(
        app(&harness),
        Method::POST,
        &gift,
        Some(json!({ "email": "  ", "issued_by": owner })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        app(&harness),
        Method::POST,
        &gift,
        Some(json!({ "email": "friend@example.com", "quantity": 2, "issued_by": owner })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ticket_id = body["id"].as_str().unwrap().to_string();

    let void = format!("/api/admin/tickets/{ticket_id}/void");
    let (status, body) = send(app(&harness), Method::POST, &void, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "INVALIDATED");

    let (status, body) = send(app(&harness), Method::POST, &void, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TICKET_INACTIVE");
}

#[tokio::test]
async fn test_reaper_run_reports_sweep() {
    let harness = TestHarness::new();
    let (status, body) = send(app(&harness), Method::POST, "/api/admin/reaper/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reclaimed"], json!([]));
    assert_eq!(body["units_released"], 0);
}

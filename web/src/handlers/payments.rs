//! Payment endpoints: provider webhook, client finalize, checkout.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use ticket_ledger_core::{ExternalPaymentId, PurchaseResult, UserId};
use ticket_ledger_engine::{CheckoutOutcome, CheckoutRequest, WebhookNotification, WebhookOutcome};

use crate::error::AppError;
use crate::middleware::CorrelationId;
use crate::state::AppState;

/// Body returned to the provider for every delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    /// Always `true`
    pub received: bool,
}

/// Provider callback.
///
/// Always acknowledges with `200 {"received": true}`, even for bodies that
/// do not parse: the provider redelivers on failure anyway, and a non-2xx
/// answer only makes it retry faster.
///
/// # Endpoint
///
/// ```text
/// POST /webhooks/payments
/// ```
pub async fn payment_webhook(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    body: Bytes,
) -> Json<WebhookAck> {
    let outcome = match serde_json::from_slice::<WebhookNotification>(&body) {
        Ok(notification) => state.ledger.reconciler.handle_webhook(&notification).await,
        Err(err) => {
            tracing::warn!(%correlation_id, error = %err, "Unparseable webhook body");
            WebhookOutcome::Ignored
        }
    };

    let label = match &outcome {
        WebhookOutcome::Ignored => "ignored",
        WebhookOutcome::Applied(_) => "applied",
        WebhookOutcome::Failed(_) => "failed",
    };
    metrics::counter!("ticket_ledger_webhooks_total", "outcome" => label).increment(1);

    Json(WebhookAck { received: true })
}

/// Who is finalizing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeParams {
    /// Must match the envelope's buyer when present
    pub user_id: Option<UserId>,
}

/// Client-driven confirmation after returning from the provider.
///
/// # Endpoint
///
/// ```text
/// POST /api/payments/:payment_id/finalize?user_id=
/// ```
///
/// # Errors
///
/// `402 PAYMENT_NOT_APPROVED` while the payment is pending, `404` for
/// unknown payments or another buyer's payment, `409 SOLD_OUT`, `504` on
/// provider timeouts.
pub async fn finalize_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    Query(params): Query<FinalizeParams>,
) -> Result<Json<PurchaseResult>, AppError> {
    let payment_id = ExternalPaymentId::new(payment_id);
    let result = state
        .ledger
        .reconciler
        .finalize(&payment_id, params.user_id)
        .await?;
    Ok(Json(result))
}

/// Start a checkout (or issue a free ticket directly).
///
/// # Endpoint
///
/// ```text
/// POST /api/checkout
/// ```
///
/// # Errors
///
/// `422` for invalid quantities, mismatched tiers or past events,
/// `409 SOLD_OUT` when stock is short, `502`/`504` on provider failures.
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutOutcome>, AppError> {
    let outcome = state.ledger.reconciler.begin_checkout(request).await?;
    Ok(Json(outcome))
}

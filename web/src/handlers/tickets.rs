//! Ticket endpoints: scan, confirm, lookups.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use ticket_ledger_core::{EventId, RedemptionReceipt, Ticket, TicketId, UserId};

use crate::error::AppError;
use crate::state::AppState;

/// Scan request.
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemRequest {
    /// Guest units admitted by this scan
    pub units: u32,
    /// Event the scanner is at; checked against the ticket when present
    pub event_id: Option<EventId>,
}

/// Admit guests on a ticket.
///
/// # Endpoint
///
/// ```text
/// POST /api/tickets/:id/redeem
/// ```
///
/// # Errors
///
/// `409` with `FULLY_REDEEMED`, `OVER_REDEEM`, `EVENT_ENDED`, `WRONG_EVENT`,
/// `PAYMENT_INCOMPLETE` or `TICKET_INACTIVE`; `422` for zero units.
pub async fn redeem_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<RedemptionReceipt>, AppError> {
    let receipt = state
        .ledger
        .redemptions
        .redeem(ticket_id, request.units, request.event_id)
        .await?;
    Ok(Json(receipt))
}

/// Holder confirmation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmRequest {
    /// Holder confirming attendance
    pub user_id: UserId,
}

/// Confirm attendance, exempting the ticket from reclamation.
///
/// # Endpoint
///
/// ```text
/// POST /api/tickets/:id/confirm
/// ```
///
/// # Errors
///
/// `404` for unknown tickets or non-holders, `409` for terminal tickets.
pub async fn confirm_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state
        .ledger
        .reservations
        .confirm(ticket_id, request.user_id)
        .await?;
    Ok(Json(ticket))
}

/// # Errors
///
/// `404` for unknown tickets.
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.ledger.reservations.get_ticket(ticket_id).await?))
}

/// Tickets held by a user, newest first.
///
/// # Errors
///
/// Storage failures.
pub async fn user_tickets(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    Ok(Json(state.ledger.reservations.tickets_for_user(user_id).await?))
}

/// Scan history window.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanParams {
    /// Lower bound on the scan time; everything when absent
    pub since: Option<DateTime<Utc>>,
}

/// Tickets scanned at an event, most recent first.
///
/// # Endpoint
///
/// ```text
/// GET /api/events/:id/scans?since=2025-01-01T20:00:00Z
/// ```
///
/// # Errors
///
/// Storage failures.
pub async fn event_scans(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Query(params): Query<ScanParams>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let since = params.since.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let tickets = state
        .ledger
        .reservations
        .scan_history(event_id, since)
        .await?;
    Ok(Json(tickets))
}

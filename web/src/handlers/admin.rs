//! Event-owner and staff operations.
//!
//! Authentication sits in front of this router; the acting user is taken
//! from the request body.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use ticket_ledger_core::{EventId, RaffleOutcome, Ticket, TicketId, TierId, UserId};
use ticket_ledger_engine::SweepReport;

use crate::error::AppError;
use crate::state::AppState;

/// Delete a reservation, returning its stock.
///
/// # Errors
///
/// `404` for unknown tickets.
pub async fn delete_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
) -> Result<Json<Ticket>, AppError> {
    let deleted = state
        .ledger
        .reservations
        .delete_reservation(ticket_id)
        .await?;
    Ok(Json(deleted))
}

/// Batch of door-sale prints.
#[derive(Debug, Clone, Deserialize)]
pub struct PrintRequest {
    /// Tickets to print
    pub count: u32,
    /// Head-count on each ticket
    #[serde(default = "one")]
    pub quantity_per_ticket: i64,
    /// Staff member printing
    pub requested_by: UserId,
}

const fn one() -> i64 {
    1
}

/// Issue physical-print tickets. They never touch stock.
///
/// # Errors
///
/// `422` for a zero count or quantity, `404` for unknown tiers.
pub async fn print_tickets(
    State(state): State<AppState>,
    Path(tier_id): Path<TierId>,
    Json(request): Json<PrintRequest>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let tickets = state
        .ledger
        .reservations
        .issue_physical_print(
            tier_id,
            request.count,
            request.quantity_per_ticket,
            request.requested_by,
        )
        .await?;
    Ok(Json(tickets))
}

/// Owner invitation.
#[derive(Debug, Clone, Deserialize)]
pub struct GiftRequest {
    /// Recipient; an account is created if none exists
    pub email: String,
    /// Head-count
    #[serde(default = "one")]
    pub quantity: i64,
    /// Owner issuing the invitation
    pub issued_by: UserId,
}

/// Gift a ticket by email.
///
/// # Errors
///
/// `422` for a blank email or invalid quantity, `404` for unknown tiers.
pub async fn gift_ticket(
    State(state): State<AppState>,
    Path(tier_id): Path<TierId>,
    Json(request): Json<GiftRequest>,
) -> Result<Json<Ticket>, AppError> {
    if request.email.trim().is_empty() {
        return Err(AppError::validation("email is required"));
    }
    let ticket = state
        .ledger
        .reservations
        .issue_invitation(tier_id, &request.email, request.quantity, request.issued_by)
        .await?;
    Ok(Json(ticket))
}

/// Void a ticket that has not been scanned.
///
/// # Errors
///
/// `409 TICKET_INACTIVE` once scanned or already terminal, `404` for unknown tickets.
pub async fn void_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<TicketId>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.ledger.redemptions.void(ticket_id).await?))
}

/// Manual raffle draw.
#[derive(Debug, Clone, Deserialize)]
pub struct RaffleRequest {
    /// Only tickets created before this instant take part
    pub cutoff: DateTime<Utc>,
    /// Prizes in rank order
    pub prizes: Vec<String>,
}

/// Draw a raffle now.
///
/// # Errors
///
/// Storage failures.
pub async fn draw_raffle(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(request): Json<RaffleRequest>,
) -> Result<Json<RaffleOutcome>, AppError> {
    let outcome = state
        .ledger
        .raffle
        .draw(event_id, request.cutoff, &request.prizes)
        .await?;
    Ok(Json(outcome))
}

/// Run one reclamation sweep immediately.
///
/// # Errors
///
/// Storage failures.
pub async fn run_reaper(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    Ok(Json(state.ledger.reaper.sweep().await?))
}

//! Error taxonomy for ledger operations.

use crate::types::{EventId, ExternalPaymentId, TicketId, TierId};
use thiserror::Error;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Every way a ledger operation can fail.
///
/// Stock and idempotency violations are detected at the store (conditional
/// updates, unique constraints) and surfaced here as typed variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // ═══════════════════════════════════════════════════════════
    // Purchase Errors
    // ═══════════════════════════════════════════════════════════

    /// Requested quantity exceeds remaining tier capacity.
    #[error("Insufficient stock on tier {tier_id}: requested {requested}, remaining {remaining}")]
    InsufficientStock {
        /// Tier that ran out
        tier_id: TierId,
        /// Units requested
        requested: u32,
        /// Units left at the time of the attempt
        remaining: i64,
    },

    /// Quantity is not a positive integer.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity {
        /// Quantity as received
        quantity: i64,
    },

    /// Tier does not belong to the requested event.
    #[error("Tier {tier_id} does not belong to event {event_id}")]
    TierEventMismatch {
        /// Requested tier
        tier_id: TierId,
        /// Requested event
        event_id: EventId,
    },

    /// Event is over (or otherwise not on sale).
    #[error("Event {event_id} is not upcoming")]
    EventNotUpcoming {
        /// Event ID
        event_id: EventId,
    },

    // ═══════════════════════════════════════════════════════════
    // Payment Errors
    // ═══════════════════════════════════════════════════════════

    /// Payment ID already produced a record.
    #[error("Payment {payment_id} already processed")]
    AlreadyProcessed {
        /// Payment ID
        payment_id: ExternalPaymentId,
    },

    /// Provider does not report the payment as approved.
    #[error("Payment {payment_id} not approved (status: {status})")]
    NotApproved {
        /// Payment ID
        payment_id: ExternalPaymentId,
        /// Provider status
        status: String,
    },

    /// Envelope could not be decoded or failed validation.
    #[error("Invalid payment envelope: {0}")]
    InvalidEnvelope(String),

    /// Provider request failed.
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Provider request exceeded its deadline.
    #[error("Payment provider timed out")]
    ProviderTimeout,

    // ═══════════════════════════════════════════════════════════
    // Redemption Errors
    // ═══════════════════════════════════════════════════════════

    /// Every guest unit was already admitted.
    #[error("Ticket {ticket_id} is fully redeemed")]
    FullyRedeemed {
        /// Ticket ID
        ticket_id: TicketId,
    },

    /// More units requested than remain on the ticket.
    #[error("Ticket {ticket_id}: requested {requested} units, {remaining} remaining")]
    OverRedeem {
        /// Ticket ID
        ticket_id: TicketId,
        /// Units requested
        requested: u32,
        /// Units left
        remaining: u32,
    },

    /// The event has ended.
    #[error("Event {event_id} has ended")]
    EventEnded {
        /// Event ID
        event_id: EventId,
    },

    /// Ticket was scanned at a different event.
    #[error("Ticket {ticket_id} is not valid for event {event_id}")]
    WrongEvent {
        /// Ticket ID
        ticket_id: TicketId,
        /// Event the scan was made at
        event_id: EventId,
    },

    /// Ticket balance is still outstanding.
    #[error("Ticket {ticket_id} is not fully paid")]
    PaymentIncomplete {
        /// Ticket ID
        ticket_id: TicketId,
    },

    /// Ticket is in a status that does not allow the transition.
    #[error("Ticket {ticket_id} is {status}")]
    TerminalState {
        /// Ticket ID
        ticket_id: TicketId,
        /// Current status
        status: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Lookup / Infrastructure Errors
    // ═══════════════════════════════════════════════════════════

    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (`ticket`, `tier`, `event`, ...)
        entity: &'static str,
        /// Identifier that failed to resolve
        id: String,
    },

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::ProviderTimeout | Self::Storage(_)
        )
    }

    /// Whether this is a rejected scan (as opposed to a lookup or system failure).
    #[must_use]
    pub const fn is_scan_rejection(&self) -> bool {
        matches!(
            self,
            Self::FullyRedeemed { .. }
                | Self::OverRedeem { .. }
                | Self::EventEnded { .. }
                | Self::WrongEvent { .. }
                | Self::PaymentIncomplete { .. }
                | Self::TerminalState { .. }
        )
    }
}

/// Failure reported by an external collaborator (rewards, points, notifications).
///
/// These never unwind a committed reservation or redemption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{collaborator}: {message}")]
pub struct CollaboratorError {
    /// Which collaborator failed
    pub collaborator: &'static str,
    /// What went wrong
    pub message: String,
}

impl CollaboratorError {
    /// Creates a collaborator error
    #[must_use]
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

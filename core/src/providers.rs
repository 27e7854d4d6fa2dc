//! External collaborators consumed by the ledger.
//!
//! Two groups:
//!
//! - **Authoritative sources** ([`PaymentProvider`], [`UserDirectory`],
//!   [`EventDirectory`]): their errors abort the operation.
//! - **Best-effort side effects** ([`RewardsGrantor`], [`PointsLedger`],
//!   [`IssuanceNotifier`], [`PurchaseTracker`], [`PrizeGrantor`]): called
//!   after commit; their [`CollaboratorError`]s are logged and swallowed.

use crate::error::{CollaboratorError, Result};
use crate::store::BoxFuture;
use crate::types::{
    EventId, EventInfo, ExternalPaymentId, Money, PurchaseRecord, RaffleWinner, RewardId, Ticket,
    TicketId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a best-effort side effect.
pub type SideEffectResult = std::result::Result<(), CollaboratorError>;

// ============================================================================
// Payment provider
// ============================================================================

/// Payment status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderPaymentStatus {
    /// Settled; the only status that issues tickets
    Approved,
    /// Awaiting payer action
    Pending,
    /// Under review
    InProcess,
    /// Declined
    Rejected,
    /// Cancelled by payer or timeout
    Cancelled,
    /// Refunded after approval
    Refunded,
    /// Disputed after approval
    ChargedBack,
    /// Anything the provider adds later
    Other(String),
}

impl ProviderPaymentStatus {
    /// Parse the provider's wire status.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "pending" => Self::Pending,
            "in_process" => Self::InProcess,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "charged_back" => Self::ChargedBack,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::InProcess => "in_process",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::ChargedBack => "charged_back",
            Self::Other(s) => s,
        }
    }

    /// Whether the payment is settled.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for ProviderPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative view of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPayment {
    /// Provider payment ID
    pub id: ExternalPaymentId,
    /// Current status
    pub status: ProviderPaymentStatus,
    /// Amount actually settled
    pub amount: Money,
    /// The envelope echoed back by the provider
    pub external_reference: Option<String>,
    /// Payer email, when the provider captured one
    pub payer_email: Option<String>,
}

/// Outgoing checkout preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRequest {
    /// Line item title shown to the payer
    pub title: String,
    /// Total to charge
    pub amount: Money,
    /// Encoded payment envelope
    pub external_reference: String,
}

/// Preference created by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    /// Provider preference ID
    pub id: String,
    /// URL the payer is redirected to
    pub checkout_url: String,
}

/// Payment provider API.
///
/// Implementations should fail fast; callers wrap every call in a timeout.
pub trait PaymentProvider: Send + Sync {
    /// Fetch the authoritative status of a payment.
    ///
    /// # Errors
    ///
    /// `LedgerError::Provider` on transport or API failures,
    /// `LedgerError::NotFound` if the provider does not know the payment.
    fn fetch_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<ProviderPayment>>;

    /// Create a checkout preference carrying the envelope.
    ///
    /// # Errors
    ///
    /// `LedgerError::Provider` on transport or API failures.
    fn create_preference<'a>(
        &'a self,
        request: &'a PreferenceRequest,
    ) -> BoxFuture<'a, Result<Preference>>;
}

// ============================================================================
// Directories
// ============================================================================

/// Narrow view of the user directory.
pub trait UserDirectory: Send + Sync {
    /// Resolve a user by email, creating one if none exists.
    fn resolve_or_create<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<UserId>>;
}

/// Narrow view of the event directory.
pub trait EventDirectory: Send + Sync {
    /// Load an event.
    fn get_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<EventInfo>>>;

    /// Events with a raffle scheduled at or before `now` that has not been drawn.
    fn events_due_for_raffle(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<EventInfo>>>;

    /// Record that the event's raffle ran.
    fn mark_raffle_drawn(&self, event_id: EventId) -> BoxFuture<'_, Result<()>>;
}

// ============================================================================
// Best-effort side effects
// ============================================================================

/// Grants the bonus reward linked to a tier.
pub trait RewardsGrantor: Send + Sync {
    /// Grant one unit of `reward_id` to `user_id` for `ticket_id`.
    fn grant_bonus(
        &self,
        user_id: UserId,
        reward_id: RewardId,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, SideEffectResult>;
}

/// Attendance / loyalty points.
pub trait PointsLedger: Send + Sync {
    /// Credit attendance points for the first scan of a ticket.
    fn credit_attendance(
        &self,
        user_id: UserId,
        event_id: EventId,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, SideEffectResult>;
}

/// Fired once per successfully issued ticket (email, push, ...).
pub trait IssuanceNotifier: Send + Sync {
    /// A ticket was issued.
    fn ticket_issued<'a>(&'a self, ticket: &'a Ticket) -> BoxFuture<'a, SideEffectResult>;
}

/// Analytics / marketing conversion tracking.
pub trait PurchaseTracker: Send + Sync {
    /// A payment produced a new record.
    fn purchase_completed<'a>(
        &'a self,
        record: &'a PurchaseRecord,
    ) -> BoxFuture<'a, SideEffectResult>;
}

/// Delivers raffle prizes.
pub trait PrizeGrantor: Send + Sync {
    /// Grant a prize to a raffle winner.
    fn grant_prize<'a>(
        &'a self,
        event_id: EventId,
        winner: &'a RaffleWinner,
    ) -> BoxFuture<'a, SideEffectResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert!(ProviderPaymentStatus::parse("approved").is_approved());
        assert_eq!(
            ProviderPaymentStatus::parse("in_process"),
            ProviderPaymentStatus::InProcess
        );
        let unknown = ProviderPaymentStatus::parse("authorized");
        assert_eq!(unknown.as_str(), "authorized");
        assert!(!unknown.is_approved());
    }
}

//! # Ticket Ledger Engine
//!
//! The services that keep the ledger consistent:
//!
//! - [`InventoryPool`]: reserve/release tier stock inside a transaction
//! - [`ReservationLedger`]: create, confirm, delete and query tickets
//! - [`RedemptionStateMachine`]: on-site check-in and manual voiding
//! - [`PaymentReconciler`]: apply provider payments exactly once
//! - [`ExpirationReaper`]: reclaim stock from unconfirmed reservations
//! - [`RaffleEligibilitySelector`]: draw raffle winners from the ledger
//!
//! Every dependency is a trait object handed over at construction; there
//! is no global state. [`Ledger::new`] wires all six services from one
//! [`LedgerEnvironment`].
//!
//! ## Example
//!
//! ```ignore
//! let ledger = Ledger::new(environment);
//! let issued = ledger.reservations.create_reservation(request).await?;
//! let receipt = ledger.redemptions.redeem(issued.ticket.id, 2, None).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use ticket_ledger_core::environment::Clock;
use ticket_ledger_core::providers::{
    EventDirectory, IssuanceNotifier, PaymentProvider, PointsLedger, PrizeGrantor,
    PurchaseTracker, RewardsGrantor, UserDirectory,
};
use ticket_ledger_core::store::{LedgerStore, LedgerTransaction};
use ticket_ledger_core::{LedgerError, Money};

pub mod inventory;
pub mod metrics;
pub mod raffle;
pub mod reaper;
pub mod reconciler;
pub mod redemption;
pub mod reservation;
pub mod retry;
pub mod scheduler;

pub use inventory::InventoryPool;
pub use raffle::RaffleEligibilitySelector;
pub use reaper::{ExpirationReaper, SweepReport};
pub use reconciler::{
    CheckoutOutcome, CheckoutRequest, CheckoutSession, PaymentReconciler, WebhookNotification,
    WebhookOutcome,
};
pub use redemption::RedemptionStateMachine;
pub use reservation::{Issuance, ReservationLedger, ReservationRequest};
pub use retry::RetryPolicy;

/// Tunable business policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Absolute tolerance when deciding whether a payment covers the total
    pub payment_tolerance: Money,
    /// Deadline for each call to the payment provider
    pub provider_timeout: std::time::Duration,
    /// Retries for transient provider failures
    pub provider_retry: RetryPolicy,
    /// Confirmation grace period for events that do not set their own
    pub default_confirmation_grace: chrono::Duration,
    /// Maximum tickets reclaimed per sweep transaction
    pub reclaim_batch_size: usize,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            payment_tolerance: Money::from_cents(100),
            provider_timeout: std::time::Duration::from_secs(5),
            provider_retry: RetryPolicy::default(),
            default_confirmation_grace: chrono::Duration::minutes(60),
            reclaim_batch_size: 500,
        }
    }
}

/// Everything the services depend on.
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Datastore of record
    pub store: Arc<dyn LedgerStore>,
    /// Event directory
    pub events: Arc<dyn EventDirectory>,
    /// User directory
    pub users: Arc<dyn UserDirectory>,
    /// Payment provider
    pub payments: Arc<dyn PaymentProvider>,
    /// Bonus reward grants
    pub rewards: Arc<dyn RewardsGrantor>,
    /// Attendance points
    pub points: Arc<dyn PointsLedger>,
    /// Issuance notifications
    pub notifier: Arc<dyn IssuanceNotifier>,
    /// Purchase analytics
    pub tracker: Arc<dyn PurchaseTracker>,
    /// Raffle prize delivery
    pub prizes: Arc<dyn PrizeGrantor>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Business policy
    pub policy: LedgerPolicy,
}

/// All six services wired from one environment.
#[derive(Clone)]
pub struct Ledger {
    /// Stock accounting
    pub inventory: InventoryPool,
    /// Ticket lifecycle
    pub reservations: ReservationLedger,
    /// Check-in
    pub redemptions: RedemptionStateMachine,
    /// Payments
    pub reconciler: PaymentReconciler,
    /// Reclamation
    pub reaper: ExpirationReaper,
    /// Raffles
    pub raffle: RaffleEligibilitySelector,
}

impl Ledger {
    /// Wire every service.
    #[must_use]
    pub fn new(env: LedgerEnvironment) -> Self {
        let inventory = InventoryPool::new(Arc::clone(&env.store));
        let reservations = ReservationLedger::new(
            Arc::clone(&env.store),
            inventory.clone(),
            Arc::clone(&env.users),
            Arc::clone(&env.rewards),
            Arc::clone(&env.notifier),
            Arc::clone(&env.clock),
            env.policy.clone(),
        );
        let redemptions = RedemptionStateMachine::new(
            Arc::clone(&env.store),
            inventory.clone(),
            Arc::clone(&env.events),
            Arc::clone(&env.points),
            Arc::clone(&env.clock),
        );
        let reconciler = PaymentReconciler::new(
            Arc::clone(&env.store),
            reservations.clone(),
            Arc::clone(&env.events),
            Arc::clone(&env.payments),
            Arc::clone(&env.tracker),
            Arc::clone(&env.clock),
            env.policy.clone(),
        );
        let reaper = ExpirationReaper::new(
            Arc::clone(&env.store),
            inventory.clone(),
            Arc::clone(&env.clock),
            env.policy.clone(),
        );
        let raffle = RaffleEligibilitySelector::new(
            Arc::clone(&env.store),
            Arc::clone(&env.events),
            Arc::clone(&env.prizes),
            Arc::clone(&env.clock),
        );

        Self {
            inventory,
            reservations,
            redemptions,
            reconciler,
            reaper,
            raffle,
        }
    }
}

/// Roll back `tx` and hand back `err`.
///
/// A failed rollback is logged; the original error is what the caller needs.
pub(crate) async fn abort<T>(tx: Box<dyn LedgerTransaction>, err: LedgerError) -> Result<T, LedgerError> {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(error = %rollback_err, "Rollback failed");
    }
    Err(err)
}

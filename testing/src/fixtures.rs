//! Builders for events, tiers and tickets, plus a fully wired [`TestHarness`].

#![allow(clippy::unwrap_used)] // Fixtures seed known-good data
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use ticket_ledger_core::envelope::PaymentEnvelope;
use ticket_ledger_core::{
    EventId, EventInfo, ExternalPaymentId, Money, PaymentMode, ProductId, ProductKind, Ticket,
    TicketId, TicketOrigin, TicketStatus, TicketTier, TierId, UserId,
};
use ticket_ledger_engine::{Ledger, LedgerEnvironment, LedgerPolicy, RetryPolicy};

use crate::clock::{ManualClock, test_epoch};
use crate::providers::{
    MockPaymentProvider, RecordingNotifier, RecordingPoints, RecordingPrizes, RecordingRewards,
    RecordingTracker,
};
use crate::store::InMemoryLedgerStore;

/// An event that started an hour before `now` and ends a day after it.
/// No confirmation request and no raffle.
#[must_use]
pub fn event_fixture(now: DateTime<Utc>) -> EventInfo {
    EventInfo {
        id: EventId::new(),
        name: "Friday Night".to_string(),
        starts_at: now - Duration::hours(1),
        ends_at: now + Duration::days(1),
        confirmation_requested_at: None,
        confirmation_grace_minutes: None,
        raffle_at: None,
        raffle_prizes: Vec::new(),
        raffle_drawn: false,
    }
}

/// A per-unit priced ticket tier. A price of zero makes it free.
#[must_use]
pub fn tier_fixture(event_id: EventId, capacity: i64, price_cents: u64) -> TicketTier {
    TicketTier {
        id: TierId::new(),
        event_id,
        name: "General Admission".to_string(),
        price: Money::from_cents(price_cents),
        is_free: price_cents == 0,
        remaining_quantity: capacity,
        kind: ProductKind::Ticket,
        partial_price: None,
        bonus_reward_id: None,
    }
}

/// A single-unit `VALID` ticket on `tier`, created at the test epoch.
#[must_use]
pub fn ticket_fixture(tier: &TicketTier, user_id: UserId, origin: TicketOrigin) -> Ticket {
    Ticket {
        id: TicketId::new(),
        user_id,
        purchased_by: None,
        tier_id: tier.id,
        event_id: tier.event_id,
        quantity: 1,
        redeemed_count: 0,
        status: TicketStatus::Valid,
        amount_paid: tier.price,
        payment_id: None,
        origin,
        special_instructions: None,
        created_at: test_epoch(),
        confirmed_at: None,
        validated_at: None,
    }
}

/// Policy for tests: no waiting between retries and a short provider deadline.
#[must_use]
pub fn test_policy() -> LedgerPolicy {
    LedgerPolicy {
        provider_timeout: std::time::Duration::from_millis(200),
        provider_retry: RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(std::time::Duration::from_millis(1))
            .max_delay(std::time::Duration::from_millis(5))
            .build(),
        ..LedgerPolicy::default()
    }
}

/// Every service wired against the in-memory store and recording mocks.
///
/// # Example
///
/// ```ignore
/// let harness = TestHarness::new();
/// let event = harness.seed_event().await;
/// let tier = harness.seed_tier(event.id, 10, 2_500).await;
/// ```
#[derive(Clone)]
pub struct TestHarness {
    /// Datastore, event directory and user directory
    pub store: Arc<InMemoryLedgerStore>,
    /// Payment provider
    pub payments: MockPaymentProvider,
    /// Bonus grants
    pub rewards: RecordingRewards,
    /// Attendance points
    pub points: RecordingPoints,
    /// Issuance notifications
    pub notifier: RecordingNotifier,
    /// Purchase analytics
    pub tracker: RecordingTracker,
    /// Prize grants
    pub prizes: RecordingPrizes,
    /// Time source, starting at the test epoch
    pub clock: ManualClock,
    /// The services under test
    pub ledger: Ledger,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Harness using [`test_policy`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(test_policy())
    }

    /// Harness with a custom policy.
    #[must_use]
    pub fn with_policy(policy: LedgerPolicy) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let payments = MockPaymentProvider::new();
        let rewards = RecordingRewards::new();
        let points = RecordingPoints::new();
        let notifier = RecordingNotifier::new();
        let tracker = RecordingTracker::new();
        let prizes = RecordingPrizes::new();
        let clock = ManualClock::new(test_epoch());

        let ledger = Ledger::new(LedgerEnvironment {
            store: store.clone(),
            events: store.clone(),
            users: store.clone(),
            payments: Arc::new(payments.clone()),
            rewards: Arc::new(rewards.clone()),
            points: Arc::new(points.clone()),
            notifier: Arc::new(notifier.clone()),
            tracker: Arc::new(tracker.clone()),
            prizes: Arc::new(prizes.clone()),
            clock: Arc::new(clock.clone()),
            policy,
        });

        Self {
            store,
            payments,
            rewards,
            points,
            notifier,
            tracker,
            prizes,
            clock,
            ledger,
        }
    }

    /// Current harness time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        use ticket_ledger_core::environment::Clock;
        self.clock.now()
    }

    /// Store an [`event_fixture`] around the current time.
    pub async fn seed_event(&self) -> EventInfo {
        let event = event_fixture(self.now());
        self.store.put_event(event.clone()).await;
        event
    }

    /// Store a [`tier_fixture`].
    pub async fn seed_tier(&self, event_id: EventId, capacity: i64, price_cents: u64) -> TicketTier {
        let tier = tier_fixture(event_id, capacity, price_cents);
        self.store.put_tier(tier.clone()).await;
        tier
    }

    /// Register an approved ticket payment on the mock provider.
    ///
    /// # Panics
    ///
    /// If the envelope cannot be encoded.
    #[allow(clippy::unwrap_used)] // Test helper
    pub fn approve_ticket_payment(
        &self,
        payment_id: &str,
        buyer: UserId,
        tier: &TicketTier,
        quantity: i64,
        amount: Money,
    ) -> ExternalPaymentId {
        let envelope =
            PaymentEnvelope::ticket(buyer, tier.event_id, tier.id, quantity, PaymentMode::Full)
                .encode()
                .unwrap();
        self.payments.approve(payment_id, &envelope, amount);
        ExternalPaymentId::new(payment_id)
    }

    /// Register an approved product payment on the mock provider.
    ///
    /// # Panics
    ///
    /// If the envelope cannot be encoded.
    #[allow(clippy::unwrap_used)] // Test helper
    pub fn approve_product_payment(
        &self,
        payment_id: &str,
        buyer: UserId,
        event_id: EventId,
        product_id: ProductId,
        quantity: i64,
        amount: Money,
    ) -> ExternalPaymentId {
        let envelope = PaymentEnvelope::product(buyer, event_id, product_id, quantity)
            .encode()
            .unwrap();
        self.payments.approve(payment_id, &envelope, amount);
        ExternalPaymentId::new(payment_id)
    }
}

//! Mock payment provider and recording collaborators.
//!
//! **WARNING**: Do NOT use in production. This is for testing only!

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_ledger_core::providers::{
    IssuanceNotifier, PaymentProvider, PointsLedger, Preference, PreferenceRequest, PrizeGrantor,
    ProviderPayment, ProviderPaymentStatus, PurchaseTracker, RewardsGrantor, SideEffectResult,
};
use ticket_ledger_core::store::BoxFuture;
use ticket_ledger_core::{
    CollaboratorError, EventId, ExternalPaymentId, LedgerError, Money, PurchaseRecord,
    RaffleWinner, Result, RewardId, Ticket, TicketId, UserId,
};

#[derive(Default)]
struct ProviderState {
    payments: HashMap<ExternalPaymentId, ProviderPayment>,
    preferences: Vec<PreferenceRequest>,
    failures_remaining: u32,
    delay: Option<Duration>,
}

/// Scriptable payment provider.
///
/// Unknown payments return `NotFound`. Failures and latency can be injected
/// to exercise the retry and timeout paths.
#[derive(Clone, Default)]
pub struct MockPaymentProvider {
    state: Arc<Mutex<ProviderState>>,
    fetches: Arc<AtomicU32>,
}

impl MockPaymentProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an approved payment echoing `envelope`.
    pub fn approve(&self, payment_id: &str, envelope: &str, amount: Money) {
        self.put(ProviderPayment {
            id: ExternalPaymentId::new(payment_id),
            status: ProviderPaymentStatus::Approved,
            amount,
            external_reference: Some(envelope.to_string()),
            payer_email: None,
        });
    }

    /// Register or replace a payment.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn put(&self, payment: ProviderPayment) {
        self.state
            .lock()
            .unwrap()
            .payments
            .insert(payment.id.clone(), payment);
    }

    /// Change the status of a registered payment.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set_status(&self, payment_id: &str, status: ProviderPaymentStatus) {
        if let Some(payment) = self
            .state
            .lock()
            .unwrap()
            .payments
            .get_mut(&ExternalPaymentId::new(payment_id))
        {
            payment.status = status;
        }
    }

    /// Change the settled amount of a registered payment.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set_amount(&self, payment_id: &str, amount: Money) {
        if let Some(payment) = self
            .state
            .lock()
            .unwrap()
            .payments
            .get_mut(&ExternalPaymentId::new(payment_id))
        {
            payment.amount = amount;
        }
    }

    /// Fail the next `count` calls with a transient provider error.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap().failures_remaining = count;
    }

    /// Delay every call by `delay`.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    /// Number of `fetch_payment` calls so far.
    #[must_use]
    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Preferences created so far.
    #[must_use]
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn preferences(&self) -> Vec<PreferenceRequest> {
        self.state.lock().unwrap().preferences.clone()
    }

    /// Take one injected failure and read the delay, without holding the lock across awaits.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn prepare_call(&self) -> (bool, Option<Duration>) {
        let mut state = self.state.lock().unwrap();
        let fail = state.failures_remaining > 0;
        if fail {
            state.failures_remaining -= 1;
        }
        (fail, state.delay)
    }
}

impl PaymentProvider for MockPaymentProvider {
    fn fetch_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<ProviderPayment>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let (fail, delay) = self.prepare_call();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(LedgerError::Provider("injected failure".to_string()));
            }

            #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
            let payment = self.state.lock().unwrap().payments.get(payment_id).cloned();
            payment.ok_or_else(|| LedgerError::not_found("payment", payment_id))
        })
    }

    fn create_preference<'a>(
        &'a self,
        request: &'a PreferenceRequest,
    ) -> BoxFuture<'a, Result<Preference>> {
        Box::pin(async move {
            let (fail, delay) = self.prepare_call();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(LedgerError::Provider("injected failure".to_string()));
            }

            #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
            let number = {
                let mut state = self.state.lock().unwrap();
                state.preferences.push(request.clone());
                state.preferences.len()
            };
            Ok(Preference {
                id: format!("pref-{number}"),
                checkout_url: format!("https://pay.test/checkout/pref-{number}"),
            })
        })
    }
}

/// Shared "fail every call" switch for recording collaborators.
#[derive(Clone, Default)]
struct Failing(Arc<AtomicBool>);

impl Failing {
    fn set(&self, failing: bool) {
        self.0.store(failing, Ordering::SeqCst);
    }

    fn check(&self, collaborator: &'static str) -> SideEffectResult {
        if self.0.load(Ordering::SeqCst) {
            Err(CollaboratorError::new(collaborator, "injected failure"))
        } else {
            Ok(())
        }
    }
}

macro_rules! recording_collaborator {
    ($(#[$meta:meta])* $name:ident, $item:ty) => {
        $(#[$meta])*
        #[derive(Clone, Default)]
        pub struct $name {
            calls: Arc<Mutex<Vec<$item>>>,
            failing: Failing,
        }

        impl $name {
            /// Create a recorder that accepts every call.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Make every subsequent call fail (calls are still recorded).
            pub fn set_failing(&self, failing: bool) {
                self.failing.set(failing);
            }

            /// Calls received so far.
            #[must_use]
            #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
            pub fn calls(&self) -> Vec<$item> {
                self.calls.lock().unwrap().clone()
            }

            #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
            fn record(&self, item: $item) {
                self.calls.lock().unwrap().push(item);
            }
        }
    };
}

recording_collaborator!(
    /// Records bonus grants as `(user, reward, ticket)`.
    RecordingRewards,
    (UserId, RewardId, TicketId)
);
recording_collaborator!(
    /// Records attendance credits as `(user, event, ticket)`.
    RecordingPoints,
    (UserId, EventId, TicketId)
);
recording_collaborator!(
    /// Records issued tickets.
    RecordingNotifier,
    Ticket
);
recording_collaborator!(
    /// Records completed purchases.
    RecordingTracker,
    PurchaseRecord
);
recording_collaborator!(
    /// Records prize grants as `(event, winner)`.
    RecordingPrizes,
    (EventId, RaffleWinner)
);

impl RewardsGrantor for RecordingRewards {
    fn grant_bonus(
        &self,
        user_id: UserId,
        reward_id: RewardId,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, SideEffectResult> {
        Box::pin(async move {
            self.record((user_id, reward_id, ticket_id));
            self.failing.check("rewards")
        })
    }
}

impl PointsLedger for RecordingPoints {
    fn credit_attendance(
        &self,
        user_id: UserId,
        event_id: EventId,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, SideEffectResult> {
        Box::pin(async move {
            self.record((user_id, event_id, ticket_id));
            self.failing.check("points")
        })
    }
}

impl IssuanceNotifier for RecordingNotifier {
    fn ticket_issued<'a>(&'a self, ticket: &'a Ticket) -> BoxFuture<'a, SideEffectResult> {
        Box::pin(async move {
            self.record(ticket.clone());
            self.failing.check("notifier")
        })
    }
}

impl PurchaseTracker for RecordingTracker {
    fn purchase_completed<'a>(
        &'a self,
        record: &'a PurchaseRecord,
    ) -> BoxFuture<'a, SideEffectResult> {
        Box::pin(async move {
            self.record(record.clone());
            self.failing.check("tracker")
        })
    }
}

impl PrizeGrantor for RecordingPrizes {
    fn grant_prize<'a>(
        &'a self,
        event_id: EventId,
        winner: &'a RaffleWinner,
    ) -> BoxFuture<'a, SideEffectResult> {
        Box::pin(async move {
            self.record((event_id, winner.clone()));
            self.failing.check("prizes")
        })
    }
}

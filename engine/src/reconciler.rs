//! Payment reconciliation.
//!
//! Provider notifications arrive at least once; this service applies each
//! payment ID at most once. The unique constraint on `payment_id` is the
//! serialization point between a webhook and a concurrent client-driven
//! `finalize`: the losing writer's insert fails, it rolls back and returns
//! the winner's record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ticket_ledger_core::envelope::PaymentEnvelope;
use ticket_ledger_core::environment::Clock;
use ticket_ledger_core::pricing::{checkout_amount, validate_quantity};
use ticket_ledger_core::providers::{
    EventDirectory, PaymentProvider, PreferenceRequest, ProviderPayment, PurchaseTracker,
};
use ticket_ledger_core::store::LedgerStore;
use ticket_ledger_core::{
    EventId, ExternalPaymentId, LedgerError, Money, PaymentMode, ProductId, ProductPurchase,
    PurchaseId, PurchaseKind, PurchaseRecord, PurchaseResult, Result, Ticket, TicketOrigin,
    TierId, UserId,
};

use crate::inventory::InventoryPool;
use crate::reservation::{ReservationLedger, ReservationRequest};
use crate::retry::retry_transient;
use crate::{LedgerPolicy, abort, metrics};

/// Provider webhook body: `{ "type": "payment", "data": { "id": ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookNotification {
    /// Notification topic
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload
    pub data: WebhookData,
}

/// Webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookData {
    /// Payment ID (some providers send it as a number)
    #[serde(deserialize_with = "ticket_ledger_core::wire::string_or_number")]
    pub id: String,
}

impl WebhookNotification {
    /// A payment notification for `payment_id`.
    #[must_use]
    pub fn payment(payment_id: impl Into<String>) -> Self {
        Self {
            kind: "payment".to_string(),
            data: WebhookData {
                id: payment_id.into(),
            },
        }
    }
}

/// What a webhook delivery did. Never surfaced to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Topic other than `payment`
    Ignored,
    /// Payment applied (or replayed)
    Applied(PurchaseResult),
    /// Processing failed; the provider's redelivery will try again
    Failed(LedgerError),
}

/// Buyer's request to start a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Buyer
    pub buyer_id: UserId,
    /// Event
    pub event_id: EventId,
    /// Tier
    pub tier_id: TierId,
    /// Head-count as received
    pub quantity: i64,
    /// Full or deposit
    #[serde(default = "full_mode")]
    pub mode: PaymentMode,
}

const fn full_mode() -> PaymentMode {
    PaymentMode::Full
}

/// A created provider checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider preference ID
    pub preference_id: String,
    /// Where to send the buyer
    pub checkout_url: String,
    /// Amount charged
    pub amount: Money,
    /// Encoded envelope attached to the preference
    pub envelope: String,
}

/// Result of [`PaymentReconciler::begin_checkout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// Paid tier: the buyer must complete payment with the provider
    PaymentRequired(CheckoutSession),
    /// Free tier: the ticket was issued immediately
    Issued(Ticket),
}

/// Applies provider payments to the ledger.
#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn LedgerStore>,
    reservations: ReservationLedger,
    events: Arc<dyn EventDirectory>,
    payments: Arc<dyn PaymentProvider>,
    tracker: Arc<dyn PurchaseTracker>,
    clock: Arc<dyn Clock>,
    policy: LedgerPolicy,
}

impl PaymentReconciler {
    /// Create the reconciler.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        reservations: ReservationLedger,
        events: Arc<dyn EventDirectory>,
        payments: Arc<dyn PaymentProvider>,
        tracker: Arc<dyn PurchaseTracker>,
        clock: Arc<dyn Clock>,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            store,
            reservations,
            events,
            payments,
            tracker,
            clock,
            policy,
        }
    }

    /// Apply an approved provider payment exactly once.
    ///
    /// The amount comes from the provider, never from the caller. When
    /// `requester` is given it must be the buyer recorded in the envelope.
    /// Replays return the existing record with `replayed = true`; a replay
    /// that reports more money on a partially paid ticket tops it up.
    ///
    /// # Errors
    ///
    /// `NotApproved`, `InvalidEnvelope`, `ProviderTimeout`/`Provider`,
    /// `NotFound` (unknown payment or requester mismatch), and every
    /// reservation error (`InsufficientStock`, `TierEventMismatch`, ...).
    #[tracing::instrument(skip(self, payment_id), fields(payment_id = %payment_id))]
    pub async fn finalize(
        &self,
        payment_id: &ExternalPaymentId,
        requester: Option<UserId>,
    ) -> Result<PurchaseResult> {
        let payment = self.fetch_authoritative(payment_id).await?;
        if !payment.status.is_approved() {
            metrics::record_payment("not_approved");
            tracing::warn!(status = %payment.status, "Payment not approved");
            return Err(LedgerError::NotApproved {
                payment_id: payment_id.clone(),
                status: payment.status.to_string(),
            });
        }

        let raw = payment.external_reference.as_deref().ok_or_else(|| {
            LedgerError::InvalidEnvelope("payment carries no external reference".to_string())
        })?;
        let envelope = PaymentEnvelope::decode(raw)?;
        if requester.is_some_and(|user| user != envelope.buyer_id) {
            return Err(LedgerError::not_found("payment", payment_id));
        }

        let result = match envelope.kind {
            PurchaseKind::Ticket => self.apply_ticket(&payment, &envelope).await,
            PurchaseKind::Product => self.apply_product(&payment, &envelope).await,
        };
        if result.is_err() {
            metrics::record_payment("failed");
        }
        let result = result?;

        if !result.replayed {
            if let Err(err) = self.tracker.purchase_completed(&result.record).await {
                tracing::warn!(error = %err, "Purchase tracking failed");
            }
        }
        Ok(result)
    }

    /// Handle an unauthenticated provider callback.
    ///
    /// Never fails: the transport layer always acknowledges, and the
    /// provider's redelivery covers anything that went wrong here.
    #[tracing::instrument(skip(self, notification), fields(kind = %notification.kind, payment_id = %notification.data.id))]
    pub async fn handle_webhook(&self, notification: &WebhookNotification) -> WebhookOutcome {
        if notification.kind != "payment" {
            tracing::debug!("Ignoring non-payment notification");
            return WebhookOutcome::Ignored;
        }

        let payment_id = ExternalPaymentId::new(notification.data.id.clone());
        match self.finalize(&payment_id, None).await {
            Ok(result) => WebhookOutcome::Applied(result),
            Err(err @ LedgerError::NotApproved { .. }) => {
                tracing::info!(error = %err, "Webhook for unapproved payment");
                WebhookOutcome::Failed(err)
            }
            Err(err) => {
                tracing::error!(error = %err, "Webhook processing failed");
                WebhookOutcome::Failed(err)
            }
        }
    }

    /// Start a purchase: create a provider preference carrying the envelope,
    /// or issue directly for free tiers.
    ///
    /// Stock is only pre-checked here; it is reserved when the payment lands.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity`, `NotFound` (tier or event), `TierEventMismatch`,
    /// `EventNotUpcoming`, `InsufficientStock`, provider failures.
    #[tracing::instrument(skip(self))]
    pub async fn begin_checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome> {
        let quantity = validate_quantity(request.quantity)?;
        let tier = self
            .store
            .get_tier(request.tier_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("tier", request.tier_id))?;
        if tier.event_id != request.event_id {
            return Err(LedgerError::TierEventMismatch {
                tier_id: tier.id,
                event_id: request.event_id,
            });
        }
        let event = self
            .events
            .get_event(request.event_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("event", request.event_id))?;
        if event.has_ended(self.clock.now()) {
            return Err(LedgerError::EventNotUpcoming { event_id: event.id });
        }

        if tier.is_free {
            let issuance = self
                .reservations
                .create_reservation(ReservationRequest::new(
                    request.buyer_id,
                    tier.id,
                    event.id,
                    request.quantity,
                    TicketOrigin::Purchase,
                ))
                .await?;
            return Ok(CheckoutOutcome::Issued(issuance.ticket));
        }

        InventoryPool::check_available(&tier, quantity)?;
        let amount = checkout_amount(&tier, quantity, request.mode)?;
        let envelope = PaymentEnvelope::ticket(
            request.buyer_id,
            event.id,
            tier.id,
            i64::from(quantity),
            request.mode,
        )
        .encode()?;
        let preference_request = PreferenceRequest {
            title: format!("{} - {} x{}", event.name, tier.name, quantity),
            amount,
            external_reference: envelope.clone(),
        };

        let timeout = self.policy.provider_timeout;
        let preference = match tokio::time::timeout(
            timeout,
            self.payments.create_preference(&preference_request),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(LedgerError::ProviderTimeout),
        };

        tracing::info!(preference_id = %preference.id, %amount, "Checkout started");
        Ok(CheckoutOutcome::PaymentRequired(CheckoutSession {
            preference_id: preference.id,
            checkout_url: preference.checkout_url,
            amount,
            envelope,
        }))
    }

    async fn fetch_authoritative(&self, payment_id: &ExternalPaymentId) -> Result<ProviderPayment> {
        let payments = &self.payments;
        let timeout = self.policy.provider_timeout;

        retry_transient(&self.policy.provider_retry, move || async move {
            match tokio::time::timeout(timeout, payments.fetch_payment(payment_id)).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::ProviderTimeout),
            }
        })
        .await
    }

    async fn apply_ticket(
        &self,
        payment: &ProviderPayment,
        envelope: &PaymentEnvelope,
    ) -> Result<PurchaseResult> {
        let tier_id = envelope.tier_id.ok_or_else(|| {
            LedgerError::InvalidEnvelope("ticket envelope without tierId".to_string())
        })?;

        if let Some(existing) = self.reservations.ticket_by_payment(&payment.id).await? {
            let (ticket, topped_up) = self
                .reservations
                .apply_settled_amount(existing.id, payment.amount)
                .await?;
            metrics::record_payment(if topped_up { "topped_up" } else { "replayed" });
            return Ok(PurchaseResult {
                record: PurchaseRecord::Ticket(ticket),
                replayed: true,
            });
        }

        let request = ReservationRequest::new(
            envelope.buyer_id,
            tier_id,
            envelope.event_id,
            envelope.quantity,
            TicketOrigin::Purchase,
        )
        .paid(payment.id.clone(), payment.amount)
        .purchased_by(envelope.buyer_id);
        let issuance = self.reservations.create_reservation(request).await?;

        metrics::record_payment(if issuance.replayed { "replayed" } else { "issued" });
        Ok(PurchaseResult {
            record: PurchaseRecord::Ticket(issuance.ticket),
            replayed: issuance.replayed,
        })
    }

    async fn apply_product(
        &self,
        payment: &ProviderPayment,
        envelope: &PaymentEnvelope,
    ) -> Result<PurchaseResult> {
        let product_id: ProductId = envelope.product_id.ok_or_else(|| {
            LedgerError::InvalidEnvelope("product envelope without productId".to_string())
        })?;

        if let Some(existing) = self.store.product_purchase_by_payment(&payment.id).await? {
            metrics::record_payment("replayed");
            return Ok(PurchaseResult {
                record: PurchaseRecord::Product(existing),
                replayed: true,
            });
        }

        let purchase = ProductPurchase {
            id: PurchaseId::new(),
            buyer_id: envelope.buyer_id,
            event_id: envelope.event_id,
            product_id,
            quantity: validate_quantity(envelope.quantity)?,
            amount_paid: payment.amount,
            payment_id: payment.id.clone(),
            created_at: self.clock.now(),
        };

        let mut tx = self.store.begin().await?;
        let inserted = tx.insert_product_purchase(&purchase).await;
        match inserted {
            Ok(()) => {}
            Err(LedgerError::AlreadyProcessed { payment_id }) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                let existing = self
                    .store
                    .product_purchase_by_payment(&payment_id)
                    .await?
                    .ok_or(LedgerError::AlreadyProcessed { payment_id })?;
                metrics::record_payment("replayed");
                return Ok(PurchaseResult {
                    record: PurchaseRecord::Product(existing),
                    replayed: true,
                });
            }
            Err(err) => return abort(tx, err).await,
        }
        tx.commit().await?;

        metrics::record_payment("issued");
        tracing::info!(purchase_id = %purchase.id, %product_id, "Product purchase recorded");
        Ok(PurchaseResult {
            record: PurchaseRecord::Product(purchase),
            replayed: false,
        })
    }
}

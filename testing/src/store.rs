//! In-memory ledger store.
//!
//! Same contract as the Postgres store: one transaction at a time holds the
//! writer lock, changes are staged on a private copy and published on commit,
//! and dropping a transaction discards it. The unique payment ID constraint
//! and the conditional stock decrement are enforced the same way.
//!
//! **WARNING**: Do NOT use in production. This is for testing only!

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use ticket_ledger_core::providers::{EventDirectory, UserDirectory};
use ticket_ledger_core::store::{BoxFuture, LedgerStore, LedgerTransaction, StockUpdate};
use ticket_ledger_core::{
    EventId, EventInfo, ExternalPaymentId, LedgerError, ProductPurchase, PurchaseId, Result,
    Ticket, TicketId, TicketStatus, TicketTier, TierId, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    tiers: HashMap<TierId, TicketTier>,
    tickets: HashMap<TicketId, Ticket>,
    products: HashMap<PurchaseId, ProductPurchase>,
    events: HashMap<EventId, EventInfo>,
    users: HashMap<String, UserId>,
}

impl LedgerState {
    fn payment_taken(&self, payment_id: &ExternalPaymentId) -> bool {
        self.tickets
            .values()
            .any(|t| t.payment_id.as_ref() == Some(payment_id))
    }
}

/// Mutex-guarded in-memory implementation of every store-side trait
/// ([`LedgerStore`], [`EventDirectory`], [`UserDirectory`]).
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a tier.
    pub async fn put_tier(&self, tier: TicketTier) {
        self.state.lock().await.tiers.insert(tier.id, tier);
    }

    /// Seed or overwrite an event.
    pub async fn put_event(&self, event: EventInfo) {
        self.state.lock().await.events.insert(event.id, event);
    }

    /// Seed a ticket directly, bypassing stock accounting.
    pub async fn put_ticket(&self, ticket: Ticket) {
        self.state.lock().await.tickets.insert(ticket.id, ticket);
    }

    /// Current state of a tier.
    pub async fn tier(&self, tier_id: TierId) -> Option<TicketTier> {
        self.state.lock().await.tiers.get(&tier_id).cloned()
    }

    /// Current state of an event.
    pub async fn event(&self, event_id: EventId) -> Option<EventInfo> {
        self.state.lock().await.events.get(&event_id).cloned()
    }

    /// Every ticket in the store.
    pub async fn all_tickets(&self) -> Vec<Ticket> {
        self.state.lock().await.tickets.values().cloned().collect()
    }

    /// Tickets carrying `payment_id` (the unique constraint keeps this at most one).
    pub async fn tickets_with_payment(&self, payment_id: &ExternalPaymentId) -> Vec<Ticket> {
        self.state
            .lock()
            .await
            .tickets
            .values()
            .filter(|t| t.payment_id.as_ref() == Some(payment_id))
            .cloned()
            .collect()
    }

    /// Every product purchase in the store.
    pub async fn all_product_purchases(&self) -> Vec<ProductPurchase> {
        self.state.lock().await.products.values().cloned().collect()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn LedgerTransaction>>> {
        Box::pin(async move {
            let guard = Arc::clone(&self.state).lock_owned().await;
            let staged = LedgerState::clone(&guard);
            Ok(Box::new(InMemoryTransaction { guard, staged }) as Box<dyn LedgerTransaction>)
        })
    }

    fn get_tier(&self, tier_id: TierId) -> BoxFuture<'_, Result<Option<TicketTier>>> {
        Box::pin(async move { Ok(self.tier(tier_id).await) })
    }

    fn get_ticket(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<Ticket>>> {
        Box::pin(async move { Ok(self.state.lock().await.tickets.get(&ticket_id).cloned()) })
    }

    fn tickets_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let mut tickets: Vec<Ticket> = state
                .tickets
                .values()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect();
            tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(tickets)
        })
    }

    fn ticket_by_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<Option<Ticket>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .tickets
                .values()
                .find(|t| t.payment_id.as_ref() == Some(payment_id))
                .cloned())
        })
    }

    fn product_purchase_by_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<Option<ProductPurchase>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .products
                .values()
                .find(|p| &p.payment_id == payment_id)
                .cloned())
        })
    }

    fn tickets_created_before(
        &self,
        event_id: EventId,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .tickets
                .values()
                .filter(|t| t.event_id == event_id && t.created_at < cutoff)
                .cloned()
                .collect())
        })
    }

    fn tickets_validated_since(
        &self,
        event_id: EventId,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let mut tickets: Vec<Ticket> = state
                .tickets
                .values()
                .filter(|t| t.event_id == event_id && t.validated_at.is_some_and(|at| at >= since))
                .cloned()
                .collect();
            tickets.sort_by(|a, b| b.validated_at.cmp(&a.validated_at));
            Ok(tickets)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl EventDirectory for InMemoryLedgerStore {
    fn get_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<EventInfo>>> {
        Box::pin(async move { Ok(self.event(event_id).await) })
    }

    fn events_due_for_raffle(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<EventInfo>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .events
                .values()
                .filter(|e| !e.raffle_drawn && e.raffle_at.is_some_and(|at| at <= now))
                .cloned()
                .collect())
        })
    }

    fn mark_raffle_drawn(&self, event_id: EventId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let event = state
                .events
                .get_mut(&event_id)
                .ok_or_else(|| LedgerError::not_found("event", event_id))?;
            event.raffle_drawn = true;
            Ok(())
        })
    }
}

impl UserDirectory for InMemoryLedgerStore {
    fn resolve_or_create<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<UserId>> {
        Box::pin(async move {
            let key = email.trim().to_lowercase();
            let mut state = self.state.lock().await;
            Ok(*state
                .users
                .entry(key)
                .or_insert_with(|| UserId::from_uuid(Uuid::new_v4())))
        })
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
}

impl LedgerTransaction for InMemoryTransaction {
    fn decrement_stock(
        &mut self,
        tier_id: TierId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<StockUpdate>> {
        Box::pin(async move {
            let tier = self
                .staged
                .tiers
                .get_mut(&tier_id)
                .ok_or_else(|| LedgerError::not_found("tier", tier_id))?;
            let wanted = i64::from(quantity);
            if tier.remaining_quantity >= wanted {
                tier.remaining_quantity -= wanted;
                Ok(StockUpdate::Applied {
                    remaining: tier.remaining_quantity,
                })
            } else {
                Ok(StockUpdate::Insufficient {
                    remaining: tier.remaining_quantity,
                })
            }
        })
    }

    fn increment_stock(&mut self, tier_id: TierId, quantity: u32) -> BoxFuture<'_, Result<i64>> {
        Box::pin(async move {
            let tier = self
                .staged
                .tiers
                .get_mut(&tier_id)
                .ok_or_else(|| LedgerError::not_found("tier", tier_id))?;
            tier.remaining_quantity += i64::from(quantity);
            Ok(tier.remaining_quantity)
        })
    }

    fn insert_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Some(payment_id) = &ticket.payment_id {
                if self.staged.payment_taken(payment_id) {
                    return Err(LedgerError::AlreadyProcessed {
                        payment_id: payment_id.clone(),
                    });
                }
            }
            if self.staged.tickets.contains_key(&ticket.id) {
                return Err(LedgerError::Storage(format!("duplicate ticket id {}", ticket.id)));
            }
            self.staged.tickets.insert(ticket.id, ticket.clone());
            Ok(())
        })
    }

    fn lock_ticket(&mut self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<Ticket>>> {
        Box::pin(async move { Ok(self.staged.tickets.get(&ticket_id).cloned()) })
    }

    fn update_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self.staged.tickets.get_mut(&ticket.id) {
                Some(stored) => {
                    *stored = ticket.clone();
                    Ok(())
                }
                None => Err(LedgerError::not_found("ticket", ticket.id)),
            }
        })
    }

    fn delete_ticket(&mut self, ticket_id: TicketId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.staged.tickets.remove(&ticket_id).is_some()) })
    }

    fn lock_reclaimable(
        &mut self,
        now: DateTime<Utc>,
        default_grace: Duration,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let staged = &self.staged;
            let mut due: Vec<Ticket> = staged
                .tickets
                .values()
                .filter(|t| {
                    t.status == TicketStatus::Valid
                        && t.confirmed_at.is_none()
                        && !t.origin.is_inventory_exempt()
                })
                .filter(|t| {
                    staged
                        .events
                        .get(&t.event_id)
                        .and_then(|e| e.confirmation_deadline(t.created_at, default_grace))
                        .is_some_and(|deadline| deadline <= now)
                })
                .cloned()
                .collect();
            due.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            due.truncate(limit);
            Ok(due)
        })
    }

    fn insert_product_purchase<'a>(
        &'a mut self,
        purchase: &'a ProductPurchase,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self
                .staged
                .products
                .values()
                .any(|p| p.payment_id == purchase.payment_id)
            {
                return Err(LedgerError::AlreadyProcessed {
                    payment_id: purchase.payment_id.clone(),
                });
            }
            self.staged.products.insert(purchase.id, purchase.clone());
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            let Self { mut guard, staged } = *self;
            *guard = staged;
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            drop(self);
            Ok(())
        })
    }
}

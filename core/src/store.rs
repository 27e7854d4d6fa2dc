//! Repository traits for the ledger's datastore.
//!
//! All mutation of shared state (a tier's remaining stock, a ticket's
//! `redeemed_count`/status) goes through a [`LedgerTransaction`], so the
//! mutation and its cause (the new ticket row, the redemption) commit or
//! roll back together.
//!
//! # Implementations
//!
//! - `PostgresLedgerStore` (in `ticket-ledger-postgres`): conditional
//!   `UPDATE ... WHERE remaining_quantity >= $n`, `SELECT ... FOR UPDATE`,
//!   unique constraint on `payment_id`.
//! - `InMemoryLedgerStore` (in `ticket-ledger-testing`): one writer at a time
//!   behind an async mutex, staged changes applied on commit.
//!
//! # Dyn Compatibility
//!
//! These traits use explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so services can hold them as `Arc<dyn LedgerStore>`.

use crate::error::Result;
use crate::types::{
    EventId, ExternalPaymentId, ProductPurchase, Ticket, TicketId, TicketTier, TierId, UserId,
};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future used by every dyn-compatible trait in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    /// Stock was taken; `remaining` is the new counter value
    Applied {
        /// Remaining after the decrement
        remaining: i64,
    },
    /// Not enough stock; nothing changed
    Insufficient {
        /// Remaining at the time of the attempt
        remaining: i64,
    },
}

/// Read side of the ledger plus the entry point for transactions.
///
/// Reads run at the database's default isolation and take no locks.
pub trait LedgerStore: Send + Sync {
    /// Open a transaction. Dropping it without [`LedgerTransaction::commit`]
    /// discards every change made through it.
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn LedgerTransaction>>>;

    /// Load a tier by ID.
    fn get_tier(&self, tier_id: TierId) -> BoxFuture<'_, Result<Option<TicketTier>>>;

    /// Load a ticket by ID.
    fn get_ticket(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<Ticket>>>;

    /// Tickets held by a user, newest first.
    fn tickets_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Ticket>>>;

    /// The ticket produced by a provider payment, if any.
    fn ticket_by_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<Option<Ticket>>>;

    /// The product purchase produced by a provider payment, if any.
    fn product_purchase_by_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<Option<ProductPurchase>>>;

    /// Tickets for an event created strictly before `cutoff`.
    fn tickets_created_before(
        &self,
        event_id: EventId,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>>;

    /// Tickets for an event scanned at or after `since`, most recent scan first.
    fn tickets_validated_since(
        &self,
        event_id: EventId,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>>;

    /// Cheap liveness probe.
    fn ping(&self) -> BoxFuture<'_, Result<()>>;
}

/// A unit of work against the ledger.
///
/// Do not issue [`LedgerStore`] reads while holding one: some backends
/// serialize writers and the read would wait on the open transaction.
pub trait LedgerTransaction: Send {
    /// Take `quantity` units from the tier iff at least that many remain.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`](crate::error::LedgerError::NotFound) if the
    /// tier does not exist.
    fn decrement_stock(&mut self, tier_id: TierId, quantity: u32)
    -> BoxFuture<'_, Result<StockUpdate>>;

    /// Return `quantity` units to the tier.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`](crate::error::LedgerError::NotFound) if the
    /// tier does not exist.
    fn increment_stock(&mut self, tier_id: TierId, quantity: u32) -> BoxFuture<'_, Result<i64>>;

    /// Insert a new ticket.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AlreadyProcessed`](crate::error::LedgerError::AlreadyProcessed)
    /// if another ticket already carries the same payment ID. The
    /// transaction must then be rolled back.
    fn insert_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, Result<()>>;

    /// Load a ticket and hold its row lock until the transaction ends.
    fn lock_ticket(&mut self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<Ticket>>>;

    /// Persist every mutable column of a ticket previously locked in this transaction.
    fn update_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, Result<()>>;

    /// Remove a ticket. Returns whether a row was deleted.
    fn delete_ticket(&mut self, ticket_id: TicketId) -> BoxFuture<'_, Result<bool>>;

    /// Lock up to `limit` reclaimable tickets: `VALID`, not confirmed, not
    /// inventory-exempt, on an event that requested confirmation with its
    /// grace period (or `default_grace`) elapsed at `now`.
    ///
    /// Rows already locked by a concurrent sweep are skipped.
    fn lock_reclaimable(
        &mut self,
        now: DateTime<Utc>,
        default_grace: Duration,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>>;

    /// Insert an ancillary product purchase.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AlreadyProcessed`](crate::error::LedgerError::AlreadyProcessed)
    /// on a duplicate payment ID.
    fn insert_product_purchase<'a>(
        &'a mut self,
        purchase: &'a ProductPurchase,
    ) -> BoxFuture<'a, Result<()>>;

    /// Make every change visible atomically.
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>>;

    /// Discard every change.
    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

//! Tier stock accounting.
//!
//! Stock only moves inside a [`LedgerTransaction`] that also persists the
//! reason it moved (a new ticket, a deletion, a reclamation), so the counter
//! and the ticket rows can never disagree after a crash.

use std::sync::Arc;
use ticket_ledger_core::store::{LedgerStore, LedgerTransaction, StockUpdate};
use ticket_ledger_core::{LedgerError, Result, Ticket, TicketOrigin, TicketTier, TierId};

use crate::metrics;

/// Capacity-bounded pool of tier slots.
#[derive(Clone)]
pub struct InventoryPool {
    store: Arc<dyn LedgerStore>,
}

impl InventoryPool {
    /// Create a pool over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Take `quantity` units for a ticket of the given origin.
    ///
    /// Exempt origins never touch the counter.
    ///
    /// # Errors
    ///
    /// `InsufficientStock` when fewer than `quantity` units remain,
    /// `NotFound` when the tier does not exist.
    #[tracing::instrument(skip(self, tx))]
    pub async fn reserve(
        &self,
        tx: &mut dyn LedgerTransaction,
        tier_id: TierId,
        quantity: u32,
        origin: TicketOrigin,
    ) -> Result<()> {
        if origin.is_inventory_exempt() {
            tracing::debug!(%origin, "Origin exempt from stock accounting");
            return Ok(());
        }

        match tx.decrement_stock(tier_id, quantity).await? {
            StockUpdate::Applied { remaining } => {
                tracing::debug!(quantity, remaining, "Stock reserved");
                Ok(())
            }
            StockUpdate::Insufficient { remaining } => {
                metrics::record_stock_rejection();
                tracing::info!(quantity, remaining, "Reservation refused: sold out");
                Err(LedgerError::InsufficientStock {
                    tier_id,
                    requested: quantity,
                    remaining,
                })
            }
        }
    }

    /// Give `quantity` units back to a tier.
    ///
    /// Callers guarantee it runs once per consumed reservation; prefer
    /// [`InventoryPool::release_ticket`] which checks that for them.
    ///
    /// # Errors
    ///
    /// `NotFound` when the tier does not exist.
    pub async fn release(
        &self,
        tx: &mut dyn LedgerTransaction,
        tier_id: TierId,
        quantity: u32,
    ) -> Result<i64> {
        let remaining = tx.increment_stock(tier_id, quantity).await?;
        tracing::debug!(%tier_id, quantity, remaining, "Stock released");
        Ok(remaining)
    }

    /// Release the stock a ticket holds, if it holds any.
    ///
    /// The ticket must be locked in `tx`, and the caller must invalidate or
    /// delete it in the same transaction. Returns whether stock moved.
    ///
    /// # Errors
    ///
    /// `NotFound` when the tier does not exist.
    pub async fn release_ticket(
        &self,
        tx: &mut dyn LedgerTransaction,
        ticket: &Ticket,
    ) -> Result<bool> {
        if !ticket.holds_stock() {
            return Ok(false);
        }
        self.release(tx, ticket.tier_id, ticket.quantity).await?;
        Ok(true)
    }

    /// Current remaining stock of a tier.
    ///
    /// # Errors
    ///
    /// `NotFound` when the tier does not exist.
    pub async fn remaining(&self, tier_id: TierId) -> Result<i64> {
        self.store
            .get_tier(tier_id)
            .await?
            .map(|tier| tier.remaining_quantity)
            .ok_or_else(|| LedgerError::not_found("tier", tier_id))
    }

    /// Unlocked availability check used before sending a buyer to checkout.
    ///
    /// Advisory only: the authoritative check is [`InventoryPool::reserve`].
    ///
    /// # Errors
    ///
    /// `InsufficientStock` when the tier cannot cover `quantity`.
    pub fn check_available(tier: &TicketTier, quantity: u32) -> Result<()> {
        if tier.remaining_quantity >= i64::from(quantity) {
            Ok(())
        } else {
            Err(LedgerError::InsufficientStock {
                tier_id: tier.id,
                requested: quantity,
                remaining: tier.remaining_quantity,
            })
        }
    }
}

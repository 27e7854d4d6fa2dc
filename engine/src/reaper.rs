//! Reclamation of unconfirmed reservations.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ticket_ledger_core::environment::Clock;
use ticket_ledger_core::store::{BoxFuture, LedgerStore};
use ticket_ledger_core::{Result, TicketId, TicketStatus};

use crate::scheduler::PeriodicJob;
use crate::{LedgerPolicy, abort, inventory::InventoryPool, metrics};

/// What one sweep reclaimed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Tickets invalidated
    pub reclaimed: Vec<TicketId>,
    /// Stock units returned to tiers
    pub units_released: u64,
}

/// Invalidates `VALID` tickets whose holders never confirmed attendance
/// after the event asked them to, and returns their stock.
#[derive(Clone)]
pub struct ExpirationReaper {
    store: Arc<dyn LedgerStore>,
    inventory: InventoryPool,
    clock: Arc<dyn Clock>,
    policy: LedgerPolicy,
}

impl ExpirationReaper {
    /// Create the reaper.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        inventory: InventoryPool,
        clock: Arc<dyn Clock>,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            store,
            inventory,
            clock,
            policy,
        }
    }

    /// Reclaim one batch in a single transaction.
    ///
    /// Idempotent: reclaimed tickets leave `VALID`, so a second sweep skips them.
    ///
    /// # Errors
    ///
    /// Storage failures; the whole batch rolls back.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let locked = tx
            .lock_reclaimable(
                now,
                self.policy.default_confirmation_grace,
                self.policy.reclaim_batch_size,
            )
            .await;
        let candidates = match locked {
            Ok(candidates) => candidates,
            Err(err) => return abort(tx, err).await,
        };
        if candidates.is_empty() {
            tx.rollback().await?;
            tracing::debug!("Nothing to reclaim");
            return Ok(SweepReport::default());
        }

        let mut report = SweepReport::default();
        for mut ticket in candidates {
            let released = self.inventory.release_ticket(tx.as_mut(), &ticket).await;
            match released {
                Ok(true) => report.units_released += u64::from(ticket.quantity),
                Ok(false) => {}
                Err(err) => return abort(tx, err).await,
            }
            ticket.status = TicketStatus::Invalidated;
            let updated = tx.update_ticket(&ticket).await;
            if let Err(err) = updated {
                return abort(tx, err).await;
            }
            report.reclaimed.push(ticket.id);
        }
        tx.commit().await?;

        metrics::record_reclaimed(report.reclaimed.len());
        tracing::info!(
            reclaimed = report.reclaimed.len(),
            units_released = report.units_released,
            "Unconfirmed tickets reclaimed"
        );
        Ok(report)
    }
}

impl PeriodicJob for ExpirationReaper {
    fn name(&self) -> &'static str {
        "expiration-reaper"
    }

    fn run(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.sweep().await.map(|_| ()) })
    }
}

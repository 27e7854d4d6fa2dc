//! On-site check-in.
//!
//! Scans lock the ticket row, apply the pure policy from
//! [`ticket_ledger_core::redemption`], and commit before any side effect.

use std::sync::Arc;
use ticket_ledger_core::environment::Clock;
use ticket_ledger_core::providers::{EventDirectory, PointsLedger};
use ticket_ledger_core::redemption::{ensure_voidable, plan_redemption, receipt};
use ticket_ledger_core::store::LedgerStore;
use ticket_ledger_core::{
    EventId, LedgerError, RedemptionReceipt, Result, Ticket, TicketId, TicketStatus,
};

use crate::{abort, inventory::InventoryPool, metrics};

/// Governs redemption and manual voiding.
#[derive(Clone)]
pub struct RedemptionStateMachine {
    store: Arc<dyn LedgerStore>,
    inventory: InventoryPool,
    events: Arc<dyn EventDirectory>,
    points: Arc<dyn PointsLedger>,
    clock: Arc<dyn Clock>,
}

impl RedemptionStateMachine {
    /// Create the state machine.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        inventory: InventoryPool,
        events: Arc<dyn EventDirectory>,
        points: Arc<dyn PointsLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            inventory,
            events,
            points,
            clock,
        }
    }

    /// Admit `units` guests on a ticket.
    ///
    /// The first successful scan of a ticket credits attendance points once.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown tickets or events, otherwise any rejection from
    /// [`plan_redemption`]: `EventEnded`, `WrongEvent`, `TerminalState`,
    /// `PaymentIncomplete`, `InvalidQuantity`, `FullyRedeemed`, `OverRedeem`.
    #[tracing::instrument(skip(self))]
    pub async fn redeem(
        &self,
        ticket_id: TicketId,
        units: u32,
        target_event: Option<EventId>,
    ) -> Result<RedemptionReceipt> {
        let snapshot = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("ticket", ticket_id))?;
        let event = self
            .events
            .get_event(snapshot.event_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("event", snapshot.event_id))?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let locked = tx.lock_ticket(ticket_id).await;
        let mut ticket = match locked {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return abort(tx, LedgerError::not_found("ticket", ticket_id)).await,
            Err(err) => return abort(tx, err).await,
        };

        let plan = match plan_redemption(&ticket, &event, units, target_event, now) {
            Ok(plan) => plan,
            Err(err) => {
                metrics::record_redemption(rejection_label(&err));
                tracing::info!(error = %err, "Scan rejected");
                return abort(tx, err).await;
            }
        };
        plan.apply(&mut ticket);
        let updated = tx.update_ticket(&ticket).await;
        if let Err(err) = updated {
            return abort(tx, err).await;
        }
        tx.commit().await?;

        metrics::record_redemption("accepted");
        tracing::info!(
            redeemed = ticket.redeemed_count,
            total = ticket.quantity,
            status = %ticket.status,
            "Ticket redeemed"
        );

        if plan.first_redemption {
            if let Err(err) = self
                .points
                .credit_attendance(ticket.user_id, ticket.event_id, ticket.id)
                .await
            {
                tracing::warn!(error = %err, "Attendance points credit failed");
            }
        }

        Ok(receipt(&ticket, plan.validated_at))
    }

    /// Void an unused ticket, returning its stock exactly once.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `TerminalState` unless the ticket is `VALID` or
    /// `PARTIALLY_PAID`.
    #[tracing::instrument(skip(self))]
    pub async fn void(&self, ticket_id: TicketId) -> Result<Ticket> {
        let mut tx = self.store.begin().await?;
        let locked = tx.lock_ticket(ticket_id).await;
        let mut ticket = match locked {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return abort(tx, LedgerError::not_found("ticket", ticket_id)).await,
            Err(err) => return abort(tx, err).await,
        };
        if let Err(err) = ensure_voidable(&ticket) {
            return abort(tx, err).await;
        }

        let released = self.inventory.release_ticket(tx.as_mut(), &ticket).await;
        let released = match released {
            Ok(released) => released,
            Err(err) => return abort(tx, err).await,
        };
        ticket.status = TicketStatus::Invalidated;
        let updated = tx.update_ticket(&ticket).await;
        if let Err(err) = updated {
            return abort(tx, err).await;
        }
        tx.commit().await?;

        tracing::info!(released, "Ticket voided");
        Ok(ticket)
    }
}

const fn rejection_label(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::FullyRedeemed { .. } => "fully_redeemed",
        LedgerError::OverRedeem { .. } => "over_redeem",
        LedgerError::EventEnded { .. } => "event_ended",
        LedgerError::WrongEvent { .. } => "wrong_event",
        LedgerError::PaymentIncomplete { .. } => "payment_incomplete",
        LedgerError::TerminalState { .. } => "invalidated",
        _ => "rejected",
    }
}

//! Side-effect adapters that record to the log.
//!
//! Rewards, points, notifications, purchase analytics and prize delivery are
//! owned by other services. Until those are wired in, every call is logged
//! with its identifiers so the events can be replayed from the log stream.

use ticket_ledger_core::providers::{
    IssuanceNotifier, PointsLedger, PrizeGrantor, PurchaseTracker, RewardsGrantor,
    SideEffectResult,
};
use ticket_ledger_core::store::BoxFuture;
use ticket_ledger_core::{
    EventId, PurchaseRecord, RaffleWinner, RewardId, Ticket, TicketId, UserId,
};

/// Logs every side effect at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCollaborators;

impl RewardsGrantor for LoggingCollaborators {
    fn grant_bonus(
        &self,
        user_id: UserId,
        reward_id: RewardId,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, SideEffectResult> {
        Box::pin(async move {
            tracing::info!(%user_id, %reward_id, %ticket_id, "Bonus reward granted");
            Ok(())
        })
    }
}

impl PointsLedger for LoggingCollaborators {
    fn credit_attendance(
        &self,
        user_id: UserId,
        event_id: EventId,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, SideEffectResult> {
        Box::pin(async move {
            tracing::info!(%user_id, %event_id, %ticket_id, "Attendance points credited");
            Ok(())
        })
    }
}

impl IssuanceNotifier for LoggingCollaborators {
    fn ticket_issued<'a>(&'a self, ticket: &'a Ticket) -> BoxFuture<'a, SideEffectResult> {
        Box::pin(async move {
            tracing::info!(
                ticket_id = %ticket.id,
                user_id = %ticket.user_id,
                origin = ticket.origin.as_str(),
                quantity = ticket.quantity,
                "Ticket issued notification"
            );
            Ok(())
        })
    }
}

impl PurchaseTracker for LoggingCollaborators {
    fn purchase_completed<'a>(
        &'a self,
        record: &'a PurchaseRecord,
    ) -> BoxFuture<'a, SideEffectResult> {
        Box::pin(async move {
            let payment_id = record.payment_id().map(ToString::to_string).unwrap_or_default();
            match record {
                PurchaseRecord::Ticket(ticket) => tracing::info!(
                    %payment_id,
                    ticket_id = %ticket.id,
                    amount_cents = ticket.amount_paid.cents(),
                    "Ticket purchase completed"
                ),
                PurchaseRecord::Product(purchase) => tracing::info!(
                    %payment_id,
                    product_id = %purchase.product_id,
                    amount_cents = purchase.amount_paid.cents(),
                    "Product purchase completed"
                ),
            }
            Ok(())
        })
    }
}

impl PrizeGrantor for LoggingCollaborators {
    fn grant_prize<'a>(
        &'a self,
        event_id: EventId,
        winner: &'a RaffleWinner,
    ) -> BoxFuture<'a, SideEffectResult> {
        Box::pin(async move {
            tracing::info!(
                %event_id,
                rank = winner.rank,
                user_id = %winner.user_id,
                prize = %winner.prize,
                "Raffle prize granted"
            );
            Ok(())
        })
    }
}

//! [`LedgerTransaction`] over a `sqlx` Postgres transaction.
//!
//! Runs at `READ COMMITTED`. Stock changes are single conditional `UPDATE`
//! statements, so two buyers racing for the last unit serialize on the tier
//! row and the loser sees zero rows affected. Tickets are locked with
//! `SELECT ... FOR UPDATE` before any read-modify-write.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Postgres, Transaction};
use ticket_ledger_core::store::{BoxFuture, LedgerTransaction, StockUpdate};
use ticket_ledger_core::{
    LedgerError, ProductPurchase, Result, Ticket, TicketId, TicketOrigin, TierId,
};

use crate::rows::{
    TICKET_COLUMNS, TicketRow, cents_to_db, count_to_db, tickets_from_rows,
};

const TICKETS_PAYMENT_UNIQUE: &str = "tickets_payment_id_unique";
const PRODUCTS_PAYMENT_UNIQUE: &str = "product_purchases_payment_id_unique";

/// Translate a failed write, turning the payment-id unique constraint into
/// `AlreadyProcessed`.
fn write_error(
    err: sqlx::Error,
    constraint: &str,
    payment_id: Option<&ticket_ledger_core::ExternalPaymentId>,
    context: &str,
) -> LedgerError {
    if let (sqlx::Error::Database(db_err), Some(payment_id)) = (&err, payment_id) {
        if db_err.is_unique_violation() && db_err.constraint() == Some(constraint) {
            metrics::counter!("ticket_ledger_postgres_payment_conflicts_total").increment(1);
            tracing::debug!(%payment_id, "Payment id already recorded");
            return LedgerError::AlreadyProcessed {
                payment_id: payment_id.clone(),
            };
        }
    }
    LedgerError::Storage(format!("{context}: {err}"))
}

/// An open database transaction.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgTransaction {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

impl LedgerTransaction for PgTransaction {
    fn decrement_stock(
        &mut self,
        tier_id: TierId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<StockUpdate>> {
        Box::pin(async move {
            let applied: Option<(i64,)> = sqlx::query_as(
                r"
                UPDATE ticket_tiers
                SET remaining_quantity = remaining_quantity - $2
                WHERE id = $1 AND remaining_quantity >= $2
                RETURNING remaining_quantity
                ",
            )
            .bind(tier_id.as_uuid())
            .bind(i64::from(quantity))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to decrement stock: {e}")))?;

            if let Some((remaining,)) = applied {
                return Ok(StockUpdate::Applied { remaining });
            }

            let current: Option<(i64,)> =
                sqlx::query_as("SELECT remaining_quantity FROM ticket_tiers WHERE id = $1")
                    .bind(tier_id.as_uuid())
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(|e| LedgerError::Storage(format!("Failed to read stock: {e}")))?;

            match current {
                Some((remaining,)) => Ok(StockUpdate::Insufficient { remaining }),
                None => Err(LedgerError::not_found("tier", tier_id)),
            }
        })
    }

    fn increment_stock(&mut self, tier_id: TierId, quantity: u32) -> BoxFuture<'_, Result<i64>> {
        Box::pin(async move {
            let updated: Option<(i64,)> = sqlx::query_as(
                r"
                UPDATE ticket_tiers
                SET remaining_quantity = remaining_quantity + $2
                WHERE id = $1
                RETURNING remaining_quantity
                ",
            )
            .bind(tier_id.as_uuid())
            .bind(i64::from(quantity))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to release stock: {e}")))?;

            updated
                .map(|(remaining,)| remaining)
                .ok_or_else(|| LedgerError::not_found("tier", tier_id))
        })
    }

    fn insert_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let query = format!(
                "INSERT INTO tickets ({TICKET_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
            );
            sqlx::query(&query)
                .bind(ticket.id.as_uuid())
                .bind(ticket.user_id.as_uuid())
                .bind(ticket.purchased_by.as_ref().map(|u| *u.as_uuid()))
                .bind(ticket.tier_id.as_uuid())
                .bind(ticket.event_id.as_uuid())
                .bind(count_to_db(ticket.quantity)?)
                .bind(count_to_db(ticket.redeemed_count)?)
                .bind(ticket.status.as_str())
                .bind(cents_to_db(ticket.amount_paid)?)
                .bind(ticket.payment_id.as_ref().map(|p| p.as_str().to_string()))
                .bind(ticket.origin.as_str())
                .bind(ticket.special_instructions.as_deref())
                .bind(ticket.created_at)
                .bind(ticket.confirmed_at)
                .bind(ticket.validated_at)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| {
                    write_error(
                        e,
                        TICKETS_PAYMENT_UNIQUE,
                        ticket.payment_id.as_ref(),
                        "Failed to insert ticket",
                    )
                })?;
            Ok(())
        })
    }

    fn lock_ticket(&mut self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<Ticket>>> {
        Box::pin(async move {
            let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 FOR UPDATE");
            let row: Option<TicketRow> = sqlx::query_as(&query)
                .bind(ticket_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to lock ticket: {e}")))?;
            row.map(Ticket::try_from).transpose()
        })
    }

    fn update_ticket<'a>(&'a mut self, ticket: &'a Ticket) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE tickets
                SET redeemed_count = $2,
                    status = $3,
                    amount_paid_cents = $4,
                    special_instructions = $5,
                    confirmed_at = $6,
                    validated_at = $7
                WHERE id = $1
                ",
            )
            .bind(ticket.id.as_uuid())
            .bind(count_to_db(ticket.redeemed_count)?)
            .bind(ticket.status.as_str())
            .bind(cents_to_db(ticket.amount_paid)?)
            .bind(ticket.special_instructions.as_deref())
            .bind(ticket.confirmed_at)
            .bind(ticket.validated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to update ticket: {e}")))?;

            if result.rows_affected() == 0 {
                return Err(LedgerError::not_found("ticket", ticket.id));
            }
            Ok(())
        })
    }

    fn delete_ticket(&mut self, ticket_id: TicketId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
                .bind(ticket_id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to delete ticket: {e}")))?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn lock_reclaimable(
        &mut self,
        now: DateTime<Utc>,
        default_grace: Duration,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let exempt: Vec<String> = TicketOrigin::ALL
                .iter()
                .filter(|origin| origin.is_inventory_exempt())
                .map(|origin| origin.as_str().to_string())
                .collect();
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let columns = TICKET_COLUMNS
                .split(", ")
                .map(|column| format!("t.{}", column.trim()))
                .collect::<Vec<_>>()
                .join(", ");
            let query = format!(
                "SELECT {columns} \
                 FROM tickets t \
                 JOIN events e ON e.id = t.event_id \
                 WHERE t.status = 'VALID' \
                   AND t.confirmed_at IS NULL \
                   AND t.origin <> ALL($2) \
                   AND e.confirmation_requested_at IS NOT NULL \
                   AND GREATEST(e.confirmation_requested_at, t.created_at) \
                       + COALESCE(e.confirmation_grace_minutes, $3)::double precision \
                         * INTERVAL '1 minute' <= $1 \
                 ORDER BY t.created_at \
                 LIMIT $4 \
                 FOR UPDATE OF t SKIP LOCKED"
            );

            let rows: Vec<TicketRow> = sqlx::query_as(&query)
                .bind(now)
                .bind(&exempt)
                .bind(default_grace.num_minutes())
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(|e| {
                    LedgerError::Storage(format!("Failed to lock reclaimable tickets: {e}"))
                })?;
            tickets_from_rows(rows)
        })
    }

    fn insert_product_purchase<'a>(
        &'a mut self,
        purchase: &'a ProductPurchase,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO product_purchases
                    (id, buyer_id, event_id, product_id, quantity, amount_paid_cents, payment_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(purchase.id.as_uuid())
            .bind(purchase.buyer_id.as_uuid())
            .bind(purchase.event_id.as_uuid())
            .bind(purchase.product_id.as_uuid())
            .bind(count_to_db(purchase.quantity)?)
            .bind(cents_to_db(purchase.amount_paid)?)
            .bind(purchase.payment_id.as_str())
            .bind(purchase.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                write_error(
                    e,
                    PRODUCTS_PAYMENT_UNIQUE,
                    Some(&purchase.payment_id),
                    "Failed to insert product purchase",
                )
            })?;
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            self.tx
                .commit()
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to commit transaction: {e}")))
        })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            self.tx
                .rollback()
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to roll back transaction: {e}")))
        })
    }
}

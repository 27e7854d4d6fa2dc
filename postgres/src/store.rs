//! `PostgreSQL` ledger store.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use ticket_ledger_core::providers::{EventDirectory, UserDirectory};
use ticket_ledger_core::store::{BoxFuture, LedgerStore, LedgerTransaction};
use ticket_ledger_core::{
    EventId, EventInfo, ExternalPaymentId, LedgerError, ProductPurchase, Result, Ticket, TicketId,
    TicketTier, TierId, UserId,
};
use uuid::Uuid;

use crate::rows::{
    EVENT_COLUMNS, EventRow, PRODUCT_COLUMNS, ProductRow, TICKET_COLUMNS, TIER_COLUMNS, TicketRow,
    TierRow, cents_to_db, tickets_from_rows,
};
use crate::transaction::PgTransaction;

/// Pool sizing for [`PostgresLedgerStore::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept warm
    pub min_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Ledger store, event directory and user directory backed by one Postgres pool.
///
/// # Example
///
/// ```ignore
/// let store = PostgresLedgerStore::connect(&url, PoolSettings::default()).await?;
/// store.migrate().await?;
/// let store: Arc<dyn LedgerStore> = Arc::new(store);
/// ```
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the database cannot be reached.
    pub async fn connect(database_url: &str, settings: PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or replace an event record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the write fails.
    pub async fn upsert_event(&self, event: &EventInfo) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO events (
                id, name, starts_at, ends_at, confirmation_requested_at,
                confirmation_grace_minutes, raffle_at, raffle_prizes, raffle_drawn
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at,
                confirmation_requested_at = EXCLUDED.confirmation_requested_at,
                confirmation_grace_minutes = EXCLUDED.confirmation_grace_minutes,
                raffle_at = EXCLUDED.raffle_at,
                raffle_prizes = EXCLUDED.raffle_prizes,
                raffle_drawn = EXCLUDED.raffle_drawn
            ",
        )
        .bind(event.id.as_uuid())
        .bind(&event.name)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(event.confirmation_requested_at)
        .bind(event.confirmation_grace_minutes)
        .bind(event.raffle_at)
        .bind(&event.raffle_prizes)
        .bind(event.raffle_drawn)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("Failed to save event: {e}")))?;
        Ok(())
    }

    /// Insert or replace a tier, including its stock counter.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the write fails.
    pub async fn upsert_tier(&self, tier: &TicketTier) -> Result<()> {
        let query = format!(
            "INSERT INTO ticket_tiers ({TIER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 price_cents = EXCLUDED.price_cents, \
                 is_free = EXCLUDED.is_free, \
                 remaining_quantity = EXCLUDED.remaining_quantity, \
                 kind = EXCLUDED.kind, \
                 partial_price_cents = EXCLUDED.partial_price_cents, \
                 bonus_reward_id = EXCLUDED.bonus_reward_id"
        );
        sqlx::query(&query)
            .bind(tier.id.as_uuid())
            .bind(tier.event_id.as_uuid())
            .bind(&tier.name)
            .bind(cents_to_db(tier.price)?)
            .bind(tier.is_free)
            .bind(tier.remaining_quantity)
            .bind(tier.kind.as_str())
            .bind(tier.partial_price.map(cents_to_db).transpose()?)
            .bind(tier.bonus_reward_id.as_ref().map(|r| *r.as_uuid()))
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to save tier: {e}")))?;
        Ok(())
    }

    async fn fetch_tickets(&self, query: &str, id: Uuid, at: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(query)
            .bind(id)
            .bind(at)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to list tickets: {e}")))?;
        tickets_from_rows(rows)
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn LedgerTransaction>>> {
        Box::pin(async move {
            let tx = self
                .pool
                .begin()
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to start transaction: {e}")))?;
            Ok(Box::new(PgTransaction::new(tx)) as Box<dyn LedgerTransaction>)
        })
    }

    fn get_tier(&self, tier_id: TierId) -> BoxFuture<'_, Result<Option<TicketTier>>> {
        Box::pin(async move {
            let query = format!("SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE id = $1");
            let row: Option<TierRow> = sqlx::query_as(&query)
                .bind(tier_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to get tier: {e}")))?;
            row.map(TicketTier::try_from).transpose()
        })
    }

    fn get_ticket(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Option<Ticket>>> {
        Box::pin(async move {
            let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
            let row: Option<TicketRow> = sqlx::query_as(&query)
                .bind(ticket_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to get ticket: {e}")))?;
            row.map(Ticket::try_from).transpose()
        })
    }

    fn tickets_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE user_id = $1 ORDER BY created_at DESC"
            );
            let rows: Vec<TicketRow> = sqlx::query_as(&query)
                .bind(user_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to list user tickets: {e}")))?;
            tickets_from_rows(rows)
        })
    }

    fn ticket_by_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<Option<Ticket>>> {
        Box::pin(async move {
            let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE payment_id = $1");
            let row: Option<TicketRow> = sqlx::query_as(&query)
                .bind(payment_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to get ticket by payment: {e}")))?;
            row.map(Ticket::try_from).transpose()
        })
    }

    fn product_purchase_by_payment<'a>(
        &'a self,
        payment_id: &'a ExternalPaymentId,
    ) -> BoxFuture<'a, Result<Option<ProductPurchase>>> {
        Box::pin(async move {
            let query =
                format!("SELECT {PRODUCT_COLUMNS} FROM product_purchases WHERE payment_id = $1");
            let row: Option<ProductRow> = sqlx::query_as(&query)
                .bind(payment_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    LedgerError::Storage(format!("Failed to get product purchase: {e}"))
                })?;
            row.map(ProductPurchase::try_from).transpose()
        })
    }

    fn tickets_created_before(
        &self,
        event_id: EventId,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets \
                 WHERE event_id = $1 AND created_at < $2 ORDER BY created_at"
            );
            self.fetch_tickets(&query, *event_id.as_uuid(), cutoff).await
        })
    }

    fn tickets_validated_since(
        &self,
        event_id: EventId,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Ticket>>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets \
                 WHERE event_id = $1 AND validated_at >= $2 ORDER BY validated_at DESC"
            );
            self.fetch_tickets(&query, *event_id.as_uuid(), since).await
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Database unreachable: {e}")))?;
            Ok(())
        })
    }
}

impl EventDirectory for PostgresLedgerStore {
    fn get_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<EventInfo>>> {
        Box::pin(async move {
            let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
            let row: Option<EventRow> = sqlx::query_as(&query)
                .bind(event_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to get event: {e}")))?;
            Ok(row.map(EventInfo::from))
        })
    }

    fn events_due_for_raffle(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<EventInfo>>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {EVENT_COLUMNS} FROM events \
                 WHERE raffle_at IS NOT NULL AND raffle_at <= $1 AND NOT raffle_drawn \
                 ORDER BY raffle_at"
            );
            let rows: Vec<EventRow> = sqlx::query_as(&query)
                .bind(now)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to list due raffles: {e}")))?;
            Ok(rows.into_iter().map(EventInfo::from).collect())
        })
    }

    fn mark_raffle_drawn(&self, event_id: EventId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE events SET raffle_drawn = TRUE WHERE id = $1")
                .bind(event_id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to mark raffle drawn: {e}")))?;
            if result.rows_affected() == 0 {
                return Err(LedgerError::not_found("event", event_id));
            }
            Ok(())
        })
    }
}

impl UserDirectory for PostgresLedgerStore {
    fn resolve_or_create<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<UserId>> {
        Box::pin(async move {
            let normalized = email.trim().to_lowercase();
            // The no-op update makes RETURNING yield the existing row on conflict.
            let (id,): (Uuid,) = sqlx::query_as(
                r"
                INSERT INTO users (id, email) VALUES ($1, $2)
                ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
                RETURNING id
                ",
            )
            .bind(Uuid::new_v4())
            .bind(&normalized)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to resolve user: {e}")))?;
            Ok(UserId::from_uuid(id))
        })
    }
}

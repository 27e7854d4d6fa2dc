//! Row types and their conversions to domain records.
//!
//! Money is stored as `BIGINT` cents and head-counts as `INTEGER`; enums are
//! stored as their `SCREAMING_SNAKE_CASE` names.

use chrono::{DateTime, Utc};
use ticket_ledger_core::{
    EventId, EventInfo, ExternalPaymentId, LedgerError, Money, ProductId, ProductKind,
    ProductPurchase, PurchaseId, Result, RewardId, Ticket, TicketId, TicketOrigin, TicketStatus,
    TicketTier, TierId, UserId,
};
use uuid::Uuid;

pub(crate) const TICKET_COLUMNS: &str = "id, user_id, purchased_by, tier_id, event_id, quantity, \
     redeemed_count, status, amount_paid_cents, payment_id, origin, special_instructions, \
     created_at, confirmed_at, validated_at";

pub(crate) const TIER_COLUMNS: &str = "id, event_id, name, price_cents, is_free, \
     remaining_quantity, kind, partial_price_cents, bonus_reward_id";

pub(crate) const EVENT_COLUMNS: &str = "id, name, starts_at, ends_at, confirmation_requested_at, \
     confirmation_grace_minutes, raffle_at, raffle_prizes, raffle_drawn";

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, buyer_id, event_id, product_id, quantity, amount_paid_cents, payment_id, created_at";

fn corrupt(what: &str, value: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("Invalid {what} in database: {value}"))
}

pub(crate) fn cents_to_db(money: Money) -> Result<i64> {
    i64::try_from(money.cents()).map_err(|_| corrupt("amount", money))
}

fn cents_from_db(cents: i64) -> Result<Money> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| corrupt("amount", cents))
}

pub(crate) fn count_to_db(count: u32) -> Result<i32> {
    i32::try_from(count).map_err(|_| corrupt("quantity", count))
}

fn count_from_db(count: i32) -> Result<u32> {
    u32::try_from(count).map_err(|_| corrupt("quantity", count))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TicketRow {
    id: Uuid,
    user_id: Uuid,
    purchased_by: Option<Uuid>,
    tier_id: Uuid,
    event_id: Uuid,
    quantity: i32,
    redeemed_count: i32,
    status: String,
    amount_paid_cents: i64,
    payment_id: Option<String>,
    origin: String,
    special_instructions: Option<String>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    validated_at: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = LedgerError;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(Self {
            id: TicketId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            purchased_by: row.purchased_by.map(UserId::from_uuid),
            tier_id: TierId::from_uuid(row.tier_id),
            event_id: EventId::from_uuid(row.event_id),
            quantity: count_from_db(row.quantity)?,
            redeemed_count: count_from_db(row.redeemed_count)?,
            status: TicketStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?,
            amount_paid: cents_from_db(row.amount_paid_cents)?,
            payment_id: row.payment_id.map(ExternalPaymentId::new),
            origin: TicketOrigin::parse(&row.origin).ok_or_else(|| corrupt("origin", &row.origin))?,
            special_instructions: row.special_instructions,
            created_at: row.created_at,
            confirmed_at: row.confirmed_at,
            validated_at: row.validated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TierRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    price_cents: i64,
    is_free: bool,
    remaining_quantity: i64,
    kind: String,
    partial_price_cents: Option<i64>,
    bonus_reward_id: Option<Uuid>,
}

impl TryFrom<TierRow> for TicketTier {
    type Error = LedgerError;

    fn try_from(row: TierRow) -> Result<Self> {
        Ok(Self {
            id: TierId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            name: row.name,
            price: cents_from_db(row.price_cents)?,
            is_free: row.is_free,
            remaining_quantity: row.remaining_quantity,
            kind: ProductKind::parse(&row.kind).ok_or_else(|| corrupt("tier kind", &row.kind))?,
            partial_price: row.partial_price_cents.map(cents_from_db).transpose()?,
            bonus_reward_id: row.bonus_reward_id.map(RewardId::from_uuid),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    name: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    confirmation_requested_at: Option<DateTime<Utc>>,
    confirmation_grace_minutes: Option<i64>,
    raffle_at: Option<DateTime<Utc>>,
    raffle_prizes: Vec<String>,
    raffle_drawn: bool,
}

impl From<EventRow> for EventInfo {
    fn from(row: EventRow) -> Self {
        Self {
            id: EventId::from_uuid(row.id),
            name: row.name,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            confirmation_requested_at: row.confirmation_requested_at,
            confirmation_grace_minutes: row.confirmation_grace_minutes,
            raffle_at: row.raffle_at,
            raffle_prizes: row.raffle_prizes,
            raffle_drawn: row.raffle_drawn,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    buyer_id: Uuid,
    event_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    amount_paid_cents: i64,
    payment_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for ProductPurchase {
    type Error = LedgerError;

    fn try_from(row: ProductRow) -> Result<Self> {
        Ok(Self {
            id: PurchaseId::from_uuid(row.id),
            buyer_id: UserId::from_uuid(row.buyer_id),
            event_id: EventId::from_uuid(row.event_id),
            product_id: ProductId::from_uuid(row.product_id),
            quantity: count_from_db(row.quantity)?,
            amount_paid: cents_from_db(row.amount_paid_cents)?,
            payment_id: ExternalPaymentId::new(row.payment_id),
            created_at: row.created_at,
        })
    }
}

pub(crate) fn tickets_from_rows(rows: Vec<TicketRow>) -> Result<Vec<Ticket>> {
    rows.into_iter().map(Ticket::try_from).collect()
}

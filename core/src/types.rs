//! Domain types for the ticket ledger.
//!
//! Value objects (identifiers, [`Money`]), the inventory pool record
//! ([`TicketTier`]), the reservation record ([`Ticket`]) and the small enums
//! that drive policy decisions ([`TicketStatus`], [`TicketOrigin`],
//! [`ProductKind`]).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event (the thing tickets admit to)
    EventId
);
uuid_id!(
    /// Unique identifier for a ticket tier (an inventory pool)
    TierId
);
uuid_id!(
    /// Unique identifier for a ticket. Doubles as the QR payload scanned at the door.
    TicketId
);
uuid_id!(
    /// Unique identifier for a user
    UserId
);
uuid_id!(
    /// Identifier of a bonus reward granted alongside each purchased unit
    RewardId
);
uuid_id!(
    /// Identifier of an ancillary product (drinks, merchandise, ...)
    ProductId
);
uuid_id!(
    /// Identifier of an ancillary product purchase record
    PurchaseId
);

/// Payment identifier assigned by the external payment provider.
///
/// This is the idempotency key: at most one ticket (or product purchase)
/// may ever carry a given value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalPaymentId(String);

impl ExternalPaymentId {
    /// Wraps a provider payment identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalPaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (minor units to avoid floating point errors)
// ============================================================================

/// Money in minor currency units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units with overflow checking
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Converts a provider-reported decimal amount (e.g. `1499.5`) to cents.
    ///
    /// Returns `None` for negative, non-finite or out-of-range values.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents > u64::MAX as f64 {
            return None;
        }
        Some(Self(cents as u64))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount as a decimal in whole currency units
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two amounts, clamping at the maximum
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts two money amounts (returns None if result would be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// What a tier sells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductKind {
    /// Ordinary admission, priced per head
    Ticket,
    /// A reserved table; the tier price covers the whole party
    VipTable,
    /// A voucher redeemable at the venue
    Voucher,
}

impl ProductKind {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "TICKET",
            Self::VipTable => "VIP_TABLE",
            Self::Voucher => "VOUCHER",
        }
    }

    /// Parse from the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TICKET" => Some(Self::Ticket),
            "VIP_TABLE" => Some(Self::VipTable),
            "VOUCHER" => Some(Self::Voucher),
            _ => None,
        }
    }

    /// Whether the price applies once per reservation instead of per head.
    #[must_use]
    pub const fn is_flat_priced(&self) -> bool {
        matches!(self, Self::VipTable)
    }
}

/// Lifecycle status of a [`Ticket`].
///
/// ```text
/// VALID ──► PARTIALLY_USED ──► REDEEMED
///   │
///   └──────────────► INVALIDATED ◄── PARTIALLY_PAID
/// PARTIALLY_PAID ──(payment reconciliation)──► VALID
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Issued and fully paid (or free), nothing redeemed yet
    Valid,
    /// A deposit was received but the balance is outstanding
    PartiallyPaid,
    /// Some guest units were admitted
    PartiallyUsed,
    /// Every guest unit was admitted (terminal)
    Redeemed,
    /// Voided or reclaimed (terminal)
    Invalidated,
}

impl TicketStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::PartiallyPaid => "PARTIALLY_PAID",
            Self::PartiallyUsed => "PARTIALLY_USED",
            Self::Redeemed => "REDEEMED",
            Self::Invalidated => "INVALIDATED",
        }
    }

    /// Parse from the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VALID" => Some(Self::Valid),
            "PARTIALLY_PAID" => Some(Self::PartiallyPaid),
            "PARTIALLY_USED" => Some(Self::PartiallyUsed),
            "REDEEMED" => Some(Self::Redeemed),
            "INVALIDATED" => Some(Self::Invalidated),
            _ => None,
        }
    }

    /// No transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Redeemed | Self::Invalidated)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a ticket.
///
/// The inventory exemption policy is declared here, once per variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketOrigin {
    /// Bought by the holder (directly or through the payment provider)
    Purchase,
    /// Issued by a promotion or campaign
    Promotional,
    /// Birthday courtesy ticket
    Birthday,
    /// Invitation handed out by the event owner
    OwnerInvitation,
    /// Pre-printed physical ticket from a print run
    PhysicalPrint,
}

impl TicketOrigin {
    /// Every origin.
    pub const ALL: [Self; 5] = [
        Self::Purchase,
        Self::Promotional,
        Self::Birthday,
        Self::OwnerInvitation,
        Self::PhysicalPrint,
    ];

    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "PURCHASE",
            Self::Promotional => "PROMOTIONAL",
            Self::Birthday => "BIRTHDAY",
            Self::OwnerInvitation => "OWNER_INVITATION",
            Self::PhysicalPrint => "PHYSICAL_PRINT",
        }
    }

    /// Parse from the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PURCHASE" => Some(Self::Purchase),
            "PROMOTIONAL" => Some(Self::Promotional),
            "BIRTHDAY" => Some(Self::Birthday),
            "OWNER_INVITATION" => Some(Self::OwnerInvitation),
            "PHYSICAL_PRINT" => Some(Self::PhysicalPrint),
            _ => None,
        }
    }

    /// Exempt origins never reserve nor release tier stock.
    #[must_use]
    pub const fn is_inventory_exempt(&self) -> bool {
        matches!(self, Self::OwnerInvitation | Self::PhysicalPrint)
    }
}

impl fmt::Display for TicketOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the total the buyer pays up front.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    /// Whole price
    Full,
    /// Deposit at the tier's partial-payment price
    Partial,
}

/// What a payment envelope pays for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseKind {
    /// A ticket against a tier
    Ticket,
    /// An ancillary product
    Product,
}

// ============================================================================
// Entities
// ============================================================================

/// A purchasable class of admission: the inventory pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTier {
    /// Tier ID
    pub id: TierId,
    /// Owning event
    pub event_id: EventId,
    /// Display name
    pub name: String,
    /// Unit price (per reservation for `VIP_TABLE`)
    pub price: Money,
    /// Free tiers never go through the payment provider
    pub is_free: bool,
    /// Remaining stock. Signed: exempt issuance can legitimately leave it
    /// untouched while the counter is corrected administratively.
    pub remaining_quantity: i64,
    /// What the tier sells
    pub kind: ProductKind,
    /// Deposit price for partial payments, if offered
    pub partial_price: Option<Money>,
    /// Bonus reward granted once per purchased unit
    pub bonus_reward_id: Option<RewardId>,
}

/// An issued reservation against a tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID (the QR payload)
    pub id: TicketId,
    /// Holder
    pub user_id: UserId,
    /// Who paid or issued it, when different from the holder
    pub purchased_by: Option<UserId>,
    /// Tier the ticket consumed
    pub tier_id: TierId,
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Head-count
    pub quantity: u32,
    /// Guest units already admitted (`0..=quantity`)
    pub redeemed_count: u32,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Amount settled so far
    pub amount_paid: Money,
    /// Provider payment that produced this ticket
    pub payment_id: Option<ExternalPaymentId>,
    /// Provenance
    pub origin: TicketOrigin,
    /// One-line note for venue staff
    pub special_instructions: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When the holder confirmed attendance
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Last successful scan
    pub validated_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Guest units still admissible.
    #[must_use]
    pub const fn remaining_units(&self) -> u32 {
        self.quantity.saturating_sub(self.redeemed_count)
    }

    /// Whether this ticket currently accounts for `quantity` units of tier stock.
    ///
    /// Exempt origins never held stock; invalidated tickets already gave it back.
    #[must_use]
    pub const fn holds_stock(&self) -> bool {
        !self.origin.is_inventory_exempt() && !matches!(self.status, TicketStatus::Invalidated)
    }
}

/// Event record as seen by the ledger (owned by the event directory).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Event ID
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Doors open
    pub starts_at: DateTime<Utc>,
    /// After this instant no ticket can be redeemed
    pub ends_at: DateTime<Utc>,
    /// When the owner asked ticket holders to confirm attendance
    pub confirmation_requested_at: Option<DateTime<Utc>>,
    /// Per-event override of the confirmation grace period
    pub confirmation_grace_minutes: Option<i64>,
    /// When the raffle should be drawn
    pub raffle_at: Option<DateTime<Utc>>,
    /// Prizes in rank order (first entry goes to the first winner)
    pub raffle_prizes: Vec<String>,
    /// Whether the raffle already ran
    pub raffle_drawn: bool,
}

impl EventInfo {
    /// Whether the event is over at `now`.
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }

    /// Grace period holders get to confirm, falling back to `default_grace`.
    #[must_use]
    pub fn confirmation_grace(&self, default_grace: Duration) -> Duration {
        self.confirmation_grace_minutes
            .map_or(default_grace, Duration::minutes)
    }

    /// Instant after which an unconfirmed ticket created at `created_at` is reclaimable.
    ///
    /// A ticket bought after the confirmation signal still gets a full grace period.
    #[must_use]
    pub fn confirmation_deadline(
        &self,
        created_at: DateTime<Utc>,
        default_grace: Duration,
    ) -> Option<DateTime<Utc>> {
        let requested = self.confirmation_requested_at?;
        Some(requested.max(created_at) + self.confirmation_grace(default_grace))
    }
}

/// An ancillary product bought through the payment provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPurchase {
    /// Purchase ID
    pub id: PurchaseId,
    /// Buyer
    pub buyer_id: UserId,
    /// Event the product is sold at
    pub event_id: EventId,
    /// Product bought
    pub product_id: ProductId,
    /// Units bought
    pub quantity: u32,
    /// Amount settled
    pub amount_paid: Money,
    /// Provider payment (unique)
    pub payment_id: ExternalPaymentId,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Record produced by a reconciled payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum PurchaseRecord {
    /// A ticket
    Ticket(Ticket),
    /// An ancillary product purchase
    Product(ProductPurchase),
}

impl PurchaseRecord {
    /// The ticket, for ticket purchases.
    #[must_use]
    pub const fn as_ticket(&self) -> Option<&Ticket> {
        match self {
            Self::Ticket(ticket) => Some(ticket),
            Self::Product(_) => None,
        }
    }

    /// The provider payment behind the record.
    #[must_use]
    pub const fn payment_id(&self) -> Option<&ExternalPaymentId> {
        match self {
            Self::Ticket(ticket) => ticket.payment_id.as_ref(),
            Self::Product(purchase) => Some(&purchase.payment_id),
        }
    }
}

/// Outcome of payment finalization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResult {
    /// The record backing the payment
    pub record: PurchaseRecord,
    /// `true` when the payment had already been applied and the existing
    /// record was returned unchanged (or only topped up)
    pub replayed: bool,
}

/// What venue staff see after a scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionReceipt {
    /// Scanned ticket
    pub ticket_id: TicketId,
    /// Human-readable summary
    pub message: String,
    /// Status after the scan
    pub status: TicketStatus,
    /// Units redeemed so far
    pub redeemed: u32,
    /// Ticket head-count
    pub total: u32,
    /// Scan time
    pub validated_at: DateTime<Utc>,
}

/// A raffle winner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleWinner {
    /// 1-based rank
    pub rank: u32,
    /// Winning user
    pub user_id: UserId,
    /// Prize
    pub prize: String,
}

/// Result of a raffle draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleOutcome {
    /// Event the raffle belongs to
    pub event_id: EventId,
    /// Size of the eligible pool
    pub eligible: usize,
    /// Winners in rank order
    pub winners: Vec<RaffleWinner>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ticket(origin: TicketOrigin, status: TicketStatus) -> Ticket {
        Ticket {
            id: TicketId::new(),
            user_id: UserId::new(),
            purchased_by: None,
            tier_id: TierId::new(),
            event_id: EventId::new(),
            quantity: 4,
            redeemed_count: 1,
            status,
            amount_paid: Money::ZERO,
            payment_id: None,
            origin,
            special_instructions: None,
            created_at: Utc::now(),
            confirmed_at: None,
            validated_at: None,
        }
    }

    #[test]
    fn test_money_from_decimal_rounds_to_cents() {
        assert_eq!(Money::from_decimal(1499.5), Some(Money::from_cents(149_950)));
        assert_eq!(Money::from_decimal(0.005), Some(Money::from_cents(1)));
        assert_eq!(Money::from_decimal(-1.0), None);
        assert_eq!(Money::from_decimal(f64::NAN), None);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(123_45).to_string(), "123.45");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn test_status_round_trips_through_db_strings() {
        for status in [
            TicketStatus::Valid,
            TicketStatus::PartiallyPaid,
            TicketStatus::PartiallyUsed,
            TicketStatus::Redeemed,
            TicketStatus::Invalidated,
        ] {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TicketStatus::parse("USED"), None);
    }

    #[test]
    fn test_only_owner_invitations_and_prints_are_exempt() {
        assert!(TicketOrigin::OwnerInvitation.is_inventory_exempt());
        assert!(TicketOrigin::PhysicalPrint.is_inventory_exempt());
        assert!(!TicketOrigin::Purchase.is_inventory_exempt());
        assert!(!TicketOrigin::Promotional.is_inventory_exempt());
        assert!(!TicketOrigin::Birthday.is_inventory_exempt());
    }

    #[test]
    fn test_holds_stock() {
        assert!(ticket(TicketOrigin::Purchase, TicketStatus::Valid).holds_stock());
        assert!(!ticket(TicketOrigin::Purchase, TicketStatus::Invalidated).holds_stock());
        assert!(!ticket(TicketOrigin::PhysicalPrint, TicketStatus::Valid).holds_stock());
        assert_eq!(ticket(TicketOrigin::Purchase, TicketStatus::Valid).remaining_units(), 3);
    }

    #[test]
    fn test_confirmation_deadline_uses_later_of_signal_and_creation() {
        let requested = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let event = EventInfo {
            id: EventId::new(),
            name: "Launch".to_string(),
            starts_at: requested,
            ends_at: requested + Duration::days(1),
            confirmation_requested_at: Some(requested),
            confirmation_grace_minutes: Some(60),
            raffle_at: None,
            raffle_prizes: vec![],
            raffle_drawn: false,
        };

        let early = requested - Duration::hours(3);
        assert_eq!(
            event.confirmation_deadline(early, Duration::minutes(5)),
            Some(requested + Duration::hours(1))
        );

        let late = requested + Duration::hours(2);
        assert_eq!(
            event.confirmation_deadline(late, Duration::minutes(5)),
            Some(late + Duration::hours(1))
        );
    }
}

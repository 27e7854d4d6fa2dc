//! Pure pricing rules: quantity validation, expected totals, payment classification.

use crate::error::{LedgerError, Result};
use crate::types::{Money, PaymentMode, TicketStatus, TicketTier};

/// Accept only positive quantities that fit a head-count.
///
/// # Errors
///
/// Returns `LedgerError::InvalidQuantity` for zero, negative or oversized values.
pub fn validate_quantity(quantity: i64) -> Result<u32> {
    match u32::try_from(quantity) {
        Ok(q) if q > 0 => Ok(q),
        _ => Err(LedgerError::InvalidQuantity { quantity }),
    }
}

/// What a reservation of `quantity` units costs in full.
///
/// Free tiers cost nothing; `VIP_TABLE` tiers are priced per reservation.
///
/// # Errors
///
/// Returns `LedgerError::InvalidQuantity` if the total overflows.
pub fn expected_total(tier: &TicketTier, quantity: u32) -> Result<Money> {
    if tier.is_free {
        return Ok(Money::ZERO);
    }
    if tier.kind.is_flat_priced() {
        return Ok(tier.price);
    }
    tier.price
        .checked_multiply(quantity)
        .ok_or(LedgerError::InvalidQuantity {
            quantity: i64::from(quantity),
        })
}

/// What the payer is charged at checkout.
///
/// `Partial` mode charges the tier's deposit price when it has one and
/// falls back to the full total otherwise.
///
/// # Errors
///
/// Returns `LedgerError::InvalidQuantity` if the total overflows.
pub fn checkout_amount(tier: &TicketTier, quantity: u32, mode: PaymentMode) -> Result<Money> {
    match (mode, tier.partial_price) {
        (PaymentMode::Partial, Some(deposit)) if !tier.is_free => {
            if tier.kind.is_flat_priced() {
                Ok(deposit)
            } else {
                deposit
                    .checked_multiply(quantity)
                    .ok_or(LedgerError::InvalidQuantity {
                        quantity: i64::from(quantity),
                    })
            }
        }
        _ => expected_total(tier, quantity),
    }
}

/// Status a newly paid (or topped-up) ticket should carry.
///
/// - nothing expected or nothing paid yet: `VALID`
/// - paid within `tolerance` of expected: `VALID`
/// - anything less: `PARTIALLY_PAID`
#[must_use]
pub const fn classify_payment(expected: Money, paid: Money, tolerance: Money) -> TicketStatus {
    if expected.is_zero() || paid.is_zero() {
        return TicketStatus::Valid;
    }
    if paid.saturating_add(tolerance).cents() >= expected.cents() {
        TicketStatus::Valid
    } else {
        TicketStatus::PartiallyPaid
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{EventId, ProductKind, TierId};

    fn tier(kind: ProductKind, price: u64) -> TicketTier {
        TicketTier {
            id: TierId::new(),
            event_id: EventId::new(),
            name: "General".to_string(),
            price: Money::from_cents(price),
            is_free: false,
            remaining_quantity: 100,
            kind,
            partial_price: Some(Money::from_cents(price / 4)),
            bonus_reward_id: None,
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert_eq!(validate_quantity(3).unwrap(), 3);
        assert!(matches!(
            validate_quantity(0),
            Err(LedgerError::InvalidQuantity { quantity: 0 })
        ));
        assert!(validate_quantity(-2).is_err());
        assert!(validate_quantity(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_expected_total_per_head_and_flat() {
        assert_eq!(
            expected_total(&tier(ProductKind::Ticket, 1000), 3).unwrap(),
            Money::from_cents(3000)
        );
        assert_eq!(
            expected_total(&tier(ProductKind::VipTable, 50_000), 8).unwrap(),
            Money::from_cents(50_000)
        );

        let mut free = tier(ProductKind::Ticket, 1000);
        free.is_free = true;
        assert_eq!(expected_total(&free, 4).unwrap(), Money::ZERO);
    }

    #[test]
    fn test_checkout_amount_partial() {
        let t = tier(ProductKind::Ticket, 1000);
        assert_eq!(
            checkout_amount(&t, 2, PaymentMode::Partial).unwrap(),
            Money::from_cents(500)
        );
        assert_eq!(
            checkout_amount(&t, 2, PaymentMode::Full).unwrap(),
            Money::from_cents(2000)
        );

        let vip = tier(ProductKind::VipTable, 40_000);
        assert_eq!(
            checkout_amount(&vip, 6, PaymentMode::Partial).unwrap(),
            Money::from_cents(10_000)
        );

        let mut no_deposit = tier(ProductKind::Ticket, 1000);
        no_deposit.partial_price = None;
        assert_eq!(
            checkout_amount(&no_deposit, 1, PaymentMode::Partial).unwrap(),
            Money::from_cents(1000)
        );
    }

    #[test]
    fn test_classify_payment() {
        let tolerance = Money::from_cents(100);
        let expected = Money::from_cents(10_000);

        assert_eq!(
            classify_payment(expected, expected, tolerance),
            TicketStatus::Valid
        );
        assert_eq!(
            classify_payment(expected, Money::from_cents(9_950), tolerance),
            TicketStatus::Valid
        );
        assert_eq!(
            classify_payment(expected, Money::from_cents(5_000), tolerance),
            TicketStatus::PartiallyPaid
        );
        assert_eq!(
            classify_payment(expected, Money::ZERO, tolerance),
            TicketStatus::Valid
        );
        assert_eq!(
            classify_payment(Money::ZERO, Money::from_cents(1), tolerance),
            TicketStatus::Valid
        );
    }
}

//! proptest strategies for ledger inputs.

use proptest::prelude::*;
use ticket_ledger_core::{Money, TicketOrigin};

/// Any requested quantity, including the invalid ones (zero, negative, huge).
pub fn any_quantity() -> impl Strategy<Value = i64> {
    prop_oneof![
        8 => 1i64..=6,
        1 => Just(0i64),
        1 => -5i64..0,
        1 => 10_001i64..20_000,
    ]
}

/// A valid head-count.
pub fn valid_quantity() -> impl Strategy<Value = i64> {
    1i64..=6
}

/// Amounts up to 500.00.
pub fn money() -> impl Strategy<Value = Money> {
    (0u64..=50_000).prop_map(Money::from_cents)
}

/// Any ticket origin.
pub fn origin() -> impl Strategy<Value = TicketOrigin> {
    prop_oneof![
        Just(TicketOrigin::Purchase),
        Just(TicketOrigin::Promotional),
        Just(TicketOrigin::Birthday),
        Just(TicketOrigin::OwnerInvitation),
        Just(TicketOrigin::PhysicalPrint),
    ]
}

/// A sequence of scan sizes, zero included so rejections are exercised.
pub fn scan_sequence() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..=4, 1..12)
}

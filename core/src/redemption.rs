//! Pure redemption policy.
//!
//! The engine loads and locks the ticket; this module decides what the scan
//! does to it. Keeping the rules free of I/O lets them be property-tested.

use crate::error::{LedgerError, Result};
use crate::types::{EventId, EventInfo, RedemptionReceipt, Ticket, TicketStatus};
use chrono::{DateTime, Utc};

/// Changes a successful scan applies to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionPlan {
    /// New `redeemed_count`
    pub redeemed_count: u32,
    /// New status
    pub status: TicketStatus,
    /// Scan time
    pub validated_at: DateTime<Utc>,
    /// Whether nothing had been redeemed before this scan
    pub first_redemption: bool,
}

impl RedemptionPlan {
    /// Write the plan into the ticket.
    pub const fn apply(&self, ticket: &mut Ticket) {
        ticket.redeemed_count = self.redeemed_count;
        ticket.status = self.status;
        ticket.validated_at = Some(self.validated_at);
    }
}

/// Decide whether `units` guests of `ticket` can be admitted at `now`.
///
/// Checks, in order: event still running, scan at the ticket's own event,
/// ticket not voided, balance settled, positive units, units left, enough
/// units left. A fully redeemed ticket is always rejected.
///
/// # Errors
///
/// `EventEnded`, `WrongEvent`, `TerminalState`, `PaymentIncomplete`,
/// `InvalidQuantity`, `FullyRedeemed` or `OverRedeem`.
pub fn plan_redemption(
    ticket: &Ticket,
    event: &EventInfo,
    units: u32,
    target_event: Option<EventId>,
    now: DateTime<Utc>,
) -> Result<RedemptionPlan> {
    if event.has_ended(now) {
        return Err(LedgerError::EventEnded { event_id: event.id });
    }
    if let Some(target) = target_event {
        if target != ticket.event_id {
            return Err(LedgerError::WrongEvent {
                ticket_id: ticket.id,
                event_id: target,
            });
        }
    }
    match ticket.status {
        TicketStatus::Invalidated => {
            return Err(LedgerError::TerminalState {
                ticket_id: ticket.id,
                status: ticket.status.to_string(),
            });
        }
        TicketStatus::PartiallyPaid => {
            return Err(LedgerError::PaymentIncomplete {
                ticket_id: ticket.id,
            });
        }
        TicketStatus::Valid | TicketStatus::PartiallyUsed | TicketStatus::Redeemed => {}
    }
    if units == 0 {
        return Err(LedgerError::InvalidQuantity { quantity: 0 });
    }

    let remaining = ticket.remaining_units();
    if remaining == 0 {
        return Err(LedgerError::FullyRedeemed {
            ticket_id: ticket.id,
        });
    }
    if units > remaining {
        return Err(LedgerError::OverRedeem {
            ticket_id: ticket.id,
            requested: units,
            remaining,
        });
    }

    let redeemed_count = ticket.redeemed_count + units;
    let status = if redeemed_count == ticket.quantity {
        TicketStatus::Redeemed
    } else {
        TicketStatus::PartiallyUsed
    };

    Ok(RedemptionPlan {
        redeemed_count,
        status,
        validated_at: now,
        first_redemption: ticket.redeemed_count == 0,
    })
}

/// Check that a ticket can be voided by hand.
///
/// # Errors
///
/// `TerminalState` unless the ticket is `VALID` or `PARTIALLY_PAID`.
pub fn ensure_voidable(ticket: &Ticket) -> Result<()> {
    match ticket.status {
        TicketStatus::Valid | TicketStatus::PartiallyPaid => Ok(()),
        status => Err(LedgerError::TerminalState {
            ticket_id: ticket.id,
            status: status.to_string(),
        }),
    }
}

/// Receipt shown to venue staff after a successful scan.
#[must_use]
pub fn receipt(ticket: &Ticket, validated_at: DateTime<Utc>) -> RedemptionReceipt {
    let message = if ticket.status == TicketStatus::Redeemed {
        format!(
            "{}/{} admitted, ticket fully used",
            ticket.redeemed_count, ticket.quantity
        )
    } else {
        format!(
            "{}/{} admitted, {} remaining",
            ticket.redeemed_count,
            ticket.quantity,
            ticket.remaining_units()
        )
    };
    RedemptionReceipt {
        ticket_id: ticket.id,
        message,
        status: ticket.status,
        redeemed: ticket.redeemed_count,
        total: ticket.quantity,
        validated_at,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Money, TicketId, TicketOrigin, TierId, UserId};
    use chrono::Duration;
    use proptest::prelude::*;

    fn fixture(quantity: u32) -> (Ticket, EventInfo, DateTime<Utc>) {
        let now = Utc::now();
        let event = EventInfo {
            id: EventId::new(),
            name: "Opening night".to_string(),
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(5),
            confirmation_requested_at: None,
            confirmation_grace_minutes: None,
            raffle_at: None,
            raffle_prizes: vec![],
            raffle_drawn: false,
        };
        let ticket = Ticket {
            id: TicketId::new(),
            user_id: UserId::new(),
            purchased_by: None,
            tier_id: TierId::new(),
            event_id: event.id,
            quantity,
            redeemed_count: 0,
            status: TicketStatus::Valid,
            amount_paid: Money::ZERO,
            payment_id: None,
            origin: TicketOrigin::Purchase,
            special_instructions: None,
            created_at: now - Duration::days(2),
            confirmed_at: None,
            validated_at: None,
        };
        (ticket, event, now)
    }

    #[test]
    fn test_partial_then_full_redemption() {
        let (mut ticket, event, now) = fixture(5);

        let plan = plan_redemption(&ticket, &event, 3, None, now).unwrap();
        assert!(plan.first_redemption);
        assert_eq!(plan.status, TicketStatus::PartiallyUsed);
        plan.apply(&mut ticket);

        let plan = plan_redemption(&ticket, &event, 2, Some(event.id), now).unwrap();
        assert!(!plan.first_redemption);
        assert_eq!(plan.status, TicketStatus::Redeemed);
        plan.apply(&mut ticket);
        assert_eq!(ticket.redeemed_count, 5);

        assert!(matches!(
            plan_redemption(&ticket, &event, 1, None, now),
            Err(LedgerError::FullyRedeemed { .. })
        ));
    }

    #[test]
    fn test_over_redeem_reports_remaining() {
        let (ticket, event, now) = fixture(2);
        assert!(matches!(
            plan_redemption(&ticket, &event, 3, None, now),
            Err(LedgerError::OverRedeem { requested: 3, remaining: 2, .. })
        ));
    }

    #[test]
    fn test_rejections() {
        let (mut ticket, event, now) = fixture(2);

        assert!(matches!(
            plan_redemption(&ticket, &event, 1, None, event.ends_at),
            Err(LedgerError::EventEnded { .. })
        ));
        assert!(matches!(
            plan_redemption(&ticket, &event, 1, Some(EventId::new()), now),
            Err(LedgerError::WrongEvent { .. })
        ));
        assert!(matches!(
            plan_redemption(&ticket, &event, 0, None, now),
            Err(LedgerError::InvalidQuantity { .. })
        ));

        ticket.status = TicketStatus::PartiallyPaid;
        assert!(matches!(
            plan_redemption(&ticket, &event, 1, None, now),
            Err(LedgerError::PaymentIncomplete { .. })
        ));

        ticket.status = TicketStatus::Invalidated;
        assert!(matches!(
            plan_redemption(&ticket, &event, 1, None, now),
            Err(LedgerError::TerminalState { .. })
        ));
    }

    #[test]
    fn test_void_only_from_unused_states() {
        let (mut ticket, _, _) = fixture(2);
        assert!(ensure_voidable(&ticket).is_ok());
        ticket.status = TicketStatus::PartiallyPaid;
        assert!(ensure_voidable(&ticket).is_ok());
        ticket.status = TicketStatus::PartiallyUsed;
        assert!(ensure_voidable(&ticket).is_err());
        ticket.status = TicketStatus::Invalidated;
        assert!(ensure_voidable(&ticket).is_err());
    }

    #[test]
    fn test_receipt_shows_counts() {
        let (mut ticket, _, now) = fixture(4);
        ticket.redeemed_count = 1;
        ticket.status = TicketStatus::PartiallyUsed;
        let r = receipt(&ticket, now);
        assert_eq!((r.redeemed, r.total), (1, 4));
        assert!(r.message.contains("3 remaining"));
    }

    proptest! {
        #[test]
        fn prop_redeemed_count_is_monotonic_and_bounded(
            quantity in 1u32..20,
            scans in proptest::collection::vec(0u32..8, 0..30),
        ) {
            let (mut ticket, event, now) = fixture(quantity);
            let mut previous = 0;

            for units in scans {
                match plan_redemption(&ticket, &event, units, None, now) {
                    Ok(plan) => plan.apply(&mut ticket),
                    Err(LedgerError::FullyRedeemed { .. }) => {
                        prop_assert_eq!(ticket.redeemed_count, quantity);
                    }
                    Err(_) => {}
                }
                prop_assert!(ticket.redeemed_count >= previous);
                prop_assert!(ticket.redeemed_count <= ticket.quantity);
                previous = ticket.redeemed_count;
            }

            if ticket.redeemed_count == quantity {
                prop_assert_eq!(ticket.status, TicketStatus::Redeemed);
                let is_fully_redeemed = matches!(
                    plan_redemption(&ticket, &event, 1, None, now),
                    Err(LedgerError::FullyRedeemed { .. })
                );
                prop_assert!(is_fully_redeemed);
            }
        }
    }
}

//! End-to-end scenarios against the in-memory store.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use ticket_ledger_core::{
    Duration, LedgerError, Money, TicketOrigin, TicketStatus, UserId,
};
use ticket_ledger_engine::{ReservationRequest, WebhookNotification, WebhookOutcome};
use ticket_ledger_testing::TestHarness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scenario_a_last_unit_goes_to_exactly_one_buyer() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 1, 1_000).await;

    let first = harness.ledger.reservations.clone();
    let second = harness.ledger.reservations.clone();
    let request = |user| ReservationRequest::new(user, tier.id, event.id, 1, TicketOrigin::Purchase);
    let (a, b) = tokio::join!(
        tokio::spawn({
            let request = request(UserId::new());
            async move { first.create_reservation(request).await }
        }),
        tokio::spawn({
            let request = request(UserId::new());
            async move { second.create_reservation(request).await }
        }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientStock { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(sold_out, 1);
    assert_eq!(harness.store.tier(tier.id).await.unwrap().remaining_quantity, 0);
    assert_eq!(harness.store.all_tickets().await.len(), 1);
}

#[tokio::test]
async fn test_scenario_b_partial_payment_is_topped_up_in_place() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 10, 1_000).await;
    let buyer = UserId::new();
    let payment_id =
        harness.approve_ticket_payment("pay-b", buyer, &tier, 2, Money::from_cents(1_000));

    let first = harness
        .ledger
        .reconciler
        .finalize(&payment_id, Some(buyer))
        .await
        .unwrap();
    assert!(!first.replayed);
    let ticket = first.record.as_ticket().cloned().unwrap();
    assert_eq!(ticket.status, TicketStatus::PartiallyPaid);

    harness
        .payments
        .set_amount("pay-b", Money::from_cents(2_000));
    let second = harness
        .ledger
        .reconciler
        .finalize(&payment_id, Some(buyer))
        .await
        .unwrap();
    assert!(second.replayed);

    let tickets = harness.store.tickets_with_payment(&payment_id).await;
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].id, ticket.id);
    assert_eq!(tickets[0].status, TicketStatus::Valid);
    assert_eq!(tickets[0].amount_paid, Money::from_cents(2_000));
    assert_eq!(harness.store.tier(tier.id).await.unwrap().remaining_quantity, 8);
}

#[tokio::test]
async fn test_scenario_c_partial_redemption_until_fully_redeemed() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 10, 0).await;
    let issued = harness
        .ledger
        .reservations
        .create_reservation(ReservationRequest::new(
            UserId::new(),
            tier.id,
            event.id,
            5,
            TicketOrigin::Purchase,
        ))
        .await
        .unwrap();
    let ticket_id = issued.ticket.id;

    let receipt = harness.ledger.redemptions.redeem(ticket_id, 3, None).await.unwrap();
    assert_eq!(receipt.status, TicketStatus::PartiallyUsed);
    assert_eq!((receipt.redeemed, receipt.total), (3, 5));
    assert_eq!(receipt.message, "3/5 admitted, 2 remaining");

    let receipt = harness.ledger.redemptions.redeem(ticket_id, 2, None).await.unwrap();
    assert_eq!(receipt.status, TicketStatus::Redeemed);
    assert_eq!(receipt.redeemed, 5);

    let third = harness.ledger.redemptions.redeem(ticket_id, 1, None).await;
    assert!(matches!(third, Err(LedgerError::FullyRedeemed { .. })));

    let stored = harness.ledger.reservations.get_ticket(ticket_id).await.unwrap();
    assert_eq!(stored.redeemed_count, 5);
    assert_eq!(stored.status, TicketStatus::Redeemed);
}

#[tokio::test]
async fn test_scenario_d_duplicate_webhook_issues_one_ticket() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 10, 1_500).await;
    let payment_id =
        harness.approve_ticket_payment("77001", UserId::new(), &tier, 1, Money::from_cents(1_500));

    let notification = WebhookNotification::payment("77001");
    let first = harness.ledger.reconciler.handle_webhook(&notification).await;
    let second = harness.ledger.reconciler.handle_webhook(&notification).await;

    assert!(matches!(first, WebhookOutcome::Applied(ref r) if !r.replayed));
    assert!(matches!(second, WebhookOutcome::Applied(ref r) if r.replayed));
    assert_eq!(harness.store.tickets_with_payment(&payment_id).await.len(), 1);
    assert_eq!(harness.store.tier(tier.id).await.unwrap().remaining_quantity, 9);
    assert_eq!(harness.tracker.calls().len(), 1);
}

#[tokio::test]
async fn test_scenario_e_reaper_reclaims_unconfirmed_ticket_once() {
    let harness = TestHarness::new();
    let mut event = harness.seed_event().await;
    let tier = harness.seed_tier(event.id, 10, 0).await;
    let issued = harness
        .ledger
        .reservations
        .create_reservation(ReservationRequest::new(
            UserId::new(),
            tier.id,
            event.id,
            3,
            TicketOrigin::Purchase,
        ))
        .await
        .unwrap();
    assert_eq!(harness.store.tier(tier.id).await.unwrap().remaining_quantity, 7);

    event.confirmation_requested_at = Some(harness.now());
    event.confirmation_grace_minutes = Some(60);
    harness.store.put_event(event).await;
    harness.clock.advance(Duration::hours(2));

    let report = harness.ledger.reaper.sweep().await.unwrap();
    assert_eq!(report.reclaimed, vec![issued.ticket.id]);
    assert_eq!(report.units_released, 3);

    let ticket = harness.ledger.reservations.get_ticket(issued.ticket.id).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Invalidated);
    assert_eq!(harness.store.tier(tier.id).await.unwrap().remaining_quantity, 10);

    let again = harness.ledger.reaper.sweep().await.unwrap();
    assert!(again.reclaimed.is_empty());
    assert_eq!(harness.store.tier(tier.id).await.unwrap().remaining_quantity, 10);
}

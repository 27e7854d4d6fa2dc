//! Raffle eligibility and draws.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use std::collections::HashSet;
use std::sync::Arc;
use ticket_ledger_core::{Duration, EventInfo, TicketOrigin, UserId};
use ticket_ledger_engine::{RaffleEligibilitySelector, ReservationRequest};
use ticket_ledger_testing::TestHarness;

fn prizes(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

fn seeded(harness: &TestHarness, seed: u64) -> RaffleEligibilitySelector {
    RaffleEligibilitySelector::new(
        harness.store.clone(),
        harness.store.clone(),
        Arc::new(harness.prizes.clone()),
        Arc::new(harness.clock.clone()),
    )
    .with_seed(seed)
}

async fn hold_tickets(harness: &TestHarness, event: &EventInfo, holders: &[UserId]) {
    let tier = harness.seed_tier(event.id, 100, 0).await;
    for holder in holders {
        harness
            .ledger
            .reservations
            .create_reservation(ReservationRequest::new(
                *holder,
                tier.id,
                event.id,
                1,
                TicketOrigin::Purchase,
            ))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_winners_are_distinct_eligible_holders_in_rank_order() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let users: Vec<UserId> = (0..6).map(|_| UserId::new()).collect();
    let mut holders = users.clone();
    holders.push(users[0]);
    hold_tickets(&harness, &event, &holders).await;
    harness.clock.advance(Duration::minutes(1));

    let outcome = harness
        .ledger
        .raffle
        .draw(event.id, harness.now(), &prizes(&["bottle", "table", "shirt"]))
        .await
        .unwrap();

    assert_eq!(outcome.eligible, 6);
    assert_eq!(outcome.winners.len(), 3);
    let distinct: HashSet<_> = outcome.winners.iter().map(|w| w.user_id).collect();
    assert_eq!(distinct.len(), 3);
    assert!(outcome.winners.iter().all(|w| users.contains(&w.user_id)));
    let ranks: Vec<_> = outcome.winners.iter().map(|w| (w.rank, w.prize.as_str())).collect();
    assert_eq!(ranks, vec![(1, "bottle"), (2, "table"), (3, "shirt")]);
    assert_eq!(harness.prizes.calls().len(), 3);
}

#[tokio::test]
async fn test_cutoff_excludes_later_tickets() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let early = UserId::new();
    hold_tickets(&harness, &event, &[early]).await;
    let cutoff = harness.now() + Duration::seconds(30);
    harness.clock.advance(Duration::minutes(1));
    hold_tickets(&harness, &event, &[UserId::new(), UserId::new()]).await;

    let eligible = harness
        .ledger
        .raffle
        .eligible_participants(event.id, cutoff)
        .await
        .unwrap();
    assert_eq!(eligible, vec![early]);
}

#[tokio::test]
async fn test_empty_pool_and_short_pool() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;

    let empty = harness
        .ledger
        .raffle
        .draw(event.id, harness.now(), &prizes(&["bottle"]))
        .await
        .unwrap();
    assert_eq!(empty.eligible, 0);
    assert!(empty.winners.is_empty());

    hold_tickets(&harness, &event, &[UserId::new(), UserId::new()]).await;
    harness.clock.advance(Duration::minutes(1));
    let short = harness
        .ledger
        .raffle
        .draw(event.id, harness.now(), &prizes(&["a", "b", "c"]))
        .await
        .unwrap();
    assert_eq!(short.winners.len(), 2);
    assert_eq!(short.winners[1].prize, "b");
}

#[tokio::test]
async fn test_seeded_draws_are_reproducible() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    let users: Vec<UserId> = (0..20).map(|_| UserId::new()).collect();
    hold_tickets(&harness, &event, &users).await;
    harness.clock.advance(Duration::minutes(1));
    let prizes = prizes(&["a", "b", "c", "d"]);

    let first = seeded(&harness, 7).draw(event.id, harness.now(), &prizes).await.unwrap();
    let second = seeded(&harness, 7).draw(event.id, harness.now(), &prizes).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_prize_failures_do_not_abort_the_draw() {
    let harness = TestHarness::new();
    let event = harness.seed_event().await;
    hold_tickets(&harness, &event, &[UserId::new(), UserId::new()]).await;
    harness.clock.advance(Duration::minutes(1));
    harness.prizes.set_failing(true);

    let outcome = harness
        .ledger
        .raffle
        .draw(event.id, harness.now(), &prizes(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(outcome.winners.len(), 2);
}

#[tokio::test]
async fn test_due_raffles_are_drawn_once() {
    let harness = TestHarness::new();
    let mut event = harness.seed_event().await;
    hold_tickets(&harness, &event, &[UserId::new(), UserId::new(), UserId::new()]).await;
    event.raffle_at = Some(harness.now() + Duration::minutes(10));
    event.raffle_prizes = prizes(&["bottle"]);
    harness.store.put_event(event.clone()).await;

    assert!(harness.ledger.raffle.run_due().await.unwrap().is_empty());

    harness.clock.advance(Duration::minutes(15));
    let outcomes = harness.ledger.raffle.run_due().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].event_id, event.id);
    assert_eq!(outcomes[0].eligible, 3);
    assert_eq!(outcomes[0].winners.len(), 1);
    assert!(harness.store.event(event.id).await.unwrap().raffle_drawn);

    assert!(harness.ledger.raffle.run_due().await.unwrap().is_empty());
    assert_eq!(harness.prizes.calls().len(), 1);
}

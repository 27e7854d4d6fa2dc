//! Raffle draws over the ledger.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeSet;
use std::sync::Arc;
use ticket_ledger_core::environment::Clock;
use ticket_ledger_core::providers::{EventDirectory, PrizeGrantor};
use ticket_ledger_core::store::{BoxFuture, LedgerStore};
use ticket_ledger_core::{
    DateTime, EventId, RaffleOutcome, RaffleWinner, Result, UserId, Utc,
};

use crate::metrics;
use crate::scheduler::PeriodicJob;

/// Draws winners among ticket holders. Read-only with respect to the ledger.
#[derive(Clone)]
pub struct RaffleEligibilitySelector {
    store: Arc<dyn LedgerStore>,
    events: Arc<dyn EventDirectory>,
    prizes: Arc<dyn PrizeGrantor>,
    clock: Arc<dyn Clock>,
    seed: Option<u64>,
}

impl RaffleEligibilitySelector {
    /// Create the selector.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        events: Arc<dyn EventDirectory>,
        prizes: Arc<dyn PrizeGrantor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            events,
            prizes,
            clock,
            seed: None,
        }
    }

    /// Use a fixed RNG seed so draws are reproducible.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Distinct holders of tickets for `event_id` created before `cutoff`, sorted.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn eligible_participants(
        &self,
        event_id: EventId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UserId>> {
        let tickets = self.store.tickets_created_before(event_id, cutoff).await?;
        let users: BTreeSet<UserId> = tickets.into_iter().map(|t| t.user_id).collect();
        Ok(users.into_iter().collect())
    }

    /// Draw one winner per prize, uniformly and without replacement.
    ///
    /// Winner `i` (1-based rank) gets `prizes[i - 1]`. With fewer
    /// participants than prizes, trailing prizes go unawarded; with none the
    /// draw completes with no winners.
    ///
    /// # Errors
    ///
    /// Storage failures. Prize delivery failures are logged, not returned.
    #[tracing::instrument(skip(self, prizes), fields(prizes = prizes.len()))]
    pub async fn draw(
        &self,
        event_id: EventId,
        cutoff: DateTime<Utc>,
        prizes: &[String],
    ) -> Result<RaffleOutcome> {
        let participants = self.eligible_participants(event_id, cutoff).await?;
        let winners = self.pick(&participants, prizes);

        for winner in &winners {
            if let Err(err) = self.prizes.grant_prize(event_id, winner).await {
                tracing::warn!(
                    rank = winner.rank,
                    user_id = %winner.user_id,
                    error = %err,
                    "Prize grant failed"
                );
            }
        }

        metrics::record_raffle_winners(winners.len());
        tracing::info!(
            eligible = participants.len(),
            winners = winners.len(),
            "Raffle drawn"
        );
        Ok(RaffleOutcome {
            event_id,
            eligible: participants.len(),
            winners,
        })
    }

    /// Draw every raffle whose scheduled time has passed, once each.
    ///
    /// A failing event is logged and left undrawn for the next run.
    ///
    /// # Errors
    ///
    /// Failure to list due events.
    pub async fn run_due(&self) -> Result<Vec<RaffleOutcome>> {
        let now = self.clock.now();
        let due = self.events.events_due_for_raffle(now).await?;
        let mut outcomes = Vec::with_capacity(due.len());

        for event in due {
            let cutoff = event.raffle_at.unwrap_or(now);
            let outcome = match self.draw(event.id, cutoff, &event.raffle_prizes).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(event_id = %event.id, error = %err, "Scheduled raffle failed");
                    continue;
                }
            };
            if let Err(err) = self.events.mark_raffle_drawn(event.id).await {
                tracing::error!(event_id = %event.id, error = %err, "Could not mark raffle drawn");
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn pick(&self, participants: &[UserId], prizes: &[String]) -> Vec<RaffleWinner> {
        let amount = participants.len().min(prizes.len());
        if amount == 0 {
            return Vec::new();
        }
        let mut rng = self
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        rand::seq::index::sample(&mut rng, participants.len(), amount)
            .into_iter()
            .zip(prizes)
            .zip(1u32..)
            .map(|((index, prize), rank)| RaffleWinner {
                rank,
                user_id: participants[index],
                prize: prize.clone(),
            })
            .collect()
    }
}

impl PeriodicJob for RaffleEligibilitySelector {
    fn name(&self) -> &'static str {
        "raffle-draw"
    }

    fn run(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.run_due().await.map(|_| ()) })
    }
}

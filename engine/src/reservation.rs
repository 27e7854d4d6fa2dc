//! Ticket issuance and lifecycle.

use std::sync::Arc;
use ticket_ledger_core::environment::Clock;
use ticket_ledger_core::pricing::{classify_payment, expected_total, validate_quantity};
use ticket_ledger_core::providers::{IssuanceNotifier, RewardsGrantor, UserDirectory};
use ticket_ledger_core::store::LedgerStore;
use ticket_ledger_core::{
    DateTime, EventId, ExternalPaymentId, LedgerError, Money, Result, Ticket, TicketId,
    TicketOrigin, TicketStatus, TicketTier, TierId, UserId, Utc,
};

use crate::{LedgerPolicy, abort, inventory::InventoryPool, metrics};

/// Input to [`ReservationLedger::create_reservation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Ticket holder
    pub user_id: UserId,
    /// Tier to consume
    pub tier_id: TierId,
    /// Event the buyer asked for (must own the tier)
    pub event_id: EventId,
    /// Head-count as received (validated here)
    pub quantity: i64,
    /// Payer or issuer, when not the holder
    pub purchased_by: Option<UserId>,
    /// Amount already settled
    pub amount_paid: Money,
    /// Provider payment that funds this ticket
    pub payment_id: Option<ExternalPaymentId>,
    /// Provenance
    pub origin: TicketOrigin,
    /// Note for venue staff
    pub special_instructions: Option<String>,
}

impl ReservationRequest {
    /// Unpaid request for `quantity` units issued to `user_id`.
    #[must_use]
    pub const fn new(
        user_id: UserId,
        tier_id: TierId,
        event_id: EventId,
        quantity: i64,
        origin: TicketOrigin,
    ) -> Self {
        Self {
            user_id,
            tier_id,
            event_id,
            quantity,
            purchased_by: None,
            amount_paid: Money::ZERO,
            payment_id: None,
            origin,
            special_instructions: None,
        }
    }

    /// Attach a settled provider payment.
    #[must_use]
    pub fn paid(mut self, payment_id: ExternalPaymentId, amount: Money) -> Self {
        self.payment_id = Some(payment_id);
        self.amount_paid = amount;
        self
    }

    /// Record who paid or issued the ticket.
    #[must_use]
    pub const fn purchased_by(mut self, user_id: UserId) -> Self {
        self.purchased_by = Some(user_id);
        self
    }

    /// Attach a note for venue staff.
    #[must_use]
    pub fn with_instructions(mut self, note: impl Into<String>) -> Self {
        self.special_instructions = Some(note.into());
        self
    }
}

/// A ticket handed back by issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    /// The ticket
    pub ticket: Ticket,
    /// `true` when the payment ID had already produced this ticket
    pub replayed: bool,
}

/// Creates, mutates and queries tickets.
#[derive(Clone)]
pub struct ReservationLedger {
    store: Arc<dyn LedgerStore>,
    inventory: InventoryPool,
    users: Arc<dyn UserDirectory>,
    rewards: Arc<dyn RewardsGrantor>,
    notifier: Arc<dyn IssuanceNotifier>,
    clock: Arc<dyn Clock>,
    policy: LedgerPolicy,
}

impl ReservationLedger {
    /// Create the ledger service.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        inventory: InventoryPool,
        users: Arc<dyn UserDirectory>,
        rewards: Arc<dyn RewardsGrantor>,
        notifier: Arc<dyn IssuanceNotifier>,
        clock: Arc<dyn Clock>,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            store,
            inventory,
            users,
            rewards,
            notifier,
            clock,
            policy,
        }
    }

    /// Issue a ticket, reserving stock in the same transaction unless the
    /// origin is exempt.
    ///
    /// A request carrying a payment ID that already produced a ticket returns
    /// that ticket with `replayed = true` and changes nothing.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity`, `NotFound` (tier), `TierEventMismatch`,
    /// `InsufficientStock`, or storage failures.
    #[tracing::instrument(
        skip(self, request),
        fields(tier_id = %request.tier_id, user_id = %request.user_id, origin = %request.origin)
    )]
    pub async fn create_reservation(&self, request: ReservationRequest) -> Result<Issuance> {
        let quantity = validate_quantity(request.quantity)?;
        let tier = self.load_tier(request.tier_id).await?;
        if tier.event_id != request.event_id {
            return Err(LedgerError::TierEventMismatch {
                tier_id: tier.id,
                event_id: request.event_id,
            });
        }

        let expected = expected_total(&tier, quantity)?;
        let status = classify_payment(expected, request.amount_paid, self.policy.payment_tolerance);
        let ticket = Ticket {
            id: TicketId::new(),
            user_id: request.user_id,
            purchased_by: request.purchased_by,
            tier_id: tier.id,
            event_id: tier.event_id,
            quantity,
            redeemed_count: 0,
            status,
            amount_paid: request.amount_paid,
            payment_id: request.payment_id,
            origin: request.origin,
            special_instructions: request.special_instructions,
            created_at: self.clock.now(),
            confirmed_at: None,
            validated_at: None,
        };

        // Insert before reserving: a concurrent writer for the same payment
        // must hit the unique payment ID, not the emptied stock.
        let mut tx = self.store.begin().await?;
        let inserted = tx.insert_ticket(&ticket).await;
        match inserted {
            Ok(()) => {}
            Err(LedgerError::AlreadyProcessed { payment_id }) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                return self.replay(payment_id, ticket.amount_paid).await;
            }
            Err(err) => return abort(tx, err).await,
        }
        let reserved = self
            .inventory
            .reserve(tx.as_mut(), tier.id, quantity, ticket.origin)
            .await;
        if let Err(err) = reserved {
            return abort(tx, err).await;
        }
        tx.commit().await?;

        metrics::record_issued(ticket.origin, 1);
        tracing::info!(
            ticket_id = %ticket.id,
            quantity,
            status = %ticket.status,
            "Ticket issued"
        );

        self.after_issue(&tier, &ticket).await;
        Ok(Issuance {
            ticket,
            replayed: false,
        })
    }

    /// Delete a ticket, returning its stock unless it never held any.
    ///
    /// # Errors
    ///
    /// `NotFound` if the ticket does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn delete_reservation(&self, ticket_id: TicketId) -> Result<Ticket> {
        let mut tx = self.store.begin().await?;
        let locked = tx.lock_ticket(ticket_id).await;
        let ticket = match locked {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return abort(tx, LedgerError::not_found("ticket", ticket_id)).await,
            Err(err) => return abort(tx, err).await,
        };

        let released = self.inventory.release_ticket(tx.as_mut(), &ticket).await;
        if let Err(err) = released {
            return abort(tx, err).await;
        }
        let deleted = tx.delete_ticket(ticket_id).await;
        if let Err(err) = deleted {
            return abort(tx, err).await;
        }
        tx.commit().await?;

        tracing::info!(
            quantity = ticket.quantity,
            released = ticket.holds_stock(),
            "Ticket deleted"
        );
        Ok(ticket)
    }

    /// Holder confirms attendance, which exempts the ticket from reclamation.
    ///
    /// Confirming twice keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// `NotFound` if the ticket does not exist or belongs to someone else,
    /// `TerminalState` if it is redeemed or invalidated.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, ticket_id: TicketId, owner: UserId) -> Result<Ticket> {
        let mut tx = self.store.begin().await?;
        let locked = tx.lock_ticket(ticket_id).await;
        let mut ticket = match locked {
            Ok(Some(ticket)) if ticket.user_id == owner => ticket,
            Ok(_) => return abort(tx, LedgerError::not_found("ticket", ticket_id)).await,
            Err(err) => return abort(tx, err).await,
        };
        if ticket.status.is_terminal() {
            let err = LedgerError::TerminalState {
                ticket_id,
                status: ticket.status.to_string(),
            };
            return abort(tx, err).await;
        }
        if ticket.confirmed_at.is_some() {
            tx.rollback().await?;
            return Ok(ticket);
        }

        ticket.confirmed_at = Some(self.clock.now());
        let updated = tx.update_ticket(&ticket).await;
        if let Err(err) = updated {
            return abort(tx, err).await;
        }
        tx.commit().await?;

        tracing::info!("Attendance confirmed");
        Ok(ticket)
    }

    /// Issue `count` physical-print tickets of `quantity_per_ticket` each.
    ///
    /// Prints are exempt from stock accounting; all of them commit together.
    /// They belong to `requested_by` until handed out.
    ///
    /// # Errors
    ///
    /// `InvalidQuantity` for a zero count or bad quantity, `NotFound` (tier).
    #[tracing::instrument(skip(self))]
    pub async fn issue_physical_print(
        &self,
        tier_id: TierId,
        count: u32,
        quantity_per_ticket: i64,
        requested_by: UserId,
    ) -> Result<Vec<Ticket>> {
        if count == 0 {
            return Err(LedgerError::InvalidQuantity { quantity: 0 });
        }
        let quantity = validate_quantity(quantity_per_ticket)?;
        let tier = self.load_tier(tier_id).await?;
        let now = self.clock.now();

        let tickets: Vec<Ticket> = (0..count)
            .map(|_| Ticket {
                id: TicketId::new(),
                user_id: requested_by,
                purchased_by: Some(requested_by),
                tier_id: tier.id,
                event_id: tier.event_id,
                quantity,
                redeemed_count: 0,
                status: TicketStatus::Valid,
                amount_paid: Money::ZERO,
                payment_id: None,
                origin: TicketOrigin::PhysicalPrint,
                special_instructions: None,
                created_at: now,
                confirmed_at: None,
                validated_at: None,
            })
            .collect();

        let mut tx = self.store.begin().await?;
        for ticket in &tickets {
            let inserted = tx.insert_ticket(ticket).await;
            if let Err(err) = inserted {
                return abort(tx, err).await;
            }
        }
        tx.commit().await?;

        metrics::record_issued(TicketOrigin::PhysicalPrint, u64::from(count));
        tracing::info!(count, quantity, "Physical print run issued");
        Ok(tickets)
    }

    /// Issue an owner invitation to `email`, creating the user if needed.
    ///
    /// # Errors
    ///
    /// Directory failures, plus everything [`Self::create_reservation`] returns.
    #[tracing::instrument(skip(self, email))]
    pub async fn issue_invitation(
        &self,
        tier_id: TierId,
        email: &str,
        quantity: i64,
        issued_by: UserId,
    ) -> Result<Ticket> {
        let tier = self.load_tier(tier_id).await?;
        let holder = self.users.resolve_or_create(email).await?;
        let request = ReservationRequest::new(
            holder,
            tier.id,
            tier.event_id,
            quantity,
            TicketOrigin::OwnerInvitation,
        )
        .purchased_by(issued_by);

        Ok(self.create_reservation(request).await?.ticket)
    }

    /// Raise the paid amount of a `PARTIALLY_PAID` ticket to `settled` and
    /// reclassify it.
    ///
    /// Returns the ticket and whether it changed. Amounts never decrease and
    /// only partially paid tickets are touched.
    ///
    /// # Errors
    ///
    /// `NotFound` if the ticket or its tier does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn apply_settled_amount(
        &self,
        ticket_id: TicketId,
        settled: Money,
    ) -> Result<(Ticket, bool)> {
        let snapshot = self.get_ticket(ticket_id).await?;
        if snapshot.status != TicketStatus::PartiallyPaid || settled <= snapshot.amount_paid {
            return Ok((snapshot, false));
        }
        let tier = self.load_tier(snapshot.tier_id).await?;
        let expected = expected_total(&tier, snapshot.quantity)?;

        let mut tx = self.store.begin().await?;
        let locked = tx.lock_ticket(ticket_id).await;
        let mut ticket = match locked {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return abort(tx, LedgerError::not_found("ticket", ticket_id)).await,
            Err(err) => return abort(tx, err).await,
        };
        if ticket.status != TicketStatus::PartiallyPaid || settled <= ticket.amount_paid {
            tx.rollback().await?;
            return Ok((ticket, false));
        }

        ticket.amount_paid = settled;
        ticket.status = classify_payment(expected, settled, self.policy.payment_tolerance);
        let updated = tx.update_ticket(&ticket).await;
        if let Err(err) = updated {
            return abort(tx, err).await;
        }
        tx.commit().await?;

        tracing::info!(
            amount_paid = %ticket.amount_paid,
            status = %ticket.status,
            "Partial payment topped up"
        );
        Ok((ticket, true))
    }

    /// Look up a ticket.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    pub async fn get_ticket(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("ticket", ticket_id))
    }

    /// Tickets held by a user.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn tickets_for_user(&self, user_id: UserId) -> Result<Vec<Ticket>> {
        self.store.tickets_by_user(user_id).await
    }

    /// The ticket funded by a payment, if any.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn ticket_by_payment(&self, payment_id: &ExternalPaymentId) -> Result<Option<Ticket>> {
        self.store.ticket_by_payment(payment_id).await
    }

    /// Tickets for an event created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn tickets_created_before(
        &self,
        event_id: EventId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        self.store.tickets_created_before(event_id, cutoff).await
    }

    /// Scan history for an event since `since`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn scan_history(
        &self,
        event_id: EventId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        self.store.tickets_validated_since(event_id, since).await
    }

    async fn load_tier(&self, tier_id: TierId) -> Result<TicketTier> {
        self.store
            .get_tier(tier_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("tier", tier_id))
    }

    async fn replay(&self, payment_id: ExternalPaymentId, settled: Money) -> Result<Issuance> {
        tracing::info!(%payment_id, "Payment already applied, returning existing ticket");
        match self.store.ticket_by_payment(&payment_id).await? {
            Some(existing) => {
                let (ticket, _) = self.apply_settled_amount(existing.id, settled).await?;
                Ok(Issuance {
                    ticket,
                    replayed: true,
                })
            }
            // The winning writer's ticket was deleted in between.
            None => Err(LedgerError::AlreadyProcessed { payment_id }),
        }
    }

    async fn after_issue(&self, tier: &TicketTier, ticket: &Ticket) {
        if let Some(reward_id) = tier.bonus_reward_id {
            for unit in 0..ticket.quantity {
                if let Err(err) = self
                    .rewards
                    .grant_bonus(ticket.user_id, reward_id, ticket.id)
                    .await
                {
                    tracing::warn!(
                        ticket_id = %ticket.id,
                        %reward_id,
                        unit,
                        error = %err,
                        "Bonus reward grant failed"
                    );
                }
            }
        }

        if let Err(err) = self.notifier.ticket_issued(ticket).await {
            tracing::warn!(ticket_id = %ticket.id, error = %err, "Issuance notification failed");
        }
    }
}

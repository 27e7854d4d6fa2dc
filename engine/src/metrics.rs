//! Business metrics for the ledger.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `ticket_ledger_reservations_total{origin}` - Tickets issued by origin
//! - `ticket_ledger_stock_rejections_total` - Reservations refused for lack of stock
//! - `ticket_ledger_payments_total{outcome}` - Payment finalizations by outcome
//!   (`issued`, `replayed`, `topped_up`, `not_approved`, `failed`)
//! - `ticket_ledger_redemptions_total{outcome}` - Scans by outcome
//! - `ticket_ledger_reclaimed_total` - Tickets reclaimed by the reaper
//! - `ticket_ledger_raffle_winners_total` - Raffle winners drawn

use metrics::describe_counter;
use ticket_ledger_core::TicketOrigin;

/// Register all metric descriptions.
///
/// Call once at start-up, after the recorder is installed.
pub fn register_ledger_metrics() {
    describe_counter!(
        "ticket_ledger_reservations_total",
        "Total number of tickets issued, labelled by origin"
    );
    describe_counter!(
        "ticket_ledger_stock_rejections_total",
        "Reservations rejected because the tier ran out of stock"
    );
    describe_counter!(
        "ticket_ledger_payments_total",
        "Payment finalizations by outcome"
    );
    describe_counter!(
        "ticket_ledger_redemptions_total",
        "Ticket scans by outcome (accepted or the rejection reason)"
    );
    describe_counter!(
        "ticket_ledger_reclaimed_total",
        "Unconfirmed tickets invalidated by the expiration reaper"
    );
    describe_counter!(
        "ticket_ledger_raffle_winners_total",
        "Raffle winners drawn"
    );

    tracing::info!("Ledger metrics registered");
}

pub(crate) fn record_issued(origin: TicketOrigin, count: u64) {
    metrics::counter!("ticket_ledger_reservations_total", "origin" => origin.as_str())
        .increment(count);
}

pub(crate) fn record_stock_rejection() {
    metrics::counter!("ticket_ledger_stock_rejections_total").increment(1);
}

pub(crate) fn record_payment(outcome: &'static str) {
    metrics::counter!("ticket_ledger_payments_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_redemption(outcome: &'static str) {
    metrics::counter!("ticket_ledger_redemptions_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_reclaimed(count: usize) {
    metrics::counter!("ticket_ledger_reclaimed_total").increment(count as u64);
}

pub(crate) fn record_raffle_winners(count: usize) {
    metrics::counter!("ticket_ledger_raffle_winners_total").increment(count as u64);
}

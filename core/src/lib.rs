//! # Ticket Ledger Core
//!
//! Domain types, policies and repository traits for the ticket ledger.
//!
//! The ledger turns a finite pool of tier slots into uniquely identified,
//! partially redeemable tickets while staying consistent under concurrent
//! purchases, at-least-once payment notifications, partial payments and
//! time-based reclamation.
//!
//! ## Layout
//!
//! - [`types`]: ids, [`Money`](types::Money), tiers, tickets, statuses, origins
//! - [`error`]: the [`LedgerError`](error::LedgerError) taxonomy
//! - [`environment`]: the [`Clock`](environment::Clock) seam
//! - [`store`]: [`LedgerStore`](store::LedgerStore) and
//!   [`LedgerTransaction`](store::LedgerTransaction)
//! - [`providers`]: payment provider, directories, best-effort side effects
//! - [`envelope`]: the payment envelope codec
//! - [`pricing`] and [`redemption`]: pure policies
//! - [`wire`]: serde helpers for provider payloads
//!
//! This crate does no I/O; services live in `ticket-ledger-engine`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod environment;
pub mod error;
pub mod pricing;
pub mod providers;
pub mod redemption;
pub mod store;
pub mod types;
pub mod wire;

// Re-export commonly used types
pub use chrono::{DateTime, Duration, Utc};
pub use error::{CollaboratorError, LedgerError, Result};
pub use types::*;

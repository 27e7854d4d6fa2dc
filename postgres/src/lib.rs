//! `PostgreSQL` ledger store for the ticket ledger.
//!
//! [`PostgresLedgerStore`] implements `LedgerStore`, `EventDirectory` and
//! `UserDirectory` from `ticket-ledger-core` over a single sqlx pool:
//!
//! - Conditional stock decrements (`WHERE remaining_quantity >= $n`)
//! - Row locks on tickets for every read-modify-write
//! - `FOR UPDATE SKIP LOCKED` batches for the reaper
//! - Payment-id unique constraints surfaced as `AlreadyProcessed`
//! - Embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use ticket_ledger_postgres::{PoolSettings, PostgresLedgerStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresLedgerStore::connect("postgres://localhost/tickets", PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod store;
mod transaction;

pub use store::{PoolSettings, PostgresLedgerStore};
pub use transaction::PgTransaction;

//! # Ticket Ledger Testing
//!
//! Testing utilities for the ticket ledger.
//!
//! This crate provides:
//! - [`InMemoryLedgerStore`]: transactional in-memory store, event directory and user directory
//! - [`MockPaymentProvider`] and recording collaborators for every side effect
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - Fixtures and a fully wired [`TestHarness`]
//! - proptest strategies in [`properties`]
//!
//! ## Example
//!
//! ```ignore
//! use ticket_ledger_testing::TestHarness;
//!
//! #[tokio::test]
//! async fn test_issue() {
//!     let harness = TestHarness::new();
//!     let event = harness.seed_event().await;
//!     let tier = harness.seed_tier(event.id, 10, 2_500).await;
//!     // drive harness.ledger ...
//! }
//! ```

pub mod clock;
pub mod fixtures;
pub mod properties;
pub mod providers;
pub mod store;

pub use clock::{FixedClock, ManualClock, test_clock, test_epoch};
pub use fixtures::{TestHarness, event_fixture, test_policy, ticket_fixture, tier_fixture};
pub use providers::{
    MockPaymentProvider, RecordingNotifier, RecordingPoints, RecordingPrizes, RecordingRewards,
    RecordingTracker,
};
pub use store::InMemoryLedgerStore;

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

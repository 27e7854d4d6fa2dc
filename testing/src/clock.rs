//! Deterministic clocks.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Poisoned locks only happen after a test already failed
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use ticket_ledger_core::environment::Clock;

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use ticket_ledger_testing::FixedClock;
/// use ticket_ledger_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move forward by `by`.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap();
        *time += by;
    }

    /// Jump to `time`.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.lock().unwrap() = time;
    }
}

impl Clock for ManualClock {
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }
}

/// The instant every test clock starts at (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// This function will panic if the hardcoded timestamp fails to parse,
/// which should never happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .expect("hardcoded timestamp should always parse")
        .with_timezone(&Utc)
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(test_epoch())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(test_epoch());
        let other = clock.clone();
        clock.advance(Duration::hours(2));
        assert_eq!(other.now(), test_epoch() + Duration::hours(2));
    }
}

//! Application state shared by every handler.

use std::sync::Arc;
use ticket_ledger_core::store::LedgerStore;
use ticket_ledger_engine::Ledger;

/// Services plus the store (for readiness probes).
///
/// Cheap to clone: everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// The ledger services
    pub ledger: Ledger,
    /// Datastore backing the services
    pub store: Arc<dyn LedgerStore>,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub fn new(ledger: Ledger, store: Arc<dyn LedgerStore>) -> Self {
        Self { ledger, store }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}

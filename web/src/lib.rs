//! Axum HTTP shell for the ticket ledger.
//!
//! Handlers are thin: extract, call one ledger service, map the result.
//! Every [`LedgerError`](ticket_ledger_core::LedgerError) becomes an
//! [`AppError`] with a stable code (`SOLD_OUT`, `PAYMENT_NOT_APPROVED`,
//! `FULLY_REDEEMED`, ...) so clients never parse messages.
//!
//! # Example
//!
//! ```ignore
//! use ticket_ledger_web::{AppState, router};
//!
//! let app = router(AppState::new(ledger, store));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

//! Ticket ledger server.
//!
//! Production adapters and process wiring around the ledger services:
//! env [`Config`], the `reqwest` [`HttpPaymentProvider`], logging side-effect
//! adapters, the Prometheus exporter and [`Application`], which owns the
//! HTTP listener, the reaper/raffle schedules and graceful shutdown.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod collaborators;
pub mod config;
pub mod metrics;
pub mod payment;

pub use app::{Application, ledger_policy};
pub use config::Config;
pub use payment::HttpPaymentProvider;

//! HTTP request handlers, grouped by audience.

pub mod admin;
pub mod health;
pub mod payments;
pub mod tickets;

pub use health::{health_check, readiness};

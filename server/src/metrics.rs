//! Prometheus exporter.
//!
//! Installs the global `metrics` recorder, describes the ledger metrics and
//! serves `GET /metrics` on its own listener so scrapes never share the API
//! port.

use axum::{Router, routing::get};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus metrics server.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: PrometheusHandle,
}

impl MetricsServer {
    /// Install the recorder and describe every metric.
    ///
    /// # Errors
    ///
    /// [`MetricsError::Install`] if a recorder is already installed.
    pub fn install(addr: SocketAddr) -> Result<Self, MetricsError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        ticket_ledger_engine::metrics::register_ledger_metrics();
        describe_counter!(
            "ticket_ledger_webhooks_total",
            "Provider webhook deliveries by outcome"
        );
        describe_counter!(
            "ticket_ledger_postgres_payment_conflicts_total",
            "Inserts that lost the race on a payment id"
        );

        Ok(Self { addr, handle })
    }

    /// Render current metrics in Prometheus format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Serve `/metrics` until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// [`MetricsError::Bind`] if the address is taken.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), MetricsError> {
        let handle = self.handle.clone();
        let app = Router::new().route("/metrics", get(move || async move { handle.render() }));
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "Metrics server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;
        Ok(())
    }
}

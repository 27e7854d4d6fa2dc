//! Process wiring: store, services, HTTP, background jobs, shutdown.

use anyhow::Context;
use std::sync::Arc;
use ticket_ledger_core::environment::SystemClock;
use ticket_ledger_core::{Money, store::LedgerStore};
use ticket_ledger_engine::scheduler::{PeriodicJob, spawn_periodic};
use ticket_ledger_engine::{Ledger, LedgerEnvironment, LedgerPolicy};
use ticket_ledger_postgres::{PoolSettings, PostgresLedgerStore};
use ticket_ledger_web::{AppState, router};
use tokio::sync::broadcast;

use crate::collaborators::LoggingCollaborators;
use crate::config::Config;
use crate::metrics::MetricsServer;
use crate::payment::HttpPaymentProvider;

/// Engine policy derived from configuration.
#[must_use]
pub fn ledger_policy(config: &Config) -> LedgerPolicy {
    LedgerPolicy {
        payment_tolerance: Money::from_cents(config.payment.tolerance_cents),
        provider_timeout: config.payment.timeout(),
        default_confirmation_grace: chrono::Duration::minutes(
            config.scheduler.default_confirmation_grace_minutes,
        ),
        ..LedgerPolicy::default()
    }
}

/// A fully wired server, ready to run.
pub struct Application {
    config: Config,
    store: Arc<PostgresLedgerStore>,
    ledger: Ledger,
}

impl Application {
    /// Connect to the database, apply migrations and wire the services.
    ///
    /// # Errors
    ///
    /// Database connection, migration or HTTP client construction failures.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let settings = PoolSettings {
            max_connections: config.postgres.max_connections,
            min_connections: config.postgres.min_connections,
            connect_timeout: config.postgres.connect_timeout(),
        };
        let store = PostgresLedgerStore::connect(&config.postgres.url, settings)
            .await
            .context("connecting to PostgreSQL")?;
        tracing::info!("PostgreSQL connected");

        store.migrate().await.context("running migrations")?;
        tracing::info!("Migrations complete");

        let store = Arc::new(store);
        let payments = HttpPaymentProvider::new(&config.payment).context("building payment client")?;
        let collaborators = Arc::new(LoggingCollaborators);

        let ledger = Ledger::new(LedgerEnvironment {
            store: store.clone(),
            events: store.clone(),
            users: store.clone(),
            payments: Arc::new(payments),
            rewards: collaborators.clone(),
            points: collaborators.clone(),
            notifier: collaborators.clone(),
            tracker: collaborators.clone(),
            prizes: collaborators,
            clock: Arc::new(SystemClock),
            policy: ledger_policy(&config),
        });

        Ok(Self {
            config,
            store,
            ledger,
        })
    }

    /// Serve HTTP and run the background jobs until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Bind failures or a server error.
    pub async fn run(self) -> anyhow::Result<()> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let metrics = MetricsServer::install(self.config.server.metrics_addr()?)?;
        let metrics_task = tokio::spawn(metrics.serve(shutdown_tx.subscribe()));

        let every = |secs: u64| std::time::Duration::from_secs(secs.max(1));
        let reaper: Arc<dyn PeriodicJob> = Arc::new(self.ledger.reaper.clone());
        let raffle: Arc<dyn PeriodicJob> = Arc::new(self.ledger.raffle.clone());
        let jobs = vec![
            spawn_periodic(
                reaper,
                every(self.config.scheduler.reaper_interval_secs),
                shutdown_tx.subscribe(),
            ),
            spawn_periodic(
                raffle,
                every(self.config.scheduler.raffle_interval_secs),
                shutdown_tx.subscribe(),
            ),
        ];

        let store: Arc<dyn LedgerStore> = self.store.clone();
        let app = router(AppState::new(self.ledger.clone(), store));
        let addr = self.config.server.addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        tracing::info!(%addr, "Ticket ledger listening");

        let signal_tx = shutdown_tx.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received");
                let _ = signal_tx.send(());
            })
            .await
            .context("HTTP server error")?;

        let drain = async {
            for job in jobs {
                if let Err(err) = job.await {
                    tracing::warn!(error = %err, "Background job ended abnormally");
                }
            }
            match metrics_task.await {
                Ok(Err(err)) => tracing::warn!(error = %err, "Metrics server failed"),
                Err(err) => tracing::warn!(error = %err, "Metrics task ended abnormally"),
                Ok(Ok(())) => {}
            }
        };
        if tokio::time::timeout(self.config.server.shutdown_timeout(), drain)
            .await
            .is_err()
        {
            tracing::warn!("Background work did not stop within the shutdown timeout");
        }
        self.store.pool().close().await;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_follows_config() {
        let config = Config::from_lookup(|key| match key {
            "PAYMENT_TOLERANCE_CENTS" => Some("250".to_string()),
            "PAYMENT_TIMEOUT_MS" => Some("1500".to_string()),
            "DEFAULT_CONFIRMATION_GRACE_MINUTES" => Some("15".to_string()),
            _ => None,
        });
        let policy = ledger_policy(&config);
        assert_eq!(policy.payment_tolerance, Money::from_cents(250));
        assert_eq!(policy.provider_timeout, std::time::Duration::from_millis(1_500));
        assert_eq!(policy.default_confirmation_grace, chrono::Duration::minutes(15));
        assert_eq!(policy.reclaim_batch_size, LedgerPolicy::default().reclaim_batch_size);
    }
}

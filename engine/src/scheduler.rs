//! Ticker loop for background sweeps.
//!
//! Jobs are plain idempotent functions ([`PeriodicJob::run`]); the scheduler
//! only decides when to call them, so tests call the same functions directly.

use std::sync::Arc;
use std::time::Duration;
use ticket_ledger_core::Result;
use ticket_ledger_core::store::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A job run on a fixed schedule.
pub trait PeriodicJob: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Run once.
    fn run(&self) -> BoxFuture<'_, Result<()>>;
}

/// Run `job` every `every` until `shutdown` fires.
///
/// The first run happens one period after spawning. A run that overlaps the
/// next tick delays it rather than queueing extra runs. A failed run is
/// logged and the schedule continues.
pub fn spawn_periodic(
    job: Arc<dyn PeriodicJob>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(job = job.name(), every_secs = every.as_secs(), "Periodic job scheduled");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(job = job.name(), "Periodic job stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = job.run().await {
                        tracing::error!(job = job.name(), error = %err, "Periodic job failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ticket_ledger_core::LedgerError;

    struct Counting {
        runs: AtomicUsize,
        fail: bool,
    }

    impl PeriodicJob for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.runs.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    Err(LedgerError::Storage("down".into()))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_runs_until_shutdown_even_when_failing() {
        let job = Arc::new(Counting {
            runs: AtomicUsize::new(0),
            fail: true,
        });
        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_periodic(
            Arc::clone(&job) as Arc<dyn PeriodicJob>,
            Duration::from_millis(10),
            rx,
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = tx.send(());
        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert!(matches!(joined, Ok(Ok(()))));
        assert!(job.runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_first_run_waits_one_period() {
        let job = Arc::new(Counting {
            runs: AtomicUsize::new(0),
            fail: false,
        });
        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_periodic(
            Arc::clone(&job) as Arc<dyn PeriodicJob>,
            Duration::from_secs(60),
            rx,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(());
        let _ = handle.await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}

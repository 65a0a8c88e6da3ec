use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::retry::RetryPolicy;

/// Fires `job` (through the retry wrapper) immediately and then on every
/// interval tick until cancelled. At most one run is in flight; ticks that
/// land while a run is still going are dropped.
pub struct Scheduler<F> {
    period: Duration,
    retry: RetryPolicy,
    job: Arc<F>,
    is_reconciling: Arc<AtomicBool>,
}

impl<F, Fut> Scheduler<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(period: Duration, retry: RetryPolicy, job: F) -> Self {
        Self {
            period,
            retry,
            job: Arc::new(job),
            is_reconciling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs until `cancel` flips to `true` (or its sender goes away), then
    /// waits for the in-flight run before returning.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            "Starting periodic reconcile every {} seconds",
            self.period.as_secs()
        );

        let mut ticker = interval(self.period);
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Triggering periodic reconcile");
                    if let Some(handle) = self.trigger() {
                        in_flight = Some(handle);
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                tracing::error!("[reconcile] Run task failed: {}", e);
            }
        }
    }

    fn trigger(&self) -> Option<JoinHandle<()>> {
        if self
            .is_reconciling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("[reconcile] Already running, dropped tick");
            return None;
        }

        let job = Arc::clone(&self.job);
        let retry = self.retry;
        let is_reconciling = Arc::clone(&self.is_reconciling);

        Some(tokio::spawn(async move {
            let _running = RunningGuard(is_reconciling);
            tracing::debug!("[reconcile] Begin");
            retry.run(|| (*job)()).await;
            tracing::debug!("[reconcile] Done");
        }))
    }
}

/// Clears the in-flight flag when the run ends, even if the job panicked.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

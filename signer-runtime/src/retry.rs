use std::future::Future;

use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds or the attempts are used up, sleeping a
    /// fixed delay between failures. Returns whether an attempt succeeded;
    /// giving up is logged, not propagated.
    pub async fn run<F, Fut>(&self, mut op: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut attempts = 0;

        loop {
            match op().await {
                Ok(()) => return true,
                Err(e) => {
                    attempts += 1;
                    tracing::error!(
                        "[retry] Attempt {}/{} failed: {:#}",
                        attempts,
                        self.max_attempts,
                        e
                    );

                    if attempts >= self.max_attempts {
                        tracing::error!(
                            "[retry] Giving up after {} attempts, waiting for next scheduled run",
                            attempts
                        );
                        return false;
                    }

                    sleep(self.delay).await;
                }
            }
        }
    }
}

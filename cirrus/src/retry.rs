//! Single delayed retry for blob transfers.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default pause before the second attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// One extra attempt after a fixed delay. No backoff, no jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Run `op`, and once more after `delay` if it fails. The second error
    /// is returned as is.
    pub async fn run<F, Fut, T, E>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match op().await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(
                    item = %what,
                    error = %e,
                    delay_ms = self.delay.as_millis() as u64,
                    "Transfer failed, retrying once"
                );
                tokio::time::sleep(self.delay).await;
                op().await
            }
        }
    }
}

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Bounded retry with linearly increasing delay (`base_delay * attempt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            // Zero attempts would never run the operation at all.
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    /// Runs `op` until it succeeds or `max_retries` attempts have been made,
    /// returning the last error.
    pub async fn retry<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.retry_if(label, op, |_| true).await
    }

    /// Like [`retry`](Self::retry), but gives up immediately on errors for
    /// which `should_retry` returns false.
    pub async fn retry_if<T, E, F, Fut, P>(&self, label: &str, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            debug!("{}: attempt {}/{}", label, attempt, self.max_retries);
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_retries || !should_retry(&e) => {
                    warn!("{}: giving up after attempt {}/{}: {}", label, attempt, self.max_retries, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.base_delay * attempt;
                    warn!(
                        "{}: attempt {}/{} failed: {}. Retrying in {:?}",
                        label, attempt, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

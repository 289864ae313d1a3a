//! Bounded retry and polling helpers.
//!
//! Retries are deliberately narrow in this system: the OTP poll loop and
//! transient relay/driver fetches use these helpers, nothing else does.
//! Full authentication attempts are never retried automatically.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Exponential-backoff retry policy for transient operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Runs `op` until it succeeds or `max_attempts` is exhausted, backing
    /// off exponentially between attempts. The last error is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        "{what}: attempt {attempt}/{} failed ({err}), retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Polls `poll` every `poll_interval` until it yields a value or the
/// wall-clock deadline `max_wait` passes.
///
/// The deadline is independent of the poll count: a slow poll eats into
/// the window rather than extending it.
pub async fn poll_until_deadline<T, F, Fut>(
    max_wait: Duration,
    poll_interval: Duration,
    mut poll: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + max_wait;
    loop {
        if let Some(value) = poll().await {
            return Some(value);
        }
        if tokio::time::Instant::now() + poll_interval > deadline {
            return None;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

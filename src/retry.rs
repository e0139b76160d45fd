//! Exponential-backoff retry for outbound calls.

use std::future::Future;
use std::time::Duration;

/// Retry settings shared by the embedding client and the index synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each subsequent failure.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before the retry following the failed 0-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(20))
    }

    /// Run `f` until it succeeds or attempts are exhausted, returning the last error.
    pub async fn run<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(f, |_| true).await
    }

    /// Like [`run`](Self::run), but errors rejected by `should_retry` are returned immediately.
    pub async fn run_if<T, E, F, Fut, P>(&self, mut f: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt + 1 >= self.max_attempts || !should_retry(&e) {
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "Attempt {}/{} failed, retrying in {:?}: {}",
                        attempt + 1,
                        self.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Retry `f` with exponential backoff, up to `max_attempts` total invocations.
pub async fn with_retry<T, E, F, Fut>(f: F, max_attempts: u32, base_delay: Duration) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    RetryPolicy::new(max_attempts, base_delay).run(f).await
}

/// Retry `f` only for errors accepted by `should_retry`.
pub async fn with_retry_if<T, E, F, Fut, P>(
    f: F,
    should_retry: P,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    RetryPolicy::new(max_attempts, base_delay)
        .run_if(f, should_retry)
        .await
}

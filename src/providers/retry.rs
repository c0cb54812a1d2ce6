use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::errors::{AdapterError, AdapterResult};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Bounded retry of transient provider failures.
///
/// Only statuses listed in `retryable_statuses` are retried, with a fixed
/// wait between attempts. Timeouts are retried only when `retry_on_timeout`
/// is set. Everything else is returned on the first failure.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
    /// Fraction of `delay` (0.0 to 1.0) used as random spread.
    pub jitter: f64,
    pub retryable_statuses: Vec<u16>,
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            jitter: 0.0,
            retryable_statuses: Vec::new(),
            retry_on_timeout: false,
        }
    }
}

/// Result of a retried call together with how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: AdapterResult<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_retryable_statuses(mut self, statuses: &[u16]) -> Self {
        self.retryable_statuses = statuses.to_vec();
        self
    }

    pub fn with_retry_on_timeout(mut self, retry_on_timeout: bool) -> Self {
        self.retry_on_timeout = retry_on_timeout;
        self
    }

    pub fn is_retryable(&self, error: &AdapterError) -> bool {
        match error {
            AdapterError::Provider { status_code, .. } => {
                self.retryable_statuses.contains(status_code)
            }
            AdapterError::Transport { timeout: true, .. } => self.retry_on_timeout,
            _ => false,
        }
    }

    fn next_delay(&self) -> Duration {
        if self.jitter <= 0.0 {
            return self.delay;
        }
        let base = self.delay.as_millis() as f64;
        let spread = base * self.jitter;
        let jittered = base + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(error) if attempt < max_attempts && self.is_retryable(&error) => {
                    let delay = self.next_delay();
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure: {}",
                        error
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

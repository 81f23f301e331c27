use std::future::Future;
use std::time::Duration;

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

impl Backoff {
    /// Parse a config value, defaulting to exponential
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "fixed" | "constant" => Backoff::Fixed,
            _ => Backoff::Exponential,
        }
    }
}

/// Result of running an operation under a [`RetryPolicy`]
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success(T),
    Failed { last_error: E, attempts: u32 },
}

/// Bounded retry loop with a backoff schedule and a retryable predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration, max_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            backoff,
        }
    }

    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, Backoff::Fixed)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(error) => {
                    if attempt >= self.max_attempts || !is_retryable(&error) {
                        return RetryOutcome::Failed {
                            last_error: error,
                            attempts: attempt,
                        };
                    }

                    let delay = self.delay_for(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

//! Retry policy, delay calculation, and the shared retry executor.
//!
//! [`with_retry`] runs one asynchronous operation under a [`RetryPolicy`]:
//! every attempt races a timeout, retryable failures back off
//! exponentially with jitter, and the terminal failure is returned as an
//! [`EnhancedError`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::millis;
use crate::error::{EnhancedError, Result};
use crate::stats::Statistics;
use crate::telemetry;
use crate::timer;

/// Upper bound (exclusive) of the random offset added to each delay.
pub const MAX_JITTER: Duration = Duration::from_millis(1_000);

/// Retry behaviour for a single call.
///
/// ```rust
/// # use request_optimizer::RetryPolicy;
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .base_delay(Duration::from_millis(200))
///     .jitter(false);
/// assert_eq!(policy.delay_for_attempt(2, Duration::ZERO), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1s.
    pub base_delay: Duration,
    /// Maximum delay between attempts, jitter included. Default: 8s.
    pub max_delay: Duration,
    /// Multiplier applied per attempt. Default: 2.
    pub backoff_factor: f64,
    /// Per-attempt timeout. Default: 10s.
    pub timeout: Duration,
    /// Whether to add random jitter in `[0, MAX_JITTER)`. Default: true.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(8_000),
            backoff_factor: 2.0,
            timeout: Duration::from_millis(10_000),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before retry number `attempt + 1` (0-indexed attempt).
    ///
    /// `min(base_delay * backoff_factor^attempt + jitter, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let backoff = Duration::try_from_secs_f64(scaled).unwrap_or(self.max_delay);
        backoff.saturating_add(jitter).min(self.max_delay)
    }

    /// Draw a jitter offset, or zero when jitter is disabled.
    pub fn sample_jitter(&self) -> Duration {
        if !self.jitter {
            return Duration::ZERO;
        }
        let millis = rand::rng().random_range(0..millis(MAX_JITTER));
        Duration::from_millis(millis)
    }
}

/// Execute an async operation with timeout and retry logic.
///
/// Each attempt is raced against `policy.timeout`; an expired attempt
/// counts as a retryable failure. Retryable errors (as classified by
/// [`OptimizerError::is_retryable()`](crate::OptimizerError::is_retryable))
/// are retried up to `policy.max_retries` times. Everything else is
/// returned immediately.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    stats: &Statistics,
    f: F,
) -> std::result::Result<T, EnhancedError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match timer::with_timeout(policy.timeout, f()).await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                stats.record_retry();
                metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => operation.to_owned())
                    .increment(1);
                let delay = policy.delay_for_attempt(attempt, policy.sample_jitter());
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = millis(delay),
                    error = %e,
                    "retrying after transient error"
                );
                timer::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(EnhancedError::new(e, attempt)),
        }
    }
}

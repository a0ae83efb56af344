//! Retry with exponential backoff
//!
//! Every Drive request goes through [`RetryPolicy::run`]. Only errors for
//! which [`DriveError::is_transient`] holds are retried; anything else is
//! returned on the first failure.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::DriveError;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Base delay for exponential backoff (1 second)
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for a single backoff sleep
const MAX_DELAY: Duration = Duration::from_secs(64);

/// Retry configuration for Drive requests
///
/// Backoff schedule with the defaults: 1s, 2s, 4s, 8s, 16s. A
/// `Retry-After` sent by the server takes precedence over the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, BASE_DELAY)
    }

    /// The default schedule with a different retry count
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self::new(max_retries, BASE_DELAY)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// Executes `f` until it succeeds, fails permanently, or retries run out
    pub async fn run<F, Fut, T>(&self, operation: &str, f: F) -> Result<T, DriveError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DriveError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation, attempt, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_retries && err.is_transient() => {
                    let delay = err.retry_after().unwrap_or_else(|| self.delay_for(attempt));
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// The header can be either:
/// - An integer number of seconds (e.g., "30")
/// - An HTTP-date (e.g., "Fri, 31 Dec 2025 23:59:59 GMT") - parsed as seconds from now
///
/// Falls back to the default duration if parsing fails.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Some(secs) = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= 3600)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

//! Retry logic with exponential backoff for network operations.
//!
//! Used where a single failure is not meaningful on its own, such as
//! fetching the server list. Latency and transfer probes are never retried:
//! their failures are part of what is being measured.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::errors::ProbeError;

/// Default number of retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (in milliseconds).
pub const DEFAULT_BASE_DELAY_MS: u64 = 250;

/// Maximum delay cap for exponential backoff (in milliseconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 4000;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self { max_retries, base_delay_ms, max_delay_ms }
    }

    /// Delay before retry number `attempt` (zero-based): base * 2^attempt,
    /// capped at max_delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Execute an async operation, retrying retryable failures with
/// exponential backoff.
///
/// Errors for which [`ProbeError::is_retryable`] is false end the loop
/// immediately. The last error is returned when every attempt fails.
pub async fn retry_async<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        "{}: Succeeded on attempt {}",
                        operation_name,
                        attempt + 1
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                warn!("{}: {} (not retrying)", operation_name, e);
                return Err(e);
            }
            Err(e) if attempt + 1 >= total_attempts => {
                warn!(
                    "{}: All {} attempts failed. Last error: {}",
                    operation_name, total_attempts, e
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{}: Attempt {} failed: {}. Retrying in {:?}",
                    operation_name,
                    attempt + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

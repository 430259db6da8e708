//! Page download with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`PageGet`]: Core trait for downloading one page as text
//! - [`RetryGet`]: Decorator that adds retry logic to any `PageGet`
//!
//! # Retry Strategy
//!
//! - Only transient failures are retried (network errors, `429`, `5xx`)
//! - Exponential backoff starting at `base_delay`
//! - Delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use rand::{Rng, rng};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

use crate::error::FetchError;

/// Download a page and return its body.
pub trait PageGet {
    fn get(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Delay before retry number `attempt` (1-based), without jitter.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay)
/// ```
pub fn backoff_delay(base_delay: Duration, max_delay: Duration, attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31) as u32;
    base_delay.saturating_mul(1 << exponent).min(max_delay)
}

/// Wrapper that adds exponential backoff retry logic to any [`PageGet`].
pub struct RetryGet<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: PageGet> RetryGet<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryGet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGet")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> PageGet for RetryGet<T>
where
    T: PageGet + Sync,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.get(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    let elapsed_ms_total = total_t0.elapsed().as_millis() as u64;

                    if !e.is_transient() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total,
                            error = %e,
                            "get() giving up"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = backoff_delay(self.base_delay, self.max_delay, attempt)
                        + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "get() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

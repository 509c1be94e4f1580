//! Retry with exponential backoff for page fetches.

use crate::http::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms, jitter_percent: 10 }
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent;
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self.base_ms.saturating_mul(2u64.saturating_pow(attempt.min(20)));
        let capped_delay = exponential_delay.min(self.max_ms);
        let jitter = if self.jitter_percent > 0 {
            rand::rng().random_range(0..=capped_delay * self.jitter_percent / 100)
        } else {
            0
        };
        Duration::from_millis(capped_delay + jitter)
    }
}

/// Runs `op` up to `attempts` times, sleeping between transient failures.
/// Non-transient errors return immediately.
pub async fn with_retry<T, F, Fut>(
    attempts: u32,
    backoff: &ExponentialBackoff,
    label: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let delay = backoff.delay(attempt);
                warn!("{} failed ({}), retry {}/{} in {:?}", label, e, attempt + 1, attempts - 1, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

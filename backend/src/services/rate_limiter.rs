use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration, Instant};

/// Paces calls to the market data provider.
///
/// Bounds the number of in-flight requests and enforces a minimum spacing
/// between request starts.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    last_request: Mutex<Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    /// # Arguments
    /// * `max_concurrent` - Maximum number of concurrent requests
    /// * `requests_per_minute` - Maximum request starts per minute
    pub fn new(max_concurrent: usize, requests_per_minute: u32) -> Self {
        let min_delay_ms = 60_000 / u64::from(requests_per_minute.max(1));
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            last_request: Mutex::new(
                Instant::now()
                    .checked_sub(Duration::from_secs(60))
                    .unwrap_or_else(Instant::now),
            ),
            min_delay: Duration::from_millis(min_delay_ms),
        }
    }

    /// Wait for a concurrency permit and for the spacing window to pass.
    ///
    /// The returned guard releases the permit when dropped.
    pub async fn acquire(&self) -> Result<RateLimitGuard, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;

        // Reserve the next slot under the lock, sleep outside it.
        let wait_time = {
            let mut last = self.last_request.lock();
            let now = Instant::now();
            let next_slot = (*last + self.min_delay).max(now);
            *last = next_slot;
            next_slot - now
        };

        if !wait_time.is_zero() {
            sleep(wait_time).await;
        }

        Ok(RateLimitGuard { _permit: permit })
    }

    /// Get the current utilization (for monitoring)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Guard that holds a rate limit permit
pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}

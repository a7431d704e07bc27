use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::api::Endpoint;
use crate::error::ModerationError;

/// Token count and refill schedule for one endpoint category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateBudget {
    pub capacity: u32,
    /// The bucket is topped back up to `capacity` once per interval.
    pub refill_interval: Duration,
}

impl RateBudget {
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TokenBucket {
    budget: RateBudget,
    tokens: u32,
    window_start: Instant,
}

impl TokenBucket {
    pub(crate) fn new(budget: RateBudget, now: Instant) -> Self {
        Self {
            budget,
            tokens: budget.capacity.max(1),
            window_start: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let interval = self.budget.refill_interval;
        if interval.is_zero() {
            self.tokens = self.budget.capacity.max(1);
            return;
        }

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < interval {
            return;
        }

        let into_window = elapsed.as_nanos() % interval.as_nanos();
        self.window_start = now - Duration::from_nanos(into_window as u64);
        self.tokens = self.budget.capacity.max(1);
    }

    /// Take one token, or report how long until the next refill.
    pub(crate) fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            return Ok(());
        }

        let next_refill = self.window_start + self.budget.refill_interval;
        Err(next_refill.saturating_duration_since(now))
    }
}

/// One bucket plus its bounded FIFO of waiting callers.
///
/// Waiters queue on the bucket mutex, which tokio hands out in FIFO order;
/// the holder sleeps until the next refill while the rest stay parked behind it.
#[derive(Debug)]
pub(crate) struct EndpointLimiter {
    endpoint: Endpoint,
    bucket: Mutex<TokenBucket>,
    waiting: AtomicUsize,
    queue_capacity: usize,
}

struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl EndpointLimiter {
    pub(crate) fn new(endpoint: Endpoint, budget: RateBudget, queue_capacity: usize) -> Self {
        Self {
            endpoint,
            bucket: Mutex::new(TokenBucket::new(budget, Instant::now())),
            waiting: AtomicUsize::new(0),
            queue_capacity,
        }
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Wait for a token. Fails fast with `Backpressure` once the queue is full.
    pub(crate) async fn acquire(&self) -> Result<(), ModerationError> {
        if let Ok(mut bucket) = self.bucket.try_lock()
            && bucket.try_take(Instant::now()).is_ok()
        {
            return Ok(());
        }

        let queued = self.waiting.fetch_add(1, Ordering::AcqRel);
        let _slot = QueueSlot(&self.waiting);
        if queued >= self.queue_capacity {
            return Err(ModerationError::Backpressure {
                endpoint: self.endpoint,
                capacity: self.queue_capacity,
            });
        }

        let mut bucket = self.bucket.lock().await;
        loop {
            match bucket.try_take(Instant::now()) {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    debug!(
                        endpoint = %self.endpoint,
                        wait_ms = wait.as_millis() as u64,
                        "rate budget exhausted; waiting for refill"
                    );
                    sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{EndpointLimiter, RateBudget, TokenBucket};
    use crate::api::Endpoint;
    use crate::error::ModerationError;

    #[tokio::test(start_paused = true)]
    async fn bucket_refills_once_per_window() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(RateBudget::new(2, Duration::from_secs(10)), start);

        assert!(bucket.try_take(start).is_ok());
        assert!(bucket.try_take(start).is_ok());
        assert_eq!(
            bucket.try_take(start + Duration::from_secs(4)),
            Err(Duration::from_secs(6))
        );

        let later = start + Duration::from_secs(25);
        assert!(bucket.try_take(later).is_ok());
        assert!(bucket.try_take(later).is_ok());
        // Window realigned to t=20, so the next refill is at t=30.
        assert_eq!(bucket.try_take(later), Err(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn excess_calls_wait_for_refill_instead_of_failing() {
        let limiter = Arc::new(EndpointLimiter::new(
            Endpoint::Messages,
            RateBudget::new(3, Duration::from_secs(5)),
            16,
        ));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await.map(|()| start.elapsed())
            }));
        }

        let mut completed_at = Vec::new();
        for handle in handles {
            completed_at.push(handle.await.unwrap().unwrap());
        }
        completed_at.sort();

        assert!(completed_at[..3].iter().all(|t| *t < Duration::from_secs(5)));
        assert!(completed_at[3..].iter().all(|t| *t >= Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_yields_backpressure() {
        let limiter = Arc::new(EndpointLimiter::new(
            Endpoint::Bans,
            RateBudget::new(1, Duration::from_secs(60)),
            2,
        ));

        limiter.acquire().await.unwrap();

        let mut waiters = Vec::new();
        for _ in 0..2 {
            let limiter = Arc::clone(&limiter);
            waiters.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        tokio::task::yield_now().await;
        while limiter.waiting() < 2 {
            tokio::task::yield_now().await;
        }

        let overflow = limiter.acquire().await;
        assert_eq!(
            overflow,
            Err(ModerationError::Backpressure {
                endpoint: Endpoint::Bans,
                capacity: 2,
            })
        );

        for waiter in waiters {
            assert!(waiter.await.unwrap().is_ok());
        }
    }
}

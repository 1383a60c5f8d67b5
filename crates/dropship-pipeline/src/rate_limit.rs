//! Per-source call limiter for marketplace requests.
//!
//! Each source key gets `max_calls` slots. A [`RatePermit`] holds a slot from
//! acquisition until the later of its release and `acquired_at + window`, so
//! at most `max_calls` requests are in flight and at most `max_calls` start
//! inside any window. Waiters are served in arrival order (tokio's semaphore
//! is fair). A zero window makes this a plain concurrency cap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::RateLimitError;

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    sources: Mutex<HashMap<String, Arc<Semaphore>>>,
    closed: AtomicBool,
}

impl RateLimiter {
    /// `max_calls` is clamped to at least 1.
    #[must_use]
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            sources: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits for a slot on `source_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Cancelled`] if the limiter is shut down
    /// before or while waiting.
    pub async fn acquire(&self, source_key: &str) -> Result<RatePermit, RateLimitError> {
        let semaphore = self.semaphore_for(source_key)?;
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| RateLimitError::Cancelled)?;

        Ok(RatePermit {
            permit: Some(permit),
            acquired_at: Instant::now(),
            window: self.window,
        })
    }

    /// Slots currently held on `source_key`, including ones still cooling
    /// down after release.
    #[must_use]
    pub fn in_use(&self, source_key: &str) -> usize {
        let sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        sources
            .get(source_key)
            .map_or(0, |s| self.max_calls.saturating_sub(s.available_permits()))
    }

    /// Fails every pending and future [`acquire`](Self::acquire) with
    /// [`RateLimitError::Cancelled`]. Permits already granted stay valid.
    pub fn shutdown(&self) {
        let sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        self.closed.store(true, Ordering::SeqCst);
        for semaphore in sources.values() {
            semaphore.close();
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn semaphore_for(&self, source_key: &str) -> Result<Arc<Semaphore>, RateLimitError> {
        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            return Err(RateLimitError::Cancelled);
        }
        let semaphore = sources
            .entry(source_key.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_calls)));
        Ok(Arc::clone(semaphore))
    }
}

/// A granted slot. Dropping it releases the slot once the window since
/// acquisition has elapsed.
#[derive(Debug)]
pub struct RatePermit {
    permit: Option<OwnedSemaphorePermit>,
    acquired_at: Instant,
    window: Duration,
}

impl RatePermit {
    /// Explicit form of dropping the permit.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RatePermit {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let free_at = self.acquired_at + self.window;
        if free_at <= Instant::now() {
            return;
        }
        // Outside a runtime there is nothing to sleep on; free immediately.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                tokio::time::sleep_until(free_at).await;
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn zero_window_is_a_concurrency_cap() {
        let limiter = RateLimiter::new(2, Duration::ZERO);
        let a = limiter.acquire("src").await.unwrap();
        let _b = limiter.acquire("src").await.unwrap();
        assert_eq!(limiter.in_use("src"), 2);

        a.release();
        assert_eq!(limiter.in_use("src"), 1);
        let _c = limiter.acquire("src").await.unwrap();
        assert_eq!(limiter.in_use("src"), 2);
    }

    #[tokio::test]
    async fn sources_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let _a = limiter.acquire("one").await.unwrap();
        let b = tokio::time::timeout(Duration::from_millis(50), limiter.acquire("two")).await;
        assert!(b.is_ok(), "a different source must not wait");
    }

    #[tokio::test(start_paused = true)]
    async fn released_permit_holds_slot_until_window_ends() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(1)));
        let start = Instant::now();

        limiter.acquire("src").await.unwrap().release();
        assert_eq!(limiter.in_use("src"), 1);

        let _second = limiter.acquire("src").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_max_calls_start_per_window() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(1)));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..9 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let permit = limiter.acquire("src").await.unwrap();
                let at = start.elapsed();
                permit.release();
                at
            }));
        }
        let mut starts = Vec::new();
        for h in handles {
            starts.push(h.await.unwrap());
        }
        starts.sort();
        for window in starts.windows(4) {
            assert!(
                window[3] - window[0] >= Duration::from_secs(1),
                "four calls started within one window: {starts:?}"
            );
        }
    }

    #[tokio::test]
    async fn concurrent_high_water_mark_never_exceeds_max() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::ZERO));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire("src").await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_waiters_and_future_acquires() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::ZERO));
        let _held = limiter.acquire("src").await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire("src").await })
        };
        tokio::task::yield_now().await;

        limiter.shutdown();
        assert_eq!(waiter.await.unwrap().unwrap_err(), RateLimitError::Cancelled);
        assert_eq!(
            limiter.acquire("other").await.unwrap_err(),
            RateLimitError::Cancelled
        );
        assert!(limiter.is_shut_down());
    }
}

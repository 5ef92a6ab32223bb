//! Process-wide token bucket for search provider calls.
//!
//! Proactively throttles outbound search requests instead of relying on
//! 429 backpressure. Excess callers queue briefly; a caller that cannot
//! acquire a slot within the configured wait fails its current attempt.

use crate::error::SearchError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A sliding-window limiter shared by every session in the process.
pub struct SearchRateLimiter {
    window: Mutex<VecDeque<Instant>>,
    capacity: usize,
    span: Duration,
    max_wait: Duration,
}

impl SearchRateLimiter {
    /// `per_sec` calls allowed per one-second window; callers queue up to
    /// `max_wait` before failing.
    pub fn new(per_sec: u32, max_wait: Duration) -> Self {
        Self {
            window: Mutex::new(VecDeque::new()),
            capacity: per_sec.max(1) as usize,
            span: Duration::from_secs(1),
            max_wait,
        }
    }

    /// Acquire one call slot, waiting if the window is full.
    pub async fn acquire(&self) -> Result<(), SearchError> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while window.front().is_some_and(|t| now - *t >= self.span) {
                    window.pop_front();
                }
                if window.len() < self.capacity {
                    window.push_back(now);
                    return Ok(());
                }
                // Oldest entry leaving the window frees the next slot.
                self.span - (now - *window.front().expect("window non-empty"))
            };

            let now = Instant::now();
            if now + wait > deadline {
                let waited_ms = self.max_wait.as_millis() as u64;
                return Err(SearchError::QueueTimeout { waited_ms });
            }
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_up_to_capacity() {
        let limiter = SearchRateLimiter::new(5, Duration::from_millis(10));
        for _ in 0..5 {
            limiter.acquire().await.unwrap();
        }
    }

    #[tokio::test]
    async fn excess_caller_times_out() {
        let limiter = SearchRateLimiter::new(2, Duration::from_millis(50));
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, SearchError::QueueTimeout { .. }));
    }

    #[tokio::test]
    async fn slot_frees_after_window_passes() {
        tokio::time::pause();
        let limiter = SearchRateLimiter::new(1, Duration::from_secs(3));
        limiter.acquire().await.unwrap();
        // Second caller queues until the first slot ages out of the window.
        let acquire = limiter.acquire();
        tokio::time::advance(Duration::from_millis(1100)).await;
        acquire.await.unwrap();
    }
}

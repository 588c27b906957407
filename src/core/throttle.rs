//! Sliding-window limiter for operator-triggered syncs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct SlidingWindowLimiter {
    max_hits: usize,
    window: Duration,
    hits: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_hits: usize, window: Duration) -> Self {
        Self {
            max_hits: max_hits.max(1),
            window,
            hits: Mutex::new(VecDeque::with_capacity(max_hits.max(1))),
        }
    }

    /// Record a hit if the window still has room.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut hits = self
            .hits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Evict everything that left the window
        while let Some(oldest) = hits.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }

        if hits.len() >= self.max_hits {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Seconds until the oldest hit leaves the window.
    pub fn retry_after(&self) -> Duration {
        let hits = self
            .hits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        hits.front()
            .map(|oldest| self.window.saturating_sub(oldest.elapsed()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_over_limit_and_recovers_after_window() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.try_acquire_at(t0));
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(1)));
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(2)));
        assert!(!limiter.try_acquire_at(t0 + Duration::from_secs(3)));

        // First hit evicted, one slot free again
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(60)));
        assert!(!limiter.try_acquire_at(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn rejected_hits_do_not_extend_the_window() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(limiter.try_acquire_at(t0));
        for s in 1..10 {
            assert!(!limiter.try_acquire_at(t0 + Duration::from_secs(s)));
        }
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(10)));
    }
}

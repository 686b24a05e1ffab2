//! Sliding-window rate limiter, one bucket per `(roomId, clientId)`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Tracks weighted event timestamps in a trailing window and accepts or
/// rejects new events against a cap. `OT_OP` costs weight `1.0`;
/// `CURSOR_UPDATE` costs `cursor_update_weight` (default `0.25`).
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    window: Duration,
    max_weight: f64,
    events: VecDeque<(Instant, f64)>,
    weight_sum: f64,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_weight: f64) -> Self {
        Self { window, max_weight, events: VecDeque::new(), weight_sum: 0.0 }
    }

    /// Evicts events older than the window, then admits `weight` if it fits
    /// under the cap. Returns whether the event was admitted.
    pub fn try_consume(&mut self, now: Instant, weight: f64) -> bool {
        self.evict(now);
        if self.weight_sum + weight > self.max_weight {
            return false;
        }
        self.events.push_back((now, weight));
        self.weight_sum += weight;
        true
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(t, w)) = self.events.front() {
            if now.saturating_duration_since(t) >= self.window {
                self.events.pop_front();
                self.weight_sum -= w;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_cap_then_rejects() {
        let mut limiter = SlidingWindowLimiter::new(Duration::from_secs(1), 3.0);
        let t0 = Instant::now();
        assert!(limiter.try_consume(t0, 1.0));
        assert!(limiter.try_consume(t0, 1.0));
        assert!(limiter.try_consume(t0, 1.0));
        assert!(!limiter.try_consume(t0, 1.0));
    }

    #[test]
    fn window_expiry_frees_budget() {
        let mut limiter = SlidingWindowLimiter::new(Duration::from_secs(1), 1.0);
        let t0 = Instant::now();
        assert!(limiter.try_consume(t0, 1.0));
        assert!(!limiter.try_consume(t0 + Duration::from_millis(500), 1.0));
        assert!(limiter.try_consume(t0 + Duration::from_millis(1001), 1.0));
    }

    #[test]
    fn fractional_weight_allows_more_events() {
        let mut limiter = SlidingWindowLimiter::new(Duration::from_secs(1), 1.0);
        let t0 = Instant::now();
        for _ in 0..4 {
            assert!(limiter.try_consume(t0, 0.25));
        }
        assert!(!limiter.try_consume(t0, 0.25));
    }
}

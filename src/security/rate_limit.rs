//! Sliding-window rate limiting keyed by operation id.
//!
//! Each key keeps the timestamps of admitted requests inside the trailing
//! window. Entries with `now - t >= window` are pruned lazily on every
//! check. A request is admitted only while fewer than `max_requests`
//! entries remain; rejected attempts are not recorded.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::Clock;

/// Per-key sliding-window admission control.
pub struct RateLimiter {
    buckets: DashMap<String, VecDeque<u64>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Admit or reject one request for `key`.
    pub fn is_allowed(&self, key: &str, max_requests: u32, window_ms: u64) -> bool {
        if max_requests == 0 {
            return false;
        }

        let now = self.clock.now_millis();
        // The entry guard holds the shard lock, so prune-check-append is atomic per key.
        let mut bucket = self.buckets.entry(key.to_string()).or_default();
        bucket.retain(|&t| now.saturating_sub(t) < window_ms);

        if bucket.len() >= max_requests as usize {
            tracing::debug!(key = %key, in_window = bucket.len(), "rate limit reached");
            return false;
        }

        bucket.push_back(now);
        true
    }

    /// Requests still admissible for `key` right now. Does not record anything.
    pub fn get_remaining_requests(&self, key: &str, max_requests: u32, window_ms: u64) -> u32 {
        let used = self.in_window(key, window_ms).len();
        max_requests.saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
    }

    /// When capacity next frees up: oldest retained timestamp plus the window.
    ///
    /// Returns the current time for a key with nothing in the window.
    pub fn get_reset_time(&self, key: &str, window_ms: u64) -> u64 {
        self.in_window(key, window_ms)
            .into_iter()
            .min()
            .map(|oldest| oldest.saturating_add(window_ms))
            .unwrap_or_else(|| self.clock.now_millis())
    }

    pub fn clear_endpoint(&self, key: &str) {
        self.buckets.remove(key);
    }

    pub fn clear_all(&self) {
        self.buckets.clear();
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    fn in_window(&self, key: &str, window_ms: u64) -> Vec<u64> {
        let now = self.clock.now_millis();
        self.buckets
            .get(key)
            .map(|bucket| {
                bucket
                    .iter()
                    .copied()
                    .filter(|&t| now.saturating_sub(t) < window_ms)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn limiter() -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new(10_000);
        (RateLimiter::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_recovers_after_window() {
        let (limiter, clock) = limiter();
        for _ in 0..3 {
            assert!(limiter.is_allowed("create-user", 3, 1000));
            clock.advance(Duration::from_millis(100));
        }
        assert!(!limiter.is_allowed("create-user", 3, 1000));

        // Earliest request was at 10_000; the window has passed it at 11_000.
        clock.set(11_000);
        assert!(limiter.is_allowed("create-user", 3, 1000));
        assert!(!limiter.is_allowed("create-user", 3, 1000));
    }

    #[test]
    fn test_burst_across_boundary_is_capped() {
        let (limiter, clock) = limiter();
        clock.set(10_900);
        assert!(limiter.is_allowed("k", 2, 1000));
        assert!(limiter.is_allowed("k", 2, 1000));
        // A fixed bucket would reset at 11_000; the sliding window does not.
        clock.set(11_050);
        assert!(!limiter.is_allowed("k", 2, 1000));
        clock.set(11_900);
        assert!(limiter.is_allowed("k", 2, 1000));
    }

    #[test]
    fn test_zero_max_always_denies() {
        let (limiter, _) = limiter();
        assert!(!limiter.is_allowed("k", 0, 1000));
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter();
        assert!(limiter.is_allowed("a", 1, 1000));
        assert!(!limiter.is_allowed("a", 1, 1000));
        assert!(limiter.is_allowed("b", 1, 1000));
    }

    #[test]
    fn test_remaining_and_reset_time() {
        let (limiter, clock) = limiter();
        assert_eq!(limiter.get_remaining_requests("k", 3, 1000), 3);
        assert_eq!(limiter.get_reset_time("k", 1000), 10_000);

        limiter.is_allowed("k", 3, 1000);
        clock.advance(Duration::from_millis(200));
        limiter.is_allowed("k", 3, 1000);

        assert_eq!(limiter.get_remaining_requests("k", 3, 1000), 1);
        assert_eq!(limiter.get_reset_time("k", 1000), 11_000);
        // Queries do not consume capacity.
        assert_eq!(limiter.get_remaining_requests("k", 3, 1000), 1);
    }

    #[test]
    fn test_window_bound_holds_for_any_sequence() {
        let (limiter, clock) = limiter();
        let mut admitted: Vec<u64> = Vec::new();
        for step in 0..500u64 {
            clock.advance(Duration::from_millis((step * 37) % 23));
            if limiter.is_allowed("k", 5, 100) {
                admitted.push(clock.now_millis());
            }
            let now = clock.now_millis();
            let in_window = admitted.iter().filter(|&&t| now - t < 100).count();
            assert!(in_window <= 5);
        }
        assert!(!admitted.is_empty());
    }

    #[test]
    fn test_clear() {
        let (limiter, _) = limiter();
        assert!(limiter.is_allowed("a", 1, 1000));
        assert!(limiter.is_allowed("b", 1, 1000));

        limiter.clear_endpoint("a");
        assert!(limiter.is_allowed("a", 1, 1000));
        assert!(!limiter.is_allowed("b", 1, 1000));

        limiter.clear_all();
        assert_eq!(limiter.tracked_keys(), 0);
        assert!(limiter.is_allowed("b", 1, 1000));
    }

    #[test]
    fn test_concurrent_calls_respect_limit() {
        let limiter = Arc::new(RateLimiter::new(Arc::new(ManualClock::new(0))));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50).filter(|_| limiter.is_allowed("hot", 25, 1000)).count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
    }
}

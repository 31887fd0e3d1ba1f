use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitRule;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Outcome of an allowed request, used for `X-RateLimit-*` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

/// Fixed-window request counter keyed by `identifier:endpoint`.
///
/// Process-local and in-memory: counts are not shared between instances and
/// are lost on restart. The check is a plain read-then-write on the entry.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, identifier: &str, endpoint: &str, rule: RateLimitRule) -> Result<RateLimitStatus, ApiError> {
        let key = format!("{}:{}", identifier, endpoint);
        self.check_at(&key, rule, Instant::now()).map_err(|retry_after| {
            tracing::warn!(key = %key, retry_after, "Rate limit exceeded");
            ApiError::rate_limited(retry_after)
        })
    }

    /// Returns the retry-after seconds when the window is exhausted
    fn check_at(&self, key: &str, rule: RateLimitRule, now: Instant) -> Result<RateLimitStatus, u64> {
        let window = rule.window();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + window,
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        entry.count += 1;
        let remaining_time = entry.reset_at.saturating_duration_since(now);
        let reset_after_secs = ceil_secs(remaining_time);

        if entry.count > rule.max_requests {
            return Err(reset_after_secs);
        }

        Ok(RateLimitStatus {
            limit: rule.max_requests,
            remaining: rule.max_requests - entry.count,
            reset_after_secs,
        })
    }

    /// Drop windows that have already reset; returns how many were removed
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    fn cleanup_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

// Rounded up, minimum 1
fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: RateLimitRule = RateLimitRule::new(3, 60);

    #[test]
    fn allows_up_to_max_then_rejects() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let status = limiter.check_at("user:/api/tenders", RULE, now).unwrap();
            assert_eq!(status.remaining, expected_remaining);
            assert_eq!(status.limit, 3);
        }

        let retry_after = limiter.check_at("user:/api/tenders", RULE, now).unwrap_err();
        assert_eq!(retry_after, 60);
    }

    #[test]
    fn retry_after_shrinks_as_window_elapses() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check_at("k", RULE, start).unwrap();
        }
        let later = start + Duration::from_millis(45_500);
        assert_eq!(limiter.check_at("k", RULE, later).unwrap_err(), 15);
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..4 {
            let _ = limiter.check_at("k", RULE, start);
        }
        let after = start + Duration::from_secs(60);
        let status = limiter.check_at("k", RULE, after).unwrap();
        assert_eq!(status.remaining, 2);
    }

    #[test]
    fn zero_length_window_still_limits() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule { max_requests: 2, window_secs: 0 };
        let now = Instant::now();
        limiter.check_at("k", rule, now).unwrap();
        limiter.check_at("k", rule, now).unwrap();
        assert_eq!(limiter.check_at("k", rule, now).unwrap_err(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..3 {
            limiter.check_at("alice:/api/ai/generate", RULE, now).unwrap();
        }
        assert!(limiter.check_at("alice:/api/ai/generate", RULE, now).is_err());
        assert!(limiter.check_at("bob:/api/ai/generate", RULE, now).is_ok());
        assert!(limiter.check_at("alice:/api/tenders", RULE, now).is_ok());
    }

    #[test]
    fn check_builds_rate_limit_error() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule::new(1, 30);
        limiter.check("1.2.3.4", "/auth/login", rule).unwrap();
        let err = limiter.check("1.2.3.4", "/auth/login", rule).unwrap_err();
        assert_eq!(err.status_code(), 429);
        assert!(matches!(err, ApiError::RateLimitExceeded { retry_after_secs, .. } if retry_after_secs <= 30));
    }

    #[test]
    fn cleanup_drops_expired_windows() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        limiter.check_at("short", RateLimitRule::new(5, 1), now).unwrap();
        limiter.check_at("long", RateLimitRule::new(5, 600), now).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        assert_eq!(limiter.cleanup_at(now + Duration::from_secs(2)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}

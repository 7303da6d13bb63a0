//! Per-host rate limiting: sliding-window admission plus error backoff.
//!
//! Admission requires both an open window slot and an expired backoff.
//! Errors raise `backoff_until` exponentially unless the server supplied a
//! `Retry-After`, which wins.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use quarry_types::{ErrorCode, FetchError};

const WINDOW: Duration = Duration::from_secs(60);
const ERROR_WINDOW: Duration = Duration::from_secs(300);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Default)]
struct HostState {
    /// Request instants within the sliding window, oldest first.
    requests: Vec<Instant>,
    /// Error instants within the error window; the count drives the
    /// exponential backoff.
    errors: Vec<Instant>,
    backoff_until: Option<Instant>,
}

impl HostState {
    fn prune(&mut self, now: Instant) {
        self.requests
            .retain(|t| now.duration_since(*t) < WINDOW);
        self.errors
            .retain(|t| now.duration_since(*t) < ERROR_WINDOW);
    }
}

/// Process-wide per-host limiter. Cheap to share; all state is behind one
/// lock with point-updates per host.
#[derive(Debug)]
pub struct RateLimiter {
    hosts: RwLock<HashMap<String, HostState>>,
    max_per_minute: usize,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            max_per_minute: max_requests_per_minute.max(1) as usize,
        }
    }

    /// Whether a request to `host` may proceed right now.
    #[must_use]
    pub fn check(&self, host: &str) -> bool {
        self.delay_needed(host).is_zero()
    }

    /// How long a caller must wait before a request to `host` is admissible.
    #[must_use]
    pub fn delay_needed(&self, host: &str) -> Duration {
        let now = Instant::now();
        let hosts = self.hosts.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(state) = hosts.get(host) else {
            return Duration::ZERO;
        };

        let mut wait = Duration::ZERO;

        if let Some(until) = state.backoff_until
            && until > now
        {
            wait = until - now;
        }

        let live: Vec<&Instant> = state
            .requests
            .iter()
            .filter(|t| now.duration_since(**t) < WINDOW)
            .collect();
        if live.len() >= self.max_per_minute
            && let Some(oldest) = live.first()
        {
            let window_wait = WINDOW - now.duration_since(**oldest);
            wait = wait.max(window_wait);
        }

        wait
    }

    /// Record an admitted request.
    pub fn record_request(&self, host: &str) {
        let now = Instant::now();
        let mut hosts = self.hosts.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = hosts.entry(host.to_string()).or_default();
        state.prune(now);
        state.requests.push(now);
    }

    /// Record a server-side failure. `retry_after` is the parsed
    /// `Retry-After` value in seconds when the server supplied one.
    pub fn record_error(&self, host: &str, retry_after: Option<u64>) {
        let now = Instant::now();
        let mut hosts = self.hosts.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = hosts.entry(host.to_string()).or_default();
        state.prune(now);
        state.errors.push(now);

        let backoff = match retry_after {
            Some(secs) => Duration::from_secs(secs),
            None => {
                let exponent = (state.errors.len() as u32).min(6);
                MAX_BACKOFF.min(Duration::from_secs(1 << exponent))
            }
        };
        state.backoff_until = Some(now + backoff);
    }

    /// Sleep until `host` is admissible, or fail if the wait would exceed
    /// `max_wait`.
    pub async fn wait_for(&self, host: &str, max_wait: Duration) -> Result<(), FetchError> {
        let wait = self.delay_needed(host);
        if wait.is_zero() {
            return Ok(());
        }
        if wait > max_wait {
            return Err(FetchError::new(
                ErrorCode::RateLimited,
                format!(
                    "host {host} is rate limited for another {}ms, beyond the {}ms budget",
                    wait.as_millis(),
                    max_wait.as_millis()
                ),
            )
            .with_detail("host", host.to_string())
            .with_detail("wait_ms", wait.as_millis().to_string()));
        }
        tracing::debug!(host, wait_ms = wait.as_millis() as u64, "rate limit wait");
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_until_window_full() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.check("a.example"));
        for _ in 0..3 {
            limiter.record_request("a.example");
        }
        assert!(!limiter.check("a.example"));
        // Other hosts are unaffected
        assert!(limiter.check("b.example"));
    }

    #[test]
    fn retry_after_sets_backoff() {
        let limiter = RateLimiter::new(100);
        limiter.record_error("a.example", Some(30));
        let wait = limiter.delay_needed("a.example");
        assert!(wait > Duration::from_secs(29));
        assert!(wait <= Duration::from_secs(30));
    }

    #[test]
    fn exponential_backoff_caps_at_five_minutes() {
        let limiter = RateLimiter::new(100);
        for _ in 0..10 {
            limiter.record_error("a.example", None);
        }
        let wait = limiter.delay_needed("a.example");
        assert!(wait <= MAX_BACKOFF);
        assert!(wait > Duration::from_secs(50));
    }

    #[test]
    fn first_error_backs_off_two_seconds() {
        let limiter = RateLimiter::new(100);
        limiter.record_error("a.example", None);
        let wait = limiter.delay_needed("a.example");
        assert!(wait > Duration::from_secs(1));
        assert!(wait <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn wait_for_respects_budget() {
        let limiter = RateLimiter::new(100);
        limiter.record_error("a.example", Some(60));
        let err = limiter
            .wait_for("a.example", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimited);
    }

    #[tokio::test]
    async fn wait_for_sleeps_short_waits() {
        let limiter = RateLimiter::new(1);
        limiter.record_request("a.example");
        // Window wait would be ~60s, beyond the budget
        let err = limiter
            .wait_for("a.example", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimited);

        // A clean host needs no wait at all
        limiter.wait_for("b.example", Duration::ZERO).await.unwrap();
    }
}

//! Retry policy with exponential backoff
//!
//! This module provides the backoff policy shared by every HTTP adapter.
//! The policy decides *how long* to wait between attempts; *whether* an
//! attempt is worth retrying is decided by status classification in the
//! transport layer (and, across providers, by the chain's error policy in
//! [`crate::error::Error::fails_over`]).
//!
//! # Examples
//!
//! ```rust
//! use llm_relay::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default()
//!     .with_max_retries(3)
//!     .with_base_delay(Duration::from_millis(500));
//!
//! // First retry waits ~500ms, second ~1s, third ~2s (plus jitter).
//! assert!(policy.delay_for(0, None) >= Duration::from_millis(250));
//! ```

use std::time::Duration;

/// Backoff configuration for a single adapter's retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first request (so `max_retries + 1`
    /// total requests).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Cap applied to the exponential delay.
    pub max_delay: Duration,

    /// Random jitter fraction applied to each delay (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of additional attempts.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay before the first retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter fraction (clamped to 0.0..=1.0).
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// Exponential doubling `base * 2^attempt`, with the shift capped at 31
    /// so large attempt counts cannot overflow, capped at `max_delay`, and
    /// jittered. A provider `Retry-After` hint overrides the computed delay
    /// entirely; the server knows better than our schedule.
    pub fn delay_for(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.min(self.max_delay);
        }

        let shift = attempt.min(31);
        let exponential = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << shift)
            .min(self.max_delay.as_millis()) as f64;

        let jitter_range = exponential * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let with_jitter = exponential + jitter - (jitter_range / 2.0);

        Duration::from_millis(with_jitter.max(0.0) as u64)
    }
}

/// Parse an HTTP `Retry-After` header value in its delay-seconds form.
///
/// The HTTP-date form is not handled; providers that rate limit send the
/// integer form.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_builder() {
        let policy = RetryPolicy::new()
            .with_max_retries(5)
            .with_base_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter_factor(0.2);

        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.jitter_factor, 0.2);
    }

    #[test]
    fn test_jitter_factor_clamped() {
        let policy = RetryPolicy::new().with_jitter_factor(3.0);
        assert_eq!(policy.jitter_factor, 1.0);
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(120))
            .with_jitter_factor(0.0);

        let d0 = policy.delay_for(0, None);
        let d1 = policy.delay_for(1, None);
        let d2 = policy.delay_for(2, None);

        assert_eq!(d0, Duration::from_secs(1));
        assert_eq!(d1, Duration::from_secs(2));
        assert_eq!(d2, Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter_factor(0.0);

        assert_eq!(policy.delay_for(10, None), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::new().with_jitter_factor(0.0);
        // The shift is capped at 31; anything beyond just hits max_delay.
        let delay = policy.delay_for(u32::MAX, None);
        assert!(delay <= policy.max_delay);
    }

    #[test]
    fn test_server_hint_overrides_schedule() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_secs(1))
            .with_jitter_factor(0.0);

        let delay = policy.delay_for(0, Some(Duration::from_secs(7)));
        assert_eq!(delay, Duration::from_secs(7));
    }

    #[test]
    fn test_server_hint_capped_at_max_delay() {
        let policy = RetryPolicy::new().with_max_delay(Duration::from_secs(10));
        let delay = policy.delay_for(0, Some(Duration::from_secs(3600)));
        assert_eq!(delay, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
    }
}

//! Retry policy for remote calls.
//!
//! Independent of the extractor's pacing: pacing spaces out successful
//! requests, the policy decides whether a failed one is attempted again.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. `1` disables retries.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    /// Single attempt: the first failure aborts the run.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Default::default()
        }
    }

    /// Whether another attempt may follow failed attempt number `attempt` (1-based).
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based): doubles each
    /// time, capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// HTTP statuses worth retrying: rate limiting and server-side failures.
    pub fn is_retryable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert!(!policy.allows_retry(1));
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(500));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(9), Duration::from_secs(30));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn retryable_statuses() {
        assert!(RetryPolicy::is_retryable_status(429));
        assert!(RetryPolicy::is_retryable_status(502));
        assert!(RetryPolicy::is_retryable_status(503));
        assert!(!RetryPolicy::is_retryable_status(400));
        assert!(!RetryPolicy::is_retryable_status(404));
    }
}

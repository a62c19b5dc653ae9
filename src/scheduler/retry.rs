//! Retry policy for failed dispatches.
//!
//! Rate-limit signals wait at least as long as the platform asked for;
//! transient failures wait the exponential backoff alone. Everything else is
//! permanent. Attempts are bounded by the configured maximum.

use std::time::Duration;

use crate::error::PacerError;

/// Bounded exponential backoff: `base * 2^(attempt-1)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` retries with `base_delay` backoff.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Maximum retry attempts before an entry permanently fails.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff delay for the given attempt, starting at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        // Exponent capped well past any sane max_attempts to avoid overflow.
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay * 2u32.pow(exponent)
    }

    /// Delay before retry number `attempt`, or `None` when the failure is
    /// permanent or the attempts are exhausted.
    pub fn next_delay(&self, attempt: u32, error: &PacerError) -> Option<Duration> {
        if attempt > self.max_attempts {
            return None;
        }
        match error {
            PacerError::RateLimited { retry_after } => Some((*retry_after).max(self.backoff(attempt))),
            PacerError::Transient(_) => Some(self.backoff(attempt)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(500))
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_rate_limit_uses_larger_of_signal_and_backoff() {
        let policy = policy();

        // Platform asked for longer than our backoff.
        let err = PacerError::RateLimited {
            retry_after: Duration::from_secs(10),
        };
        assert_eq!(policy.next_delay(1, &err), Some(Duration::from_secs(10)));

        // Backoff exceeds the platform's ask.
        let err = PacerError::RateLimited {
            retry_after: Duration::from_millis(100),
        };
        assert_eq!(policy.next_delay(3, &err), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn test_transient_uses_backoff_only() {
        let policy = policy();
        let err = PacerError::Transient("timed out".to_string());
        assert_eq!(policy.next_delay(1, &err), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_delay(2, &err), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_attempts_exhausted() {
        let policy = policy();
        let err = PacerError::Transient("timed out".to_string());
        assert_eq!(policy.next_delay(3, &err), Some(Duration::from_millis(2000)));
        assert_eq!(policy.next_delay(4, &err), None);
    }

    #[test]
    fn test_permanent_failures_never_retry() {
        let policy = policy();
        assert_eq!(policy.next_delay(1, &PacerError::Permanent("bad chat".into())), None);
        assert_eq!(policy.next_delay(1, &PacerError::Cancelled), None);
        assert_eq!(policy.next_delay(1, &PacerError::Shutdown), None);
    }

    #[test]
    fn test_zero_base_delay() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let err = PacerError::Transient("flap".to_string());
        assert_eq!(policy.next_delay(1, &err), Some(Duration::ZERO));
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_millis(1));
        let _ = policy.backoff(10_000);
    }
}

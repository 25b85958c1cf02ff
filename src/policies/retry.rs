//! # Retry policy for failed events.
//!
//! [`RetryPolicy`] decides whether a failed attempt is retried and how long the
//! event waits before it is queued again.
//!
//! `should_retry(attempt, error)` is `false` once `attempt >= max_attempts`, `false`
//! when the predicate rejects the error, `true` otherwise. `attempt` counts the
//! retries already performed (0 on the first failure), so `max_attempts = K` on an
//! always-failing action yields exactly `K` retries followed by one terminal error.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::{BackoffPolicy, EventError, RetryPolicy};
//!
//! let policy = RetryPolicy::new(2, BackoffPolicy::constant(Duration::from_millis(10)));
//! let err = EventError::fail("flaky");
//!
//! assert!(policy.should_retry(0, &err));
//! assert!(policy.should_retry(1, &err));
//! assert!(!policy.should_retry(2, &err));
//! assert!(!policy.should_retry(0, &EventError::fatal("nope")));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{BackoffPolicy, JitterPolicy};
use crate::error::EventError;

type RetryPredicate = Arc<dyn Fn(&EventError) -> bool + Send + Sync>;

/// Max attempts + backoff + optional retryable-error predicate.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffPolicy,
    jitter: JitterPolicy,
    retry_if: Option<RetryPredicate>,
}

impl Default for RetryPolicy {
    /// `max_attempts = 3`, default backoff, no jitter, no predicate.
    fn default() -> Self {
        Self::new(3, BackoffPolicy::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("retry_if", &self.retry_if.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            jitter: JitterPolicy::None,
            retry_if: None,
        }
    }

    /// Returns a policy with the given jitter layered over the backoff.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns a policy that only retries errors accepted by `predicate`.
    ///
    /// Replaces the default classification ([`EventError::is_retryable`]).
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&EventError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Maximum number of retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff shape.
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Whether a failure on retry number `attempt` may be retried.
    pub fn should_retry(&self, attempt: u32, error: &EventError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match &self.retry_if {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        }
    }

    /// Delay before retry number `attempt` (0-based), jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.delay(attempt);
        self.jitter
            .apply(base, self.backoff.initial(), self.backoff.cap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_attempts_bounds_retries() {
        let policy = RetryPolicy::new(3, BackoffPolicy::constant(Duration::from_millis(5)));
        let err = EventError::fail("boom");
        let retries = (0..10).take_while(|a| policy.should_retry(*a, &err)).count();
        assert_eq!(retries, 3);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, BackoffPolicy::default());
        assert_eq!(policy.max_attempts(), 1);
        assert!(policy.should_retry(0, &EventError::fail("x")));
    }

    #[test]
    fn test_predicate_overrides_classification() {
        let policy = RetryPolicy::default().retry_if(|e| e.as_label() == "event_fatal");
        assert!(policy.should_retry(0, &EventError::fatal("x")));
        assert!(!policy.should_retry(0, &EventError::fail("x")));
    }

    #[test]
    fn test_delay_follows_backoff_without_jitter() {
        let policy = RetryPolicy::new(
            5,
            BackoffPolicy::exponential(Duration::from_millis(10), Duration::from_secs(1)),
        );
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(3), Duration::from_millis(80));
    }
}

//! Retry and backoff policies.
//!
//! This module groups the knobs that control **whether** a failed event is
//! retried and **how long** to wait before it is queued again.
//!
//! ## Contents
//! - [`BackoffPolicy`] attempt → delay (constant / linear / exponential, capped)
//! - [`JitterPolicy`]  randomization layered on top of the backoff delay
//! - [`RetryPolicy`]   max attempts + backoff + optional retryable-error predicate
//!
//! ## Quick wiring
//! ```text
//! Event { retry: Option<RetryPolicy>, .. }
//!      └─► core::queued::complete_error uses:
//!           - should_retry(attempt, &err) to decide Retry vs Error
//!           - delay(attempt) to schedule the re-queue
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → exponential, initial=100ms, multiplier=2.0, max=30s.
//! - `JitterPolicy::None`.
//! - `RetryPolicy::default()` → max_attempts=3, no predicate (uses [`EventError::is_retryable`](crate::EventError::is_retryable)).

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;

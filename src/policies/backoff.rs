//! # Backoff policy for retried events.
//!
//! [`BackoffPolicy`] maps a retry attempt number (0-based) to a wait duration.
//! Three shapes are supported:
//! - [`BackoffPolicy::Constant`] the same delay for every attempt;
//! - [`BackoffPolicy::Linear`] `initial + increment × attempt`, clamped to `max`;
//! - [`BackoffPolicy::Exponential`] `initial × multiplier^attempt`, clamped to `max`.
//!
//! The computation is pure: the delay for attempt `n` depends on `n` only, never on
//! the delay actually slept for attempt `n - 1`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::Exponential {
//!     initial: Duration::from_millis(100),
//!     multiplier: 2.0,
//!     max: Duration::from_secs(10),
//! };
//!
//! assert_eq!(backoff.delay(0), Duration::from_millis(100));
//! assert_eq!(backoff.delay(1), Duration::from_millis(200));
//! // 100ms × 2^10 = 102_400ms → capped at max=10s
//! assert_eq!(backoff.delay(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

/// Default multiplier for [`BackoffPolicy::exponential`].
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Retry backoff shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BackoffPolicy {
    /// Fixed delay between attempts.
    Constant(Duration),

    /// Delay grows by a fixed increment per attempt.
    Linear {
        /// Delay before the first retry.
        initial: Duration,
        /// Added once per attempt.
        increment: Duration,
        /// Upper bound.
        max: Duration,
    },

    /// Delay grows geometrically per attempt.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Growth factor (`>= 1.0` recommended).
        multiplier: f64,
        /// Upper bound.
        max: Duration,
    },
}

impl Default for BackoffPolicy {
    /// Exponential: `initial = 100ms`, `multiplier = 2.0`, `max = 30s`.
    fn default() -> Self {
        Self::exponential(Duration::from_millis(100), Duration::from_secs(30))
    }
}

impl BackoffPolicy {
    /// Constant delay.
    pub const fn constant(delay: Duration) -> Self {
        Self::Constant(delay)
    }

    /// Linear growth capped at `max`.
    pub const fn linear(initial: Duration, increment: Duration, max: Duration) -> Self {
        Self::Linear {
            initial,
            increment,
            max,
        }
    }

    /// Exponential growth with the default multiplier (`2.0`), capped at `max`.
    pub const fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential {
            initial,
            multiplier: DEFAULT_MULTIPLIER,
            max,
        }
    }

    /// Delay before the first retry, clamped to the cap.
    ///
    /// Used as the floor of decorrelated jitter.
    pub fn initial(&self) -> Duration {
        match *self {
            Self::Constant(d) => d,
            Self::Linear { initial, max, .. } | Self::Exponential { initial, max, .. } => {
                initial.min(max)
            }
        }
    }

    /// Upper bound of any delay produced by this policy.
    pub fn cap(&self) -> Duration {
        match *self {
            Self::Constant(d) => d,
            Self::Linear { max, .. } | Self::Exponential { max, .. } => max,
        }
    }

    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// # Notes
    /// - Overflowing or non-finite intermediate values clamp to the cap.
    /// - A multiplier below `1.0` shrinks delays (not typical, but allowed).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Constant(d) => d,
            Self::Linear {
                initial,
                increment,
                max,
            } => increment
                .checked_mul(attempt)
                .and_then(|grown| initial.checked_add(grown))
                .map_or(max, |d| d.min(max)),
            Self::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let max_secs = max.as_secs_f64();
                let exp = attempt.min(i32::MAX as u32) as i32;
                let secs = initial.as_secs_f64() * multiplier.powi(exp);

                if !secs.is_finite() || secs < 0.0 || secs > max_secs {
                    max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }
}

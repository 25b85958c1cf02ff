//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] adds randomness on top of a [`BackoffPolicy`](super::BackoffPolicy)
//! delay so that many events failing together (e.g. all members of one token group)
//! do not retry in lockstep.
//!
//! - [`JitterPolicy::None`]: exact backoff delay
//! - [`JitterPolicy::Full`]: random delay in `[0, delay]`
//! - [`JitterPolicy::Equal`]: `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`]: random delay in `[floor, delay × 3]`, capped

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Predictable delays. Use for single events or tests.
    #[default]
    None,

    /// Random delay in `[0, delay]`. Most aggressive spreading.
    Full,

    /// `delay/2 + random[0, delay/2]`. Keeps ~75% of the delay on average.
    Equal,

    /// Random delay in `[floor, delay × 3]`, capped at `cap`.
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `floor` and `cap` bound the decorrelated variant and are ignored otherwise.
    pub fn apply(&self, delay: Duration, floor: Duration, cap: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => full(delay),
            JitterPolicy::Equal => equal(delay),
            JitterPolicy::Decorrelated => decorrelated(delay, floor, cap),
        }
    }
}

fn full(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let half = ms / 2;
    if half == 0 {
        return Duration::from_millis(ms);
    }
    Duration::from_millis(half + rand::rng().random_range(0..=half))
}

fn decorrelated(delay: Duration, floor: Duration, cap: Duration) -> Duration {
    let floor_ms = floor.as_millis() as u64;
    let upper = (delay.as_millis() as u64)
        .saturating_mul(3)
        .min(cap.as_millis() as u64)
        .max(floor_ms);

    if floor_ms >= upper {
        return floor;
    }
    Duration::from_millis(rand::rng().random_range(floor_ms..=upper))
}

//! # Execution modes: admission control for starting events.
//!
//! | Mode                        | Admits another start when          |
//! |-----------------------------|------------------------------------|
//! | `Sequential`                | nothing is running                 |
//! | `Concurrent(Some(n))`       | fewer than `n` are running         |
//! | `Concurrent(None)`          | always                             |
//! | `RateLimited{limit,window}` | fewer than `limit` started in the current window |
//!
//! Priority governs start order only; the concurrent and rate-limited modes make
//! no promise about completion order. Window bookkeeping uses
//! [`tokio::time::Instant`], so a paused test runtime drives it deterministically.

use std::time::Duration;

use tokio::time::Instant;

/// Admission strategy of an [`EventManager`](crate::EventManager).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One event at a time.
    Sequential,
    /// Up to `n` events at once (`None` = unbounded).
    Concurrent(Option<usize>),
    /// At most `limit` starts per rolling `window`.
    RateLimited {
        /// Starts allowed per window (min 1).
        limit: usize,
        /// Window length.
        window: Duration,
    },
}

impl ExecutionMode {
    /// Bounded concurrency; `0` means unbounded.
    pub fn concurrent(limit: usize) -> Self {
        ExecutionMode::Concurrent((limit > 0).then_some(limit))
    }

    /// Unbounded concurrency.
    pub fn unbounded() -> Self {
        ExecutionMode::Concurrent(None)
    }

    /// Rate limiting: `limit` starts per `window`.
    pub fn rate_limited(limit: usize, window: Duration) -> Self {
        ExecutionMode::RateLimited {
            limit: limit.max(1),
            window,
        }
    }
}

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    Granted,
    /// Denied until something running finishes.
    UntilIdle,
    /// Denied until the given instant (rate window reset).
    Until(Instant),
}

/// Mode plus its mutable bookkeeping.
#[derive(Debug)]
pub(crate) struct Admitter {
    mode: ExecutionMode,
    window_start: Option<Instant>,
    window_count: usize,
}

impl Admitter {
    pub(crate) fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            window_start: None,
            window_count: 0,
        }
    }

    pub(crate) fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Decides whether one more event may start now.
    pub(crate) fn check(&mut self, active: usize, now: Instant) -> Admission {
        match self.mode {
            ExecutionMode::Sequential if active == 0 => Admission::Granted,
            ExecutionMode::Sequential => Admission::UntilIdle,
            ExecutionMode::Concurrent(None) => Admission::Granted,
            ExecutionMode::Concurrent(Some(limit)) if active < limit => Admission::Granted,
            ExecutionMode::Concurrent(Some(_)) => Admission::UntilIdle,
            ExecutionMode::RateLimited { limit, window } => {
                let start = match self.window_start {
                    Some(start) if now.saturating_duration_since(start) < window => start,
                    _ => {
                        self.window_start = Some(now);
                        self.window_count = 0;
                        now
                    }
                };
                if self.window_count < limit {
                    Admission::Granted
                } else {
                    Admission::Until(start + window)
                }
            }
        }
    }

    /// Records a start granted by [`check`](Self::check).
    pub(crate) fn on_start(&mut self, now: Instant) {
        if let ExecutionMode::RateLimited { .. } = self.mode {
            if self.window_start.is_none() {
                self.window_start = Some(now);
            }
            self.window_count += 1;
        }
    }
}

//! # Manager configuration.
//!
//! [`ManagerConfig`] centralizes the settings consumed by
//! [`EventManager::builder`](crate::EventManager::builder).
//!
//! ## Sentinel values
//! - `max_queue_size = 0` → unbounded queue (overflow policy never applies)
//! - `max_batch_size = 0` → no per-batch start limit
//! - `frame_budget = 0s` → no per-batch time budget
//! - `history_capacity = 0` → no undo/redo manager

use std::time::Duration;

use crate::core::mode::ExecutionMode;

/// What `submit` does when the bounded queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Reject the new event with `SubmitError::Rejected`.
    #[default]
    DropNewest,
    /// Cancel the oldest queued event (retriable, reason `"queue overflow"`) and
    /// accept the new one.
    DropOldest,
    /// Reject the new event with `SubmitError::Overflow { current, max }`.
    Error,
}

/// Configuration for an [`EventManager`](crate::EventManager).
///
/// All fields are public; prefer the helper accessors to sprinkling sentinel
/// checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Admission strategy.
    pub mode: ExecutionMode,

    /// Maximum queued (not yet started) events. `0` = unbounded.
    ///
    /// Enforced only at submission time.
    pub max_queue_size: usize,

    /// Behaviour when `max_queue_size` is reached.
    pub overflow: OverflowPolicy,

    /// Maximum events started per scheduling batch before the driver yields.
    /// `0` = no limit.
    pub max_batch_size: usize,

    /// Maximum wall time spent starting events in one batch before the driver
    /// yields. `0s` = no limit.
    pub frame_budget: Duration,

    /// Capacity of the notification bus ring buffer (min 1).
    pub bus_capacity: usize,

    /// Entries kept per undo/redo stack. `0` = no history.
    pub history_capacity: usize,
}

impl ManagerConfig {
    /// Queue bound as an `Option` (`None` = unbounded).
    #[inline]
    pub fn queue_limit(&self) -> Option<usize> {
        (self.max_queue_size > 0).then_some(self.max_queue_size)
    }

    /// Batch size bound as an `Option` (`None` = no limit).
    #[inline]
    pub fn batch_limit(&self) -> Option<usize> {
        (self.max_batch_size > 0).then_some(self.max_batch_size)
    }

    /// Frame budget as an `Option` (`None` = no limit).
    #[inline]
    pub fn frame_limit(&self) -> Option<Duration> {
        (self.frame_budget > Duration::ZERO).then_some(self.frame_budget)
    }

    /// History capacity as an `Option` (`None` = no undo/redo manager).
    #[inline]
    pub fn history_limit(&self) -> Option<usize> {
        (self.history_capacity > 0).then_some(self.history_capacity)
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ManagerConfig {
    /// Default configuration:
    ///
    /// - `mode = Sequential`
    /// - `max_queue_size = 0` (unbounded), `overflow = DropNewest`
    /// - `max_batch_size = 64`
    /// - `frame_budget = 8ms`
    /// - `bus_capacity = 1024`
    /// - `history_capacity = 0` (no undo/redo)
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            max_queue_size: 0,
            overflow: OverflowPolicy::default(),
            max_batch_size: 64,
            frame_budget: Duration::from_millis(8),
            bus_capacity: 1024,
            history_capacity: 0,
        }
    }
}

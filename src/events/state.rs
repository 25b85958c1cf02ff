//! # Event lifecycle states.
//!
//! ```text
//! (none) ──► Queued ⇄ Paused
//!              │
//!              ▼
//!           Started ──► Progress* ──┬─► Completed(output)
//!              ▲                    ├─► Failed(error)
//!              │                    ├─► Cancelled(reason)
//!           Queued ◄── Retrying ◄───┘ (retry policy permits)
//! ```
//!
//! `Completed`, `Failed` and `Cancelled` are terminal: once reached, no further
//! transition is accepted until the event is re-submitted (and only a retriable
//! terminal state may be re-submitted).

use std::sync::Arc;
use std::time::Duration;

use crate::error::EventError;
use crate::events::action::Output;
use crate::tokens::CancelReason;

/// Lifecycle state of an [`Event`](crate::Event).
#[derive(Clone, Debug)]
pub enum EventState {
    /// Waiting in the manager's queue.
    Queued,
    /// Skipped by the scheduler until resumed.
    Paused,
    /// The action is running.
    Started,
    /// The action reported progress.
    Progress {
        /// Fraction done, clamped to `[0, 1]`.
        value: f64,
        /// Optional status line.
        message: Option<Arc<str>>,
    },
    /// The action failed and will be queued again after `delay`.
    Retrying {
        /// Retry number (1-based).
        attempt: u32,
        /// Delay before re-queueing.
        delay: Duration,
    },
    /// The action succeeded.
    Completed(Output),
    /// The action failed and will not be retried.
    Failed(EventError),
    /// The event was cancelled (explicitly, by its token, by timeout or overflow).
    Cancelled(CancelReason),
}

impl EventState {
    /// True for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventState::Completed(_) | EventState::Failed(_) | EventState::Cancelled(_)
        )
    }

    /// True while the action is executing (`Started` or `Progress`).
    pub fn is_running(&self) -> bool {
        matches!(self, EventState::Started | EventState::Progress { .. })
    }

    /// True if the event may be submitted again from this state.
    ///
    /// Only a non-retriable cancellation forbids re-submission.
    pub fn is_resubmittable(&self) -> bool {
        match self {
            EventState::Cancelled(c) => c.retriable,
            other => other.is_terminal(),
        }
    }

    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventState::Queued => "queued",
            EventState::Paused => "paused",
            EventState::Started => "started",
            EventState::Progress { .. } => "progress",
            EventState::Retrying { .. } => "retrying",
            EventState::Completed(_) => "completed",
            EventState::Failed(_) => "failed",
            EventState::Cancelled(_) => "cancelled",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// `None` as the current state means "never submitted or reset".
    pub(crate) fn accepts(current: Option<&EventState>, next: &EventState) -> bool {
        use EventState::*;
        match (current, next) {
            (Some(c), _) if c.is_terminal() => false,
            (_, Cancelled(_)) => true,
            (None | Some(Retrying { .. }) | Some(Paused), Queued) => true,
            (Some(Queued), Paused) => true,
            (Some(Queued), Started) => true,
            (Some(Started | Progress { .. }), Progress { .. }) => true,
            (Some(Started | Progress { .. }), Completed(_) | Failed(_) | Retrying { .. }) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        let done = EventState::Completed(Output::empty());
        assert!(!EventState::accepts(Some(&done), &EventState::Queued));
        assert!(!EventState::accepts(
            Some(&done),
            &EventState::Cancelled(CancelReason::new("x", true))
        ));
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(EventState::accepts(None, &EventState::Queued));
        assert!(EventState::accepts(Some(&EventState::Queued), &EventState::Started));
        let progress = EventState::Progress {
            value: 0.5,
            message: None,
        };
        assert!(EventState::accepts(Some(&EventState::Started), &progress));
        assert!(EventState::accepts(
            Some(&progress),
            &EventState::Completed(Output::empty())
        ));
    }

    #[test]
    fn test_pause_only_from_queue() {
        assert!(EventState::accepts(Some(&EventState::Queued), &EventState::Paused));
        assert!(!EventState::accepts(Some(&EventState::Started), &EventState::Paused));
        assert!(EventState::accepts(Some(&EventState::Paused), &EventState::Queued));
        assert!(!EventState::accepts(Some(&EventState::Paused), &EventState::Started));
    }

    #[test]
    fn test_resubmittable() {
        assert!(EventState::Failed(EventError::fail("x")).is_resubmittable());
        assert!(EventState::Cancelled(CancelReason::new("x", true)).is_resubmittable());
        assert!(!EventState::Cancelled(CancelReason::new("x", false)).is_resubmittable());
        assert!(!EventState::Queued.is_resubmittable());
    }
}

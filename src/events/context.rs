//! # Per-attempt context handed to actions.
//!
//! [`EventContext`] lets an action report progress, inspect which retry it is
//! running as, and check cooperative cancellation (its own event or its token).

use crate::events::event::Event;
use crate::tokens::EventToken;

/// Context for one attempt of an event's action.
#[derive(Clone, Debug)]
pub struct EventContext {
    event: Event,
    attempt: u32,
}

impl EventContext {
    pub(crate) fn new(event: Event, attempt: u32) -> Self {
        Self { event, attempt }
    }

    /// The event being executed.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Retries performed before this attempt (0 on the first run).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The event's group token, if any.
    pub fn token(&self) -> Option<&EventToken> {
        self.event.token()
    }

    /// True once the event or its token has been cancelled.
    ///
    /// Long-running actions should poll this and return early; the result of an
    /// attempt finishing after cancellation is discarded anyway.
    pub fn is_cancelled(&self) -> bool {
        self.event.is_cancelled()
    }

    /// Reports progress. `value` is clamped to `[0, 1]`.
    ///
    /// Returns `false` when the event is not running (e.g. already cancelled).
    pub fn progress(&self, value: f64, message: Option<&str>) -> bool {
        self.event.report_progress(value, message)
    }
}

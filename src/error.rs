//! Error types used by the eventvisor runtime and by event actions.
//!
//! - [`SubmitError`]: admission faults raised synchronously by `submit`; the
//!   queue is left untouched.
//! - [`EventError`]: faults raised by actions (and by batch members).
//! - [`ActionFault`]: an [`EventError`] bound to the event that raised it,
//!   with [`ActionFault::retry`] to submit it again.
//! - [`Failure`]: what a [`Completion`](crate::Completion) resolves to when the
//!   event did not complete: a terminal action fault, or a cancellation.
//!
//! All enums provide `as_label` (stable snake_case, for logs/metrics).

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;

use crate::core::{Completion, Shared};
use crate::events::{BatchError, Event};
use crate::tokens::CancelReason;

/// # Admission faults.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Queue is full and the overflow policy is `Error`.
    #[error("queue overflow: {current} queued, max {max}")]
    Overflow {
        /// Queue length at submission time.
        current: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Queue is full and the overflow policy is `DropNewest`.
    #[error("queue full; submission dropped")]
    Rejected,

    /// The event is disabled.
    #[error("event is disabled")]
    Disabled,

    /// The event was cancelled non-retriably.
    #[error("event was cancelled and cannot be resubmitted")]
    Terminated,

    /// The event is already queued or running.
    #[error("event is already queued or in flight")]
    InFlight,

    /// The manager has been disposed.
    #[error("manager disposed")]
    Disposed,
}

impl SubmitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::SubmitError;
    ///
    /// let err = SubmitError::Overflow { current: 2, max: 2 };
    /// assert_eq!(err.as_label(), "submit_overflow");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Overflow { .. } => "submit_overflow",
            SubmitError::Rejected => "submit_rejected",
            SubmitError::Disabled => "submit_disabled",
            SubmitError::Terminated => "submit_terminated",
            SubmitError::InFlight => "submit_in_flight",
            SubmitError::Disposed => "submit_disposed",
        }
    }
}

/// # Faults raised by event actions.
///
/// `Fail` and `Timeout` are retryable by default, `Fatal` and `Cancelled` never
/// are; a `Batch` fault is retryable when every member fault is.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum EventError {
    /// Execution failed but may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error (not retried unless a predicate says so).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// A batch member exceeded its timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// A batch member was cancelled.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// Cancellation reason.
        reason: Arc<str>,
    },

    /// Aggregate fault of a batch event.
    #[error(transparent)]
    Batch(Arc<BatchError>),
}

impl EventError {
    /// A retryable failure.
    pub fn fail(error: impl fmt::Display) -> Self {
        EventError::Fail {
            error: error.to_string(),
        }
    }

    /// A non-retryable failure.
    pub fn fatal(error: impl fmt::Display) -> Self {
        EventError::Fatal {
            error: error.to_string(),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        EventError::Fatal {
            error: format!("action panicked: {msg}"),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::EventError;
    ///
    /// assert_eq!(EventError::fail("boom").as_label(), "event_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EventError::Fail { .. } => "event_failed",
            EventError::Fatal { .. } => "event_fatal",
            EventError::Timeout { .. } => "event_timeout",
            EventError::Cancelled { .. } => "event_cancelled",
            EventError::Batch(_) => "event_batch_failed",
        }
    }

    /// Indicates whether the error is safe to retry.
    ///
    /// # Example
    /// ```
    /// use eventvisor::EventError;
    ///
    /// assert!(EventError::fail("boom").is_retryable());
    /// assert!(!EventError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            EventError::Fail { .. } | EventError::Timeout { .. } => true,
            EventError::Fatal { .. } | EventError::Cancelled { .. } => false,
            EventError::Batch(batch) => batch.failures().iter().all(|(_, e)| e.is_retryable()),
        }
    }
}

/// # A terminal action fault, bound to its event.
#[derive(Clone)]
pub struct ActionFault {
    event: Event,
    error: EventError,
    manager: Weak<Shared>,
}

impl ActionFault {
    pub(crate) fn new(event: Event, error: EventError, manager: Weak<Shared>) -> Self {
        Self {
            event,
            error,
            manager,
        }
    }

    /// The event that failed.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// The raw fault.
    pub fn error(&self) -> &EventError {
        &self.error
    }

    /// Submits the event again to the manager that ran it.
    ///
    /// For a batch fault only the members that failed or were never attempted
    /// are resubmitted, as a new batch carrying the original's attributes.
    pub fn retry(&self) -> Result<Completion, SubmitError> {
        let shared = self.manager.upgrade().ok_or(SubmitError::Disposed)?;
        match &self.error {
            EventError::Batch(batch) => {
                let remaining = Event::builder(batch.retry_batch())
                    .inherit(&self.event)
                    .build();
                shared.submit(remaining)
            }
            _ => shared.submit(self.event.clone()),
        }
    }
}

impl fmt::Debug for ActionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFault")
            .field("event", &self.event)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for ActionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event.key() {
            Some(key) => write!(f, "event {key:?}: {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for ActionFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// # Why an event did not complete.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum Failure {
    /// The action failed and the retry policy (if any) gave up.
    #[error(transparent)]
    Failed(ActionFault),

    /// The event was cancelled (explicitly, by its token, by timeout, overflow or clear).
    #[error("cancelled: {0}")]
    Cancelled(CancelReason),
}

impl Failure {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Failure::Failed(_) => "failure_failed",
            Failure::Cancelled(_) => "failure_cancelled",
        }
    }

    /// The fault, if the event failed.
    pub fn fault(&self) -> Option<&ActionFault> {
        match self {
            Failure::Failed(fault) => Some(fault),
            Failure::Cancelled(_) => None,
        }
    }

    /// The cancellation, if the event was cancelled.
    pub fn cancellation(&self) -> Option<&CancelReason> {
        match self {
            Failure::Cancelled(reason) => Some(reason),
            Failure::Failed(_) => None,
        }
    }

    /// True if cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Failure::Cancelled(_))
    }
}

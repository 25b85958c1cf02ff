//! # Queued event wrapper and its completion.
//!
//! A [`QueuedEvent`] binds one submission of an [`Event`] to its result slot.
//! It is created by `submit`, survives retries (the same wrapper goes back into
//! the queue), and is consumed exactly once by [`QueuedEvent::deliver`].
//!
//! The caller side of the slot is a [`Completion`] future (or the callbacks
//! given to `submit_with`).

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::warn;

use crate::error::Failure;
use crate::events::{Event, Output};
use crate::tokens::CancelReason;

/// What a submission resolves to.
pub type Outcome = Result<Output, Failure>;

pub(crate) type Deliver = Box<dyn FnOnce(Outcome) + Send>;

/// Wraps a user callback so a panic in it is logged instead of unwinding into
/// the scheduler.
pub(crate) fn guarded<F>(callback: F) -> Deliver
where
    F: FnOnce(Outcome) + Send + 'static,
{
    Box::new(move |outcome| {
        if catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
            warn!("completion callback panicked");
        }
    })
}

pub(crate) struct QueuedEvent {
    pub(crate) event: Event,
    /// Insertion order, used to find the oldest entry on overflow.
    pub(crate) seq: u64,
    /// Submission generation this wrapper belongs to.
    pub(crate) generation: u64,
    /// Retries performed so far.
    pub(crate) attempt: u32,
    /// Submitted through `process_immediately`: never queued, holds no slot.
    pub(crate) immediate: bool,
    deliver: Option<Deliver>,
}

impl QueuedEvent {
    pub(crate) fn new(event: Event, generation: u64, immediate: bool, deliver: Deliver) -> Self {
        Self {
            event,
            seq: 0,
            generation,
            attempt: 0,
            immediate,
            deliver: Some(deliver),
        }
    }

    /// False once the event was claimed again by a newer submission.
    pub(crate) fn is_current(&self) -> bool {
        self.event.generation() == self.generation
    }

    pub(crate) fn priority(&self) -> i32 {
        self.event.priority()
    }

    /// Hands the outcome to the submitter. Must be called outside any manager lock.
    pub(crate) fn deliver(mut self, outcome: Outcome) {
        if let Some(deliver) = self.deliver.take() {
            deliver(outcome);
        }
    }
}

impl Drop for QueuedEvent {
    fn drop(&mut self) {
        if let Some(deliver) = self.deliver.take() {
            deliver(Err(Failure::Cancelled(CancelReason::new("disposed", true))));
        }
    }
}

impl fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("event", &self.event)
            .field("seq", &self.seq)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Resolves when a submitted event terminates.
///
/// - `Ok(output)` when the action completed,
/// - `Err(Failure::Failed(_))` when it failed and retries (if any) gave up,
/// - `Err(Failure::Cancelled(_))` when it was cancelled (explicitly, by its
///   token, by timeout, overflow, `clear` or disposal).
///
/// Dropping a `Completion` does not cancel the event.
#[must_use = "a Completion does nothing unless awaited; drop it to ignore the result"]
pub struct Completion {
    event: Event,
    rx: oneshot::Receiver<Outcome>,
}

impl Completion {
    pub(crate) fn channel(event: Event) -> (Self, Deliver) {
        let (tx, rx) = oneshot::channel();
        let deliver: Deliver = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (Self { event, rx }, deliver)
    }

    /// The submitted event.
    pub fn event(&self) -> &Event {
        &self.event
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| Err(Failure::Cancelled(CancelReason::new("disposed", true))))
        })
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").field("event", &self.event).finish()
    }
}

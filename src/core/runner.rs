//! # Run one attempt of a queued event.
//!
//! ```text
//! start(w):
//!   capture_state()  (reversible events; panics become fatal faults)
//!   Queued ──► Started
//!   run_guarded(action)
//!     ├─ Ready(res)   ──► settle(w, res)                 (inline)
//!     └─ Pending(fut) ──► spawn { race(spawn(fut), timeout) } ──► settle(w, res | timed out)
//!
//! settle(w, attempt):
//!   release slot, then
//!   ├─ stale submission / cancelled ──► Cancelled
//!   ├─ timed out                    ──► Cancelled("timeout", retriable = false)
//!   ├─ Ok(out)  ──► Completed ──► record history ──► deliver Ok
//!   └─ Err(e)   ──► retry policy permits?
//!                     ├─ yes ──► Retrying{attempt, delay} ──► delayed ──► timer ──► requeue
//!                     └─ no  ──► Failed ──► deliver Failure::Failed(ActionFault)
//! ```
//!
//! ## Rules
//! - Cancellation is re-checked after every await point: a result arriving
//!   after cancel is discarded.
//! - Timeout is a terminal, non-retriable cancellation even when a retry
//!   policy is present. The timed-out action is not aborted: it runs to the
//!   end on its own task and its result is discarded.
//! - Retry timers are children of the manager's timer token; `clear` and
//!   `dispose` cancel them.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::queued::QueuedEvent;
use crate::core::shared::{Shared, superseded};
use crate::error::{ActionFault, EventError, Failure};
use crate::events::{EventContext, EventState, Execution, Output, run_guarded};
use crate::tokens::CancelReason;

/// How an attempt ended.
pub(crate) enum Attempt {
    Done(Result<Output, EventError>),
    TimedOut(Duration),
    /// The event could not be started (cancelled or superseded after dequeue).
    Interrupted,
}

impl Shared {
    /// Starts one attempt. The caller has already taken an execution slot for
    /// queued (non-immediate) wrappers.
    pub(crate) fn start(&self, wrapper: QueuedEvent) {
        if !wrapper.is_current() {
            self.settle(wrapper, Attempt::Interrupted);
            return;
        }
        let event = wrapper.event.clone();

        if let Some(hooks) = event.reversible_hooks() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| hooks.capture_state())) {
                let err = EventError::from_panic(panic);
                if event.transition(EventState::Started) {
                    self.settle(wrapper, Attempt::Done(Err(err)));
                } else {
                    self.settle(wrapper, Attempt::Interrupted);
                }
                return;
            }
        }
        if !event.transition(EventState::Started) {
            self.settle(wrapper, Attempt::Interrupted);
            return;
        }

        let ctx = EventContext::new(event.clone(), wrapper.attempt);
        match run_guarded(event.action(), &ctx) {
            Execution::Ready(res) => self.settle(wrapper, Attempt::Done(res)),
            Execution::Pending(fut) => {
                let Some(shared) = self.me.upgrade() else {
                    return;
                };
                let timeout = event.timeout();
                tokio::spawn(async move {
                    let attempt = match timeout {
                        Some(limit) => {
                            // past the deadline the action keeps running; only its result is dropped
                            let mut work = tokio::spawn(fut);
                            match tokio::time::timeout(limit, &mut work).await {
                                Ok(Ok(res)) => Attempt::Done(res),
                                Ok(Err(_join)) => Attempt::Interrupted,
                                Err(_elapsed) => Attempt::TimedOut(limit),
                            }
                        }
                        None => Attempt::Done(fut.await),
                    };
                    shared.settle(wrapper, attempt);
                });
            }
        }
    }

    /// Finishes an attempt: frees its slot and moves the event on.
    pub(crate) fn settle(&self, wrapper: QueuedEvent, attempt: Attempt) {
        if !wrapper.immediate {
            self.release_slot();
        }
        if !wrapper.is_current() {
            self.retire(wrapper, superseded());
            return;
        }
        if let Some(c) = wrapper.event.cancellation() {
            self.cancel_wrapper(wrapper, c);
            return;
        }

        match attempt {
            Attempt::Done(Ok(out)) => self.complete(wrapper, out),
            Attempt::Done(Err(err)) => self.complete_error(wrapper, err),
            Attempt::TimedOut(limit) => {
                debug!(
                    key = wrapper.event.key().unwrap_or("-"),
                    timeout_ms = limit.as_millis() as u64,
                    "event timed out"
                );
                self.cancel_wrapper(wrapper, CancelReason::new("timeout", false));
            }
            Attempt::Interrupted => {
                self.cancel_wrapper(wrapper, CancelReason::new("interrupted", true));
            }
        }
    }

    fn complete(&self, wrapper: QueuedEvent, out: Output) {
        let event = wrapper.event.clone();
        if event.transition(EventState::Completed(out.clone())) {
            if let Some(history) = &self.history {
                history.record(&event);
            }
            self.retire(wrapper, Ok(out));
        } else {
            self.retire_displaced(wrapper);
        }
    }

    fn complete_error(&self, mut wrapper: QueuedEvent, err: EventError) {
        let event = wrapper.event.clone();
        let attempt = wrapper.attempt;
        let decision = match event.retry_policy() {
            Some(p) => catch_unwind(AssertUnwindSafe(|| {
                p.should_retry(attempt, &err).then(|| p.delay(attempt))
            })),
            None => Ok(None),
        };
        // a panicking retry predicate ends the event with that panic as its fault
        let (retry, err) = match decision {
            Ok(retry) => (retry, err),
            Err(panic) => {
                warn!(key = event.key().unwrap_or("-"), "retry predicate panicked");
                (None, EventError::from_panic(panic))
            }
        };

        match retry {
            Some(delay) => {
                wrapper.attempt += 1;
                let next = EventState::Retrying {
                    attempt: wrapper.attempt,
                    delay,
                };
                if event.transition(next) {
                    self.schedule_retry(wrapper, delay);
                } else {
                    self.retire_displaced(wrapper);
                }
            }
            None => {
                let fault = ActionFault::new(event.clone(), err.clone(), self.me.clone());
                if event.transition(EventState::Failed(err)) {
                    self.retire(wrapper, Err(Failure::Failed(fault)));
                } else {
                    self.retire_displaced(wrapper);
                }
            }
        }
    }

    /// The event moved on without us (cancelled or re-claimed mid-flight).
    fn retire_displaced(&self, wrapper: QueuedEvent) {
        match wrapper.event.cancellation() {
            Some(c) => self.retire(wrapper, Err(Failure::Cancelled(c))),
            None => self.retire(wrapper, superseded()),
        }
    }

    fn schedule_retry(&self, wrapper: QueuedEvent, delay: Duration) {
        let id = wrapper.event.id();
        let generation = wrapper.generation;
        let parked = {
            let mut core = self.lock();
            if core.disposed {
                Err(wrapper)
            } else {
                core.delayed.insert(id, wrapper);
                Ok(core.timers.clone())
            }
        };
        let timers = match parked {
            Ok(timers) => timers,
            Err(wrapper) => {
                self.cancel_wrapper(wrapper, CancelReason::new("disposed", true));
                return;
            }
        };
        let Some(shared) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => shared.fire_retry(id, generation),
                _ = timers.cancelled() => {}
            }
        });
    }

    fn fire_retry(&self, id: usize, generation: u64) {
        let wrapper = {
            let mut core = self.lock();
            let due = core
                .delayed
                .get(&id)
                .is_some_and(|w| w.generation == generation);
            if due { core.delayed.remove(&id) } else { None }
        };
        if let Some(wrapper) = wrapper {
            self.requeue(wrapper);
        }
    }

    fn release_slot(&self) {
        {
            let mut core = self.lock();
            core.active = core.active.saturating_sub(1);
        }
        self.wake.notify_one();
    }
}

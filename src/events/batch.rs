//! # Batch events: several events run as one unit.
//!
//! A [`BatchEvent`] is an [`Action`] composed of member events. Members run
//! inline inside the batch's own attempt (they are not queued individually), but
//! each still goes through its own lifecycle states, honours its own timeout and
//! token, and keeps its own reversible `capture_state` hook.
//!
//! ## Modes
//! ```text
//! Sequential, eager       m1 ─► m2 ✗  (m3 never attempted)
//! Sequential, collecting  m1 ─► m2 ✗ ─► m3          (all attempted)
//! Concurrent              m1 ┐
//!                         m2 ┼─► join (every result kept)
//!                         m3 ┘
//! ```
//!
//! On any failure the batch fails with one aggregate [`BatchError`] that lists
//! exactly the members that failed or were never attempted, and keeps the
//! outputs of the members that succeeded. [`BatchError::retry_batch`] builds a
//! new batch containing only the outstanding members.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;

use crate::error::{EventError, SubmitError};
use crate::events::action::{Action, Execution, Output, run_guarded};
use crate::events::context::EventContext;
use crate::events::event::Event;
use crate::events::state::EventState;
use crate::tokens::EventToken;

/// How batch members are scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchMode {
    /// One member at a time, in order.
    Sequential,
    /// All members started at once.
    Concurrent,
}

/// An action composed of member events.
///
/// On success the batch output is a `Vec<Output>` in member order.
#[derive(Clone, Debug)]
pub struct BatchEvent {
    events: Vec<Event>,
    mode: BatchMode,
    eager: bool,
}

impl BatchEvent {
    /// Sequential batch that stops at the first failure.
    pub fn sequential(events: Vec<Event>) -> Self {
        Self {
            events,
            mode: BatchMode::Sequential,
            eager: true,
        }
    }

    /// Concurrent batch.
    pub fn concurrent(events: Vec<Event>) -> Self {
        Self {
            events,
            mode: BatchMode::Concurrent,
            eager: false,
        }
    }

    /// Stop at the first failure (`true`) or attempt every member and collect
    /// all failures (`false`). Only meaningful for sequential batches: concurrent
    /// members are all started before any can fail.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Member events.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Scheduling mode.
    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    /// Wraps the batch into a submittable event with default attributes.
    pub fn into_event(self) -> Event {
        Event::new(self)
    }
}

impl Action for BatchEvent {
    fn run(&self, ctx: &EventContext) -> Execution {
        let batch = self.clone();
        let parent = ctx.clone();
        Execution::pending(async move {
            match batch.mode {
                BatchMode::Sequential => batch.run_sequential(&parent).await,
                BatchMode::Concurrent => batch.run_concurrent(parent.attempt()).await,
            }
        })
    }
}

impl BatchEvent {
    async fn run_sequential(self, parent: &EventContext) -> Result<Output, EventError> {
        let mut report = BatchReport::new(self.mode, self.eager);
        let mut members = self.events.into_iter();

        while let Some(member) = members.next() {
            if parent.is_cancelled() {
                report.skipped.push(member);
                report.skipped.extend(members.by_ref());
                break;
            }
            match run_member(member.clone(), parent.attempt()).await {
                Ok(out) => report.completed.push((member, out)),
                Err(err) => {
                    report.failed.push((member, err));
                    if report.eager {
                        report.skipped.extend(members.by_ref());
                        break;
                    }
                }
            }
        }
        report.finish()
    }

    async fn run_concurrent(self, attempt: u32) -> Result<Output, EventError> {
        let mut report = BatchReport::new(self.mode, self.eager);
        let results = join_all(
            self.events
                .iter()
                .cloned()
                .map(|member| run_member(member, attempt)),
        )
        .await;

        for (member, res) in self.events.into_iter().zip(results) {
            match res {
                Ok(out) => report.completed.push((member, out)),
                Err(err) => report.failed.push((member, err)),
            }
        }
        report.finish()
    }
}

/// Runs one member through its own lifecycle, outside any manager queue.
async fn run_member(event: Event, attempt: u32) -> Result<Output, EventError> {
    match event.claim() {
        Ok(_) => {}
        Err(SubmitError::Terminated) => {
            let reason = event
                .cancellation()
                .map_or_else(|| Arc::from("cancelled"), |c| c.reason);
            return Err(EventError::Cancelled { reason });
        }
        Err(e) => return Err(EventError::fatal(format!("batch member rejected: {e}"))),
    }
    if let Some(c) = event.token().and_then(EventToken::cancellation) {
        event.transition(EventState::Cancelled(c.clone()));
        return Err(EventError::Cancelled { reason: c.reason });
    }

    event.transition(EventState::Queued);
    if let Some(hooks) = event.reversible_hooks() {
        hooks.capture_state();
    }
    event.transition(EventState::Started);

    let ctx = EventContext::new(event.clone(), attempt);
    let res = match (run_guarded(event.action(), &ctx), event.timeout()) {
        (Execution::Ready(res), _) => res,
        (Execution::Pending(fut), Some(timeout)) => tokio::time::timeout(timeout, fut)
            .await
            .unwrap_or(Err(EventError::Timeout { timeout })),
        (Execution::Pending(fut), None) => fut.await,
    };

    match &res {
        Ok(out) => event.transition(EventState::Completed(out.clone())),
        Err(err) => event.transition(EventState::Failed(err.clone())),
    };
    res
}

struct BatchReport {
    mode: BatchMode,
    eager: bool,
    completed: Vec<(Event, Output)>,
    failed: Vec<(Event, EventError)>,
    skipped: Vec<Event>,
}

impl BatchReport {
    fn new(mode: BatchMode, eager: bool) -> Self {
        Self {
            mode,
            eager,
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn finish(self) -> Result<Output, EventError> {
        if self.failed.is_empty() && self.skipped.is_empty() {
            let outputs: Vec<Output> = self.completed.into_iter().map(|(_, out)| out).collect();
            return Ok(Output::new(outputs));
        }
        Err(EventError::Batch(Arc::new(BatchError {
            mode: self.mode,
            eager: self.eager,
            completed: self.completed,
            failed: self.failed,
            skipped: self.skipped,
        })))
    }
}

/// Aggregate fault of a batch.
#[derive(Clone, Debug)]
pub struct BatchError {
    mode: BatchMode,
    eager: bool,
    completed: Vec<(Event, Output)>,
    failed: Vec<(Event, EventError)>,
    skipped: Vec<Event>,
}

impl BatchError {
    /// Members that failed, with their faults.
    pub fn failures(&self) -> &[(Event, EventError)] {
        &self.failed
    }

    /// Members never attempted (eager stop or parent cancellation).
    pub fn skipped(&self) -> &[Event] {
        &self.skipped
    }

    /// Members that succeeded, with their outputs.
    pub fn completed(&self) -> &[(Event, Output)] {
        &self.completed
    }

    /// Failed members followed by never-attempted members.
    pub fn outstanding(&self) -> Vec<Event> {
        self.failed
            .iter()
            .map(|(ev, _)| ev.clone())
            .chain(self.skipped.iter().cloned())
            .collect()
    }

    /// A new batch with the same mode containing only the outstanding members.
    pub fn retry_batch(&self) -> BatchEvent {
        BatchEvent {
            events: self.outstanding(),
            mode: self.mode,
            eager: self.eager,
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.completed.len() + self.failed.len() + self.skipped.len();
        write!(
            f,
            "batch failed: {} of {} members failed, {} not attempted",
            self.failed.len(),
            total,
            self.skipped.len()
        )
    }
}

impl std::error::Error for BatchError {}

//! # EventManager: the public handle to a running event queue.
//!
//! [`EventManager`] is cheap to clone; every clone drives the same queue. Build
//! one with [`EventManager::new`] or [`EventManager::builder`] from inside a
//! tokio runtime.
//!
//! ```text
//! submit(event) ──► checks ──► priority queue ──► driver ──► attempt ──► Completion
//!                     │                                        │
//!                     └─ SubmitError (sync, queue untouched)   └─ retry timer ─► queue
//! ```
//!
//! ## Example
//! ```rust
//! use eventvisor::{ActionFn, Event, EventManager, Execution, ManagerConfig, Output};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = EventManager::new(ManagerConfig::default());
//!
//!     let event = Event::builder(ActionFn::new(|_ctx| Execution::ok(Output::new(7u32))))
//!         .key("answer")
//!         .priority(10)
//!         .build();
//!
//!     let out = manager.submit(event)?.await?;
//!     assert_eq!(out.downcast_ref::<u32>(), Some(&7));
//!
//!     manager.dispose();
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::broadcast;

use crate::core::builder::ManagerBuilder;
use crate::core::config::ManagerConfig;
use crate::core::mode::ExecutionMode;
use crate::core::queued::{Completion, guarded};
use crate::core::shared::Shared;
use crate::core::stream::{StreamHandlers, StreamSubscription, spawn_stream};
use crate::error::{Failure, SubmitError};
use crate::events::{Event, Output};
use crate::history::UndoRedoManager;
use crate::notify::Notification;
use crate::subscribers::{Subscribe, SubscriberId};

/// Handle to an event queue and its driver.
#[derive(Clone)]
pub struct EventManager {
    shared: Arc<Shared>,
}

impl EventManager {
    /// Starts a manager with the given configuration and no extras.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn new(cfg: ManagerConfig) -> Self {
        ManagerBuilder::new(cfg).build()
    }

    /// Builder for a manager with a logger, subscribers or undo history.
    pub fn builder(cfg: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder::new(cfg)
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    // ---- submission ----

    /// Queues `event` and returns a future resolving to its outcome.
    ///
    /// Fails synchronously (queue untouched) when the manager is disposed, the
    /// event is disabled, already queued or running, cancelled non-retriably, or
    /// the bounded queue refuses it.
    pub fn submit(&self, event: Event) -> Result<Completion, SubmitError> {
        self.shared.submit(event)
    }

    /// Queues `event`; exactly one of the callbacks runs when it terminates.
    ///
    /// Callbacks run on the scheduler; keep them short.
    pub fn submit_with<D, F>(&self, event: Event, on_done: D, on_error: F) -> Result<(), SubmitError>
    where
        D: FnOnce(Output) + Send + 'static,
        F: FnOnce(Failure) + Send + 'static,
    {
        let deliver = guarded(move |outcome| match outcome {
            Ok(out) => on_done(out),
            Err(failure) => on_error(failure),
        });
        self.shared.enqueue(event, deliver)
    }

    /// Submits every event `source` yields until it ends, the subscription is
    /// cancelled, or the manager is disposed.
    pub fn submit_stream<S, E>(&self, source: S, handlers: StreamHandlers<E>) -> StreamSubscription
    where
        S: Stream<Item = Result<Event, E>> + Send + 'static,
        E: Send + 'static,
    {
        spawn_stream(&self.shared, source, handlers)
    }

    /// Runs `event` now, bypassing the queue and the execution mode.
    ///
    /// State checks, timeout, retry policy and token still apply. Retries of an
    /// immediate event also bypass the queue.
    pub fn process_immediately(&self, event: Event) -> Result<Completion, SubmitError> {
        let (completion, deliver) = Completion::channel(event.clone());
        self.shared.run_now(event, deliver)?;
        Ok(completion)
    }

    // ---- control ----

    /// Stops starting new events; running ones continue. Returns `false` if
    /// already paused or disposed.
    pub fn pause(&self) -> bool {
        self.shared.pause()
    }

    /// Lifts a pause. A resume requested while a batch is being started takes
    /// effect when that batch ends. Returns `false` if not paused.
    pub fn resume(&self) -> bool {
        self.shared.resume()
    }

    /// Cancels every queued or retry-waiting event, unpauses, and returns how
    /// many were cancelled. Running events are unaffected.
    pub fn clear(&self, reason: Option<&str>) -> usize {
        self.shared.clear(reason)
    }

    /// Shuts the manager down: pending events are cancelled, timers, stream
    /// subscriptions and the driver stop, token listeners are released. Running
    /// attempts finish, but no new work starts. Idempotent.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    // ---- introspection ----

    /// Events waiting in the queue (retry-waiting events are not counted).
    pub fn queue_len(&self) -> usize {
        self.shared.load().0
    }

    /// Queued events currently executing.
    pub fn active_count(&self) -> usize {
        self.shared.load().1
    }

    /// True while the whole queue is paused.
    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    /// True once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Snapshot of the queue in start order.
    pub fn pending(&self) -> Vec<Event> {
        self.shared.lock().queue.events()
    }

    /// Admission mode the manager was built with.
    pub fn mode(&self) -> ExecutionMode {
        self.shared.lock().admitter.mode()
    }

    /// Configuration the manager was built with.
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.cfg
    }

    /// Undo/redo history, if enabled on the builder.
    pub fn undo_redo(&self) -> Option<&Arc<UndoRedoManager>> {
        self.shared.history.as_ref()
    }

    /// Receiver observing every notification published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.shared.bus.subscribe()
    }

    /// Attaches a subscriber with its own bounded queue and worker.
    pub fn add_subscriber(&self, sub: Arc<dyn Subscribe>) -> SubscriberId {
        self.shared.subscribers.add(sub)
    }

    /// Detaches a subscriber; its worker drains what is already queued.
    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        self.shared.subscribers.remove(id)
    }

    /// Tokens the manager currently listens to.
    pub fn token_count(&self) -> usize {
        self.shared.token_count()
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (queue_len, active) = self.shared.load();
        f.debug_struct("EventManager")
            .field("mode", &self.mode())
            .field("queue_len", &queue_len)
            .field("active", &active)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

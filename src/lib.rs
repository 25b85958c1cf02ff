//! # eventvisor
//!
//! **Eventvisor** is an in-process event queue for tokio applications.
//!
//! Units of work ([`Event`]s) are submitted to an [`EventManager`], ordered by
//! priority, and started by a single driver task according to an
//! [`ExecutionMode`]. Each event carries its own timeout, [`RetryPolicy`] and an
//! optional group [`EventToken`]; reversible events feed an
//! [`UndoRedoManager`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   submit / submit_with / submit_stream        process_immediately
//!            │                                          │
//!            ▼                                          │
//! ┌──────────────────────────────────────────────┐      │
//! │  EventManager (Arc<Shared>)                  │      │
//! │  - PendingQueue (priority, FIFO within)      │      │
//! │  - Admitter (Sequential/Concurrent/RateLim.) │      │
//! │  - delayed (retry-waiting events)            │      │
//! │  - token listeners (ref-counted)             │      │
//! └──────┬───────────────────────────────────────┘      │
//!        ▼                                              │
//!   driver task (time-boxed batches)                    │
//!        │                                              │
//!        ▼                                              ▼
//!   attempt: capture_state ─► Started ─► Action::run ─► timeout race
//!        │
//!        ├─ Ok   ─► Completed ─► UndoRedoManager::record ─► Completion
//!        ├─ Err  ─► RetryPolicy ─► Retrying ─► timer ─► queue again
//!        │                    └──► Failed ─► Completion (ActionFault)
//!        └─ cancel/timeout ─► Cancelled ─► Completion
//!
//! Every state change:
//!   ─► Bus (broadcast) ─► listener ─► SubscriberSet ─► per-subscriber workers
//!   ─► EventLogger::record_lifecycle (optional)
//! ```
//!
//! ### Event lifecycle
//! ```text
//!            ┌────────► Paused ──┐
//!            │                   ▼
//! submit ─► Queued ─► Started ─► Progress* ─► Completed
//!            ▲           │
//!            │           ├─► Retrying{attempt, delay} ──┐
//!            └───────────┼──────────────────────────────┘
//!                        └─► Failed
//! (any non-terminal) ─► Cancelled{reason, retriable}
//! ```
//! `Completed`, `Failed` and retriable cancellations may be submitted again.
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Manager**       | Priority queue, pause/resume, clear, dispose, stream intake.  | [`EventManager`], [`ManagerConfig`]             |
//! | **Events**        | Sync or async actions, batches, progress, reversible hooks.   | [`Event`], [`Action`], [`BatchEvent`]           |
//! | **Policies**      | Retry with constant/linear/exponential backoff and jitter.    | [`RetryPolicy`], [`BackoffPolicy`]              |
//! | **Tokens**        | Pause or cancel a group of events at once.                    | [`EventToken`]                                  |
//! | **Notifications** | Broadcast state changes, fan out to subscribers.              | [`Notification`], [`Subscribe`]                 |
//! | **History**       | Bounded undo/redo with merging.                               | [`UndoRedoManager`], [`Reversible`]             |
//! | **Logging**       | Lifecycle logging through `tracing`.                          | [`EventLogger`], [`TracingLogger`]              |
//! | **Errors**        | Typed submission and action faults.                           | [`SubmitError`], [`EventError`], [`Failure`]    |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::{
//!     AsyncActionFn, BackoffPolicy, Event, EventError, EventManager, ExecutionMode,
//!     ManagerConfig, Output, RetryPolicy,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = ManagerConfig {
//!         mode: ExecutionMode::concurrent(4),
//!         ..ManagerConfig::default()
//!     };
//!     let manager = EventManager::builder(cfg).with_undo_redo(50).build();
//!
//!     let fetch = Event::builder(AsyncActionFn::new(|ctx| async move {
//!         ctx.progress(0.5, Some("halfway"));
//!         Ok::<_, EventError>(Output::new(format!("attempt {}", ctx.attempt())))
//!     }))
//!     .key("fetch")
//!     .priority(5)
//!     .timeout(Duration::from_secs(5))
//!     .retry(RetryPolicy::new(3, BackoffPolicy::constant(Duration::from_millis(10))))
//!     .build();
//!
//!     let out = manager.submit(fetch)?.await?;
//!     assert_eq!(out.downcast_ref::<String>().map(String::as_str), Some("attempt 0"));
//!
//!     manager.dispose();
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod history;
mod logging;
mod notify;
mod policies;
mod subscribers;
mod tokens;

// ---- Public re-exports ----

pub use core::{
    Completion, EventManager, ExecutionMode, ManagerBuilder, ManagerConfig, OverflowPolicy,
    Outcome, StreamHandlers, StreamSubscription,
};
pub use error::{ActionFault, EventError, Failure, SubmitError};
pub use events::{
    Action, ActionFn, AsyncActionFn, BatchError, BatchEvent, BatchMode, Event, EventBuilder,
    EventContext, EventState, Execution, Metadata, Output, Reversible,
};
pub use history::{HistoryEntry, UndoRedoManager};
pub use logging::{EventLogger, LifecyclePhase, TracingLogger};
pub use notify::{Bus, Notification, NotificationKind};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use subscribers::{Subscribe, SubscriberId, SubscriberSet};
pub use tokens::{CancelReason, EventToken, ListenerId, TokenSignal};

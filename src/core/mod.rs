//! Runtime core: queue, scheduling and lifecycle.
//!
//! The public API from this module is [`EventManager`] (plus its builder and
//! configuration), which owns a priority queue and drives it with one task.
//!
//! Internal modules:
//! - [`shared`]: state behind every manager handle; submission, control, state observation;
//! - [`driver`]: the single task draining the queue in time-boxed batches;
//! - [`runner`]: executes one attempt with timeout, cancellation and retry;
//! - [`queue`]: priority-ordered pending queue;
//! - [`queued`]: a submission bound to its result slot;
//! - [`mode`]: execution modes and admission;
//! - [`stream`]: submitting from an async stream.

mod builder;
mod config;
mod driver;
mod manager;
mod mode;
mod queue;
mod queued;
mod runner;
mod shared;
mod stream;

pub use builder::ManagerBuilder;
pub use config::{ManagerConfig, OverflowPolicy};
pub use manager::EventManager;
pub use mode::ExecutionMode;
pub use queued::{Completion, Outcome};
pub use stream::{StreamHandlers, StreamSubscription};

pub(crate) use shared::Shared;

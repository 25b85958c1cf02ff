//! Units of work: events, their actions and lifecycle.
//!
//! ## Contents
//! - [`Event`], [`EventBuilder`]: the submitted unit of work and its attributes
//! - [`Action`], [`Execution`], [`Output`]: what an event runs and what it returns
//! - [`ActionFn`], [`AsyncActionFn`]: closure-backed actions
//! - [`EventState`]: lifecycle state machine
//! - [`EventContext`]: per-attempt handle given to actions (progress, cancellation)
//! - [`Reversible`]: undo/redo hooks for undoable events
//! - [`BatchEvent`], [`BatchError`]: events composed of other events
//!
//! See `core/mod.rs` for how the manager drives these through the queue.

mod action;
mod batch;
mod context;
mod event;
mod reversible;
mod state;

pub use action::{Action, ActionFn, AsyncActionFn, Execution, Output};
pub use batch::{BatchError, BatchEvent, BatchMode};
pub use context::EventContext;
pub use event::{Event, EventBuilder, Metadata};
pub use reversible::Reversible;
pub use state::EventState;

pub(crate) use action::run_guarded;
pub(crate) use event::StateObserver;

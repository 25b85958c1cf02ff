//! # Reversible events.
//!
//! An event built with [`Event::reversible`](crate::Event::reversible) carries
//! [`Reversible`] hooks. When such an event completes under a manager configured
//! with history, it is recorded by the [`UndoRedoManager`](crate::UndoRedoManager).
//!
//! ## Hook order
//! ```text
//! dequeue ──► capture_state() ──► Action::run ──► Completed ──► record(event)
//!                                                                 │
//!                                         merge(previous)? ◄──────┘
//! undo(n) ──► Reversible::undo  (newest first)
//! redo(n) ──► Reversible::redo  (most recently undone first)
//! ```

use crate::events::action::Execution;
use crate::events::event::Event;

/// Undo/redo hooks for an event's action.
pub trait Reversible: Send + Sync + 'static {
    /// Called synchronously right before the action starts.
    ///
    /// Snapshot whatever `undo` needs to restore.
    fn capture_state(&self) {}

    /// Reverts the effect of the action.
    fn undo(&self) -> Execution<()>;

    /// Re-applies the effect after an undo.
    fn redo(&self) -> Execution<()>;

    /// Coalesces with the most recent history entry.
    ///
    /// Called on the newly completed event with the current top of the undo
    /// stack. Returning `Some(merged)` replaces that top entry instead of pushing
    /// a new one (e.g. consecutive keystrokes becoming one undo step).
    fn merge(&self, previous: &Event) -> Option<Event> {
        let _ = previous;
        None
    }
}

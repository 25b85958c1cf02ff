//! Undo/redo history for reversible events.

mod undo_redo;

pub use undo_redo::{HistoryEntry, UndoRedoManager};

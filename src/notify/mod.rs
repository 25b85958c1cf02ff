//! Manager notifications: types and broadcast bus.
//!
//! ## Contents
//! - [`NotificationKind`], [`Notification`]: classification and payload
//! - [`Bus`]: thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `EventManager` (every accepted state transition and
//!   manager-level change), `UndoRedoManager`, `SubscriberSet` workers
//!   (overflow/panic).
//! - **Consumers**: callers via `EventManager::subscribe()`, and the manager's
//!   subscriber listener which fans out to the `SubscriberSet`.

mod bus;
mod notification;

pub use bus::Bus;
pub use notification::{Notification, NotificationKind};

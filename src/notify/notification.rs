//! # Notifications published by the event manager.
//!
//! [`NotificationKind`] classifies notifications in three groups:
//! - **Event lifecycle**: every accepted [`EventState`] transition
//! - **Manager control**: pause/resume/clear/dispose and history changes
//! - **Subscriber faults**: overflow and panics inside subscriber workers
//!
//! [`Notification`] carries the optional payload fields relevant to its kind.
//!
//! ## Ordering guarantees
//! The publishing [`Bus`](crate::Bus) stamps `seq`, strictly increasing per
//! manager. Use it to restore order across subscribers.
//!
//! ## Example
//! ```rust
//! use eventvisor::{Notification, NotificationKind};
//!
//! let n = Notification::new(NotificationKind::Cleared)
//!     .with_reason("user reset")
//!     .with_count(3);
//!
//! assert_eq!(n.kind, NotificationKind::Cleared);
//! assert_eq!(n.reason.as_deref(), Some("user reset"));
//! assert_eq!(n.count, Some(3));
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use crate::events::{Event, EventState};

/// Classification of manager notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    // === Event lifecycle ===
    /// An event changed state.
    ///
    /// Sets: `event`, `key`, `state`, `queue_len`, `active`.
    StateChanged,

    // === Manager control ===
    /// The processing loop was paused.
    ManagerPaused,

    /// The processing loop was resumed.
    ManagerResumed,

    /// Queued events were cancelled by `clear`.
    ///
    /// Sets: `reason`, `count` (events cancelled).
    Cleared,

    /// The manager was disposed.
    Disposed,

    /// The undo/redo history changed.
    ///
    /// Sets: `reason` (`record`, `undo`, `redo` or `clear`), `count` (entries processed).
    HistoryChanged,

    // === Subscriber faults ===
    /// A subscriber dropped a notification (queue full or worker closed).
    ///
    /// Sets: `subscriber`, `reason`.
    SubscriberOverflow,

    /// A subscriber panicked while handling a notification.
    ///
    /// Sets: `subscriber`, `reason` (panic message).
    SubscriberPanicked,
}

/// Manager notification with optional payload.
#[derive(Clone, Debug)]
pub struct Notification {
    /// Per-bus sequence number, stamped on publish.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Classification.
    pub kind: NotificationKind,

    /// The event concerned, if any.
    pub event: Option<Event>,
    /// Debug key of the event concerned.
    pub key: Option<Arc<str>>,
    /// New state of the event concerned.
    pub state: Option<EventState>,
    /// Human-readable reason (clear reason, history operation, fault details).
    pub reason: Option<Arc<str>>,
    /// Number of items affected.
    pub count: Option<usize>,
    /// Queue length right after the change.
    pub queue_len: Option<usize>,
    /// Active (running) count right after the change.
    pub active: Option<usize>,
    /// Subscriber name for subscriber faults.
    pub subscriber: Option<&'static str>,
}

impl Notification {
    /// Creates a notification of the given kind, timestamped now.
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            event: None,
            key: None,
            state: None,
            reason: None,
            count: None,
            queue_len: None,
            active: None,
            subscriber: None,
        }
    }

    /// A state transition of `event`.
    pub fn state_changed(event: &Event, state: &EventState) -> Self {
        let mut n = Self::new(NotificationKind::StateChanged);
        n.key = event.key_arc();
        n.event = Some(event.clone());
        n.state = Some(state.clone());
        n
    }

    /// Attaches a debug key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an item count.
    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches the manager load observed with the change.
    #[inline]
    pub fn with_load(mut self, queue_len: usize, active: usize) -> Self {
        self.queue_len = Some(queue_len);
        self.active = Some(active);
        self
    }

    /// Creates a subscriber overflow notification.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut n = Self::new(NotificationKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        n.subscriber = Some(subscriber);
        n
    }

    /// Creates a subscriber panic notification.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut n = Self::new(NotificationKind::SubscriberPanicked).with_reason(info);
        n.subscriber = Some(subscriber);
        n
    }

    /// True for [`NotificationKind::SubscriberOverflow`].
    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, NotificationKind::SubscriberOverflow)
    }

    /// Label of the carried state, if any.
    pub fn state_label(&self) -> Option<&'static str> {
        self.state.as_ref().map(EventState::as_label)
    }
}

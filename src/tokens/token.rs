//! # EventToken: cooperative group pause/resume/cancel.
//!
//! ## States
//! ```text
//!   active ⇄ paused
//!      \      /
//!       ▼    ▼
//!      cancelled (terminal)
//! ```
//!
//! ## Rules
//! - `pause`/`resume` are no-ops when already in that state or cancelled.
//! - `cancel` stores its payload exactly once; later calls are no-ops.
//! - Every successful transition fires each registered listener once, outside
//!   the token's internal lock.
//! - [`EventToken::cancelled`] completes once cancelled (backed by
//!   [`tokio_util::sync::CancellationToken`]).
//!
//! ## Example
//! ```rust
//! use eventvisor::EventToken;
//!
//! let token = EventToken::new();
//! assert!(token.pause());
//! assert!(!token.pause());
//! assert!(token.cancel("user aborted", false));
//! assert!(!token.resume());
//! assert_eq!(token.cancellation().map(|c| c.retriable), Some(false));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// Why something was cancelled, and whether it may be submitted again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelReason {
    /// Human-readable reason.
    pub reason: Arc<str>,
    /// Whether the cancelled event may be re-submitted.
    pub retriable: bool,
}

impl CancelReason {
    /// Creates a cancellation payload.
    pub fn new(reason: impl Into<Arc<str>>, retriable: bool) -> Self {
        Self {
            reason: reason.into(),
            retriable,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (retriable={})", self.reason, self.retriable)
    }
}

/// Transition delivered to token listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenSignal {
    /// Token moved from active to paused.
    Paused,
    /// Token moved from paused to active.
    Resumed,
    /// Token was cancelled.
    Cancelled(CancelReason),
}

/// Handle returned by [`EventToken::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&TokenSignal) + Send + Sync>;

#[derive(Default)]
struct Status {
    paused: bool,
    cancelled: Option<CancelReason>,
}

struct Inner {
    status: Mutex<Status>,
    signal: CancellationToken,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

/// Shared capability grouping events for collective control.
///
/// Cloning is cheap; clones refer to the same token.
#[derive(Clone)]
pub struct EventToken {
    inner: Arc<Inner>,
}

impl Default for EventToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("EventToken")
            .field("paused", &status.0)
            .field("cancelled", &status.1)
            .finish()
    }
}

impl PartialEq for EventToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EventToken {}

impl EventToken {
    /// Creates an active token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                status: Mutex::new(Status::default()),
                signal: CancellationToken::new(),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Stable identity of this token (shared by all clones).
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Pauses every event sharing this token. Returns whether the state changed.
    pub fn pause(&self) -> bool {
        let changed = {
            let mut status = self.lock_status();
            if status.paused || status.cancelled.is_some() {
                false
            } else {
                status.paused = true;
                true
            }
        };
        if changed {
            self.fire(&TokenSignal::Paused);
        }
        changed
    }

    /// Resumes a paused token. Returns whether the state changed.
    pub fn resume(&self) -> bool {
        let changed = {
            let mut status = self.lock_status();
            if !status.paused || status.cancelled.is_some() {
                false
            } else {
                status.paused = false;
                true
            }
        };
        if changed {
            self.fire(&TokenSignal::Resumed);
        }
        changed
    }

    /// Cancels the token once. Returns whether this call performed the cancellation.
    pub fn cancel(&self, reason: impl Into<Arc<str>>, retriable: bool) -> bool {
        let payload = {
            let mut status = self.lock_status();
            if status.cancelled.is_some() {
                return false;
            }
            let payload = CancelReason::new(reason, retriable);
            status.cancelled = Some(payload.clone());
            status.paused = false;
            payload
        };
        self.inner.signal.cancel();
        self.fire(&TokenSignal::Cancelled(payload));
        true
    }

    /// True while paused (never true once cancelled).
    pub fn is_paused(&self) -> bool {
        self.lock_status().paused
    }

    /// True once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.lock_status().cancelled.is_some()
    }

    /// The cancellation payload, if cancelled.
    pub fn cancellation(&self) -> Option<CancelReason> {
        self.lock_status().cancelled.clone()
    }

    /// Completes when the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.signal.cancelled().await;
    }

    /// Registers a listener fired on every successful transition.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TokenSignal) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Detaches a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn status(&self) -> (bool, Option<CancelReason>) {
        let status = self.lock_status();
        (status.paused, status.cancelled.clone())
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, signal: &TokenSignal) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(signal);
        }
    }
}

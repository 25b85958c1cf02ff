//! # Event: a submitted unit of work.
//!
//! [`Event`] is a cheap, cloneable handle; identity is by reference (two clones
//! are the same event). It bundles:
//! - the [`Action`] to run (plus optional [`Reversible`] hooks),
//! - scheduling attributes: debug key, priority, timeout, retry policy, token,
//!   enabled flag,
//! - a typed debug metadata map,
//! - the current lifecycle [`EventState`].
//!
//! State changes go through [`EventState::accepts`], so transitions are
//! monotonic no matter who triggers them (scheduler, caller, token).
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::{ActionFn, BackoffPolicy, Event, Execution, Output, RetryPolicy};
//!
//! let ev = Event::builder(ActionFn::new(|_ctx| Execution::ok(Output::empty())))
//!     .key("save-document")
//!     .priority(10)
//!     .timeout(Duration::from_secs(5))
//!     .retry(RetryPolicy::new(3, BackoffPolicy::constant(Duration::from_millis(50))))
//!     .metadata("origin", "toolbar")
//!     .build();
//!
//! assert_eq!(ev.key(), Some("save-document"));
//! assert_eq!(ev.priority(), 10);
//! assert!(ev.state().is_none());
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::error::SubmitError;
use crate::events::action::Action;
use crate::events::reversible::Reversible;
use crate::events::state::EventState;
use crate::policies::RetryPolicy;
use crate::tokens::{CancelReason, EventToken};

/// Debug metadata attached to an event.
pub type Metadata = BTreeMap<String, String>;

/// Receives every accepted state transition of a bound event.
pub(crate) trait StateObserver: Send + Sync {
    fn state_changed(&self, event: &Event, previous: Option<&EventState>, next: &EventState);
}

struct Inner {
    key: Option<Arc<str>>,
    priority: i32,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    token: Option<EventToken>,
    enabled: AtomicBool,
    metadata: Mutex<Metadata>,

    action: Arc<dyn Action>,
    any: Arc<dyn Any + Send + Sync>,
    reversible: Option<Arc<dyn Reversible>>,

    state: Mutex<Option<EventState>>,
    generation: AtomicU64,
    observer: Mutex<Option<Weak<dyn StateObserver>>>,
}

/// Shared handle to a unit of work.
#[derive(Clone)]
pub struct Event {
    inner: Arc<Inner>,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Event {}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("key", &self.inner.key)
            .field("priority", &self.inner.priority)
            .field("state", &self.state().map(|s| s.as_label()))
            .finish()
    }
}

impl Event {
    /// Creates an event with default attributes.
    pub fn new<A: Action>(action: A) -> Self {
        EventBuilder::new(action).build()
    }

    /// Starts building an event.
    pub fn builder<A: Action>(action: A) -> EventBuilder {
        EventBuilder::new(action)
    }

    /// Starts building an event whose action can be undone and redone.
    pub fn reversible<A: Action + Reversible>(action: A) -> EventBuilder {
        EventBuilder::reversible(action)
    }

    /// Stable identity shared by all clones.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Debug key.
    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    pub(crate) fn key_arc(&self) -> Option<Arc<str>> {
        self.inner.key.clone()
    }

    /// Priority; higher runs first.
    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    /// Per-attempt timeout for asynchronous actions.
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    /// Retry policy.
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.inner.retry.as_ref()
    }

    /// Group token.
    pub fn token(&self) -> Option<&EventToken> {
        self.inner.token.as_ref()
    }

    /// Whether submissions are accepted.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Enables or disables future submissions.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    /// Snapshot of the debug metadata.
    pub fn metadata(&self) -> Metadata {
        self.inner
            .metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sets one metadata entry.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Current lifecycle state (`None` before the first submission).
    pub fn state(&self) -> Option<EventState> {
        self.lock_state().clone()
    }

    /// True if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        self.lock_state().as_ref().is_some_and(EventState::is_terminal)
    }

    /// True once the event itself or its token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation().is_some()
    }

    /// The cancellation observed at this instant: the event's own first, then its token's.
    pub fn cancellation(&self) -> Option<CancelReason> {
        if let Some(EventState::Cancelled(c)) = self.lock_state().as_ref() {
            return Some(c.clone());
        }
        self.inner.token.as_ref().and_then(EventToken::cancellation)
    }

    /// True while the event itself or its token is paused.
    pub fn is_held(&self) -> bool {
        matches!(self.lock_state().as_ref(), Some(EventState::Paused))
            || self.inner.token.as_ref().is_some_and(EventToken::is_paused)
    }

    /// True if built with [`Event::reversible`].
    pub fn is_reversible(&self) -> bool {
        self.inner.reversible.is_some()
    }

    /// Borrows the action as its concrete type.
    pub fn action_as<A: Any>(&self) -> Option<&A> {
        self.inner.any.downcast_ref::<A>()
    }

    /// Pauses a queued event; the scheduler skips it until resumed.
    pub fn pause(&self) -> bool {
        self.transition(EventState::Paused)
    }

    /// Resumes a paused event.
    pub fn resume(&self) -> bool {
        if !matches!(self.lock_state().as_ref(), Some(EventState::Paused)) {
            return false;
        }
        self.transition(EventState::Queued)
    }

    /// Cancels the event. Idempotent: only the first call transitions.
    ///
    /// A queued event is dropped at its next checkpoint; a running event keeps
    /// running, but its result is discarded.
    pub fn cancel(&self, reason: impl Into<Arc<str>>, retriable: bool) -> bool {
        self.transition(EventState::Cancelled(CancelReason::new(reason, retriable)))
    }

    pub(crate) fn action(&self) -> &Arc<dyn Action> {
        &self.inner.action
    }

    pub(crate) fn reversible_hooks(&self) -> Option<&Arc<dyn Reversible>> {
        self.inner.reversible.as_ref()
    }

    pub(crate) fn report_progress(&self, value: f64, message: Option<&str>) -> bool {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.transition(EventState::Progress {
            value,
            message: message.map(Arc::from),
        })
    }

    /// Checks that the event may be submitted without changing anything.
    pub(crate) fn check_claim(&self) -> Result<(), SubmitError> {
        match self.lock_state().as_ref() {
            None => Ok(()),
            Some(s) if s.is_resubmittable() => Ok(()),
            Some(EventState::Cancelled(_)) => Err(SubmitError::Terminated),
            Some(_) => Err(SubmitError::InFlight),
        }
    }

    /// Claims the event for a new submission, resetting a resubmittable terminal
    /// state. Returns the submission generation; wrappers from earlier
    /// submissions compare unequal to it.
    pub(crate) fn claim(&self) -> Result<u64, SubmitError> {
        let mut state = self.lock_state();
        match state.as_ref() {
            None => {}
            Some(s) if s.is_resubmittable() => *state = None,
            Some(EventState::Cancelled(_)) => return Err(SubmitError::Terminated),
            Some(_) => return Err(SubmitError::InFlight),
        }
        Ok(self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Current submission generation.
    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Applies `next` if legal and reports it to the bound observer.
    pub(crate) fn transition(&self, next: EventState) -> bool {
        match self.transition_quiet(next.clone()) {
            Some(previous) => {
                self.announce(previous.as_ref(), &next);
                true
            }
            None => false,
        }
    }

    /// Applies `next` if legal without notifying; returns the previous state on
    /// success. The caller must [`announce`](Self::announce) it afterwards.
    pub(crate) fn transition_quiet(&self, next: EventState) -> Option<Option<EventState>> {
        let mut state = self.lock_state();
        if !EventState::accepts(state.as_ref(), &next) {
            return None;
        }
        Some(state.replace(next))
    }

    /// Reports an applied transition to the bound observer.
    pub(crate) fn announce(&self, previous: Option<&EventState>, next: &EventState) {
        let observer = self
            .inner
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        if let Some(observer) = observer {
            observer.state_changed(self, previous, next);
        }
    }

    pub(crate) fn bind(&self, observer: Weak<dyn StateObserver>) {
        *self
            .inner
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<EventState>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`Event`].
pub struct EventBuilder {
    key: Option<Arc<str>>,
    priority: i32,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    token: Option<EventToken>,
    enabled: bool,
    metadata: Metadata,
    action: Arc<dyn Action>,
    any: Arc<dyn Any + Send + Sync>,
    reversible: Option<Arc<dyn Reversible>>,
}

impl EventBuilder {
    /// Builder for a plain action.
    pub fn new<A: Action>(action: A) -> Self {
        let action = Arc::new(action);
        Self::from_parts(action.clone(), action, None)
    }

    /// Builder for an action with undo/redo hooks.
    pub fn reversible<A: Action + Reversible>(action: A) -> Self {
        let action = Arc::new(action);
        Self::from_parts(action.clone(), action.clone(), Some(action))
    }

    fn from_parts(
        action: Arc<dyn Action>,
        any: Arc<dyn Any + Send + Sync>,
        reversible: Option<Arc<dyn Reversible>>,
    ) -> Self {
        Self {
            key: None,
            priority: 0,
            timeout: None,
            retry: None,
            token: None,
            enabled: true,
            metadata: Metadata::new(),
            action,
            any,
            reversible,
        }
    }

    /// Copies key, priority, timeout, retry policy, token and metadata from `template`.
    pub fn inherit(mut self, template: &Event) -> Self {
        self.key = template.inner.key.clone();
        self.priority = template.inner.priority;
        self.timeout = template.inner.timeout;
        self.retry = template.inner.retry.clone();
        self.token = template.inner.token.clone();
        self.metadata = template.metadata();
        self
    }

    /// Debug key (used in logs and notification filtering).
    pub fn key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Priority; higher runs first, default 0.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Per-attempt timeout for asynchronous actions.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|d| *d > Duration::ZERO);
        self
    }

    /// Retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Group token.
    pub fn token(mut self, token: EventToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Initial enabled flag (default `true`).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Finishes the event.
    pub fn build(self) -> Event {
        Event {
            inner: Arc::new(Inner {
                key: self.key,
                priority: self.priority,
                timeout: self.timeout,
                retry: self.retry,
                token: self.token,
                enabled: AtomicBool::new(self.enabled),
                metadata: Mutex::new(self.metadata),
                action: self.action,
                any: self.any,
                reversible: self.reversible,
                state: Mutex::new(None),
                generation: AtomicU64::new(0),
                observer: Mutex::new(None),
            }),
        }
    }
}

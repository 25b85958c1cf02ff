//! # Shared manager state: submission, control and state observation.
//!
//! [`Shared`] is what every [`EventManager`](crate::EventManager) clone,
//! spawned attempt and retry timer points at. Mutable scheduling state lives in
//! one [`Core`] behind a `std::sync::Mutex`.
//!
//! ## Locking rules
//! - The core lock is never held across an `.await`, while user code runs
//!   (actions, hooks, callbacks, subscribers), or while an event transition
//!   notifies its observer.
//! - Transitions that must be atomic with a queue change use
//!   `Event::transition_quiet` under the lock and are announced after it is
//!   released.
//! - Lock order is core, then event state, then token internals.
//!
//! ## Wrapper ownership
//! A [`QueuedEvent`] lives in exactly one place at a time: the queue, the
//! `delayed` map (waiting for a retry timer), or a running attempt. Whoever
//! takes it out is responsible for retiring it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::SystemTime;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::{ManagerConfig, OverflowPolicy};
use crate::core::mode::Admitter;
use crate::core::queue::PendingQueue;
use crate::core::queued::{Completion, Deliver, Outcome, QueuedEvent};
use crate::error::{Failure, SubmitError};
use crate::events::{Event, EventState, Metadata, StateObserver};
use crate::history::UndoRedoManager;
use crate::logging::{EventLogger, LifecyclePhase};
use crate::notify::{Bus, Notification, NotificationKind};
use crate::subscribers::SubscriberSet;
use crate::tokens::{CancelReason, EventToken, ListenerId};

/// One manager listener attached to a token, shared by every event using it.
struct TokenRef {
    token: EventToken,
    count: usize,
    listener: ListenerId,
}

/// Mutable scheduling state.
pub(crate) struct Core {
    pub(crate) queue: PendingQueue,
    /// Wrappers waiting for a retry timer, by event id.
    pub(crate) delayed: HashMap<usize, QueuedEvent>,
    pub(crate) active: usize,
    pub(crate) paused: bool,
    pub(crate) in_batch: bool,
    pub(crate) resume_deferred: bool,
    pub(crate) admitter: Admitter,
    /// Parent of every pending retry timer; replaced on `clear`.
    pub(crate) timers: CancellationToken,
    pub(crate) disposed: bool,
    tokens: HashMap<usize, TokenRef>,
}

impl Core {
    pub(crate) fn new(cfg: &ManagerConfig) -> Self {
        Self {
            queue: PendingQueue::default(),
            delayed: HashMap::new(),
            active: 0,
            paused: false,
            in_batch: false,
            resume_deferred: false,
            admitter: Admitter::new(cfg.mode),
            timers: CancellationToken::new(),
            disposed: false,
            tokens: HashMap::new(),
        }
    }

    fn take_delayed(&mut self, event: &Event) -> Option<QueuedEvent> {
        let id = event.id();
        if self.delayed.get(&id).is_some_and(QueuedEvent::is_current) {
            self.delayed.remove(&id)
        } else {
            None
        }
    }

    fn drain_pending(&mut self) -> Vec<QueuedEvent> {
        let mut drained = self.queue.drain();
        drained.extend(self.delayed.drain().map(|(_, w)| w));
        drained
    }
}

pub(crate) struct Shared {
    pub(crate) cfg: ManagerConfig,
    core: Mutex<Core>,
    pub(crate) wake: Arc<Notify>,
    pub(crate) bus: Bus,
    pub(crate) subscribers: Arc<SubscriberSet>,
    logger: Option<Arc<dyn EventLogger>>,
    owns_logger: bool,
    pub(crate) history: Option<Arc<UndoRedoManager>>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) me: Weak<Shared>,
}

pub(crate) struct SharedParts {
    pub(crate) cfg: ManagerConfig,
    pub(crate) bus: Bus,
    pub(crate) subscribers: Arc<SubscriberSet>,
    pub(crate) logger: Option<Arc<dyn EventLogger>>,
    pub(crate) owns_logger: bool,
    pub(crate) history: Option<Arc<UndoRedoManager>>,
}

impl Shared {
    pub(crate) fn new(parts: SharedParts) -> Arc<Self> {
        Arc::new_cyclic(|me| Shared {
            core: Mutex::new(Core::new(&parts.cfg)),
            cfg: parts.cfg,
            wake: Arc::new(Notify::new()),
            bus: parts.bus,
            subscribers: parts.subscribers,
            logger: parts.logger,
            owns_logger: parts.owns_logger,
            history: parts.history,
            shutdown: CancellationToken::new(),
            me: me.clone(),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `(queue_len, active)`.
    pub(crate) fn load(&self) -> (usize, usize) {
        let core = self.lock();
        (core.queue.len(), core.active)
    }

    fn observer(&self) -> Weak<dyn StateObserver> {
        self.me.clone()
    }

    fn precheck(&self, core: &Core, event: &Event) -> Result<(), SubmitError> {
        if core.disposed {
            return Err(SubmitError::Disposed);
        }
        if !event.is_enabled() {
            return Err(SubmitError::Disabled);
        }
        let token_closed = event
            .token()
            .and_then(EventToken::cancellation)
            .is_some_and(|c| !c.retriable);
        if token_closed {
            return Err(SubmitError::Terminated);
        }
        event.check_claim()
    }

    // ---- submission ----

    /// Admits `event` into the queue; `deliver` receives its outcome.
    pub(crate) fn enqueue(&self, event: Event, deliver: Deliver) -> Result<(), SubmitError> {
        let mut evicted = None;
        let mut refused = None;
        let mut announce = None;
        {
            let mut core = self.lock();
            self.precheck(&core, &event)?;

            if let Some(max) = self.cfg.queue_limit() {
                let current = core.queue.len();
                if current >= max {
                    match self.cfg.overflow {
                        OverflowPolicy::DropNewest => return Err(SubmitError::Rejected),
                        OverflowPolicy::Error => return Err(SubmitError::Overflow { current, max }),
                        OverflowPolicy::DropOldest => evicted = core.queue.evict_oldest(),
                    }
                }
            }

            let generation = match event.claim() {
                Ok(generation) => generation,
                Err(e) => {
                    if let Some(w) = evicted.take() {
                        core.queue.restore(w);
                    }
                    return Err(e);
                }
            };
            event.bind(self.observer());
            self.register_token(&mut core, &event);
            let wrapper = QueuedEvent::new(event.clone(), generation, false, deliver);

            if event.token().is_some_and(EventToken::is_cancelled) {
                refused = Some(wrapper);
            } else {
                match event.transition_quiet(EventState::Queued) {
                    Some(previous) => {
                        core.queue.insert(wrapper);
                        announce = Some(previous);
                    }
                    None => refused = Some(wrapper),
                }
            }
        }

        if let Some(w) = evicted {
            self.cancel_wrapper(w, CancelReason::new("queue overflow", true));
        }
        if let Some(previous) = announce {
            event.announce(previous.as_ref(), &EventState::Queued);
        }
        if let Some(w) = refused {
            let reason = event
                .cancellation()
                .unwrap_or_else(|| CancelReason::new("cancelled", true));
            self.cancel_wrapper(w, reason);
        }
        self.wake.notify_one();
        Ok(())
    }

    pub(crate) fn submit(&self, event: Event) -> Result<Completion, SubmitError> {
        let (completion, deliver) = Completion::channel(event.clone());
        self.enqueue(event, deliver)?;
        Ok(completion)
    }

    /// Runs `event` right away, outside the queue and execution mode.
    pub(crate) fn run_now(&self, event: Event, deliver: Deliver) -> Result<(), SubmitError> {
        let wrapper = {
            let mut core = self.lock();
            self.precheck(&core, &event)?;
            let generation = event.claim()?;
            event.bind(self.observer());
            self.register_token(&mut core, &event);
            QueuedEvent::new(event.clone(), generation, true, deliver)
        };

        if let Some(c) = event.token().and_then(EventToken::cancellation) {
            self.cancel_wrapper(wrapper, c);
        } else if event.transition(EventState::Queued) {
            self.start(wrapper);
        } else {
            let reason = event
                .cancellation()
                .unwrap_or_else(|| CancelReason::new("cancelled", true));
            self.cancel_wrapper(wrapper, reason);
        }
        Ok(())
    }

    /// Puts a wrapper back after its retry delay.
    pub(crate) fn requeue(&self, wrapper: QueuedEvent) {
        let event = wrapper.event.clone();
        if !wrapper.is_current() {
            self.retire(wrapper, superseded());
            return;
        }
        if let Some(c) = event.cancellation() {
            self.cancel_wrapper(wrapper, c);
            return;
        }
        if wrapper.immediate {
            if event.transition(EventState::Queued) {
                self.start(wrapper);
            } else {
                self.cancel_wrapper(wrapper, CancelReason::new("cancelled", true));
            }
            return;
        }

        let mut refused = None;
        let mut announce = None;
        {
            let mut core = self.lock();
            if core.disposed {
                refused = Some((wrapper, CancelReason::new("disposed", true)));
            } else {
                match event.transition_quiet(EventState::Queued) {
                    Some(previous) => {
                        core.queue.insert(wrapper);
                        announce = Some(previous);
                    }
                    None => refused = Some((wrapper, CancelReason::new("cancelled", true))),
                }
            }
        }
        if let Some(previous) = announce {
            event.announce(previous.as_ref(), &EventState::Queued);
        }
        if let Some((w, reason)) = refused {
            self.cancel_wrapper(w, reason);
        }
        self.wake.notify_one();
    }

    // ---- termination ----

    /// Cancels a wrapper that is not running and retires it.
    pub(crate) fn cancel_wrapper(&self, wrapper: QueuedEvent, reason: CancelReason) {
        let reason = if wrapper.is_current() {
            wrapper
                .event
                .transition(EventState::Cancelled(reason.clone()));
            wrapper.event.cancellation().unwrap_or(reason)
        } else {
            reason
        };
        self.retire(wrapper, Err(Failure::Cancelled(reason)));
    }

    /// Releases the wrapper's token reference and delivers its outcome.
    pub(crate) fn retire(&self, wrapper: QueuedEvent, outcome: Outcome) {
        if let Some(token) = wrapper.event.token() {
            self.release_token(token);
        }
        wrapper.deliver(outcome);
    }

    // ---- tokens ----

    fn register_token(&self, core: &mut Core, event: &Event) {
        let Some(token) = event.token() else { return };
        core.tokens
            .entry(token.identity())
            .and_modify(|r| r.count += 1)
            .or_insert_with(|| {
                let wake = Arc::clone(&self.wake);
                let listener = token.add_listener(move |_signal| wake.notify_one());
                TokenRef {
                    token: token.clone(),
                    count: 1,
                    listener,
                }
            });
    }

    fn release_token(&self, token: &EventToken) {
        let detached = {
            let mut core = self.lock();
            let id = token.identity();
            let last = match core.tokens.get_mut(&id) {
                Some(r) => {
                    r.count -= 1;
                    r.count == 0
                }
                None => false,
            };
            if last { core.tokens.remove(&id) } else { None }
        };
        if let Some(r) = detached {
            r.token.remove_listener(r.listener);
        }
    }

    /// Number of tokens the manager is listening to.
    pub(crate) fn token_count(&self) -> usize {
        self.lock().tokens.len()
    }

    // ---- control ----

    pub(crate) fn pause(&self) -> bool {
        {
            let mut core = self.lock();
            if core.disposed || core.paused {
                return false;
            }
            core.paused = true;
            core.resume_deferred = false;
        }
        self.publish(Notification::new(NotificationKind::ManagerPaused));
        true
    }

    pub(crate) fn resume(&self) -> bool {
        let resumed_now = {
            let mut core = self.lock();
            if !core.paused || core.resume_deferred {
                return false;
            }
            if core.in_batch {
                core.resume_deferred = true;
                false
            } else {
                core.paused = false;
                true
            }
        };
        if resumed_now {
            self.publish(Notification::new(NotificationKind::ManagerResumed));
        }
        self.wake.notify_one();
        true
    }

    pub(crate) fn clear(&self, reason: Option<&str>) -> usize {
        let reason: Arc<str> = Arc::from(reason.unwrap_or("cleared"));
        let drained = {
            let mut core = self.lock();
            let drained = core.drain_pending();
            core.paused = false;
            core.resume_deferred = false;
            std::mem::replace(&mut core.timers, CancellationToken::new()).cancel();
            drained
        };
        let count = drained.len();
        for w in drained {
            self.cancel_wrapper(w, CancelReason::new(reason.clone(), true));
        }
        self.publish(
            Notification::new(NotificationKind::Cleared)
                .with_reason(reason)
                .with_count(count),
        );
        self.wake.notify_one();
        count
    }

    pub(crate) fn dispose(&self) {
        let (drained, tokens) = {
            let mut core = self.lock();
            if core.disposed {
                return;
            }
            core.disposed = true;
            core.timers.cancel();
            let tokens: Vec<TokenRef> = core.tokens.drain().map(|(_, r)| r).collect();
            (core.drain_pending(), tokens)
        };
        for r in tokens {
            r.token.remove_listener(r.listener);
        }
        let count = drained.len();
        for w in drained {
            self.cancel_wrapper(w, CancelReason::new("disposed", true));
        }
        self.publish(Notification::new(NotificationKind::Disposed).with_count(count));
        self.shutdown.cancel();

        if self.owns_logger {
            if let Some(logger) = &self.logger {
                logger.dispose();
            }
        }
        debug!(cancelled = count, "event manager disposed");
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    pub(crate) fn publish(&self, n: Notification) {
        let (queue_len, active) = self.load();
        self.bus.publish(n.with_load(queue_len, active));
    }

    fn log(&self, event: &Event, state: &EventState) {
        let Some(logger) = &self.logger else { return };
        let Some(phase) = LifecyclePhase::of(state) else {
            return;
        };
        let mut metadata: Metadata = event.metadata();
        match state {
            EventState::Retrying { attempt, delay } => {
                metadata.insert("attempt".into(), attempt.to_string());
                metadata.insert("delay_ms".into(), delay.as_millis().to_string());
            }
            EventState::Failed(err) => {
                metadata.insert("error".into(), err.to_string());
            }
            EventState::Cancelled(c) => {
                metadata.insert("reason".into(), c.reason.to_string());
                metadata.insert("retriable".into(), c.retriable.to_string());
            }
            _ => {}
        }
        logger.record_lifecycle(event, phase, SystemTime::now(), &metadata);
    }
}

impl StateObserver for Shared {
    fn state_changed(&self, event: &Event, _previous: Option<&EventState>, next: &EventState) {
        let removed = match next {
            EventState::Cancelled(_) => {
                let mut core = self.lock();
                core.queue.remove(event).or_else(|| core.take_delayed(event))
            }
            _ => None,
        };

        self.publish(Notification::state_changed(event, next));
        self.log(event, next);

        if let (Some(w), EventState::Cancelled(c)) = (removed, next) {
            self.retire(w, Err(Failure::Cancelled(c.clone())));
        }
        if matches!(next, EventState::Queued | EventState::Cancelled(_)) {
            self.wake.notify_one();
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub(crate) fn superseded() -> Outcome {
    Err(Failure::Cancelled(CancelReason::new("superseded", true)))
}

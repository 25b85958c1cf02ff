//! # Non-blocking notification fan-out to a dynamic set of subscribers.
//!
//! ## Architecture
//! ```text
//! emit(notification)
//!     │  (priority order, filtered by Subscribe::accepts)
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► worker 2 ──► subscriber2.on_event()
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - `emit()` returns immediately (uses `try_send`).
//! - Overflow drops the notification for that subscriber only and publishes
//!   `SubscriberOverflow` (never for an overflow notification itself).
//! - A panicking subscriber is reported and its worker keeps going.
//! - `add`/`remove` may be called at any time; removal closes the queue and the
//!   worker exits after draining what was already queued.
//!
//! `AssertUnwindSafe` is used around `on_event`, which can leave shared state
//! inconsistent if a subscriber panics while holding a lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::notify::{Bus, Notification};
use crate::subscribers::Subscribe;

/// Handle returned by [`SubscriberSet::add`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct SubscriberChannel {
    id: SubscriberId,
    name: &'static str,
    priority: i32,
    subscriber: Arc<dyn Subscribe>,
    sender: mpsc::Sender<Arc<Notification>>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct Channels {
    list: Vec<SubscriberChannel>,
    next_id: u64,
}

/// Fan-out coordinator for notification subscribers.
pub struct SubscriberSet {
    channels: Mutex<Channels>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a set and spawns one worker per subscriber.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let set = Self {
            channels: Mutex::new(Channels::default()),
            bus,
        };
        for sub in subs {
            set.add(sub);
        }
        set
    }

    /// Registers a subscriber, keeping the set ordered by descending priority
    /// (registration order among equal priorities).
    pub fn add(&self, sub: Arc<dyn Subscribe>) -> SubscriberId {
        let cap = sub.queue_capacity().max(1);
        let name = sub.name();
        let priority = sub.priority();
        let (tx, rx) = mpsc::channel::<Arc<Notification>>(cap);
        let worker = tokio::spawn(run_worker(Arc::clone(&sub), rx, self.bus.clone()));

        let mut channels = self.lock();
        let id = SubscriberId(channels.next_id);
        channels.next_id += 1;
        let at = channels
            .list
            .iter()
            .position(|c| c.priority < priority)
            .unwrap_or(channels.list.len());
        channels.list.insert(
            at,
            SubscriberChannel {
                id,
                name,
                priority,
                subscriber: sub,
                sender: tx,
                worker,
            },
        );
        id
    }

    /// Unregisters a subscriber. Returns `false` if the id is unknown.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut channels = self.lock();
        match channels.list.iter().position(|c| c.id == id) {
            Some(at) => {
                channels.list.remove(at);
                true
            }
            None => false,
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.lock().list.len()
    }

    /// True if no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offers a notification to every accepting subscriber without waiting.
    pub fn emit(&self, notification: &Notification) {
        self.emit_arc(Arc::new(notification.clone()));
    }

    /// Like [`emit`](Self::emit) without cloning the payload.
    pub fn emit_arc(&self, notification: Arc<Notification>) {
        let is_overflow = notification.is_subscriber_overflow();
        let mut dropped = Vec::new();
        {
            let channels = self.lock();
            for channel in &channels.list {
                if !channel.subscriber.accepts(&notification) {
                    continue;
                }
                match channel.sender.try_send(Arc::clone(&notification)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => dropped.push((channel.name, "full")),
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dropped.push((channel.name, "closed"))
                    }
                }
            }
        }
        if is_overflow {
            return;
        }
        for (name, reason) in dropped {
            warn!(subscriber = name, reason, "subscriber dropped a notification");
            self.bus
                .publish(Notification::subscriber_overflow(name, reason));
        }
    }

    /// Closes every queue and waits for the workers to drain.
    pub async fn shutdown(&self) {
        let list = std::mem::take(&mut self.lock().list);
        let workers: Vec<JoinHandle<()>> = list.into_iter().map(|c| c.worker).collect();
        for worker in workers {
            let _ = worker.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_worker(
    sub: Arc<dyn Subscribe>,
    mut rx: mpsc::Receiver<Arc<Notification>>,
    bus: Bus,
) {
    while let Some(n) = rx.recv().await {
        let fut = sub.on_event(n.as_ref());
        if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            let info = panic
                .downcast_ref::<&'static str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(subscriber = sub.name(), info = %info, "subscriber panicked");
            bus.publish(Notification::subscriber_panicked(sub.name(), info));
        }
    }
}

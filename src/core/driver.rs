//! # Driver: the single task that drains the queue.
//!
//! ```text
//! loop:
//!   upgrade Weak<Shared> (manager dropped ─► exit)
//!   run_batch():
//!     in_batch = true
//!     repeat until a stop condition:
//!       ├─ disposed / paused / nothing ready ─► Idle
//!       ├─ batch size or frame budget spent  ─► Now    (yield, then continue)
//!       ├─ entry stale or cancelled          ─► pop, cancel, next
//!       └─ admission check
//!            ├─ Granted   ─► pop, active += 1, start (lock released)
//!            ├─ UntilIdle ─► Idle                     (a finishing attempt wakes us)
//!            └─ Until(t)  ─► At(t)                    (rate window reset)
//!     in_batch = false; apply a resume deferred during the batch
//!   drop the strong ref, then wait per Next (wake / deadline / shutdown)
//! ```
//!
//! The driver holds only a `Weak<Shared>` while waiting, so dropping the last
//! manager handle tears everything down.

use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::mode::Admission;
use crate::core::queued::QueuedEvent;
use crate::core::shared::{Shared, superseded};
use crate::notify::{Notification, NotificationKind};
use crate::subscribers::SubscriberSet;
use crate::tokens::CancelReason;

/// What the driver does after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    /// More work is ready; yield and go again.
    Now,
    /// Nothing may start before this instant.
    At(Instant),
    /// Wait for a wake-up.
    Idle,
}

enum Step {
    Run(QueuedEvent),
    Discard(QueuedEvent),
}

pub(crate) fn spawn_driver(shared: &Arc<Shared>) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let wake: Arc<Notify> = Arc::clone(&shared.wake);
    let shutdown = shared.shutdown.clone();

    tokio::spawn(async move {
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let next = match weak.upgrade() {
                Some(shared) => shared.run_batch(),
                None => break,
            };
            match next {
                Next::Now => tokio::task::yield_now().await,
                Next::At(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = wake.notified() => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                Next::Idle => {
                    tokio::select! {
                        _ = wake.notified() => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }
        debug!("event driver stopped");
    });
}

/// Forwards bus notifications to the subscriber set until shutdown.
pub(crate) fn spawn_listener(shared: &Arc<Shared>) {
    let mut rx = shared.bus.subscribe();
    let set: Arc<SubscriberSet> = Arc::clone(&shared.subscribers);
    let shutdown: CancellationToken = shared.shutdown.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                res = rx.recv() => match res {
                    Ok(n) => set.emit(&n),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "subscriber listener lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.cancelled() => {
                    // deliver what was published before shutdown
                    while let Ok(n) = rx.try_recv() {
                        set.emit(&n);
                    }
                    break;
                }
            }
        }
        set.shutdown().await;
    });
}

impl Shared {
    /// Starts as many queued events as the mode, batch size and frame budget allow.
    pub(crate) fn run_batch(&self) -> Next {
        let began = Instant::now();
        let batch_limit = self.cfg.batch_limit();
        let frame_limit = self.cfg.frame_limit();
        let mut started = 0usize;

        self.lock().in_batch = true;
        let next = loop {
            let step = {
                let mut core = self.lock();
                if core.disposed || core.paused || core.queue.is_empty() {
                    break Next::Idle;
                }
                if batch_limit.is_some_and(|max| started >= max)
                    || frame_limit.is_some_and(|budget| began.elapsed() >= budget)
                {
                    break Next::Now;
                }
                let Some(at) = core.queue.first_ready() else {
                    break Next::Idle;
                };
                let droppable = core
                    .queue
                    .get(at)
                    .is_some_and(|q| !q.is_current() || q.event.is_cancelled());
                if droppable {
                    match core.queue.take(at) {
                        Some(w) => Step::Discard(w),
                        None => break Next::Idle,
                    }
                } else {
                    let now = Instant::now();
                    let active = core.active;
                    match core.admitter.check(active, now) {
                        Admission::UntilIdle => break Next::Idle,
                        Admission::Until(deadline) => break Next::At(deadline),
                        Admission::Granted => match core.queue.take(at) {
                            Some(w) => {
                                core.active += 1;
                                core.admitter.on_start(now);
                                Step::Run(w)
                            }
                            None => break Next::Idle,
                        },
                    }
                }
            };

            match step {
                Step::Run(w) => {
                    started += 1;
                    self.start(w);
                }
                Step::Discard(w) if !w.is_current() => self.retire(w, superseded()),
                Step::Discard(w) => {
                    let reason = w
                        .event
                        .cancellation()
                        .unwrap_or_else(|| CancelReason::new("cancelled", true));
                    self.cancel_wrapper(w, reason);
                }
            }
        };

        let resumed = {
            let mut core = self.lock();
            core.in_batch = false;
            if core.resume_deferred {
                core.resume_deferred = false;
                core.paused = false;
                true
            } else {
                false
            }
        };
        if resumed {
            self.publish(Notification::new(NotificationKind::ManagerResumed));
            return Next::Now;
        }
        next
    }
}

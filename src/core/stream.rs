//! # Stream submission: feed events from an async source.
//!
//! [`EventManager::submit_stream`](crate::EventManager::submit_stream) spawns a
//! task that pulls `Result<Event, E>` items and submits each event. Outcomes go
//! to the per-event handlers in [`StreamHandlers`].
//!
//! ```text
//! source.next() ─► Ok(event)  ─► submit ─┬─ accepted ─► on_done / on_error (when it terminates)
//!                                        └─ refused  ─► on_rejected
//!               ─► Err(e)     ─► on_source_error ─► stop if cancel_on_error
//!               ─► None       ─► on_source_done
//! ```
//!
//! The subscription stops when cancelled, when the manager is disposed, or when
//! the last manager handle is dropped. Events already submitted keep running.

use std::fmt;
use std::sync::{Arc, Weak};

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::queued::{Deliver, guarded};
use crate::core::shared::Shared;
use crate::error::{Failure, SubmitError};
use crate::events::{Event, Output};

type DoneFn = Arc<dyn Fn(&Event, Output) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&Event, Failure) + Send + Sync>;
type RejectedFn = Box<dyn FnMut(Event, SubmitError) + Send>;
type SourceErrorFn<E> = Box<dyn FnMut(E) + Send>;
type SourceDoneFn = Box<dyn FnOnce() + Send>;

/// Callbacks for a stream subscription. All are optional.
pub struct StreamHandlers<E> {
    on_done: Option<DoneFn>,
    on_error: Option<ErrorFn>,
    on_rejected: Option<RejectedFn>,
    on_source_error: Option<SourceErrorFn<E>>,
    on_source_done: Option<SourceDoneFn>,
    cancel_on_error: bool,
}

impl<E> Default for StreamHandlers<E> {
    fn default() -> Self {
        Self {
            on_done: None,
            on_error: None,
            on_rejected: None,
            on_source_error: None,
            on_source_done: None,
            cancel_on_error: false,
        }
    }
}

impl<E> StreamHandlers<E> {
    /// Handlers that do nothing; add the ones you need with the builder methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a submitted event completes.
    pub fn on_done<F>(mut self, f: F) -> Self
    where
        F: Fn(&Event, Output) + Send + Sync + 'static,
    {
        self.on_done = Some(Arc::new(f));
        self
    }

    /// Called when a submitted event fails or is cancelled.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Event, Failure) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called when the manager refuses an event at submission.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: FnMut(Event, SubmitError) + Send + 'static,
    {
        self.on_rejected = Some(Box::new(f));
        self
    }

    /// Called for every error item the source yields.
    pub fn on_source_error<F>(mut self, f: F) -> Self
    where
        F: FnMut(E) + Send + 'static,
    {
        self.on_source_error = Some(Box::new(f));
        self
    }

    /// Called once when the source ends on its own.
    pub fn on_source_done<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_source_done = Some(Box::new(f));
        self
    }

    /// Stop the subscription at the first source error.
    pub fn cancel_on_error(mut self, cancel: bool) -> Self {
        self.cancel_on_error = cancel;
        self
    }

    fn deliver_for(&self, event: &Event) -> Deliver {
        let event = event.clone();
        let on_done = self.on_done.clone();
        let on_error = self.on_error.clone();
        guarded(move |outcome| match outcome {
            Ok(out) => {
                if let Some(f) = on_done {
                    f(&event, out);
                }
            }
            Err(failure) => {
                if let Some(f) = on_error {
                    f(&event, failure);
                }
            }
        })
    }
}

impl<E> fmt::Debug for StreamHandlers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandlers")
            .field("cancel_on_error", &self.cancel_on_error)
            .finish_non_exhaustive()
    }
}

/// Handle to a running stream subscription.
///
/// Dropping the handle does not stop the subscription; call
/// [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct StreamSubscription {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamSubscription {
    /// Stops pulling from the source. Events already submitted are unaffected.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True after [`cancel`](Self::cancel) or manager disposal.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the subscription task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the subscription task to exit.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "stream subscription task failed");
        }
    }
}

pub(crate) fn spawn_stream<S, E>(
    shared: &Arc<Shared>,
    source: S,
    mut handlers: StreamHandlers<E>,
) -> StreamSubscription
where
    S: Stream<Item = Result<Event, E>> + Send + 'static,
    E: Send + 'static,
{
    let token = shared.shutdown.child_token();
    let stop = token.clone();
    let weak: Weak<Shared> = Arc::downgrade(shared);

    let handle = tokio::spawn(async move {
        let mut source = Box::pin(source);
        loop {
            let item = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                item = source.next() => item,
            };
            match item {
                Some(Ok(event)) => {
                    let Some(shared) = weak.upgrade() else { break };
                    let deliver = handlers.deliver_for(&event);
                    if let Err(e) = shared.enqueue(event.clone(), deliver) {
                        match handlers.on_rejected.as_mut() {
                            Some(f) => f(event, e),
                            None => debug!(error = %e, "stream event rejected"),
                        }
                    }
                }
                Some(Err(e)) => {
                    if let Some(f) = handlers.on_source_error.as_mut() {
                        f(e);
                    }
                    if handlers.cancel_on_error {
                        stop.cancel();
                        break;
                    }
                }
                None => {
                    if let Some(done) = handlers.on_source_done.take() {
                        done();
                    }
                    break;
                }
            }
        }
    });

    StreamSubscription { token, handle }
}

//! # Actions: the work an event performs.
//!
//! An [`Action`] returns an [`Execution`], which is either already finished
//! ([`Execution::Ready`], completed inline on the scheduler's hot path) or a boxed
//! future ([`Execution::Pending`], driven on its own tokio task and raced against
//! the event's timeout).
//!
//! [`ActionFn`] and [`AsyncActionFn`] wrap closures so simple events need no
//! dedicated type.
//!
//! ## Example
//! ```rust
//! use eventvisor::{ActionFn, AsyncActionFn, Event, EventError, Execution, Output};
//!
//! let sync = Event::new(ActionFn::new(|_ctx| Execution::ok(Output::new(42u32))));
//! let async_ = Event::new(AsyncActionFn::new(|_ctx| async move {
//!     Ok::<_, EventError>(Output::new("done"))
//! }));
//! # let _ = (sync, async_);
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::EventError;
use crate::events::context::EventContext;

/// Type-erased, cheaply cloneable action result.
#[derive(Clone)]
pub struct Output(Arc<dyn Any + Send + Sync>);

impl Output {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// An output carrying `()`.
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Borrows the value as `T` if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// True if the value is `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is::<()>() {
            f.write_str("Output(())")
        } else {
            f.write_str("Output(..)")
        }
    }
}

/// Result of invoking an action or a reversible hook.
pub enum Execution<T = Output> {
    /// Finished synchronously.
    Ready(Result<T, EventError>),
    /// Finishes when the future resolves.
    Pending(BoxFuture<'static, Result<T, EventError>>),
}

impl<T> Execution<T> {
    /// A synchronous success.
    pub fn ok(value: T) -> Self {
        Execution::Ready(Ok(value))
    }

    /// A synchronous failure.
    pub fn err(error: EventError) -> Self {
        Execution::Ready(Err(error))
    }

    /// An asynchronous result.
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T, EventError>> + Send + 'static,
    {
        Execution::Pending(Box::pin(fut))
    }

    /// Awaits the result regardless of flavour.
    pub async fn resolve(self) -> Result<T, EventError> {
        match self {
            Execution::Ready(res) => res,
            Execution::Pending(fut) => fut.await,
        }
    }
}

impl<T> From<Result<T, EventError>> for Execution<T> {
    fn from(res: Result<T, EventError>) -> Self {
        Execution::Ready(res)
    }
}

/// # Unit of work carried by an [`Event`](crate::Event).
///
/// `run` is invoked once per attempt, on the scheduler's driver task. Do not
/// block in `run`: return [`Execution::Pending`] for anything that waits.
pub trait Action: Send + Sync + 'static {
    /// Starts one attempt.
    fn run(&self, ctx: &EventContext) -> Execution;
}

/// Invokes `action`, turning a panic (in `run` or in the returned future) into a
/// fatal [`EventError`] so the caller always gets a result.
pub(crate) fn run_guarded(action: &Arc<dyn Action>, ctx: &EventContext) -> Execution {
    match catch_unwind(AssertUnwindSafe(|| action.run(ctx))) {
        Ok(Execution::Pending(fut)) => Execution::pending(async move {
            AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(EventError::from_panic(panic)))
        }),
        Ok(ready) => ready,
        Err(panic) => Execution::err(EventError::from_panic(panic)),
    }
}

/// Synchronous closure-backed action.
pub struct ActionFn<F> {
    f: F,
}

impl<F> ActionFn<F>
where
    F: Fn(&EventContext) -> Execution + Send + Sync + 'static,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Action for ActionFn<F>
where
    F: Fn(&EventContext) -> Execution + Send + Sync + 'static,
{
    fn run(&self, ctx: &EventContext) -> Execution {
        (self.f)(ctx)
    }
}

/// Asynchronous closure-backed action.
///
/// The closure *creates* a fresh future per attempt and receives an owned
/// context clone, so no state leaks between retries unless shared explicitly
/// through an `Arc`.
pub struct AsyncActionFn<F> {
    f: F,
}

impl<F, Fut> AsyncActionFn<F>
where
    F: Fn(EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Output, EventError>> + Send + 'static,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Action for AsyncActionFn<F>
where
    F: Fn(EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Output, EventError>> + Send + 'static,
{
    fn run(&self, ctx: &EventContext) -> Execution {
        Execution::pending((self.f)(ctx.clone()))
    }
}

//! # Lifecycle logging.
//!
//! [`EventLogger`] is the structured diagnostics sink the manager calls at each
//! lifecycle phase of an event. It is optional: a manager without a logger
//! schedules exactly the same way.
//!
//! [`TracingLogger`] is the default implementation, emitting one `tracing`
//! event per phase.

mod logger;
mod tracing_logger;

pub use logger::{EventLogger, LifecyclePhase};
pub use tracing_logger::TracingLogger;

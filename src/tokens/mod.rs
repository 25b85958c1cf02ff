//! Group control tokens.
//!
//! An [`EventToken`] groups any number of events for collective
//! pause/resume/cancel. The manager observes token state lazily, at the next
//! checkpoint of each event (submission, dequeue, post-await).
//!
//! ## Contents
//! - [`EventToken`] the shared handle
//! - [`CancelReason`] one-shot cancellation payload (reason + retriable flag)
//! - [`TokenSignal`] what a registered listener is told
//! - [`ListenerId`] handle for detaching a listener

mod token;

pub use token::{CancelReason, EventToken, ListenerId, TokenSignal};

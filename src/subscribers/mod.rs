//! # Notification subscribers.
//!
//! [`Subscribe`] is the extension point; [`SubscriberSet`] fans notifications
//! out to registered subscribers, each on its own worker with its own bounded
//! queue.
//!
//! ## Architecture
//! ```text
//! EventManager ── publish ──► Bus ──► subscriber listener ──► SubscriberSet
//!                                                               ├──► [queue] ──► sub1.on_event()
//!                                                               └──► [queue] ──► sub2.on_event()
//! ```

mod set;
mod subscribe;

pub use set::{SubscriberId, SubscriberSet};
pub use subscribe::Subscribe;

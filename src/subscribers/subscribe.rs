//! # Notification subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging custom notification
//! handlers into an [`EventManager`](crate::EventManager).
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `SubscriberPanicked`)
//! - **Filtering** via [`Subscribe::accepts`], evaluated before enqueueing
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the notification **for this subscriber only** and
//!   publishes `NotificationKind::SubscriberOverflow`.
//! - Notifications are processed sequentially (FIFO) per subscriber.
//! - Higher [`Subscribe::priority`] subscribers are offered each notification first.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use eventvisor::{Notification, NotificationKind, Subscribe};
//!
//! struct SaveAudit;
//!
//! #[async_trait]
//! impl Subscribe for SaveAudit {
//!     async fn on_event(&self, n: &Notification) {
//!         if n.kind == NotificationKind::StateChanged {
//!             // write an audit line
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "save-audit" }
//!     fn accepts(&self, n: &Notification) -> bool { n.key.as_deref() == Some("save") }
//! }
//! ```

use async_trait::async_trait;

use crate::notify::Notification;

/// Notification subscriber.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single notification, on the subscriber's worker task.
    async fn on_event(&self, notification: &Notification);

    /// Name used in logs and overflow/panic notifications.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }

    /// Registration priority; higher is offered notifications first. Default: 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Filter evaluated on the publisher side; rejected notifications are never
    /// queued for this subscriber. Default: accept everything.
    fn accepts(&self, notification: &Notification) -> bool {
        let _ = notification;
        true
    }
}

//! # Broadcast bus for manager notifications.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that stamps each
//! published [`Notification`] with a sequence number and fans it out to every
//! receiver without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Receivers (many):
//!   EventManager   ──┐
//!   UndoRedoManager──┼──► Bus ──┬──► subscriber listener ──► SubscriberSet
//!   SubscriberSet  ──┘          └──► EventManager::subscribe() receivers
//! ```
//!
//! ## Rules
//! - `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - Sequence numbers are per bus, strictly increasing in publish order.
//! - Slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - Notifications are lost if there are no receivers at send time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::notification::Notification;

/// Broadcast channel for manager notifications.
///
/// Cheap to clone; clones share the channel and the sequence counter.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Notification>,
    seq: Arc<AtomicU64>,
}

impl Bus {
    /// Creates a new bus with the given ring-buffer capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Notification>(capacity.max(1));
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stamps the next sequence number and publishes to all active receivers.
    pub fn publish(&self, mut n: Notification) {
        n.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(n);
    }

    /// Creates a receiver that observes notifications published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;

    #[tokio::test]
    async fn test_sequence_is_per_bus_and_monotonic() {
        let a = Bus::new(8);
        let b = Bus::new(8);
        let mut ra = a.subscribe();
        let mut rb = b.subscribe();

        a.publish(Notification::new(NotificationKind::ManagerPaused));
        a.publish(Notification::new(NotificationKind::ManagerResumed));
        b.publish(Notification::new(NotificationKind::Cleared));

        assert_eq!(ra.recv().await.unwrap().seq, 0);
        assert_eq!(ra.recv().await.unwrap().seq, 1);
        assert_eq!(rb.recv().await.unwrap().seq, 0);
    }

    #[test]
    fn test_publish_without_receivers_is_noop() {
        let bus = Bus::new(0);
        assert_eq!(bus.receiver_count(), 0);
        bus.publish(Notification::new(NotificationKind::Disposed));
    }
}

//! # UndoRedoManager: bounded undo/redo stacks.
//!
//! ```text
//! record(e) ──► redo.clear() ──► merge(top)? ──┬─ Some(m) ─► replace top with m
//!                                              └─ None    ─► push e (evict oldest past capacity)
//!
//! undo(n):  undo.pop() ──► Reversible::undo ──► redo.push()     (up to n times)
//! redo(n):  redo.pop() ──► Reversible::redo ──► undo.push()     (up to n times)
//! ```
//!
//! ## Rules
//! - Only reversible events are recorded.
//! - Recording clears the redo stack.
//! - Each call publishes one `HistoryChanged` notification, not one per entry.
//! - `undo`/`redo` calls are serialized; the stacks themselves are never locked
//!   while a hook runs.
//! - A failing (or panicking) hook puts its entry back where it came from and
//!   stops the call with that error.
//! - `merge` also runs unlocked; a panicking merge records the event as a new
//!   entry.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::EventError;
use crate::events::{Event, Execution};
use crate::notify::{Bus, Notification, NotificationKind};

/// One recorded reversible event.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    /// The reversible event.
    pub event: Event,
    /// When it was recorded (or last merged).
    pub at: SystemTime,
}

#[derive(Default)]
struct Stacks {
    undo: VecDeque<HistoryEntry>,
    redo: VecDeque<HistoryEntry>,
}

#[derive(Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}

/// Bounded undo/redo history.
pub struct UndoRedoManager {
    capacity: usize,
    stacks: Mutex<Stacks>,
    op: tokio::sync::Mutex<()>,
    bus: Option<Bus>,
}

impl UndoRedoManager {
    /// Creates a standalone history keeping at most `capacity` entries per stack
    /// (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            stacks: Mutex::new(Stacks::default()),
            op: tokio::sync::Mutex::new(()),
            bus: None,
        }
    }

    pub(crate) fn with_bus(capacity: usize, bus: Bus) -> Self {
        Self {
            bus: Some(bus),
            ..Self::new(capacity)
        }
    }

    /// Maximum entries per stack.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True if there is something to undo.
    pub fn can_undo(&self) -> bool {
        !self.lock().undo.is_empty()
    }

    /// True if there is something to redo.
    pub fn can_redo(&self) -> bool {
        !self.lock().redo.is_empty()
    }

    /// Entries on the undo stack.
    pub fn undo_len(&self) -> usize {
        self.lock().undo.len()
    }

    /// Entries on the redo stack.
    pub fn redo_len(&self) -> usize {
        self.lock().redo.len()
    }

    /// Snapshot of the undo stack, oldest first.
    pub fn undo_entries(&self) -> Vec<HistoryEntry> {
        self.lock().undo.iter().cloned().collect()
    }

    /// Records a completed reversible event. Returns `false` for events without
    /// undo/redo hooks.
    pub fn record(&self, event: &Event) -> bool {
        let Some(hooks) = event.reversible_hooks() else {
            return false;
        };
        let now = SystemTime::now();
        let previous = {
            let mut stacks = self.lock();
            stacks.redo.clear();
            stacks.undo.back().map(|top| top.event.clone())
        };

        // the hook runs with the stacks unlocked; a panic means "no merge"
        let replacement = previous.as_ref().and_then(|prev| {
            catch_unwind(AssertUnwindSafe(|| hooks.merge(prev))).unwrap_or_else(|_| {
                warn!(key = event.key().unwrap_or("-"), "merge hook panicked");
                None
            })
        });

        let merged = {
            let mut stacks = self.lock();
            let top_unchanged = match (stacks.undo.back(), &previous) {
                (Some(top), Some(prev)) => top.event == *prev,
                _ => false,
            };
            match replacement {
                Some(event) if top_unchanged => {
                    if let Some(top) = stacks.undo.back_mut() {
                        *top = HistoryEntry { event, at: now };
                    }
                    true
                }
                _ => {
                    Self::push_bounded(
                        &mut stacks.undo,
                        HistoryEntry {
                            event: event.clone(),
                            at: now,
                        },
                        self.capacity,
                    );
                    false
                }
            }
        };
        debug!(key = event.key().unwrap_or("-"), merged, "history recorded");
        self.notify("record", 1);
        true
    }

    /// Undoes up to `count` entries, newest first. Returns how many were undone.
    pub async fn undo(&self, count: usize) -> Result<usize, EventError> {
        self.step(Direction::Undo, count).await
    }

    /// Redoes up to `count` entries, most recently undone first. Returns how many
    /// were redone.
    pub async fn redo(&self, count: usize) -> Result<usize, EventError> {
        self.step(Direction::Redo, count).await
    }

    /// Drops both stacks.
    pub fn clear(&self) {
        {
            let mut stacks = self.lock();
            stacks.undo.clear();
            stacks.redo.clear();
        }
        self.notify("clear", 0);
    }

    async fn step(&self, dir: Direction, count: usize) -> Result<usize, EventError> {
        let _serial = self.op.lock().await;
        let mut done = 0;
        let mut outcome = Ok(());

        while done < count {
            let entry = {
                let mut stacks = self.lock();
                match dir {
                    Direction::Undo => stacks.undo.pop_back(),
                    Direction::Redo => stacks.redo.pop_back(),
                }
            };
            let Some(entry) = entry else { break };

            let res = match entry.event.reversible_hooks() {
                Some(hooks) => {
                    let exec = catch_unwind(AssertUnwindSafe(|| match dir {
                        Direction::Undo => hooks.undo(),
                        Direction::Redo => hooks.redo(),
                    }))
                    .unwrap_or_else(|panic| Execution::err(EventError::from_panic(panic)));
                    AssertUnwindSafe(exec.resolve())
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(EventError::from_panic(panic)))
                }
                None => Ok(()),
            };

            let mut stacks = self.lock();
            match (res, dir) {
                (Ok(()), Direction::Undo) => Self::push_bounded(&mut stacks.redo, entry, self.capacity),
                (Ok(()), Direction::Redo) => Self::push_bounded(&mut stacks.undo, entry, self.capacity),
                (Err(err), Direction::Undo) => {
                    stacks.undo.push_back(entry);
                    outcome = Err(err);
                    break;
                }
                (Err(err), Direction::Redo) => {
                    stacks.redo.push_back(entry);
                    outcome = Err(err);
                    break;
                }
            }
            done += 1;
        }

        self.notify(
            match dir {
                Direction::Undo => "undo",
                Direction::Redo => "redo",
            },
            done,
        );
        outcome.map(|()| done)
    }

    fn push_bounded(stack: &mut VecDeque<HistoryEntry>, entry: HistoryEntry, cap: usize) {
        stack.push_back(entry);
        while stack.len() > cap {
            stack.pop_front();
        }
    }

    fn notify(&self, op: &'static str, count: usize) {
        if let Some(bus) = &self.bus {
            bus.publish(
                Notification::new(NotificationKind::HistoryChanged)
                    .with_reason(op)
                    .with_count(count),
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Stacks> {
        self.stacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for UndoRedoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stacks = self.lock();
        f.debug_struct("UndoRedoManager")
            .field("capacity", &self.capacity)
            .field("undo", &stacks.undo.len())
            .field("redo", &stacks.redo.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Action, EventContext, Output, Reversible};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct Add {
        total: Arc<AtomicI64>,
        amount: i64,
        fail_undo: bool,
    }

    impl Action for Add {
        fn run(&self, _: &EventContext) -> Execution {
            self.total.fetch_add(self.amount, Ordering::SeqCst);
            Execution::ok(Output::empty())
        }
    }

    impl Reversible for Add {
        fn undo(&self) -> Execution<()> {
            if self.fail_undo {
                return Execution::err(EventError::fail("cannot undo"));
            }
            self.total.fetch_sub(self.amount, Ordering::SeqCst);
            Execution::ok(())
        }

        fn redo(&self) -> Execution<()> {
            let total = self.total.clone();
            let amount = self.amount;
            Execution::pending(async move {
                total.fetch_add(amount, Ordering::SeqCst);
                Ok::<(), EventError>(())
            })
        }

        fn merge(&self, previous: &Event) -> Option<Event> {
            let prev = previous.action_as::<Add>()?;
            if prev.amount != 1 || self.amount != 1 {
                return None;
            }
            Some(
                Event::reversible(Add {
                    total: self.total.clone(),
                    amount: 2,
                    fail_undo: false,
                })
                .build(),
            )
        }
    }

    fn add(total: &Arc<AtomicI64>, amount: i64) -> Event {
        let ev = Event::reversible(Add {
            total: total.clone(),
            amount,
            fail_undo: false,
        })
        .build();
        total.fetch_add(amount, Ordering::SeqCst);
        ev
    }

    #[tokio::test]
    async fn test_undo_then_redo_restores() {
        let total = Arc::new(AtomicI64::new(0));
        let history = UndoRedoManager::new(10);
        assert!(history.record(&add(&total, 5)));
        assert!(history.record(&add(&total, 7)));
        assert_eq!(total.load(Ordering::SeqCst), 12);

        assert_eq!(history.undo(1).await.unwrap(), 1);
        assert_eq!(total.load(Ordering::SeqCst), 5);
        assert!(history.can_redo());

        assert_eq!(history.redo(5).await.unwrap(), 1);
        assert_eq!(total.load(Ordering::SeqCst), 12);
        assert_eq!((history.undo_len(), history.redo_len()), (2, 0));
    }

    #[tokio::test]
    async fn test_record_clears_redo() {
        let total = Arc::new(AtomicI64::new(0));
        let history = UndoRedoManager::new(10);
        history.record(&add(&total, 5));
        history.undo(1).await.unwrap();
        assert_eq!(history.redo_len(), 1);
        history.record(&add(&total, 3));
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let total = Arc::new(AtomicI64::new(0));
        let history = UndoRedoManager::new(2);
        let first = add(&total, 10);
        history.record(&first);
        history.record(&add(&total, 20));
        history.record(&add(&total, 30));
        let entries = history.undo_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.event != first));
    }

    #[test]
    fn test_merge_replaces_top() {
        let total = Arc::new(AtomicI64::new(0));
        let history = UndoRedoManager::new(10);
        history.record(&add(&total, 1));
        history.record(&add(&total, 1));
        assert_eq!(history.undo_len(), 1);
        let top = &history.undo_entries()[0];
        assert_eq!(top.event.action_as::<Add>().map(|a| a.amount), Some(2));
    }

    #[test]
    fn test_plain_events_are_not_recorded() {
        let history = UndoRedoManager::new(4);
        let ev = Event::new(crate::events::ActionFn::new(|_| Execution::ok(Output::empty())));
        assert!(!history.record(&ev));
        assert!(!history.can_undo());
    }

    #[tokio::test]
    async fn test_failing_hook_keeps_entry() {
        let total = Arc::new(AtomicI64::new(0));
        let history = UndoRedoManager::new(4);
        let ev = Event::reversible(Add {
            total: total.clone(),
            amount: 3,
            fail_undo: true,
        })
        .build();
        history.record(&ev);

        assert!(history.undo(1).await.is_err());
        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.redo_len(), 0);
    }

    #[tokio::test]
    async fn test_one_notification_per_call() {
        let total = Arc::new(AtomicI64::new(0));
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let history = UndoRedoManager::with_bus(10, bus);
        history.record(&add(&total, 5));
        history.record(&add(&total, 6));
        history.undo(2).await.unwrap();

        let mut ops = Vec::new();
        while let Ok(n) = rx.try_recv() {
            ops.push((n.reason.unwrap().to_string(), n.count.unwrap()));
        }
        assert_eq!(
            ops,
            vec![
                ("record".to_string(), 1),
                ("record".to_string(), 1),
                ("undo".to_string(), 2)
            ]
        );
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use eventvisor::{
    Action, Event, EventContext, EventManager, Execution, ManagerConfig, NotificationKind,
    Output, Reversible,
};

/// Adds `amount` to a shared counter; undo subtracts it again.
struct Add {
    total: Arc<AtomicI64>,
    amount: i64,
}

impl Action for Add {
    fn run(&self, _ctx: &EventContext) -> Execution {
        let now = self.total.fetch_add(self.amount, Ordering::SeqCst) + self.amount;
        Execution::ok(Output::new(now))
    }
}

impl Reversible for Add {
    fn undo(&self) -> Execution<()> {
        self.total.fetch_sub(self.amount, Ordering::SeqCst);
        Execution::ok(())
    }

    fn redo(&self) -> Execution<()> {
        let total = self.total.clone();
        let amount = self.amount;
        Execution::pending(async move {
            total.fetch_add(amount, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn add(total: &Arc<AtomicI64>, amount: i64) -> Event {
    Event::reversible(Add {
        total: total.clone(),
        amount,
    })
    .build()
}

#[tokio::test(start_paused = true)]
async fn test_undo_redo_restores_state() {
    let mgr = EventManager::builder(ManagerConfig::default())
        .with_undo_redo(10)
        .build();
    let history = mgr.undo_redo().expect("history enabled").clone();
    let total = Arc::new(AtomicI64::new(0));

    mgr.submit(add(&total, 2)).unwrap().await.unwrap();
    mgr.submit(add(&total, 5)).unwrap().await.unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 7);
    assert_eq!(history.undo_len(), 2);

    assert_eq!(history.undo(1).await.unwrap(), 1);
    assert_eq!(total.load(Ordering::SeqCst), 2);
    assert!(history.can_redo());

    assert_eq!(history.undo(5).await.unwrap(), 1);
    assert_eq!(total.load(Ordering::SeqCst), 0);
    assert!(!history.can_undo());

    assert_eq!(history.redo(2).await.unwrap(), 2);
    assert_eq!(total.load(Ordering::SeqCst), 7);
    assert_eq!(history.redo_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_record_clears_redo_and_notifies_once_per_call() {
    let mgr = EventManager::builder(ManagerConfig::default())
        .with_undo_redo(10)
        .build();
    let history = mgr.undo_redo().unwrap().clone();
    let total = Arc::new(AtomicI64::new(0));

    for amount in [1, 2, 3] {
        mgr.submit(add(&total, amount)).unwrap().await.unwrap();
    }
    let mut rx = mgr.subscribe();
    assert_eq!(history.undo(3).await.unwrap(), 3);

    let changes: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|n| n.kind == NotificationKind::HistoryChanged)
        .collect();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].count, Some(3));

    mgr.submit(add(&total, 10)).unwrap().await.unwrap();
    assert_eq!(history.redo_len(), 0);
    assert_eq!(history.undo_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_without_history_nothing_is_recorded() {
    let mgr = EventManager::new(ManagerConfig::default());
    let total = Arc::new(AtomicI64::new(0));
    mgr.submit(add(&total, 4)).unwrap().await.unwrap();
    assert!(mgr.undo_redo().is_none());
}

/// Reversible no-op whose merge hook always panics.
struct Stubborn {
    runs: Arc<AtomicI64>,
}

impl Action for Stubborn {
    fn run(&self, _ctx: &EventContext) -> Execution {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Execution::ok(Output::empty())
    }
}

impl Reversible for Stubborn {
    fn undo(&self) -> Execution<()> {
        Execution::ok(())
    }

    fn redo(&self) -> Execution<()> {
        Execution::ok(())
    }

    fn merge(&self, _previous: &Event) -> Option<Event> {
        panic!("merge exploded")
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_merge_records_a_new_entry() {
    let mgr = EventManager::builder(ManagerConfig::default())
        .with_undo_redo(10)
        .build();
    let history = mgr.undo_redo().unwrap().clone();
    let runs = Arc::new(AtomicI64::new(0));

    for _ in 0..3 {
        let ev = Event::reversible(Stubborn { runs: runs.clone() }).build();
        mgr.submit(ev).unwrap().await.unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(history.undo_len(), 3);
    assert_eq!(history.undo(3).await.unwrap(), 3);
}

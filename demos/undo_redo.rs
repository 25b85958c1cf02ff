//! # Example: undo_redo
//!
//! Reversible edits on a shared counter. Consecutive single-step increments
//! merge into one history entry, so one `undo` reverts both.
//!
//! ## Flow
//! ```text
//! submit(+10) ─► record
//! submit(+1)  ─► record
//! submit(+1)  ─► merge with previous (+2)
//! undo(1) ─► counter -= 2
//! undo(1) ─► counter -= 10
//! redo(2) ─► counter += 10, += 2
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example undo_redo
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use eventvisor::{Action, Event, EventContext, EventManager, Execution, ManagerConfig, Output, Reversible};

struct Increment {
    counter: Arc<AtomicI64>,
    by: i64,
}

impl Action for Increment {
    fn run(&self, _ctx: &EventContext) -> Execution {
        let now = self.counter.fetch_add(self.by, Ordering::SeqCst) + self.by;
        Execution::ok(Output::new(now))
    }
}

impl Reversible for Increment {
    fn undo(&self) -> Execution<()> {
        self.counter.fetch_sub(self.by, Ordering::SeqCst);
        Execution::ok(())
    }

    fn redo(&self) -> Execution<()> {
        self.counter.fetch_add(self.by, Ordering::SeqCst);
        Execution::ok(())
    }

    fn merge(&self, previous: &Event) -> Option<Event> {
        let prev = previous.action_as::<Increment>()?;
        if prev.by != 1 || self.by != 1 {
            return None;
        }
        Some(increment(&self.counter, 2))
    }
}

fn increment(counter: &Arc<AtomicI64>, by: i64) -> Event {
    Event::reversible(Increment {
        counter: counter.clone(),
        by,
    })
    .key(format!("+{by}"))
    .build()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mgr = EventManager::builder(ManagerConfig::default())
        .with_undo_redo(16)
        .build();
    let history = mgr
        .undo_redo()
        .ok_or("history is enabled by with_undo_redo")?
        .clone();
    let counter = Arc::new(AtomicI64::new(0));

    for by in [10, 1, 1] {
        mgr.submit(increment(&counter, by))?.await?;
    }
    println!("counter = {}, history = {}", counter.load(Ordering::SeqCst), history.undo_len());

    history.undo(1).await?;
    println!("undo    -> {}", counter.load(Ordering::SeqCst));
    history.undo(1).await?;
    println!("undo    -> {}", counter.load(Ordering::SeqCst));
    history.redo(2).await?;
    println!("redo x2 -> {}", counter.load(Ordering::SeqCst));

    mgr.dispose();
    Ok(())
}

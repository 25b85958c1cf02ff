//! # Example: priority_retry
//!
//! Queues three events behind a paused manager, then resumes it. The urgent
//! event runs first; the flaky one fails twice and is retried with
//! exponential backoff before it completes.
//!
//! ## Flow
//! ```text
//! pause ─► submit(report p=0) ─► submit(flaky p=1) ─► submit(urgent p=9)
//! resume
//!   ├─► urgent  started ─► completed
//!   ├─► flaky   started ─► retrying(1)          (waits out its backoff off-queue)
//!   ├─► report  started ─► completed
//!   └─► flaky   queued ─► started ─► retrying(2) ─► queued ─► started ─► completed
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example priority_retry
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use eventvisor::{
    ActionFn, BackoffPolicy, Event, EventError, EventManager, Execution, JitterPolicy,
    ManagerConfig, NotificationKind, Output, RetryPolicy,
};

fn job(key: &'static str, priority: i32) -> Event {
    Event::builder(ActionFn::new(move |_ctx| {
        println!("[{key}] running");
        Execution::ok(Output::new(key))
    }))
    .key(key)
    .priority(priority)
    .build()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mgr = EventManager::new(ManagerConfig::default());

    let mut rx = mgr.subscribe();
    tokio::spawn(async move {
        while let Ok(n) = rx.recv().await {
            if n.kind != NotificationKind::StateChanged {
                continue;
            }
            if let (Some(key), Some(label)) = (n.key.as_deref(), n.state_label()) {
                println!("  #{:<3} {key:<7} {label}", n.seq);
            }
        }
    });

    let failures = Arc::new(AtomicU32::new(0));
    let counter = failures.clone();
    let flaky = Event::builder(ActionFn::new(move |ctx| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            println!("[flaky] attempt {} failed", ctx.attempt());
            return Execution::err(EventError::fail("upstream busy"));
        }
        Execution::ok(Output::new("flaky"))
    }))
    .key("flaky")
    .priority(1)
    .retry(
        RetryPolicy::new(
            3,
            BackoffPolicy::exponential(Duration::from_millis(50), Duration::from_secs(1)),
        )
        .with_jitter(JitterPolicy::Equal),
    )
    .build();

    mgr.pause();
    let report = mgr.submit(job("report", 0))?;
    let flaky = mgr.submit(flaky)?;
    let urgent = mgr.submit(job("urgent", 9))?;
    println!("queued: {}", mgr.queue_len());
    mgr.resume();

    for done in [urgent, flaky, report] {
        let out = done.await?;
        println!("done: {:?}", out.downcast_ref::<&str>());
    }

    mgr.dispose();
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}

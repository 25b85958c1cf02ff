use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eventvisor::{
    ActionFn, AsyncActionFn, BackoffPolicy, BatchEvent, Event, EventError, EventManager,
    EventState, EventToken, Execution, ManagerConfig, Notification, NotificationKind, Output,
    RetryPolicy, StreamHandlers, SubmitError,
};
use tokio::sync::broadcast;

fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

fn labels(notes: &[Notification], event: &Event) -> Vec<&'static str> {
    notes
        .iter()
        .filter(|n| n.event.as_ref() == Some(event))
        .filter_map(Notification::state_label)
        .collect()
}

fn sleeper(work: Duration) -> Event {
    Event::new(AsyncActionFn::new(move |_ctx| async move {
        tokio::time::sleep(work).await;
        Ok::<_, EventError>(Output::new("slept"))
    }))
}

fn constant(ms: u64) -> BackoffPolicy {
    BackoffPolicy::constant(Duration::from_millis(ms))
}

#[tokio::test(start_paused = true)]
async fn test_retries_then_succeeds() {
    let mgr = EventManager::new(ManagerConfig::default());
    let mut rx = mgr.subscribe();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let event = Event::builder(ActionFn::new(move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        if ctx.attempt() < 2 {
            Execution::err(EventError::fail("flaky"))
        } else {
            Execution::ok(Output::new(ctx.attempt()))
        }
    }))
    .retry(RetryPolicy::new(3, constant(10)))
    .build();

    let out = mgr.submit(event.clone()).unwrap().await.unwrap();
    assert_eq!(out.downcast_ref::<u32>(), Some(&2));
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    let seen = labels(&drain(&mut rx), &event);
    assert_eq!(
        seen,
        vec![
            "queued", "started", "retrying", "queued", "started", "retrying", "queued",
            "started", "completed"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_then_error() {
    let mgr = EventManager::new(ManagerConfig::default());
    let mut rx = mgr.subscribe();
    let event = Event::builder(ActionFn::new(|_| Execution::err(EventError::fail("always"))))
        .retry(RetryPolicy::new(2, constant(5)))
        .build();

    let failure = mgr.submit(event.clone()).unwrap().await.unwrap_err();
    let fault = failure.fault().expect("a terminal fault");
    assert_eq!(fault.event(), &event);
    assert!(matches!(fault.error(), EventError::Fail { .. }));

    let seen = labels(&drain(&mut rx), &event);
    assert_eq!(seen.iter().filter(|l| **l == "retrying").count(), 2);
    assert_eq!(seen.last(), Some(&"failed"));
    assert!(matches!(event.state(), Some(EventState::Failed(_))));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_errors_are_not_retried() {
    let mgr = EventManager::new(ManagerConfig::default());
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let event = Event::builder(ActionFn::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Execution::err(EventError::fatal("broken"))
    }))
    .retry(RetryPolicy::new(5, constant(5)))
    .build();

    assert!(mgr.submit(event).unwrap().await.is_err());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_action_becomes_fatal_fault() {
    let mgr = EventManager::new(ManagerConfig::default());
    let event = Event::new(ActionFn::new(|_| -> Execution { panic!("kaboom") }));

    let failure = mgr.submit(event).unwrap().await.unwrap_err();
    let fault = failure.fault().unwrap();
    assert!(matches!(fault.error(), EventError::Fatal { .. }));
    assert!(fault.to_string().contains("kaboom"));

    // the driver survives
    let ok = Event::new(ActionFn::new(|_| Execution::ok(Output::empty())));
    mgr.submit(ok).unwrap().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_retry_predicate_fails_event() {
    let mgr = EventManager::new(ManagerConfig::default());
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let event = Event::builder(ActionFn::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Execution::err(EventError::fail("flaky"))
    }))
    .retry(RetryPolicy::new(3, constant(5)).retry_if(|_: &EventError| -> bool {
        panic!("predicate exploded")
    }))
    .build();

    let failure = mgr.submit(event.clone()).unwrap().await.unwrap_err();
    let fault = failure.fault().expect("a terminal fault");
    assert!(matches!(fault.error(), EventError::Fatal { .. }));
    assert!(fault.to_string().contains("predicate exploded"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(matches!(event.state(), Some(EventState::Failed(_))));

    // the queue keeps draining afterwards
    let ok = Event::new(ActionFn::new(|_| Execution::ok(Output::empty())));
    mgr.submit(ok).unwrap().await.unwrap();
    assert_eq!(mgr.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_without_retry() {
    let mgr = EventManager::new(ManagerConfig::default());
    let mut rx = mgr.subscribe();
    let event = Event::builder(AsyncActionFn::new(|_ctx| async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, EventError>(Output::empty())
    }))
    .timeout(Duration::from_millis(50))
    .retry(RetryPolicy::new(3, constant(5)))
    .build();

    let failure = mgr.submit(event.clone()).unwrap().await.unwrap_err();
    let reason = failure.cancellation().unwrap();
    assert_eq!(&*reason.reason, "timeout");
    assert!(!reason.retriable);

    let seen = labels(&drain(&mut rx), &event);
    assert!(!seen.contains(&"retrying"));
    assert_eq!(mgr.submit(event).unwrap_err(), SubmitError::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_action_runs_to_the_end() {
    let mgr = EventManager::new(ManagerConfig::default());
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let event = Event::builder(AsyncActionFn::new(move |_ctx| {
        let flag = flag.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, EventError>(Output::empty())
        }
    }))
    .timeout(Duration::from_millis(20))
    .build();

    let failure = mgr.submit(event.clone()).unwrap().await.unwrap_err();
    assert_eq!(&*failure.cancellation().unwrap().reason, "timeout");
    assert!(!finished.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(finished.load(Ordering::SeqCst));
    assert!(matches!(event.state(), Some(EventState::Cancelled(_))));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let mgr = EventManager::new(ManagerConfig::default());
    let mut rx = mgr.subscribe();
    mgr.pause();

    let event = sleeper(Duration::from_millis(10));
    let done = mgr.submit(event.clone()).unwrap();
    assert!(event.cancel("user", true));
    assert!(!event.cancel("again", false));

    let failure = done.await.unwrap_err();
    assert_eq!(&*failure.cancellation().unwrap().reason, "user");
    assert_eq!(mgr.queue_len(), 0);

    let cancels = labels(&drain(&mut rx), &event)
        .into_iter()
        .filter(|l| *l == "cancelled")
        .count();
    assert_eq!(cancels, 1);

    // retriable cancellation allows a fresh submission
    mgr.resume();
    let again = mgr.submit(event).unwrap().await.unwrap();
    assert_eq!(again.downcast_ref::<&str>(), Some(&"slept"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_running_discards_result() {
    let mgr = EventManager::new(ManagerConfig::default());
    let event = sleeper(Duration::from_millis(100));
    let done = mgr.submit(event.clone()).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(event.state().is_some_and(|s| s.is_running()));
    event.cancel("stop", true);

    let failure = done.await.unwrap_err();
    assert_eq!(&*failure.cancellation().unwrap().reason, "stop");
    assert!(matches!(event.state(), Some(EventState::Cancelled(_))));
}

#[tokio::test(start_paused = true)]
async fn test_rejects_disabled_and_in_flight() {
    let mgr = EventManager::new(ManagerConfig::default());
    mgr.pause();

    let disabled = Event::builder(ActionFn::new(|_| Execution::ok(Output::empty())))
        .enabled(false)
        .build();
    assert_eq!(mgr.submit(disabled).unwrap_err(), SubmitError::Disabled);

    let event = sleeper(Duration::from_millis(1));
    let _done = mgr.submit(event.clone()).unwrap();
    assert_eq!(mgr.submit(event).unwrap_err(), SubmitError::InFlight);
}

#[tokio::test(start_paused = true)]
async fn test_token_pause_and_cancel_group() {
    let mgr = EventManager::new(ManagerConfig::default());
    let token = EventToken::new();
    token.pause();

    let ran = Arc::new(AtomicUsize::new(0));
    let make = |key: &'static str| {
        let ran = ran.clone();
        Event::builder(ActionFn::new(move |_| {
            ran.fetch_add(1, Ordering::SeqCst);
            Execution::ok(Output::empty())
        }))
        .key(key)
        .token(token.clone())
        .build()
    };

    let first = mgr.submit(make("first")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(mgr.queue_len(), 1);
    assert_eq!(mgr.token_count(), 1);
    assert_eq!(token.listener_count(), 1);

    token.resume();
    first.await.unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    token.pause();
    let second = mgr.submit(make("second")).unwrap();
    let third = mgr.submit(make("third")).unwrap();
    token.cancel("group closed", false);

    for done in [second, third] {
        let failure = done.await.unwrap_err();
        let reason = failure.cancellation().unwrap();
        assert_eq!(&*reason.reason, "group closed");
        assert!(!reason.retriable);
    }
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(mgr.token_count(), 0);
    assert_eq!(token.listener_count(), 0);
    assert_eq!(mgr.submit(make("late")).unwrap_err(), SubmitError::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cancels_queued_and_retry_waiting() {
    let mgr = EventManager::new(ManagerConfig::default());
    let mut rx = mgr.subscribe();

    let retrying = Event::builder(ActionFn::new(|_| Execution::err(EventError::fail("later"))))
        .retry(RetryPolicy::new(5, constant(1_000)))
        .build();
    let waiting = mgr.submit(retrying.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(matches!(retrying.state(), Some(EventState::Retrying { .. })));

    mgr.pause();
    let queued: Vec<_> = (0..3)
        .map(|_| mgr.submit(sleeper(Duration::from_millis(1))).unwrap())
        .collect();

    assert_eq!(mgr.clear(Some("reset")), 4);
    assert!(!mgr.is_paused());
    assert_eq!(mgr.queue_len(), 0);

    for done in queued.into_iter().chain([waiting]) {
        let failure = done.await.unwrap_err();
        assert_eq!(&*failure.cancellation().unwrap().reason, "reset");
    }

    let cleared = drain(&mut rx)
        .into_iter()
        .find(|n| n.kind == NotificationKind::Cleared)
        .unwrap();
    assert_eq!(cleared.count, Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_dispose_cancels_pending_and_refuses_work() {
    let mgr = EventManager::new(ManagerConfig::default());
    mgr.pause();
    let pending = mgr.submit(sleeper(Duration::from_millis(1))).unwrap();

    mgr.dispose();
    mgr.dispose();
    assert!(mgr.is_disposed());

    let failure = pending.await.unwrap_err();
    assert_eq!(&*failure.cancellation().unwrap().reason, "disposed");
    assert_eq!(
        mgr.submit(sleeper(Duration::from_millis(1))).unwrap_err(),
        SubmitError::Disposed
    );
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_dispose_is_cancelled_not_retried() {
    let mgr = EventManager::new(ManagerConfig::default());
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let event = Event::builder(AsyncActionFn::new(move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<Output, _>(EventError::fail("late failure"))
        }
    }))
    .retry(RetryPolicy::new(3, constant(5)))
    .build();

    let done = mgr.submit(event.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(mgr.active_count(), 1);
    mgr.dispose();

    let failure = done.await.unwrap_err();
    assert_eq!(&*failure.cancellation().unwrap().reason, "disposed");
    assert!(matches!(event.state(), Some(EventState::Cancelled(_))));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_process_immediately_bypasses_paused_queue() {
    let mgr = EventManager::new(ManagerConfig::default());
    mgr.pause();
    let queued = mgr.submit(sleeper(Duration::from_millis(1))).unwrap();

    let out = mgr
        .process_immediately(sleeper(Duration::from_millis(5)))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(out.downcast_ref::<&str>(), Some(&"slept"));
    assert_eq!(mgr.queue_len(), 1);

    mgr.resume();
    queued.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_submit_with_callbacks() {
    let mgr = EventManager::new(ManagerConfig::default());
    let (tx, rx) = tokio::sync::oneshot::channel();

    mgr.submit_with(
        Event::new(ActionFn::new(|_| Execution::ok(Output::new(5u8)))),
        move |out| {
            let _ = tx.send(out.downcast_ref::<u8>().copied());
        },
        |failure| panic!("unexpected failure: {failure}"),
    )
    .unwrap();

    assert_eq!(rx.await.unwrap(), Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_submit_stream() {
    let mgr = EventManager::new(ManagerConfig::default());
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let source_errors = Arc::new(Mutex::new(Vec::new()));
    let finished = Arc::new(AtomicBool::new(false));

    let items: Vec<Result<Event, &'static str>> = vec![
        Ok(Event::new(ActionFn::new(|_| Execution::ok(Output::new(1u8))))),
        Err("bad frame"),
        Ok(Event::new(ActionFn::new(|_| Execution::ok(Output::new(2u8))))),
    ];

    let errors = source_errors.clone();
    let flag = finished.clone();
    let handlers = StreamHandlers::<&'static str>::new()
        .on_done(move |_event, out| {
            let _ = done_tx.send(out.downcast_ref::<u8>().copied());
        })
        .on_source_error(move |e| errors.lock().unwrap().push(e))
        .on_source_done(move || flag.store(true, Ordering::SeqCst));

    let sub = mgr.submit_stream(futures::stream::iter(items), handlers);
    let mut got = vec![done_rx.recv().await.unwrap(), done_rx.recv().await.unwrap()];
    got.sort();
    assert_eq!(got, vec![Some(1), Some(2)]);

    sub.join().await;
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(*source_errors.lock().unwrap(), vec!["bad frame"]);
}

#[tokio::test(start_paused = true)]
async fn test_submit_stream_cancel_on_error() {
    let mgr = EventManager::new(ManagerConfig::default());
    let submitted = Arc::new(AtomicUsize::new(0));
    let items: Vec<Result<Event, &'static str>> = vec![
        Err("broken"),
        Ok(Event::new(ActionFn::new(|_| Execution::ok(Output::empty())))),
    ];

    let counter = submitted.clone();
    let handlers = StreamHandlers::<&'static str>::new()
        .on_done(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .cancel_on_error(true);
    let sub = mgr.submit_stream(futures::stream::iter(items), handlers);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(sub.is_cancelled());
    assert!(sub.is_finished());
    assert_eq!(submitted.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_retries_outstanding_members() {
    let mgr = EventManager::new(ManagerConfig::default());
    let healed = Arc::new(AtomicBool::new(false));
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let steady = Event::builder(ActionFn::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Execution::ok(Output::new("steady"))
    }))
    .key("steady")
    .build();
    let flag = healed.clone();
    let flaky = Event::builder(ActionFn::new(move |_| {
        if flag.load(Ordering::SeqCst) {
            Execution::ok(Output::new("flaky"))
        } else {
            Execution::err(EventError::fail("not yet"))
        }
    }))
    .key("flaky")
    .build();

    let batch = Event::builder(BatchEvent::sequential(vec![steady, flaky.clone()]))
        .key("batch")
        .build();
    let failure = mgr.submit(batch).unwrap().await.unwrap_err();
    let fault = failure.fault().unwrap();
    match fault.error() {
        EventError::Batch(b) => assert_eq!(b.outstanding(), vec![flaky]),
        other => panic!("expected a batch fault, got {other:?}"),
    }

    healed.store(true, Ordering::SeqCst);
    let out = fault.retry().unwrap().await.unwrap();
    let outs = out.downcast_ref::<Vec<Output>>().unwrap();
    assert_eq!(outs.len(), 1);
    assert_eq!(outs[0].downcast_ref::<&str>(), Some(&"flaky"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_notifications_carry_load_and_sequence() {
    let mgr = EventManager::new(ManagerConfig::default());
    let mut rx = mgr.subscribe();
    let event = Event::builder(ActionFn::new(|ctx| {
        ctx.progress(0.5, Some("half"));
        Execution::ok(Output::empty())
    }))
    .key("load")
    .build();
    mgr.submit(event.clone()).unwrap().await.unwrap();

    let notes = drain(&mut rx);
    assert!(notes.windows(2).all(|w| w[0].seq < w[1].seq));
    assert_eq!(labels(&notes, &event), vec!["queued", "started", "progress", "completed"]);
    let started = notes
        .iter()
        .find(|n| n.state_label() == Some("started"))
        .unwrap();
    assert_eq!(started.active, Some(1));
    assert_eq!(started.key.as_deref(), Some("load"));
}

#[derive(Default)]
struct PhaseLog {
    phases: Mutex<Vec<(String, eventvisor::LifecyclePhase)>>,
    disposed: AtomicBool,
}

impl eventvisor::EventLogger for PhaseLog {
    fn record_lifecycle(
        &self,
        _event: &Event,
        phase: eventvisor::LifecyclePhase,
        _at: std::time::SystemTime,
        metadata: &eventvisor::Metadata,
    ) {
        let tag = metadata.get("tag").cloned().unwrap_or_default();
        self.phases.lock().unwrap().push((tag, phase));
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_logger_sees_phases_and_is_not_disposed_when_shared() {
    use eventvisor::LifecyclePhase::*;

    let log = Arc::new(PhaseLog::default());
    let mgr = EventManager::builder(ManagerConfig::default())
        .with_logger(log.clone())
        .build();
    let event = Event::builder(ActionFn::new(|_| Execution::err(EventError::fail("once"))))
        .metadata("tag", "x")
        .retry(RetryPolicy::new(1, constant(5)))
        .build();
    assert!(mgr.submit(event).unwrap().await.is_err());

    let phases: Vec<_> = log.phases.lock().unwrap().iter().map(|(_, p)| *p).collect();
    assert_eq!(phases, vec![Queue, Start, Retry, Queue, Start, Error]);
    assert!(log.phases.lock().unwrap().iter().all(|(tag, _)| tag == "x"));

    mgr.dispose();
    assert!(!log.disposed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_owned_logger_disposed_with_manager() {
    let mgr = EventManager::builder(ManagerConfig::default())
        .with_owned_logger(eventvisor::TracingLogger::new())
        .build();
    mgr.submit(Event::new(ActionFn::new(|_| Execution::ok(Output::empty()))))
        .unwrap()
        .await
        .unwrap();
    mgr.dispose();
    assert!(mgr.is_disposed());
}

struct Completions {
    tx: tokio::sync::mpsc::UnboundedSender<Option<Arc<str>>>,
}

#[async_trait::async_trait]
impl eventvisor::Subscribe for Completions {
    async fn on_event(&self, n: &Notification) {
        let _ = self.tx.send(n.key.clone());
    }

    fn name(&self) -> &'static str {
        "completions"
    }

    fn accepts(&self, n: &Notification) -> bool {
        n.state_label() == Some("completed")
    }
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_receive_filtered_notifications() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mgr = EventManager::builder(ManagerConfig::default())
        .with_subscribers(vec![Arc::new(Completions { tx }) as Arc<dyn eventvisor::Subscribe>])
        .build();

    let event = Event::builder(ActionFn::new(|_| Execution::ok(Output::empty())))
        .key("watched")
        .build();
    mgr.submit(event).unwrap().await.unwrap();
    assert_eq!(rx.recv().await.unwrap().as_deref(), Some("watched"));

    let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
    let id = mgr.add_subscriber(Arc::new(Completions { tx: tx2 }));
    mgr.submit(Event::new(ActionFn::new(|_| Execution::ok(Output::empty()))))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(rx2.recv().await.unwrap(), None);
    assert!(mgr.remove_subscriber(id));
    assert!(!mgr.remove_subscriber(id));
}

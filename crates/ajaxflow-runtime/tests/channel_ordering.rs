//! Scheduling guarantees observed through whole calls.

mod common;

use ajaxflow_runtime::{AjaxResponse, CallHooks, CallOutcome, Notify};
use common::{envelope, Harness, Timeline};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn traced(timeline: &Timeline, label: &str) -> CallHooks {
    let start = timeline.clone();
    let done = timeline.clone();
    let (s, d) = (format!("start {label}"), format!("done {label}"));
    CallHooks::new()
        .before(move |_| start.mark(s.clone()))
        .on_done(move |_| done.mark(d.clone()))
}

#[tokio::test(start_paused = true)]
async fn sequential_channel_is_fifo_despite_latency() {
    let h = Harness::new();
    let empty = AjaxResponse::ok(envelope(""));
    h.transport
        .respond_after("/slow", ms(50), empty.clone())
        .respond_after("/mid", ms(20), empty.clone())
        .respond("/fast", empty);

    let timeline = Timeline::default();
    let t0 = Instant::now();
    let handles: Vec<_> = ["/slow", "/mid", "/fast"]
        .into_iter()
        .map(|url| {
            h.runtime
                .ajax_with(h.runtime.attributes(url), traced(&timeline, url))
        })
        .collect();

    for handle in handles {
        assert!(handle.outcome().await.is_completed());
    }

    assert_eq!(h.transport.urls(), ["/slow", "/mid", "/fast"]);
    assert_eq!(
        timeline.labels(),
        [
            "start /slow",
            "done /slow",
            "start /mid",
            "done /mid",
            "start /fast",
            "done /fast"
        ]
    );
    assert_eq!(timeline.at("start /mid") - t0, ms(50));
    assert_eq!(timeline.at("start /fast") - t0, ms(70));
    assert!(!h.runtime.channels().is_busy("0"));
}

#[tokio::test(start_paused = true)]
async fn drop_channel_keeps_only_newest_queued_call() {
    let h = Harness::new();
    h.transport
        .respond_after("/block", ms(30), AjaxResponse::ok(envelope("")))
        .respond("/poll", AjaxResponse::ok(envelope("")));

    let successes = Arc::new(Mutex::new(Vec::new()));
    let hooks = |label: &'static str| {
        let successes = Arc::clone(&successes);
        CallHooks::new().on_success(move |_, _| successes.lock().push(label))
    };
    let attrs = |url: &str| h.runtime.attributes(url).with_channel("poll|d");

    let blocker = h.runtime.ajax_with(attrs("/block"), hooks("block"));
    let a = h.runtime.ajax_with(attrs("/poll?n=a"), hooks("a"));
    let b = h.runtime.ajax_with(attrs("/poll?n=b"), hooks("b"));
    let c = h.runtime.ajax_with(attrs("/poll?n=c"), hooks("c"));

    assert_eq!(a.outcome().await, CallOutcome::Superseded);
    assert_eq!(b.outcome().await, CallOutcome::Superseded);
    assert!(c.outcome().await.is_completed());
    assert!(blocker.outcome().await.is_completed());

    assert_eq!(*successes.lock(), ["block", "c"]);
    assert_eq!(h.transport.urls(), ["/block", "/poll?n=c"]);
}

#[tokio::test(start_paused = true)]
async fn drop_channel_lets_active_call_finish_first() {
    let h = Harness::new();
    h.transport
        .respond_after("/poll", ms(50), AjaxResponse::ok(envelope("")));

    let timeline = Timeline::default();
    let t0 = Instant::now();
    let launch = |n: u32| {
        let url = format!("/poll?t={n}");
        h.runtime.ajax_with(
            h.runtime.attributes(url.clone()).with_channel("poll|d"),
            traced(&timeline, &url),
        )
    };

    let first = launch(0);
    tokio::time::sleep(ms(5)).await;
    let second = launch(5);
    tokio::time::sleep(ms(5)).await;
    let third = launch(10);

    assert!(first.outcome().await.is_completed());
    assert_eq!(second.outcome().await, CallOutcome::Superseded);
    assert!(third.outcome().await.is_completed());

    assert_eq!(h.transport.urls(), ["/poll?t=0", "/poll?t=10"]);
    assert_eq!(timeline.at("start /poll?t=0") - t0, Duration::ZERO);
    assert_eq!(timeline.at("start /poll?t=10") - t0, ms(50));
    assert!(!timeline.labels().iter().any(|l| l.ends_with("t=5")));
}

#[tokio::test(start_paused = true)]
async fn active_channel_ignores_while_busy() {
    let h = Harness::new();
    h.transport
        .respond_after("/save", ms(20), AjaxResponse::ok(envelope("")));
    let attrs = || h.runtime.attributes("/save").with_channel("save|a");

    let first = h.runtime.ajax(attrs());
    let second = h.runtime.ajax(attrs());
    assert_eq!(second.outcome().await, CallOutcome::Ignored);
    assert!(first.outcome().await.is_completed());

    let third = h.runtime.ajax(attrs());
    assert!(third.outcome().await.is_completed());
    assert_eq!(h.transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn distinct_channels_overlap() {
    let h = Harness::new();
    let empty = AjaxResponse::ok(envelope(""));
    h.transport
        .respond_after("/one", ms(40), empty.clone())
        .respond_after("/two", ms(40), empty);

    let t0 = Instant::now();
    let one = h.runtime.ajax(h.runtime.attributes("/one").with_channel("one|s"));
    let two = h.runtime.ajax(h.runtime.attributes("/two").with_channel("two|s"));
    assert!(one.outcome().await.is_completed());
    assert!(two.outcome().await.is_completed());
    assert_eq!(t0.elapsed(), ms(40));
}

#[tokio::test(start_paused = true)]
async fn suspend_locks_hold_the_channel() {
    let h = Harness::new();
    h.transport.respond("/anim", AjaxResponse::ok(envelope("")));

    let locks: Arc<Mutex<Vec<Notify>>> = Arc::default();
    let held = Arc::clone(&locks);
    let first = h.runtime.ajax_with(
        h.runtime.attributes("/anim"),
        CallHooks::new().on_success(move |ctx, _| {
            let mut held = held.lock();
            held.push(ctx.suspend());
            held.push(ctx.suspend());
        }),
    );
    let second = h.runtime.ajax(h.runtime.attributes("/anim?next"));

    tokio::time::sleep(ms(10)).await;
    assert_eq!(h.transport.request_count(), 1);
    assert_eq!(locks.lock().len(), 2);

    let (a, b) = {
        let mut held = locks.lock();
        let b = held.pop().unwrap();
        let a = held.pop().unwrap();
        (a, b)
    };
    b.notify();
    tokio::time::sleep(ms(10)).await;
    assert_eq!(h.transport.request_count(), 1);
    assert!(h.runtime.channels().is_busy("0"));

    a.notify();
    assert!(first.outcome().await.is_completed());
    assert!(second.outcome().await.is_completed());
    assert_eq!(h.transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn suspending_evaluate_holds_the_channel() {
    let h = Harness::new();
    h.scripts.hold_suspended(true);
    h.transport.respond(
        "/fade",
        AjaxResponse::ok(envelope("<evaluate>(function(){n|fade(n);})();</evaluate>")),
    );

    let first = h.runtime.ajax(h.runtime.attributes("/fade"));
    let second = h.runtime.ajax(h.runtime.attributes("/fade?again"));
    tokio::time::sleep(ms(10)).await;
    assert_eq!(h.scripts.held(), 1);
    assert_eq!(h.transport.request_count(), 1);

    assert_eq!(h.scripts.release_all(), 1);
    assert!(first.outcome().await.is_completed());
    tokio::time::sleep(ms(10)).await;
    assert_eq!(h.transport.request_count(), 2);
    h.scripts.release_all();
    assert!(second.outcome().await.is_completed());
}

#[tokio::test(start_paused = true)]
async fn postponing_throttle_coalesces_to_last_call() {
    let h = Harness::new();
    h.transport.push(Duration::ZERO, AjaxResponse::ok(envelope("")));

    let ran = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for i in 1..=5 {
        let ran = Arc::clone(&ran);
        let attrs = h
            .runtime
            .attributes(format!("/search/{i}"))
            .with_throttle("search", ms(100), true);
        handles.push(h.runtime.ajax_with(
            attrs,
            CallHooks::new().before(move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        tokio::time::sleep(ms(10)).await;
    }

    let last = handles.pop().unwrap();
    for handle in handles {
        assert_eq!(handle.outcome().await, CallOutcome::Superseded);
    }
    assert!(last.outcome().await.is_completed());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(h.transport.urls(), ["/search/5"]);
}

#[tokio::test(start_paused = true)]
async fn anchored_throttle_runs_first_then_latest() {
    let h = Harness::new();
    h.transport
        .push(Duration::ZERO, AjaxResponse::ok(envelope("")))
        .push(Duration::ZERO, AjaxResponse::ok(envelope("")));

    let handles: Vec<_> = (1..=4)
        .map(|i| {
            h.runtime.ajax(
                h.runtime
                    .attributes(format!("/type/{i}"))
                    .with_throttle("typing", ms(100), false),
            )
        })
        .collect();

    let outcomes: Vec<_> = futures_outcomes(handles).await;
    assert!(outcomes[0].is_completed());
    assert_eq!(outcomes[1], CallOutcome::Superseded);
    assert_eq!(outcomes[2], CallOutcome::Superseded);
    assert!(outcomes[3].is_completed());
    assert_eq!(h.transport.urls(), ["/type/1", "/type/4"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_queued_calls() {
    let h = Harness::new();
    h.transport
        .respond_after("/long", ms(100), AjaxResponse::ok(envelope("")));

    let running = h.runtime.ajax(h.runtime.attributes("/long"));
    let queued = h.runtime.ajax(h.runtime.attributes("/long?2"));
    let throttled = h.runtime.ajax(
        h.runtime
            .attributes("/later")
            .with_throttle("t", ms(100), true),
    );

    h.runtime.shutdown();
    assert_eq!(queued.outcome().await, CallOutcome::Aborted);
    assert_eq!(throttled.outcome().await, CallOutcome::Superseded);
    assert!(running.outcome().await.is_completed());
    assert_eq!(h.transport.urls(), ["/long"]);
}

async fn futures_outcomes(handles: Vec<ajaxflow_runtime::CallHandle>) -> Vec<CallOutcome> {
    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.outcome().await);
    }
    outcomes
}

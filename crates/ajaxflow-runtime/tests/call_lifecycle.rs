//! Call lifecycle: preconditions, request building, outcomes and
//! the guarantee that every started call releases its channel.

mod common;

use ajaxflow_event::{Payload, Topic};
use ajaxflow_runtime::transport::AJAX_LOCATION_HEADER;
use ajaxflow_runtime::{
    AjaxConfig, AjaxResponse, CallError, CallHooks, CallOutcome, HttpMethod, Parameter,
    TransportError,
};
use ajaxflow_types::ErrorCode;
use common::{component, envelope, Harness};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let read = Arc::clone(&count);
    (count, move || read.load(Ordering::SeqCst))
}

#[tokio::test(start_paused = true)]
async fn successful_call_publishes_lifecycle_in_order() {
    let h = Harness::new();
    h.transport.respond(
        "/panel",
        AjaxResponse::ok(envelope(&component("panel", r#"<div id="panel">new</div>"#))),
    );

    let handle = h.runtime.ajax(h.runtime.attributes("/panel").with_component("panel"));
    let id = handle.id();
    let outcome = handle.outcome().await;

    let CallOutcome::Completed { status, report } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(status, 200);
    assert_eq!(report.unwrap().replaced, ["panel"]);
    assert_eq!(h.text_of("panel").as_deref(), Some("new"));
    assert_eq!(
        h.events.for_call(id),
        [
            Topic::CallInit,
            Topic::CallAfter,
            Topic::CallBefore,
            Topic::CallBeforeSend,
            Topic::CallSuccess,
            Topic::CallComplete,
            Topic::CallDone,
        ]
    );
    assert_eq!(h.runtime.channels().channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn native_hooks_run_in_stage_order() {
    let h = Harness::new();
    h.transport.respond("/x", AjaxResponse::ok(envelope("")));

    let log = Arc::new(Mutex::new(Vec::new()));
    let push = |stage: &'static str| {
        let log = Arc::clone(&log);
        move |_: &ajaxflow_runtime::CallContext<'_>| log.lock().push(stage)
    };
    let on_success = {
        let log = Arc::clone(&log);
        move |_: &ajaxflow_runtime::CallContext<'_>, _: &AjaxResponse| log.lock().push("success")
    };
    let pre = {
        let log = Arc::clone(&log);
        move |_: &ajaxflow_runtime::CallContext<'_>| {
            log.lock().push("precondition");
            true
        }
    };
    let hooks = CallHooks::new()
        .precondition(pre)
        .before(push("before"))
        .on_success(on_success)
        .on_complete(push("complete"))
        .on_done(push("done"));

    assert!(h.runtime.ajax_with(h.runtime.attributes("/x"), hooks).outcome().await.is_completed());
    assert_eq!(
        *log.lock(),
        ["precondition", "before", "success", "complete", "done"]
    );
}

#[tokio::test(start_paused = true)]
async fn failing_precondition_cancels_without_side_effects() {
    let h = Harness::new();
    h.scripts.set_predicate("allowed()", false);
    let (failures, failed) = counter();

    let attrs = h
        .runtime
        .attributes("/never")
        .with_precondition_script("allowed()")
        .with_failure_script("onFail()");
    let handle = h.runtime.ajax_with(
        attrs,
        CallHooks::new().on_failure(move |_, _| {
            failures.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let id = handle.id();

    assert_eq!(handle.outcome().await, CallOutcome::Cancelled);
    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(failed(), 0);
    assert!(h.scripts.evaluated().is_empty());
    assert_eq!(h.events.for_call(id), [Topic::CallInit, Topic::CallPrecondition]);
    assert_eq!(h.runtime.channels().channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn absent_component_cancels_call() {
    let h = Harness::new();
    let handle = h.runtime.ajax(h.runtime.attributes("/x").with_component("ghost"));
    assert_eq!(handle.outcome().await, CallOutcome::Cancelled);

    let mut config = AjaxConfig::default();
    config.call.check_presence = false;
    let lenient = Harness::with_config(config);
    lenient.transport.respond("/x", AjaxResponse::ok(envelope("")));
    let handle = lenient
        .runtime
        .ajax(lenient.runtime.attributes("/x").with_component("ghost"));
    assert!(handle.outcome().await.is_completed());
}

#[tokio::test(start_paused = true)]
async fn predicate_error_counts_as_false() {
    let h = Harness::new();
    h.scripts.fail_on("broken()");
    let attrs = h.runtime.attributes("/x").with_precondition_script("broken()");
    assert_eq!(h.runtime.ajax(attrs).outcome().await, CallOutcome::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_runs_failure_path_and_releases_channel() {
    let h = Harness::new();
    h.transport
        .fail("/down", ms(10), TransportError::Connect("refused".into()))
        .respond("/next", AjaxResponse::ok(envelope("")));

    let (failures, failed) = counter();
    let (dones, done) = counter();
    let hooks = CallHooks::new()
        .on_failure(move |_, e| {
            assert_eq!(e.code(), "TRANSPORT_CONNECT");
            failures.fetch_add(1, Ordering::SeqCst);
        })
        .on_done(move |_| {
            dones.fetch_add(1, Ordering::SeqCst);
        });

    let attrs = h
        .runtime
        .attributes("/down")
        .with_failure_script("showError()");
    let down = h.runtime.ajax_with(attrs, hooks);
    let next = h.runtime.ajax(h.runtime.attributes("/next"));
    let down_id = down.id();

    assert!(matches!(
        down.outcome().await,
        CallOutcome::Failed(CallError::Transport(TransportError::Connect(_)))
    ));
    assert!(next.outcome().await.is_completed());
    assert_eq!((failed(), done()), (1, 1));
    assert_eq!(h.scripts.evaluated(), ["showError()"]);

    let failure = h
        .events
        .all()
        .into_iter()
        .find(|n| n.topic == Topic::CallFailure && n.call_id() == Some(down_id))
        .unwrap();
    let Payload::CallFailed { code, .. } = failure.payload else {
        panic!("unexpected payload {:?}", failure.payload);
    };
    assert_eq!(code, "TRANSPORT_CONNECT");
    assert_eq!(
        h.events.for_call(down_id),
        [
            Topic::CallInit,
            Topic::CallAfter,
            Topic::CallBefore,
            Topic::CallBeforeSend,
            Topic::CallFailure,
            Topic::CallComplete,
            Topic::CallDone,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn error_status_is_a_failure() {
    let h = Harness::new();
    h.transport
        .respond("/boom", AjaxResponse::with_status(500, "oops"));
    let outcome = h.runtime.ajax(h.runtime.attributes("/boom")).outcome().await;
    let error = outcome.error().unwrap();
    assert_eq!(error, &CallError::Status { status: 500 });
    assert!(error.is_recoverable());
    assert_eq!(h.text_of("panel").as_deref(), Some("old"));
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_call_and_frees_channel() {
    let h = Harness::new();
    h.transport
        .respond_after("/hang", ms(1_000), AjaxResponse::ok(envelope("")))
        .respond("/after", AjaxResponse::ok(envelope("")));

    let hung = h
        .runtime
        .ajax(h.runtime.attributes("/hang").with_timeout(ms(30)));
    let after = h.runtime.ajax(h.runtime.attributes("/after"));

    assert_eq!(
        hung.outcome().await,
        CallOutcome::Failed(CallError::Transport(TransportError::Timeout { after_ms: 30 }))
    );
    assert!(after.outcome().await.is_completed());
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_applies_by_default() {
    let mut config = AjaxConfig::default();
    config.call.request_timeout_ms = 20;
    let h = Harness::with_config(config);
    h.transport
        .respond_after("/hang", ms(500), AjaxResponse::ok(envelope("")));

    let outcome = h.runtime.ajax(h.runtime.attributes("/hang")).outcome().await;
    assert_eq!(outcome.error().map(ErrorCode::code), Some("TRANSPORT_TIMEOUT"));
}

#[tokio::test(start_paused = true)]
async fn malformed_envelope_is_a_failure() {
    let h = Harness::new();
    h.transport.respond("/bad", AjaxResponse::ok("<html>not an envelope</html>"));
    let outcome = h.runtime.ajax(h.runtime.attributes("/bad")).outcome().await;
    assert_eq!(outcome.error().map(ErrorCode::code), Some("ENVELOPE_MISSING_ROOT"));

    h.transport.respond("/broken", AjaxResponse::ok("<ajax-response><component"));
    let outcome = h.runtime.ajax(h.runtime.attributes("/broken")).outcome().await;
    assert_eq!(outcome.error().map(ErrorCode::code), Some("ENVELOPE_MALFORMED"));
    assert_eq!(h.runtime.channels().channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_component_is_reported_and_rest_applied() {
    let h = Harness::new();
    let body = envelope(&format!(
        "{}{}<evaluate>after()</evaluate>",
        component("ghost", r#"<div id="ghost">x</div>"#),
        component("panel", r#"<div id="panel">fresh</div>"#),
    ));
    h.transport.respond("/mixed", AjaxResponse::ok(body));

    let outcome = h.runtime.ajax(h.runtime.attributes("/mixed")).outcome().await;
    let CallOutcome::Completed { report: Some(report), .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(report.missing, ["ghost"]);
    assert_eq!(report.replaced, ["panel"]);
    assert_eq!(h.text_of("panel").as_deref(), Some("fresh"));
    assert_eq!(h.scripts.evaluated(), ["after()"]);
}

#[tokio::test(start_paused = true)]
async fn location_header_redirects_instead_of_processing() {
    let h = Harness::new();
    h.transport.respond(
        "/secure",
        AjaxResponse::ok(envelope(&component("panel", "<div id=\"panel\">no</div>")))
            .with_header(AJAX_LOCATION_HEADER, "/login"),
    );

    let outcome = h.runtime.ajax(h.runtime.attributes("/secure")).outcome().await;
    assert_eq!(
        outcome,
        CallOutcome::Completed {
            status: 200,
            report: None
        }
    );
    assert_eq!(h.scripts.redirects(), ["/login"]);
    assert_eq!(h.text_of("panel").as_deref(), Some("old"));
}

#[tokio::test(start_paused = true)]
async fn non_envelope_calls_skip_processing() {
    let h = Harness::new();
    h.transport.respond("/ping", AjaxResponse::ok("pong"));
    let attrs = h.runtime.attributes("/ping").expect_envelope(false);
    assert_eq!(
        h.runtime.ajax(attrs).outcome().await,
        CallOutcome::Completed {
            status: 200,
            report: None
        }
    );
}

#[tokio::test(start_paused = true)]
async fn get_parameters_go_in_the_query() {
    let h = Harness::new();
    h.transport.respond("/find", AjaxResponse::ok(envelope("")));

    let attrs = h
        .runtime
        .attributes("/find?page=1#top")
        .with_form("search")
        .with_parameter("sort", "name asc");
    h.runtime.ajax(attrs).outcome().await;

    let request = &h.transport.requests()[0];
    assert_eq!(request.url, "/find?page=1&sort=name+asc&q=rust&all=on#top");
    assert_eq!(request.method, HttpMethod::Get);
    assert!(request.form_body().is_none());
    assert_eq!(request.header("ajax-request"), Some("true"));
}

#[tokio::test(start_paused = true)]
async fn post_parameters_go_in_the_body() {
    let mut config = AjaxConfig::default();
    config.base_url = Some("http://localhost:8080/app/".into());
    let h = Harness::with_config(config);
    h.transport.respond("/save", AjaxResponse::ok(envelope("")));

    let attrs = h
        .runtime
        .attributes("/save")
        .with_method(HttpMethod::Post)
        .with_form("search");
    h.runtime.ajax(attrs).outcome().await;

    let request = &h.transport.requests()[0];
    assert_eq!(request.url, "/save");
    assert_eq!(
        request.form_body().unwrap(),
        [Parameter::new("q", "rust"), Parameter::new("all", "on")]
    );
    assert_eq!(request.header("Ajax-Base-Url"), Some("http://localhost:8080/app/"));
}

#[tokio::test(start_paused = true)]
async fn dependencies_read_the_document_at_fire_time() {
    let h = Harness::new();
    h.transport
        .respond_after("/first", ms(20), AjaxResponse::ok(envelope("")))
        .respond("/second", AjaxResponse::ok(envelope("")));
    h.scripts
        .provide_parameters("extra()", vec![Parameter::new("from", "script")]);

    let first = h.runtime.ajax(h.runtime.attributes("/first"));
    let hooks = CallHooks::new().dependency(|ctx| {
        let doc = ctx.document().lock();
        let text = doc
            .element_by_id("panel")
            .map(|n| doc.text_content(n))
            .unwrap_or_default();
        vec![Parameter::new("panel", text)]
    });
    let mut attrs = h.runtime.attributes("/second");
    attrs.dependencies.push("extra()".into());
    let second = h.runtime.ajax_with(attrs, hooks);

    h.runtime
        .process(&envelope(&component("panel", r#"<div id="panel">edited</div>"#)))
        .unwrap();
    first.outcome().await;
    second.outcome().await;

    let request = &h.transport.requests()[1];
    assert_eq!(request.param("panel"), Some("edited"));
    assert_eq!(request.param("from"), Some("script"));
}

#[tokio::test(start_paused = true)]
async fn url_builder_supplies_missing_url() {
    let h = Harness::new();
    h.transport.respond("/built", AjaxResponse::ok(envelope("")));
    let hooks = CallHooks::new().url_builder(|ctx| format!("/built?call={}", ctx.call_id()));
    let outcome = h.runtime.ajax_with(h.runtime.attributes(""), hooks).outcome().await;
    assert!(outcome.is_completed());
    assert!(h.transport.urls()[0].starts_with("/built?call="));

    let outcome = h.runtime.ajax(h.runtime.attributes(" ")).outcome().await;
    assert_eq!(outcome.error().map(ErrorCode::code), Some("ATTR_MISSING_URL"));
}

#[tokio::test(start_paused = true)]
async fn script_handlers_from_attribute_json() {
    let h = Harness::new();
    h.transport.respond("/j", AjaxResponse::ok(envelope("<evaluate>body()</evaluate>")));

    let attrs = h
        .runtime
        .attributes_from_json(
            r#"{"u":"/j","bh":"before()","sh":["ok()"],"coh":"complete()","dh":"bye()"}"#,
        )
        .unwrap();
    assert!(h.runtime.ajax(attrs).outcome().await.is_completed());
    assert_eq!(
        h.scripts.evaluated(),
        ["before()", "body()", "ok()", "complete()", "bye()"]
    );
}

#[test]
fn call_without_async_runtime_fails_and_releases() {
    let h = Harness::new();
    let mut handle = h.runtime.ajax(h.runtime.attributes("/x"));
    assert_eq!(
        handle.try_outcome(),
        Some(CallOutcome::Failed(CallError::NoRuntime))
    );
    assert_eq!(h.runtime.channels().channel_count(), 0);
}

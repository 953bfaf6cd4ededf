//! Test doubles for the runtime seams.
//!
//! - [`MockTransport`]: scripted responses with simulated latency
//! - [`RecordingScriptHost`]: records every script it is handed
//! - [`NotificationRecorder`]: captures everything published on a bus

use crate::call::{Notify, Parameter};
use crate::events::EventBus;
use crate::script::{ScriptContext, ScriptError, ScriptHost};
use crate::transport::{AjaxRequest, AjaxResponse, Transport, TransportError};
use ajaxflow_event::{Notification, Topic};
use ajaxflow_types::CallId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Scripted {
    latency: Duration,
    result: Result<AjaxResponse, TransportError>,
}

/// Transport answering from a script.
///
/// Responses are routed by URL without its query string. Each route is
/// a queue; the last entry stays in place once the others are used up.
/// Unrouted requests take the next entry of the fallback queue, then
/// fail with [`TransportError::Connect`].
///
/// Latency is simulated with `tokio::time::sleep`, so paused-clock
/// tests advance it deterministically.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fallback: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<AjaxRequest>>,
}

impl MockTransport {
    /// Transport with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `url` with `response` immediately.
    pub fn respond(&self, url: &str, response: AjaxResponse) -> &Self {
        self.respond_after(url, Duration::ZERO, response)
    }

    /// Answers `url` with `response` after `latency`.
    pub fn respond_after(&self, url: &str, latency: Duration, response: AjaxResponse) -> &Self {
        self.route(url, latency, Ok(response))
    }

    /// Fails `url` with `error` after `latency`.
    pub fn fail(&self, url: &str, latency: Duration, error: TransportError) -> &Self {
        self.route(url, latency, Err(error))
    }

    /// Queues an answer for the next unrouted request.
    pub fn push(&self, latency: Duration, response: AjaxResponse) -> &Self {
        self.fallback.lock().push_back(Scripted {
            latency,
            result: Ok(response),
        });
        self
    }

    fn route(
        &self,
        url: &str,
        latency: Duration,
        result: Result<AjaxResponse, TransportError>,
    ) -> &Self {
        self.routes
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(Scripted { latency, result });
        self
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<AjaxRequest> {
        self.requests.lock().clone()
    }

    /// URLs received so far, in arrival order.
    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_for(&self, url: &str) -> Option<Scripted> {
        let path = url.split_once('?').map_or(url, |(p, _)| p);
        let mut routes = self.routes.lock();
        if let Some(queue) = routes.get_mut(path) {
            return if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
        }
        drop(routes);
        self.fallback.lock().pop_front()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: AjaxRequest) -> Result<AjaxResponse, TransportError> {
        let scripted = self.next_for(&request.url);
        let url = request.url.clone();
        self.requests.lock().push(request);

        let Some(scripted) = scripted else {
            return Err(TransportError::Connect(format!("no scripted response for {url}")));
        };
        if !scripted.latency.is_zero() {
            tokio::time::sleep(scripted.latency).await;
        }
        scripted.result
    }
}

type EvalHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Script host that records instead of running.
#[derive(Default)]
pub struct RecordingScriptHost {
    evaluated: Mutex<Vec<String>>,
    hook: Mutex<Option<EvalHook>>,
    failing: Mutex<HashSet<String>>,
    hold: AtomicBool,
    held: Mutex<Vec<Notify>>,
    redirects: Mutex<Vec<String>>,
    predicates: Mutex<HashMap<String, bool>>,
    parameters: Mutex<HashMap<String, Vec<Parameter>>>,
}

impl RecordingScriptHost {
    /// Host that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts evaluated so far, in order. Suspending scripts appear as
    /// their body.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().clone()
    }

    /// Runs `hook` with every evaluated script, after recording it.
    pub fn on_evaluate(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    /// Makes `script` fail when evaluated or used as a predicate.
    pub fn fail_on(&self, script: &str) {
        self.failing.lock().insert(script.to_string());
    }

    /// Keeps suspend locks held until [`Self::release_all`].
    pub fn hold_suspended(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    /// Releases every held suspend lock. Returns how many there were.
    pub fn release_all(&self) -> usize {
        let held: Vec<Notify> = self.held.lock().drain(..).collect();
        for notify in &held {
            notify.notify();
        }
        held.len()
    }

    /// Suspend locks currently held.
    pub fn held(&self) -> usize {
        self.held.lock().len()
    }

    /// Redirect targets, in order.
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }

    /// Result of the script predicate `script`. Unset predicates pass.
    pub fn set_predicate(&self, script: &str, result: bool) {
        self.predicates.lock().insert(script.to_string(), result);
    }

    /// Parameters the dependency script `script` contributes.
    pub fn provide_parameters(&self, script: &str, params: Vec<Parameter>) {
        self.parameters.lock().insert(script.to_string(), params);
    }

    fn record(&self, script: &str) -> Result<(), ScriptError> {
        self.evaluated.lock().push(script.to_string());
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(script);
        }
        if self.failing.lock().contains(script) {
            return Err(ScriptError::failed(format!("{script} raised")));
        }
        Ok(())
    }
}

impl ScriptHost for RecordingScriptHost {
    fn evaluate(&self, script: &str, _ctx: &ScriptContext<'_>) -> Result<(), ScriptError> {
        self.record(script)
    }

    fn evaluate_suspended(
        &self,
        _identifier: &str,
        body: &str,
        notify: Notify,
        _ctx: &ScriptContext<'_>,
    ) -> Result<(), ScriptError> {
        let result = self.record(body);
        if self.hold.load(Ordering::SeqCst) {
            self.held.lock().push(notify);
        } else {
            notify.notify();
        }
        result
    }

    fn predicate(&self, script: &str, _ctx: &ScriptContext<'_>) -> Result<bool, ScriptError> {
        if self.failing.lock().contains(script) {
            return Err(ScriptError::failed(format!("{script} raised")));
        }
        Ok(self.predicates.lock().get(script).copied().unwrap_or(true))
    }

    fn parameters(
        &self,
        script: &str,
        _ctx: &ScriptContext<'_>,
    ) -> Result<Vec<Parameter>, ScriptError> {
        if self.failing.lock().contains(script) {
            return Err(ScriptError::failed(format!("{script} raised")));
        }
        Ok(self.parameters.lock().get(script).cloned().unwrap_or_default())
    }

    fn redirect(&self, url: &str) {
        self.redirects.lock().push(url.to_string());
    }
}

impl std::fmt::Debug for RecordingScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingScriptHost")
            .field("evaluated", &self.evaluated.lock().len())
            .field("held", &self.held.lock().len())
            .finish_non_exhaustive()
    }
}

/// Captures every notification published on a bus.
#[derive(Debug, Clone, Default)]
pub struct NotificationRecorder {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationRecorder {
    /// Subscribes to every topic of `bus`.
    pub fn attach(bus: &EventBus) -> Self {
        let recorder = Self::default();
        let seen = Arc::clone(&recorder.seen);
        bus.subscribe_all(move |n| seen.lock().push(n.clone()));
        recorder
    }

    /// Everything captured, in publish order.
    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    /// Captured topics, in publish order.
    pub fn topics(&self) -> Vec<Topic> {
        self.seen.lock().iter().map(|n| n.topic.clone()).collect()
    }

    /// Topics published for one call, in order.
    pub fn for_call(&self, call_id: CallId) -> Vec<Topic> {
        self.seen
            .lock()
            .iter()
            .filter(|n| n.call_id() == Some(call_id))
            .map(|n| n.topic.clone())
            .collect()
    }

    /// Call ids in the order `topic` was published for them.
    pub fn calls_on(&self, topic: &Topic) -> Vec<CallId> {
        self.seen
            .lock()
            .iter()
            .filter(|n| &n.topic == topic)
            .filter_map(Notification::call_id)
            .collect()
    }

    /// Number captured.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Forgets everything captured so far.
    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

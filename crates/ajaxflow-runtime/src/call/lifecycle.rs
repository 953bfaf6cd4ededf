//! One call from creation to channel release.
//!
//! ```text
//!  launch ──► init ──► preconditions ─✗─► precondition ──► Cancelled
//!                           │ ✓
//!                           ▼
//!              [throttle] ─► ChannelManager::schedule ──► after
//!                                      │ (grant)
//!                                      ▼
//!   before ─► beforeSend ─► Transport::send ─► success | failure ─► complete
//!                                                                     │
//!                              done ◄── suspend locks released ◄──────┘
//!                               │
//!                               ▼
//!                      ChannelManager::done
//! ```
//!
//! Every path out of a granted call goes through [`ChannelRelease`], so
//! the channel is released exactly once even when the task is dropped
//! or panics.

use super::{
    AttributeError, CallAttributes, CallContext, CallError, CallHooks, CallOutcome, HttpMethod,
    Parameter, Suspender,
};
use crate::channel::{DiscardReason, PendingEntry};
use crate::response::ProcessReport;
use crate::runtime::RuntimeShared;
use crate::transport::{
    AjaxRequest, AjaxResponse, TransportError, TransportKind, AJAX_BASE_URL_HEADER,
    AJAX_REQUEST_HEADER,
};
use ajaxflow_dom::Document;
use ajaxflow_event::{CallSummary, Notification, Topic};
use ajaxflow_types::{CallId, ChannelSpec, ErrorCode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};
use url::form_urlencoded;

/// Caller's view of a launched call.
///
/// The outcome always arrives, whatever path the call takes.
#[derive(Debug)]
pub struct CallHandle {
    id: CallId,
    rx: oneshot::Receiver<CallOutcome>,
}

impl CallHandle {
    /// The call's id.
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Waits for the outcome.
    pub async fn outcome(self) -> CallOutcome {
        self.rx.await.unwrap_or(CallOutcome::Aborted)
    }

    /// The outcome if it is already known.
    pub fn try_outcome(&mut self) -> Option<CallOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(CallOutcome::Aborted),
        }
    }
}

/// Single-use sender shared by the run and discard paths.
#[derive(Clone)]
struct OutcomeSlot(Arc<Mutex<Option<oneshot::Sender<CallOutcome>>>>);

impl OutcomeSlot {
    fn new(tx: oneshot::Sender<CallOutcome>) -> Self {
        Self(Arc::new(Mutex::new(Some(tx))))
    }

    fn resolve(&self, outcome: CallOutcome) {
        if let Some(tx) = self.0.lock().take() {
            // the caller may have dropped its handle
            let _ = tx.send(outcome);
        }
    }
}

/// Releases the channel once, on [`ChannelRelease::release`] or on drop.
struct ChannelRelease {
    shared: Arc<RuntimeShared>,
    spec: ChannelSpec,
    call_id: CallId,
    released: bool,
}

impl ChannelRelease {
    fn new(shared: Arc<RuntimeShared>, spec: ChannelSpec, call_id: CallId) -> Self {
        Self {
            shared,
            spec,
            call_id,
            released: false,
        }
    }

    fn release(mut self) {
        self.released = true;
        trace!(call = %self.call_id, channel = %self.spec, "Releasing channel");
        self.shared.channels.done(&self.spec);
    }
}

impl Drop for ChannelRelease {
    fn drop(&mut self) {
        if !self.released {
            warn!(call = %self.call_id, channel = %self.spec, "Call ended abnormally, releasing channel");
            self.shared.channels.done(&self.spec);
        }
    }
}

/// A throttled entry; dropped unrun means a newer registration won.
struct Coalesced(Option<PendingEntry>);

impl Coalesced {
    fn take(&mut self) -> Option<PendingEntry> {
        self.0.take()
    }
}

impl Drop for Coalesced {
    fn drop(&mut self) {
        if let Some(entry) = self.0.take() {
            entry.discard(DiscardReason::Superseded);
        }
    }
}

pub(crate) struct AjaxCall {
    shared: Arc<RuntimeShared>,
    summary: CallSummary,
    attributes: CallAttributes,
    hooks: CallHooks,
    suspender: Suspender,
}

/// Creates a call and hands it to its channel.
pub(crate) fn launch(
    shared: &Arc<RuntimeShared>,
    attributes: CallAttributes,
    hooks: CallHooks,
) -> CallHandle {
    let attributes = attributes.normalize();
    let call_id = CallId::new();
    let (tx, rx) = oneshot::channel();
    let handle = CallHandle { id: call_id, rx };
    let slot = OutcomeSlot::new(tx);

    match attributes.validate() {
        Err(AttributeError::MissingUrl) if hooks.has_url_builder() => {}
        Err(e) => {
            error!(call = %call_id, code = e.code(), error = %e, "Invalid call attributes");
            slot.resolve(CallOutcome::Failed(e.into()));
            return handle;
        }
        Ok(()) => {}
    }

    let call = Arc::new(AjaxCall {
        shared: Arc::clone(shared),
        summary: CallSummary {
            call_id,
            url: attributes.url.clone(),
            channel: attributes.channel.clone(),
            component_id: attributes.component_id.clone(),
        },
        attributes,
        hooks,
        suspender: Suspender::new(call_id),
    });

    call.publish(Topic::CallInit);
    if !call.preconditions_pass() {
        info!(call = %call_id, url = %call.summary.url, "Precondition failed, call cancelled");
        call.publish(Topic::CallPrecondition);
        slot.resolve(CallOutcome::Cancelled);
        return handle;
    }

    let spec = call.attributes.channel.clone();
    let throttle = call.attributes.throttle.clone();
    let entry = Arc::clone(&call).into_entry(slot);

    match throttle {
        Some(tr) => {
            let delay = if tr.delay_ms == 0 {
                Duration::from_millis(shared.config.throttle.default_delay_ms)
            } else {
                tr.delay()
            };
            let throttler = if tr.postpone {
                &shared.postponer
            } else {
                &shared.throttler
            };
            debug!(call = %call_id, token = %tr.id, ?delay, postpone = tr.postpone, "Throttling call");
            let target = Arc::clone(shared);
            let mut pending = Coalesced(Some(entry));
            throttler.throttle(&tr.id, delay, move || {
                if let Some(entry) = pending.take() {
                    target.channels.schedule(&spec, entry);
                }
            });
        }
        None => {
            let outcome = shared.channels.schedule(&spec, entry);
            trace!(call = %call_id, ?outcome, "Call scheduled");
        }
    }

    call.publish(Topic::CallAfter);
    handle
}

impl AjaxCall {
    fn context(&self) -> CallContext<'_> {
        CallContext {
            summary: &self.summary,
            attributes: &self.attributes,
            document: &self.shared.document,
            suspender: &self.suspender,
        }
    }

    fn publish(&self, topic: Topic) {
        self.shared
            .bus
            .publish(&Notification::call(topic, self.summary.clone()));
    }

    fn preconditions_pass(&self) -> bool {
        if self.shared.config.call.check_presence {
            let doc = self.shared.document.lock();
            let declared = [
                ("component", self.attributes.component_id.as_deref()),
                ("form", self.attributes.form_id.as_deref()),
            ];
            for (kind, id) in declared {
                if let Some(id) = id {
                    if doc.element_by_id(id).is_none() {
                        debug!(call = %self.summary.call_id, kind, id, "Element not in document");
                        return false;
                    }
                }
            }
        }

        let ctx = self.context();
        if !self.hooks.preconditions.iter().all(|pre| pre(&ctx)) {
            return false;
        }

        let sctx = ctx.script_context();
        self.attributes.preconditions.iter().all(|script| {
            self.shared
                .scripts
                .predicate(script, &sctx)
                .unwrap_or_else(|e| {
                    warn!(call = %self.summary.call_id, error = %e, "Precondition script failed");
                    false
                })
        })
    }

    fn into_entry(self: Arc<Self>, slot: OutcomeSlot) -> PendingEntry {
        let call_id = self.summary.call_id;
        let discard_slot = slot.clone();

        PendingEntry::new(move || {
            let Ok(runtime) = Handle::try_current() else {
                error!(call = %call_id, "No async runtime, failing call");
                self.shared.channels.done(&self.attributes.channel);
                slot.resolve(CallOutcome::Failed(CallError::NoRuntime));
                return;
            };
            let release = ChannelRelease::new(
                Arc::clone(&self.shared),
                self.attributes.channel.clone(),
                call_id,
            );
            runtime.spawn(async move {
                let outcome = self.execute(release).await;
                slot.resolve(outcome);
            });
        })
        .on_discard(move |reason| {
            debug!(call = %call_id, %reason, "Call discarded before running");
            discard_slot.resolve(match reason {
                DiscardReason::Superseded => CallOutcome::Superseded,
                DiscardReason::Ignored => CallOutcome::Ignored,
                DiscardReason::Shutdown => CallOutcome::Aborted,
            });
        })
    }

    async fn execute(self: Arc<Self>, release: ChannelRelease) -> CallOutcome {
        let call_id = self.summary.call_id;
        let ctx = self.context();

        for before in &self.hooks.before {
            before(&ctx);
        }
        self.run_scripts(&self.attributes.before_handlers, "before", &ctx);
        self.publish(Topic::CallBefore);

        let request = self.build_request(&ctx);
        self.publish(Topic::CallBeforeSend);
        debug!(call = %call_id, method = %request.method, url = %request.url, "Call fired");

        let outcome = match self.send(request).await {
            Ok(response) => match self.handle_response(&response) {
                Ok(report) => {
                    for success in &self.hooks.success {
                        success(&ctx, &response);
                    }
                    self.run_scripts(&self.attributes.success_handlers, "success", &ctx);
                    self.publish(Topic::CallSuccess);
                    CallOutcome::Completed {
                        status: response.status,
                        report,
                    }
                }
                Err(e) => self.fail(e, &ctx),
            },
            Err(e) => self.fail(e, &ctx),
        };

        for complete in &self.hooks.complete {
            complete(&ctx);
        }
        self.run_scripts(&self.attributes.complete_handlers, "complete", &ctx);
        self.publish(Topic::CallComplete);

        let outstanding = self.suspender.outstanding();
        if outstanding > 0 {
            debug!(call = %call_id, outstanding, "Waiting for suspend locks");
        }
        self.suspender.wait_released().await;

        for done in &self.hooks.done {
            done(&ctx);
        }
        self.run_scripts(&self.attributes.done_handlers, "done", &ctx);
        self.publish(Topic::CallDone);

        release.release();
        outcome
    }

    fn fail(&self, error: CallError, ctx: &CallContext<'_>) -> CallOutcome {
        warn!(
            call = %self.summary.call_id,
            url = %self.summary.url,
            code = error.code(),
            error = %error,
            "Call failed"
        );
        for failure in &self.hooks.failure {
            failure(ctx, &error);
        }
        self.run_scripts(&self.attributes.failure_handlers, "failure", ctx);
        self.shared.bus.publish(&Notification::call_failed(
            self.summary.clone(),
            error.code(),
            error.to_string(),
        ));
        CallOutcome::Failed(error)
    }

    fn run_scripts(&self, scripts: &[String], stage: &str, ctx: &CallContext<'_>) {
        let sctx = ctx.script_context();
        for script in scripts {
            if let Err(e) = self.shared.scripts.evaluate(script, &sctx) {
                warn!(call = %self.summary.call_id, stage, error = %e, "Handler script failed");
            }
        }
    }

    fn build_request(&self, ctx: &CallContext<'_>) -> AjaxRequest {
        let mut params = self.attributes.extra_parameters.clone();
        if let Some(ref form_id) = self.attributes.form_id {
            let doc = self.shared.document.lock();
            params.extend(form_parameters(&doc, form_id));
        }
        for dependency in &self.hooks.dependencies {
            params.extend(dependency(ctx));
        }
        let sctx = ctx.script_context();
        for script in &self.attributes.dependencies {
            match self.shared.scripts.parameters(script, &sctx) {
                Ok(extra) => params.extend(extra),
                Err(e) => warn!(call = %self.summary.call_id, error = %e, "Dependency script failed"),
            }
        }

        let mut url = match self.hooks.url_builder {
            Some(ref build) => build(ctx),
            None => self.attributes.url.clone(),
        };
        if self.attributes.method == HttpMethod::Get && !params.is_empty() {
            url = append_query(&url, &params);
        }

        let mut headers = vec![(AJAX_REQUEST_HEADER.to_string(), "true".to_string())];
        if let Some(ref base) = self.shared.config.base_url {
            headers.push((AJAX_BASE_URL_HEADER.to_string(), base.clone()));
        }

        AjaxRequest {
            call_id: self.summary.call_id,
            url,
            method: self.attributes.method,
            params,
            headers,
            kind: if self.attributes.multipart {
                TransportKind::Iframe
            } else {
                TransportKind::Xhr
            },
            timeout: self
                .attributes
                .request_timeout()
                .or_else(|| self.shared.config.call.request_timeout()),
        }
    }

    async fn send(&self, request: AjaxRequest) -> Result<AjaxResponse, CallError> {
        let limit = request.timeout;
        let pending = self.shared.transport.send(request);
        let response = match limit {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| TransportError::Timeout {
                    after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => pending.await,
        };
        Ok(response?)
    }

    fn handle_response(&self, response: &AjaxResponse) -> Result<Option<ProcessReport>, CallError> {
        if !response.is_success() {
            return Err(CallError::Status {
                status: response.status,
            });
        }
        if let Some(location) = response.redirect_location() {
            info!(call = %self.summary.call_id, location, "Server requested redirect");
            self.shared.scripts.redirect(location);
            return Ok(None);
        }
        if !self.attributes.ajax_response {
            return Ok(None);
        }
        let report = self.shared.processor.process(
            &response.body,
            Some(&self.summary),
            Some(&self.suspender),
        )?;
        Ok(Some(report))
    }
}

/// Appends `params` to `url`'s query, keeping any fragment last.
fn append_query(url: &str, params: &[Parameter]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|p| (p.name.as_str(), p.value.as_str())))
        .finish();
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let separator = match base.find('?') {
        None => "?",
        Some(_) if base.ends_with('?') || base.ends_with('&') => "",
        Some(_) => "&",
    };
    match fragment {
        Some(fragment) => format!("{base}{separator}{query}#{fragment}"),
        None => format!("{base}{separator}{query}"),
    }
}

/// Successful controls of the form with `form_id`.
fn form_parameters(doc: &Document, form_id: &str) -> Vec<Parameter> {
    let Some(form) = doc.element_by_id(form_id) else {
        return Vec::new();
    };

    let mut params = Vec::new();
    for node in doc.descendants(form) {
        let Some(element) = doc.element(node) else {
            continue;
        };
        let Some(name) = element.attr("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        if element.attr("disabled").is_some() {
            continue;
        }
        match element.tag.as_str() {
            "input" => {
                let kind = element.attr("type").unwrap_or("text").to_ascii_lowercase();
                let checkable = kind == "checkbox" || kind == "radio";
                if matches!(kind.as_str(), "submit" | "button" | "reset" | "image" | "file")
                    || (checkable && element.attr("checked").is_none())
                {
                    continue;
                }
                let fallback = if checkable { "on" } else { "" };
                params.push(Parameter::new(name, element.attr("value").unwrap_or(fallback)));
            }
            "textarea" => params.push(Parameter::new(name, doc.text_content(node))),
            "select" => {
                let options = doc.elements_by_tag(node, "option");
                let selected: Vec<_> = options
                    .iter()
                    .copied()
                    .filter(|&o| doc.attr(o, "selected").is_some())
                    .collect();
                let chosen = if selected.is_empty() {
                    options.first().copied().into_iter().collect()
                } else {
                    selected
                };
                for option in chosen {
                    let value = doc
                        .attr(option, "value")
                        .map_or_else(|| doc.text_content(option), str::to_string);
                    params.push(Parameter::new(name, value));
                }
            }
            _ => {}
        }
    }
    params
}

//! Envelope application.
//!
//! ```text
//!   raw body ──► Envelope::parse ──► processing_order()
//!                                          │
//!        ┌──────────────┬─────────────────┼───────────────┬────────────┐
//!        ▼              ▼                 ▼               ▼            ▼
//!   priority-eval   component        header-contrib    evaluate     redirect
//!        │          removing/replace/     │               │            │
//!        │          added                 │               │            │
//!        └──────► ScriptHost ◄────────────┴───────────────┘      ScriptHost::redirect
//! ```
//!
//! Directives are applied one by one. A directive that fails is logged
//! and recorded in the [`ProcessReport`]; the rest still run. The
//! document lock is never held while publishing or calling the script
//! host, so subscribers and scripts may read the document freely.

use super::envelope::{Directive, Envelope, EnvelopeError};
use super::evaluate::{split_evaluate, EvalScript};
use super::head::{HeadContributor, HeadReport};
use crate::call::Suspender;
use crate::events::EventBus;
use crate::script::{ScriptContext, ScriptHost};
use ajaxflow_dom::{Document, DomPatch, Fragment, NodeId, SharedDocument};
use ajaxflow_event::{CallSummary, NodeSnapshot, Notification};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// What one envelope did to the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Component ids that were replaced (or removed by empty markup).
    pub replaced: Vec<String>,
    /// Component ids with no matching element.
    pub missing: Vec<String>,
    /// Scripts handed to the host (evaluate and priority-evaluate).
    pub evaluated: usize,
    /// Scripts or markup fragments that failed.
    pub errors: Vec<String>,
    /// Head merge statistics.
    pub head: HeadReport,
    /// Redirect target, if the envelope asked for one.
    pub redirect: Option<String>,
    /// New document title, when a `<title>` was targeted.
    pub title: Option<String>,
}

impl ProcessReport {
    /// Whether every directive applied cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.errors.is_empty() && self.head.script_errors == 0
    }
}

/// Applies envelopes to a shared document.
pub struct ResponseProcessor {
    document: SharedDocument,
    bus: Arc<EventBus>,
    scripts: Arc<dyn ScriptHost>,
    head: HeadContributor,
}

impl ResponseProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(document: SharedDocument, bus: Arc<EventBus>, scripts: Arc<dyn ScriptHost>) -> Self {
        Self {
            document,
            bus,
            scripts,
            head: HeadContributor::default(),
        }
    }

    /// Replaces the head contributor.
    #[must_use]
    pub fn with_head(mut self, head: HeadContributor) -> Self {
        self.head = head;
        self
    }

    /// The document being patched.
    #[must_use]
    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    /// Parses and applies `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when `raw` is not an envelope. Nothing
    /// is applied in that case.
    pub fn process(
        &self,
        raw: &str,
        call: Option<&CallSummary>,
        suspender: Option<&Suspender>,
    ) -> Result<ProcessReport, EnvelopeError> {
        let envelope = Envelope::parse(raw)?;
        Ok(self.apply(&envelope, call, suspender))
    }

    /// Applies a parsed envelope.
    ///
    /// Suspending `evaluate` segments take their locks from `suspender`;
    /// outside a call they get a detached one nobody waits on.
    pub fn apply(
        &self,
        envelope: &Envelope,
        call: Option<&CallSummary>,
        suspender: Option<&Suspender>,
    ) -> ProcessReport {
        let detached;
        let suspender = match suspender {
            Some(s) => s,
            None => {
                detached = Suspender::detached();
                &detached
            }
        };
        let ctx = ScriptContext {
            call,
            document: &self.document,
            suspender: Some(suspender),
        };

        let mut report = ProcessReport::default();
        for directive in envelope.processing_order() {
            trace!(kind = directive.kind(), "Applying directive");
            match directive {
                Directive::Component { id, markup } => self.replace_component(id, markup, &mut report),
                Directive::PriorityEvaluate { script } | Directive::Evaluate { script } => {
                    self.evaluate(script, suspender, &ctx, &mut report);
                }
                Directive::HeaderContribution { markup } => {
                    let head = self.head.contribute(markup, self.scripts.as_ref(), &ctx);
                    report.head.absorb(&head);
                }
                Directive::Redirect { url } => {
                    info!(url = %url, "Envelope requested redirect");
                    report.redirect = Some(url.clone());
                    self.scripts.redirect(url);
                }
            }
        }

        debug!(
            replaced = report.replaced.len(),
            missing = report.missing.len(),
            evaluated = report.evaluated,
            errors = report.errors.len(),
            "Envelope applied"
        );
        report
    }

    fn replace_component(&self, id: &str, markup: &str, report: &mut ProcessReport) {
        let fragment = match Fragment::parse_html(markup) {
            Ok(f) => f,
            Err(e) => {
                error!(component = %id, error = %e, "Component markup is malformed");
                report.errors.push(format!("component {id}: {e}"));
                return;
            }
        };

        let (removing, is_title) = {
            let doc = self.document.lock();
            let Some(target) = doc.element_by_id(id) else {
                error!(
                    component = %id,
                    reason = "not found, ensure markup-id output is enabled",
                    "Component cannot be replaced"
                );
                report.missing.push(id.to_string());
                return;
            };
            (snapshot(&doc, target), doc.tag(target) == Some("title"))
        };

        self.bus.publish(&Notification::node_removing(removing));

        if is_title {
            self.update_title(id, &fragment, report);
            return;
        }

        // a subscriber may have touched the tree, so look the target up again
        let added = {
            let mut doc = self.document.lock();
            let Some(target) = doc.element_by_id(id) else {
                warn!(component = %id, "Component vanished during removal notification");
                report.missing.push(id.to_string());
                return;
            };
            if let Err(e) = doc.apply(DomPatch::Replace { target, fragment }) {
                error!(component = %id, error = %e, "Component replacement failed");
                report.errors.push(format!("component {id}: {e}"));
                return;
            }
            report.replaced.push(id.to_string());
            doc.element_by_id(id).map(|node| snapshot(&doc, node))
        };

        match added {
            Some(node) => self.bus.publish(&Notification::node_added(node)),
            None => trace!(component = %id, "Component removed, no replacement element"),
        }
    }

    /// The title element keeps its node; only its text changes.
    fn update_title(&self, id: &str, fragment: &Fragment, report: &mut ProcessReport) {
        let text = fragment
            .elements()
            .next()
            .map(|el| el.text())
            .unwrap_or_default();
        let mut doc = self.document.lock();
        let Some(target) = doc.element_by_id(id) else {
            warn!(component = %id, "Title vanished during removal notification");
            report.missing.push(id.to_string());
            return;
        };
        if let Err(e) = doc.apply(DomPatch::SetText {
            target,
            text: text.clone(),
        }) {
            warn!(component = %id, error = %e, "Cannot update title");
            report.errors.push(format!("title {id}: {e}"));
            return;
        }
        debug!(title = %text, "Title updated");
        report.title = Some(text);
        report.replaced.push(id.to_string());
    }

    fn evaluate(
        &self,
        text: &str,
        suspender: &Suspender,
        ctx: &ScriptContext<'_>,
        report: &mut ProcessReport,
    ) {
        for script in split_evaluate(text) {
            report.evaluated += 1;
            let result = match script {
                EvalScript::Plain(ref body) => self.scripts.evaluate(body, ctx),
                EvalScript::Suspending {
                    ref identifier,
                    ref body,
                } => {
                    let notify = suspender.suspend();
                    self.scripts.evaluate_suspended(identifier, body, notify, ctx)
                }
            };
            if let Err(e) = result {
                error!(error = %e, "Evaluated script failed");
                report.errors.push(e.to_string());
            }
        }
    }
}

impl std::fmt::Debug for ResponseProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseProcessor")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Owned snapshot of `node` for a notification.
#[must_use]
pub fn snapshot(doc: &Document, node: NodeId) -> NodeSnapshot {
    NodeSnapshot {
        element_id: doc.attr(node, "id").map(str::to_string),
        tag: doc.tag(node).unwrap_or_default().to_string(),
        markup: doc.outer_html(node),
    }
}

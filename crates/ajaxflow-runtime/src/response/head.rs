//! Head contribution merging.
//!
//! A `header-contribution` is parsed into a list of steps first, then
//! the steps are flushed in order against the live document. Each step
//! re-reads the document, so an earlier step's mutation is visible to
//! the next one.
//!
//! # Rules
//!
//! | Element | Existing match | Action |
//! |---------|----------------|--------|
//! | `<script src>` | same normalized `src` anywhere | skip |
//! | `<script src>` | same `id`, different `src` | remove old, append new |
//! | `<link href>` | same normalized `href` in head | skip |
//! | `<link href>` | same `id`, different `href` | remove old, append new |
//! | inline `<script>` | element with same `id` | skip |
//! | inline `<script id>` | none | append to head, evaluate |
//! | inline `<script>` (no id) | none | evaluate only |
//! | `<style>` | element with same `id` | skip |
//! | `<meta name>` | `meta` with same `name` | remove old, append new |
//! | comment | | append |
//!
//! Normalized means with any `;jsessionid=...` path parameter removed.

use crate::script::{ScriptContext, ScriptHost};
use ajaxflow_dom::{Document, DomPatch, Fragment, MarkupElement, MarkupNode, NodeId};
use tracing::{debug, error, trace, warn};

/// Outcome of one contribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadReport {
    /// Elements appended to the head.
    pub added: usize,
    /// Existing elements removed in favour of a new one.
    pub replaced: usize,
    /// Elements skipped as already present.
    pub skipped: usize,
    /// Inline scripts handed to the script host.
    pub evaluated: usize,
    /// Inline scripts that failed.
    pub script_errors: usize,
}

impl HeadReport {
    /// Adds `other`'s counts to this report.
    pub fn absorb(&mut self, other: &Self) {
        self.added += other.added;
        self.replaced += other.replaced;
        self.skipped += other.skipped;
        self.evaluated += other.evaluated;
        self.script_errors += other.script_errors;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeadStep {
    Link(MarkupElement),
    Script(MarkupElement),
    Style(MarkupElement),
    Meta(MarkupElement),
    Comment(String),
}

/// Merges head fragments into a document.
#[derive(Debug, Clone, Copy)]
pub struct HeadContributor {
    strip_session_id: bool,
}

impl Default for HeadContributor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl HeadContributor {
    /// Creates a contributor.
    ///
    /// With `strip_session_id`, URLs differing only in a
    /// `;jsessionid=` parameter compare equal.
    #[must_use]
    pub fn new(strip_session_id: bool) -> Self {
        Self { strip_session_id }
    }

    /// Parses `markup` and applies every step in order.
    ///
    /// Malformed markup is logged and contributes nothing.
    pub fn contribute(
        &self,
        markup: &str,
        host: &dyn ScriptHost,
        ctx: &ScriptContext<'_>,
    ) -> HeadReport {
        let fragment = match Fragment::parse_html(markup) {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, "Header contribution is not valid markup, skipping");
                return HeadReport::default();
            }
        };
        let steps = collect_steps(&fragment);
        trace!(steps = steps.len(), "Flushing header contribution");

        let mut report = HeadReport::default();
        for step in steps {
            self.run_step(step, host, ctx, &mut report);
        }
        report
    }

    fn run_step(
        &self,
        step: HeadStep,
        host: &dyn ScriptHost,
        ctx: &ScriptContext<'_>,
        report: &mut HeadReport,
    ) {
        match step {
            HeadStep::Link(el) => {
                let mut doc = ctx.document.lock();
                let scope = doc.head();
                self.merge_resource(&mut doc, scope, el, "href", report);
            }
            HeadStep::Script(el) => {
                let src = el.attr("src").filter(|s| !s.is_empty()).map(str::to_string);
                match src {
                    Some(_) => {
                        let mut doc = ctx.document.lock();
                        let scope = doc.root();
                        self.merge_resource(&mut doc, scope, el, "src", report);
                    }
                    None => self.inline_script(el, host, ctx, report),
                }
            }
            HeadStep::Style(el) => {
                let mut doc = ctx.document.lock();
                if id_exists(&doc, &el) {
                    report.skipped += 1;
                    return;
                }
                let mut style = MarkupElement::new("style");
                if let Some(id) = el.id() {
                    style = style.with_attr("id", id);
                }
                style.children = el.children;
                append_to_head(&mut doc, style, report);
            }
            HeadStep::Meta(el) => {
                let mut doc = ctx.document.lock();
                if let Some(name) = el.attr("name") {
                    let root = doc.root();
                    let existing: Vec<NodeId> = doc
                        .elements_by_tag(root, "meta")
                        .into_iter()
                        .filter(|&n| doc.attr(n, "name") == Some(name))
                        .collect();
                    for node in existing {
                        if doc.apply(DomPatch::Remove { target: node }).is_ok() {
                            report.replaced += 1;
                        }
                    }
                }
                append_to_head(&mut doc, el, report);
            }
            HeadStep::Comment(body) => {
                let mut doc = ctx.document.lock();
                let head = doc.head();
                match doc.apply(DomPatch::Append {
                    parent: head,
                    fragment: Fragment::from_nodes(vec![MarkupNode::Comment(body)]),
                }) {
                    Ok(_) => report.added += 1,
                    Err(e) => warn!(error = %e, "Cannot append head comment"),
                }
            }
        }
    }

    /// `<script src>` / `<link href>` de-duplication.
    fn merge_resource(
        &self,
        doc: &mut Document,
        scope: NodeId,
        el: MarkupElement,
        attr: &str,
        report: &mut HeadReport,
    ) {
        let Some(wanted) = el.attr(attr).filter(|v| !v.is_empty()) else {
            append_to_head(doc, el, report);
            return;
        };
        let wanted = self.normalize(wanted);
        let id = el.id();

        let mut stale = None;
        for node in doc.elements_by_tag(scope, &el.tag) {
            let loaded = doc.attr(node, attr).map(|v| self.normalize(v));
            if loaded.as_deref() == Some(wanted.as_str()) {
                trace!(tag = %el.tag, url = %wanted, "Resource already present");
                report.skipped += 1;
                return;
            }
            if stale.is_none() && id.is_some() && doc.attr(node, "id") == id {
                stale = Some(node);
            }
        }

        if let Some(old) = stale {
            debug!(tag = %el.tag, id = ?id, url = %wanted, "Replacing resource with same id");
            if doc.apply(DomPatch::Remove { target: old }).is_ok() {
                report.replaced += 1;
            }
        }
        append_to_head(doc, el, report);
    }

    fn inline_script(
        &self,
        el: MarkupElement,
        host: &dyn ScriptHost,
        ctx: &ScriptContext<'_>,
        report: &mut HeadReport,
    ) {
        let text = strip_cdata_guard(&el.text()).to_string();
        {
            let mut doc = ctx.document.lock();
            if id_exists(&doc, &el) {
                report.skipped += 1;
                return;
            }
            if el.id().is_some_and(|id| !id.is_empty()) {
                let mut script = MarkupElement::new("script");
                for name in ["id", "type"] {
                    if let Some(v) = el.attr(name) {
                        script = script.with_attr(name, v);
                    }
                }
                append_to_head(&mut doc, script.with_text(text.clone()), report);
            }
        }

        report.evaluated += 1;
        if let Err(e) = host.evaluate(&text, ctx) {
            report.script_errors += 1;
            error!(error = %e, "Head script failed");
        }
    }

    /// Comparison form of a URL.
    #[must_use]
    pub fn normalize(&self, url: &str) -> String {
        if self.strip_session_id {
            strip_session_id(url)
        } else {
            url.to_string()
        }
    }
}

/// Removes a `;jsessionid=...` path parameter (ASCII case-insensitive).
///
/// ```
/// use ajaxflow_runtime::strip_session_id;
///
/// assert_eq!(strip_session_id("a.js;jsessionid=XYZ?v=1"), "a.js?v=1");
/// assert_eq!(strip_session_id("a.js;JSESSIONID=XYZ"), "a.js");
/// assert_eq!(strip_session_id("a.js"), "a.js");
/// ```
#[must_use]
pub fn strip_session_id(url: &str) -> String {
    const MARKER: &str = ";jsessionid=";
    let lower = url.to_ascii_lowercase();
    let Some(start) = lower.find(MARKER) else {
        return url.to_string();
    };
    let end = url[start..]
        .find(['?', '#'])
        .map_or(url.len(), |offset| start + offset);
    format!("{}{}", &url[..start], &url[end..])
}

fn collect_steps(fragment: &Fragment) -> Vec<HeadStep> {
    let nodes: &[MarkupNode] = match fragment.elements().find(|el| el.tag == "head") {
        Some(head) => &head.children,
        None => fragment.nodes(),
    };

    let mut steps = Vec::new();
    for node in nodes {
        match node {
            MarkupNode::Element(el) => {
                if let Some(step) = step_for(el) {
                    steps.push(step);
                }
            }
            MarkupNode::Comment(c) => steps.push(HeadStep::Comment(c.clone())),
            MarkupNode::Text(_) => {}
        }
    }
    steps
}

fn step_for(el: &MarkupElement) -> Option<HeadStep> {
    match el.tag.as_str() {
        "link" => Some(HeadStep::Link(el.clone())),
        "script" => Some(HeadStep::Script(el.clone())),
        "style" => Some(HeadStep::Style(el.clone())),
        "meta" => Some(HeadStep::Meta(el.clone())),
        _ => match el.child_elements().next() {
            // wrappers such as <wicket:link> carry one real element
            Some(inner) => step_for(inner),
            None => {
                debug!(tag = %el.tag, "Ignoring head element");
                None
            }
        },
    }
}

fn id_exists(doc: &Document, el: &MarkupElement) -> bool {
    el.id()
        .filter(|id| !id.is_empty())
        .is_some_and(|id| doc.element_by_id(id).is_some())
}

fn append_to_head(doc: &mut Document, el: MarkupElement, report: &mut HeadReport) {
    let head = doc.head();
    let tag = el.tag.clone();
    match doc.apply(DomPatch::Append {
        parent: head,
        fragment: Fragment::from_nodes(vec![MarkupNode::Element(el)]),
    }) {
        Ok(_) => report.added += 1,
        Err(e) => warn!(tag = %tag, error = %e, "Cannot append to head"),
    }
}

fn strip_cdata_guard(text: &str) -> &str {
    let text = text.strip_prefix("\n/*<![CDATA[*/\n").unwrap_or(text);
    text.strip_suffix("\n/*]]>*/\n").unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::NoopScriptHost;
    use crate::testing::RecordingScriptHost;
    use ajaxflow_dom::SharedDocument;

    fn page(head: &str) -> SharedDocument {
        Document::parse(&format!("<html><head>{head}</head><body></body></html>"))
            .unwrap()
            .into_shared()
    }

    fn contribute(doc: &SharedDocument, markup: &str) -> HeadReport {
        HeadContributor::default().contribute(markup, &NoopScriptHost, &ScriptContext::detached(doc))
    }

    fn scripts(doc: &SharedDocument) -> Vec<(Option<String>, Option<String>)> {
        let d = doc.lock();
        d.elements_by_tag(d.root(), "script")
            .into_iter()
            .map(|n| (d.attr(n, "id").map(String::from), d.attr(n, "src").map(String::from)))
            .collect()
    }

    #[test]
    fn script_with_same_id_is_replaced() {
        let doc = page("");
        contribute(&doc, r#"<head><script id="x" src="a.js"></script></head>"#);
        let report = contribute(&doc, r#"<head><script id="x" src="b.js"></script></head>"#);

        assert_eq!(report.replaced, 1);
        assert_eq!(scripts(&doc), [(Some("x".into()), Some("b.js".into()))]);
    }

    #[test]
    fn jsessionid_difference_is_not_a_change() {
        let doc = page(r#"<script id="x" src="a.js;jsessionid=OLD"></script>"#);
        let report = contribute(&doc, r#"<head><script id="x" src="a.js;jsessionid=NEW"></script></head>"#);

        assert_eq!(report.skipped, 1);
        assert_eq!(report.replaced, 0);
        assert_eq!(
            scripts(&doc),
            [(Some("x".into()), Some("a.js;jsessionid=OLD".into()))]
        );
    }

    #[test]
    fn session_id_stripping_can_be_disabled() {
        let doc = page(r#"<link href="s.css;jsessionid=A" rel="stylesheet">"#);
        let report = HeadContributor::new(false).contribute(
            r#"<link href="s.css;jsessionid=B" rel="stylesheet">"#,
            &NoopScriptHost,
            &ScriptContext::detached(&doc),
        );
        assert_eq!(report.added, 1);
        let d = doc.lock();
        assert_eq!(d.elements_by_tag(d.head(), "link").len(), 2);
    }

    #[test]
    fn link_dedup_by_href() {
        let doc = page(r#"<link rel="stylesheet" href="/s.css">"#);
        let report = contribute(&doc, r#"<head><link rel="stylesheet" href="/s.css"><link href="/t.css"></head>"#);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.added, 1);
    }

    #[test]
    fn meta_replaces_by_name() {
        let doc = page(r#"<meta name="viewport" content="old"><meta name="keep" content="k">"#);
        contribute(&doc, r#"<head><meta name="viewport" content="new"></head>"#);

        let d = doc.lock();
        let metas: Vec<(String, String)> = d
            .elements_by_tag(d.head(), "meta")
            .into_iter()
            .map(|n| {
                (
                    d.attr(n, "name").unwrap_or_default().to_string(),
                    d.attr(n, "content").unwrap_or_default().to_string(),
                )
            })
            .collect();
        assert_eq!(
            metas,
            [("keep".into(), "k".into()), ("viewport".into(), "new".into())]
        );
    }

    #[test]
    fn inline_scripts() {
        let doc = page(r#"<script id="once">old()</script>"#);
        let host = RecordingScriptHost::new();
        let report = HeadContributor::default().contribute(
            "<head><script id=\"once\">again()</script><script id=\"fresh\">fresh()</script><script>anon()</script></head>",
            &host,
            &ScriptContext::detached(&doc),
        );

        assert_eq!(report.skipped, 1);
        assert_eq!(report.evaluated, 2);
        assert_eq!(host.evaluated(), ["fresh()", "anon()"]);
        let d = doc.lock();
        assert!(d.element_by_id("fresh").is_some());
        assert_eq!(d.elements_by_tag(d.head(), "script").len(), 2);
    }

    #[test]
    fn style_comment_and_wrappers() {
        let doc = page(r#"<style id="s1">a{}</style>"#);
        let report = contribute(
            &doc,
            "<head><style id=\"s1\">b{}</style><style id=\"s2\">c{}</style><!--[if IE]>x<![endif]-->\
             <wicket:link><script src=\"w.js\"></script></wicket:link></head>",
        );
        assert_eq!(report.skipped, 1);
        assert_eq!(report.added, 3);

        let d = doc.lock();
        let head_html = d.inner_html(d.head());
        assert!(head_html.contains("<style id=\"s2\">c{}</style>"));
        assert!(head_html.contains("<!--[if IE]>x<![endif]-->"));
        assert!(head_html.contains("w.js"));
    }

    #[test]
    fn cdata_guard_is_removed() {
        assert_eq!(strip_cdata_guard("\n/*<![CDATA[*/\nrun();\n/*]]>*/\n"), "run();");
        assert_eq!(strip_cdata_guard("run();"), "run();");
    }

    #[test]
    fn strip_session_id_variants() {
        assert_eq!(strip_session_id("/r/a.js;jsessionid=1#frag"), "/r/a.js#frag");
        assert_eq!(strip_session_id(""), "");
    }
}

//! Shared fixtures for runtime integration tests.

#![allow(dead_code)]

use ajaxflow_dom::{Document, SharedDocument};
use ajaxflow_runtime::testing::{MockTransport, NotificationRecorder, RecordingScriptHost};
use ajaxflow_runtime::{AjaxConfig, AjaxRuntime};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

pub const PAGE: &str = r#"<html><head><title>t</title></head><body>
<div id="panel">old</div>
<ul id="list"><li>a</li></ul>
<form id="search"><input name="q" value="rust"><input type="checkbox" name="all" checked></form>
</body></html>"#;

pub struct Harness {
    pub runtime: AjaxRuntime,
    pub transport: Arc<MockTransport>,
    pub scripts: Arc<RecordingScriptHost>,
    pub events: NotificationRecorder,
    pub document: SharedDocument,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AjaxConfig::default())
    }

    pub fn with_config(config: AjaxConfig) -> Self {
        let document = Document::parse(PAGE).unwrap().into_shared();
        let transport = Arc::new(MockTransport::new());
        let scripts = Arc::new(RecordingScriptHost::new());
        let runtime = AjaxRuntime::builder()
            .with_config(config)
            .with_document(document.clone())
            .with_transport(transport.clone())
            .with_script_host(scripts.clone())
            .build();
        let events = NotificationRecorder::attach(runtime.bus());
        Self {
            runtime,
            transport,
            scripts,
            events,
            document,
        }
    }

    pub fn text_of(&self, id: &str) -> Option<String> {
        let doc = self.document.lock();
        doc.element_by_id(id).map(|n| doc.text_content(n))
    }
}

/// Timestamped labels, for ordering assertions.
#[derive(Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<(String, Instant)>>>);

impl Timeline {
    pub fn mark(&self, label: impl Into<String>) {
        self.0.lock().push((label.into(), Instant::now()));
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.lock().iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn at(&self, label: &str) -> Instant {
        self.0
            .lock()
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, t)| *t)
            .unwrap_or_else(|| panic!("no mark {label}"))
    }
}

pub fn envelope(body: &str) -> String {
    format!("<ajax-response>{body}</ajax-response>")
}

pub fn component(id: &str, markup: &str) -> String {
    format!(r#"<component id="{id}"><![CDATA[{markup}]]></component>"#)
}

//! Websocket session bridge.
//!
//! The socket itself belongs to the embedder. The bridge turns its
//! events into `/websocket/*` notifications and applies pushed
//! `<ajax-response>` envelopes to the document, outside any call.

use crate::response::{ProcessReport, ResponseProcessor, ROOT_ELEMENT};
use crate::events::EventBus;
use ajaxflow_event::{Notification, SocketEvent};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Publishes socket events and applies pushed envelopes.
#[derive(Debug, Clone)]
pub struct WebSocketBridge {
    bus: Arc<EventBus>,
    processor: Arc<ResponseProcessor>,
    process_envelopes: bool,
}

impl WebSocketBridge {
    pub(crate) fn new(
        bus: Arc<EventBus>,
        processor: Arc<ResponseProcessor>,
        process_envelopes: bool,
    ) -> Self {
        Self {
            bus,
            processor,
            process_envelopes,
        }
    }

    /// Connection established.
    pub fn on_open(&self) {
        info!("Websocket open");
        self.bus.publish(&Notification::socket(SocketEvent::Open));
    }

    /// Text frame received.
    ///
    /// The message is published first. If it is an envelope, it is then
    /// applied; the report is returned. A malformed envelope is logged.
    pub fn on_message(&self, text: &str) -> Option<ProcessReport> {
        debug!(bytes = text.len(), "Websocket message");
        self.bus
            .publish(&Notification::socket(SocketEvent::Message(text.to_string())));

        if !self.process_envelopes || !text.contains(&format!("<{ROOT_ELEMENT}")) {
            return None;
        }
        match self.processor.process(text, None, None) {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Pushed envelope is malformed");
                None
            }
        }
    }

    /// Connection closed.
    pub fn on_close(&self, code: Option<u16>, reason: impl Into<String>) {
        let reason = reason.into();
        info!(?code, reason = %reason, "Websocket closed");
        self.bus
            .publish(&Notification::socket(SocketEvent::Closed { code, reason }));
    }

    /// Transport error.
    pub fn on_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "Websocket error");
        self.bus
            .publish(&Notification::socket(SocketEvent::Error(message)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::NoopScriptHost;
    use crate::testing::NotificationRecorder;
    use ajaxflow_dom::Document;
    use ajaxflow_event::Topic;

    fn bridge(process: bool) -> (WebSocketBridge, NotificationRecorder, ajaxflow_dom::SharedDocument) {
        let doc = Document::parse(r#"<html><body><ul id="feed"></ul></body></html>"#)
            .unwrap()
            .into_shared();
        let bus = Arc::new(EventBus::new());
        let recorder = NotificationRecorder::attach(&bus);
        let processor = Arc::new(ResponseProcessor::new(
            doc.clone(),
            Arc::clone(&bus),
            Arc::new(NoopScriptHost),
        ));
        (WebSocketBridge::new(bus, processor, process), recorder, doc)
    }

    #[test]
    fn lifecycle_topics() {
        let (bridge, recorder, _) = bridge(true);
        bridge.on_open();
        bridge.on_message("ping");
        bridge.on_error("reset");
        bridge.on_close(Some(1000), "bye");
        assert_eq!(
            recorder.topics(),
            [
                Topic::SocketOpen,
                Topic::SocketMessage,
                Topic::SocketError,
                Topic::SocketClosed
            ]
        );
    }

    #[test]
    fn pushed_envelope_is_applied() {
        let (bridge, _, doc) = bridge(true);
        let report = bridge
            .on_message(r#"<ajax-response><component id="feed"><![CDATA[<ul id="feed"><li>1</li></ul>]]></component></ajax-response>"#)
            .unwrap();
        assert_eq!(report.replaced, ["feed"]);
        let d = doc.lock();
        assert_eq!(d.elements_by_tag(d.body(), "li").len(), 1);
    }

    #[test]
    fn envelope_processing_can_be_disabled() {
        let (bridge, recorder, doc) = bridge(false);
        assert!(bridge
            .on_message(r#"<ajax-response><component id="feed"></component></ajax-response>"#)
            .is_none());
        assert!(doc.lock().element_by_id("feed").is_some());
        assert_eq!(recorder.topics(), [Topic::SocketMessage]);
    }
}

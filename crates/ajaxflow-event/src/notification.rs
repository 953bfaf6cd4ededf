//! Notification payloads.

use crate::Topic;
use ajaxflow_types::{CallId, ChannelSpec};
use serde::{Deserialize, Serialize};

/// Owned snapshot of an element at the moment of the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// The element's `id` attribute, if any.
    pub element_id: Option<String>,
    /// Lower-case tag name.
    pub tag: String,
    /// Serialized outer markup.
    pub markup: String,
}

/// Identity of a call as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSummary {
    /// Call identifier.
    pub call_id: CallId,
    /// Target URL as declared (before parameters are appended).
    pub url: String,
    /// Channel the call runs on.
    pub channel: ChannelSpec,
    /// Component that triggered the call.
    pub component_id: Option<String>,
}

/// Websocket session events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketEvent {
    /// Connection established.
    Open,
    /// Text frame received.
    Message(String),
    /// Connection closed.
    Closed {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// Transport error.
    Error(String),
}

impl SocketEvent {
    /// Topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::Open => Topic::SocketOpen,
            Self::Message(_) => Topic::SocketMessage,
            Self::Closed { .. } => Topic::SocketClosed,
            Self::Error(_) => Topic::SocketError,
        }
    }
}

/// What a notification carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// DOM node notifications.
    Node(NodeSnapshot),
    /// Call lifecycle notifications.
    Call(CallSummary),
    /// Call failure, with the error code of the cause.
    CallFailed {
        /// The failed call.
        call: CallSummary,
        /// Stable error code (see `ErrorCode`).
        code: String,
        /// Human-readable cause.
        message: String,
    },
    /// Websocket notifications.
    Socket(SocketEvent),
    /// Free-form data for custom topics.
    Custom(serde_json::Value),
    /// No data.
    Empty,
}

/// One published message.
///
/// # Example
///
/// ```
/// use ajaxflow_event::{NodeSnapshot, Notification, Topic};
///
/// let n = Notification::node_removing(NodeSnapshot {
///     element_id: Some("panel".into()),
///     tag: "div".into(),
///     markup: "<div id=\"panel\"></div>".into(),
/// });
/// assert_eq!(n.topic, Topic::NodeRemoving);
/// assert_eq!(n.element_id(), Some("panel"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Where it is published.
    pub topic: Topic,
    /// What it carries.
    pub payload: Payload,
}

impl Notification {
    /// Creates a notification.
    #[must_use]
    pub fn new(topic: Topic, payload: Payload) -> Self {
        Self { topic, payload }
    }

    /// `/dom/node/removing`.
    #[must_use]
    pub fn node_removing(node: NodeSnapshot) -> Self {
        Self::new(Topic::NodeRemoving, Payload::Node(node))
    }

    /// `/dom/node/added`.
    #[must_use]
    pub fn node_added(node: NodeSnapshot) -> Self {
        Self::new(Topic::NodeAdded, Payload::Node(node))
    }

    /// A call lifecycle notification.
    #[must_use]
    pub fn call(topic: Topic, call: CallSummary) -> Self {
        Self::new(topic, Payload::Call(call))
    }

    /// `/ajax/call/failure`.
    #[must_use]
    pub fn call_failed(
        call: CallSummary,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            Topic::CallFailure,
            Payload::CallFailed {
                call,
                code: code.into(),
                message: message.into(),
            },
        )
    }

    /// A websocket notification on the matching topic.
    #[must_use]
    pub fn socket(event: SocketEvent) -> Self {
        Self::new(event.topic(), Payload::Socket(event))
    }

    /// Call id, for call lifecycle payloads.
    #[must_use]
    pub fn call_id(&self) -> Option<CallId> {
        match &self.payload {
            Payload::Call(c) | Payload::CallFailed { call: c, .. } => Some(c.call_id),
            _ => None,
        }
    }

    /// Element id, for node payloads.
    #[must_use]
    pub fn element_id(&self) -> Option<&str> {
        match &self.payload {
            Payload::Node(n) => n.element_id.as_deref(),
            _ => None,
        }
    }
}

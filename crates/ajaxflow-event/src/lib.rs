//! Pub/sub vocabulary for ajaxflow.
//!
//! Widgets never hook into the runtime's internals. They subscribe to
//! topics and receive [`Notification`]s:
//!
//! ```text
//!  ResponseProcessor ──► /dom/node/removing ──┐
//!                    ──► /dom/node/added    ──┤
//!  AjaxCall          ──► /ajax/call/*       ──┼──► EventBus ──► subscribers
//!  WebSocketBridge   ──► /websocket/*       ──┘
//! ```
//!
//! # Topics
//!
//! | Topic | Payload |
//! |-------|---------|
//! | `/dom/node/removing` | [`Payload::Node`] snapshot taken before detachment |
//! | `/dom/node/added` | [`Payload::Node`] snapshot of the inserted element |
//! | `/ajax/call/init` .. `/ajax/call/done` | [`Payload::Call`] |
//! | `/ajax/call/failure` | [`Payload::CallFailed`] |
//! | `/websocket/open` .. `/websocket/error` | [`Payload::Socket`] |
//!
//! Payloads are owned snapshots, never live references into the
//! document, so a subscriber can keep them after the node is gone.

mod notification;
mod topic;

pub use notification::{CallSummary, NodeSnapshot, Notification, Payload, SocketEvent};
pub use topic::Topic;

//! ajaxflow runtime - call orchestration.
//!
//! Turns a declarative description of a server round trip into a
//! scheduled, serialized, observable request whose `<ajax-response>`
//! envelope is applied to a shared document.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ajaxflow-types : ChannelSpec, CallId, ErrorCode            │
//! │  ajaxflow-event : Topic, Notification                       │
//! │  ajaxflow-dom   : Document, markup parsing, DomPatch        │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Runtime Layer (THIS CRATE)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  channel/   : per-name scheduling (s / d / a)               │
//! │  throttle   : per-token coalescing                          │
//! │  call/      : attributes, hooks, lifecycle, suspend locks   │
//! │  transport/ : Transport seam, reqwest implementation        │
//! │  response/  : envelope decoding, processor, head merging    │
//! │  events/    : topic bus                                     │
//! │  config/    : layered TOML configuration                    │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Frontend (ajaxflow-cli)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! ## [`channel`] - Serialization
//!
//! - [`ChannelManager`]: busy flag and queue per channel name
//! - [`PendingEntry`]: a scheduled closure with its discard hook
//!
//! ## [`call`] - Call Lifecycle
//!
//! - [`CallAttributes`]: what to send and how to schedule it
//! - [`CallHooks`]: native preconditions, dependencies and handlers
//! - [`CallHandle`] / [`CallOutcome`]: how the call ended
//!
//! ## [`response`] - Envelope Processing
//!
//! - [`Envelope`] / [`Directive`]: decoded `<ajax-response>`
//! - [`ResponseProcessor`]: applies directives to the document
//!
//! ## [`AjaxRuntime`]
//!
//! Ties everything together; see its documentation for an example.
//!
//! # Testing
//!
//! The `test-utils` feature exposes [`testing`] with a scripted
//! transport, a recording script host and a notification recorder.

pub mod call;
pub mod channel;
pub mod config;
pub mod events;
pub mod response;
mod runtime;
pub mod script;
pub mod throttle;
pub mod timer;
pub mod transport;
mod websocket;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use call::{
    AttributeError, CallAttributes, CallContext, CallError, CallHandle, CallHooks, CallOutcome,
    HttpMethod, Notify, Parameter, Suspender, ThrottleSettings,
};
pub use channel::{ChannelManager, DiscardReason, PendingEntry, ScheduleOutcome};
pub use config::{AjaxConfig, ConfigError, ConfigLoader, ConfigResolver};
pub use events::EventBus;
pub use response::{
    strip_session_id, Directive, Envelope, EnvelopeError, HeadContributor, ProcessReport,
    ResponseProcessor,
};
pub use runtime::{AjaxRuntime, AjaxRuntimeBuilder};
pub use script::{NoopScriptHost, ScriptContext, ScriptError, ScriptHost};
pub use throttle::Throttler;
pub use timer::TimerRegistry;
pub use transport::{AjaxRequest, AjaxResponse, HttpTransport, Transport, TransportError};
pub use websocket::WebSocketBridge;

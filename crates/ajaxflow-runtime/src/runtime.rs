//! The runtime context.
//!
//! [`AjaxRuntime`] owns everything a call needs: configuration, the
//! document, the event bus, the channel registry, both throttlers, the
//! timer registry, the transport and the script host. It is cheap to
//! clone; clones share state.
//!
//! ```text
//!                        AjaxRuntime
//!   ┌──────────────────────────────────────────────────────┐
//!   │ config   document   bus   channels   timers          │
//!   │ throttler (anchored)     postponer (restarting)      │
//!   │ transport: dyn Transport   scripts: dyn ScriptHost   │
//!   │ processor: ResponseProcessor                         │
//!   └──────────────────────────────────────────────────────┘
//! ```

use crate::call::{self, AttributeError, CallAttributes, CallHandle, CallHooks};
use crate::channel::ChannelManager;
use crate::config::{AjaxConfig, ConfigError, ConfigResolver};
use crate::events::EventBus;
use crate::response::{EnvelopeError, HeadContributor, ProcessReport, ResponseProcessor};
use crate::script::{NoopScriptHost, ScriptHost};
use crate::throttle::Throttler;
use crate::timer::TimerRegistry;
use crate::transport::{HttpTransport, Transport};
use crate::websocket::WebSocketBridge;
use ajaxflow_dom::{Document, SharedDocument};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

pub(crate) struct RuntimeShared {
    pub(crate) config: AjaxConfig,
    pub(crate) document: SharedDocument,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) channels: ChannelManager,
    pub(crate) throttler: Throttler,
    pub(crate) postponer: Throttler,
    pub(crate) timers: TimerRegistry,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) scripts: Arc<dyn ScriptHost>,
    pub(crate) processor: Arc<ResponseProcessor>,
}

/// Call orchestration context.
///
/// # Example
///
/// ```no_run
/// use ajaxflow_runtime::{AjaxRuntime, CallOutcome};
/// use ajaxflow_dom::Document;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let document = Document::parse("<html><body><div id=\"panel\"></div></body></html>")?;
/// let runtime = AjaxRuntime::builder().with_document(document.into_shared()).build();
///
/// let attrs = runtime.attributes("http://localhost:8080/app?0-1.IBehaviorListener.0-panel");
/// match runtime.ajax(attrs).outcome().await {
///     CallOutcome::Completed { report, .. } => println!("{report:?}"),
///     other => println!("call ended: {other:?}"),
/// }
/// runtime.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AjaxRuntime {
    shared: Arc<RuntimeShared>,
}

impl AjaxRuntime {
    /// Starts a builder with default configuration.
    #[must_use]
    pub fn builder() -> AjaxRuntimeBuilder {
        AjaxRuntimeBuilder::new()
    }

    /// Launches a call.
    pub fn ajax(&self, attributes: CallAttributes) -> CallHandle {
        self.ajax_with(attributes, CallHooks::default())
    }

    /// Launches a call with native hooks.
    pub fn ajax_with(&self, attributes: CallAttributes, hooks: CallHooks) -> CallHandle {
        call::launch(&self.shared, attributes, hooks)
    }

    /// Attributes for `url` with the configured defaults applied.
    #[must_use]
    pub fn attributes(&self, url: impl Into<String>) -> CallAttributes {
        let config = &self.shared.config;
        CallAttributes::new(url)
            .with_channel(config.default_channel_spec())
            .expect_envelope(config.call.ajax_response_default)
    }

    /// Parses an attribute object, filling keys it omits from the
    /// configured defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::Malformed`] for invalid JSON or types.
    pub fn attributes_from_json(&self, json: &str) -> Result<CallAttributes, AttributeError> {
        let mut value: Value = serde_json::from_str(json).map_err(|e| AttributeError::Malformed {
            message: e.to_string(),
        })?;
        if let Value::Object(ref mut map) = value {
            let config = &self.shared.config;
            if !map.contains_key("ch") && !map.contains_key("channel") {
                map.insert("ch".into(), Value::String(config.default_channel.clone()));
            }
            if !map.contains_key("wr") && !map.contains_key("ajax_response") {
                map.insert("wr".into(), Value::Bool(config.call.ajax_response_default));
            }
        }
        CallAttributes::from_value(value)
    }

    /// Applies an envelope outside any call.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when `raw` is not an envelope.
    pub fn process(&self, raw: &str) -> Result<ProcessReport, EnvelopeError> {
        self.shared.processor.process(raw, None, None)
    }

    /// Bridge for an embedder-owned websocket.
    #[must_use]
    pub fn websocket(&self) -> WebSocketBridge {
        WebSocketBridge::new(
            Arc::clone(&self.shared.bus),
            Arc::clone(&self.shared.processor),
            self.shared.config.websocket.process_envelopes,
        )
    }

    /// The live document.
    #[must_use]
    pub fn document(&self) -> &SharedDocument {
        &self.shared.document
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.shared.bus
    }

    /// The channel registry.
    #[must_use]
    pub fn channels(&self) -> &ChannelManager {
        &self.shared.channels
    }

    /// Named one-shot timers.
    #[must_use]
    pub fn timers(&self) -> &TimerRegistry {
        &self.shared.timers
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &AjaxConfig {
        &self.shared.config
    }

    /// Cancels timers and throttled calls, and discards every queued
    /// call. Calls already in flight run to completion.
    pub fn shutdown(&self) {
        info!("Shutting down ajax runtime");
        self.shared.timers.clear_all();
        self.shared.throttler.cancel_all();
        self.shared.postponer.cancel_all();
        self.shared.channels.shutdown();
    }
}

impl std::fmt::Debug for AjaxRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AjaxRuntime")
            .field("channels", &self.shared.channels.channel_count())
            .field("timers", &self.shared.timers.active())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AjaxRuntime`].
pub struct AjaxRuntimeBuilder {
    config: AjaxConfig,
    document: Option<SharedDocument>,
    bus: Option<Arc<EventBus>>,
    transport: Option<Arc<dyn Transport>>,
    scripts: Option<Arc<dyn ScriptHost>>,
}

impl AjaxRuntimeBuilder {
    /// Defaults everywhere.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AjaxConfig::default(),
            document: None,
            bus: None,
            transport: None,
            scripts: None,
        }
    }

    /// Uses `config`.
    #[must_use]
    pub fn with_config(mut self, config: AjaxConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses the configuration produced by `resolver`.
    ///
    /// # Errors
    ///
    /// Returns the resolver's [`ConfigError`].
    pub fn with_resolver(mut self, resolver: &dyn ConfigResolver) -> Result<Self, ConfigError> {
        self.config = resolver.resolve()?;
        Ok(self)
    }

    /// Operates on `document` instead of an empty page.
    #[must_use]
    pub fn with_document(mut self, document: SharedDocument) -> Self {
        self.document = Some(document);
        self
    }

    /// Publishes on an existing bus.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sends requests through `transport` instead of HTTP.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Evaluates scripts with `scripts` instead of skipping them.
    #[must_use]
    pub fn with_script_host(mut self, scripts: Arc<dyn ScriptHost>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    /// Builds the runtime.
    ///
    /// Without an explicit transport, an [`HttpTransport`] is used that
    /// resolves relative URLs against the configured `base_url`.
    #[must_use]
    pub fn build(self) -> AjaxRuntime {
        let config = self.config;
        let document = self
            .document
            .unwrap_or_else(|| Document::new().into_shared());
        let bus = self.bus.unwrap_or_else(|| Arc::new(EventBus::new()));
        let scripts: Arc<dyn ScriptHost> = self.scripts.unwrap_or_else(|| Arc::new(NoopScriptHost));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(http_transport(config.base_url.as_deref())));
        let processor = Arc::new(
            ResponseProcessor::new(document.clone(), Arc::clone(&bus), Arc::clone(&scripts))
                .with_head(HeadContributor::new(config.head.strip_session_id)),
        );

        debug!(
            default_channel = %config.default_channel,
            base_url = ?config.base_url,
            "Ajax runtime built"
        );
        AjaxRuntime {
            shared: Arc::new(RuntimeShared {
                config,
                document,
                bus,
                channels: ChannelManager::new(),
                throttler: Throttler::new(false),
                postponer: Throttler::new(true),
                timers: TimerRegistry::new(),
                transport,
                scripts,
                processor,
            }),
        }
    }
}

impl Default for AjaxRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn http_transport(base_url: Option<&str>) -> HttpTransport {
    let transport = HttpTransport::new();
    match base_url.map(Url::parse) {
        Some(Ok(base)) => transport.with_base(base),
        Some(Err(e)) => {
            warn!(error = %e, "Ignoring invalid base_url");
            transport
        }
        None => transport,
    }
}

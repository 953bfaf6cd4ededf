//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use ajaxflow_types::{ChannelSpec, DEFAULT_CHANNEL};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure.
///
/// This is the unified configuration after merging all layers.
///
/// # Example
///
/// ```
/// use ajaxflow_runtime::config::AjaxConfig;
///
/// let config = AjaxConfig::default();
/// assert_eq!(config.default_channel, "0|s");
/// assert!(config.head.strip_session_id);
/// assert_eq!(config.call.request_timeout(), None);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AjaxConfig {
    /// Page base URL, sent as `Ajax-Base-Url` and used to resolve
    /// relative call URLs.
    pub base_url: Option<String>,

    /// Channel for calls that do not name one.
    pub default_channel: String,

    /// Call defaults.
    pub call: CallConfig,

    /// Throttle defaults.
    pub throttle: ThrottleConfig,

    /// Head contribution settings.
    pub head: HeadConfig,

    /// Log file settings.
    pub logging: LoggingConfig,

    /// Websocket bridge settings.
    pub websocket: WebSocketConfig,
}

impl Default for AjaxConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_channel: DEFAULT_CHANNEL.into(),
            call: CallConfig::default(),
            throttle: ThrottleConfig::default(),
            head: HeadConfig::default(),
            logging: LoggingConfig::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

impl AjaxConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// The default channel, parsed leniently.
    #[must_use]
    pub fn default_channel_spec(&self) -> ChannelSpec {
        ChannelSpec::parse_lenient(&self.default_channel)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default. This enables layered configuration.
    pub fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.base_url.is_some() {
            self.base_url.clone_from(&other.base_url);
        }
        if other.default_channel != default.default_channel {
            self.default_channel.clone_from(&other.default_channel);
        }

        self.call.merge(&other.call);
        self.throttle.merge(&other.throttle);
        self.head.merge(&other.head);
        self.logging.merge(&other.logging);
        self.websocket.merge(&other.websocket);
    }
}

/// Call defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CallConfig {
    /// Timeout for calls without `rt`, in milliseconds. 0 disables it.
    pub request_timeout_ms: u64,

    /// Cancel calls whose component or form element is not in the
    /// document.
    pub check_presence: bool,

    /// Whether bodies are envelopes unless a call says otherwise.
    pub ajax_response_default: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 0,
            check_presence: true,
            ajax_response_default: true,
        }
    }
}

impl CallConfig {
    /// The default timeout, if any.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.request_timeout_ms != default.request_timeout_ms {
            self.request_timeout_ms = other.request_timeout_ms;
        }
        if other.check_presence != default.check_presence {
            self.check_presence = other.check_presence;
        }
        if other.ajax_response_default != default.ajax_response_default {
            self.ajax_response_default = other.ajax_response_default;
        }
    }
}

/// Throttle defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Window used when a throttle setting gives no delay.
    pub default_delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 500,
        }
    }
}

impl ThrottleConfig {
    fn merge(&mut self, other: &Self) {
        if other.default_delay_ms != Self::default().default_delay_ms {
            self.default_delay_ms = other.default_delay_ms;
        }
    }
}

/// Head contribution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeadConfig {
    /// Ignore `;jsessionid=` when comparing resource URLs.
    pub strip_session_id: bool,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            strip_session_id: true,
        }
    }
}

impl HeadConfig {
    fn merge(&mut self, other: &Self) {
        if other.strip_session_id != Self::default().strip_session_id {
            self.strip_session_id = other.strip_session_id;
        }
    }
}

/// Log file settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a persistent log file.
    pub file: bool,

    /// Directory for `ajaxflow.log`; defaults to `~/.ajaxflow/logs`.
    pub file_path: Option<PathBuf>,

    /// Filter level for the file layer.
    pub file_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: false,
            file_path: None,
            file_level: "debug".into(),
        }
    }
}

impl LoggingConfig {
    /// Directory the log file lives in.
    #[must_use]
    pub fn resolved_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| super::default_config_dir().join("logs"))
    }

    /// `EnvFilter` directive for the file layer.
    ///
    /// HTTP and TLS internals are capped at `warn`.
    #[must_use]
    pub fn file_filter_directive(&self) -> String {
        format!(
            "{},hyper=warn,h2=warn,reqwest=warn,rustls=warn,tokio=warn",
            self.file_level
        )
    }

    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.file != default.file {
            self.file = other.file;
        }
        if other.file_path.is_some() {
            self.file_path.clone_from(&other.file_path);
        }
        if other.file_level != default.file_level {
            self.file_level.clone_from(&other.file_level);
        }
    }
}

/// Websocket bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Apply messages that are `<ajax-response>` envelopes.
    pub process_envelopes: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            process_envelopes: true,
        }
    }
}

impl WebSocketConfig {
    fn merge(&mut self, other: &Self) {
        if other.process_envelopes != Self::default().process_envelopes {
            self.process_envelopes = other.process_envelopes;
        }
    }
}

//! Declarative call attributes.
//!
//! Widgets describe a call as a JSON object with short keys. Every key
//! is an alias of a canonical field:
//!
//! | Key | Field | Type |
//! |-----|-------|------|
//! | `u` | `url` | string |
//! | `c` | `component_id` | string |
//! | `e` | `event_names` | string or list |
//! | `ch` | `channel` | `"name\|mode"`, falls back to `0\|s` |
//! | `mt` | `method` | `GET` / `POST` |
//! | `f` | `form_id` | string |
//! | `m`, `mp` | `multipart` | bool |
//! | `ep` | `extra_parameters` | map or list of `{name, value}` |
//! | `rt` | `request_timeout_ms` | integer |
//! | `wr` | `ajax_response` | bool, default `true` |
//! | `tr` | `throttle` | `{id, d, p}` |
//! | `pre` | `preconditions` | scripts |
//! | `dep` | `dependencies` | scripts |
//! | `bh` / `sh` / `fh` / `coh` / `dh` | handler scripts | before / success / failure / complete / done |
//!
//! Parsing is followed by [`CallAttributes::normalize`] and
//! [`CallAttributes::validate`].

use ajaxflow_types::{ChannelSpec, ErrorCode};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Attribute object failure.
///
/// # Error Codes
///
/// | Variant | Code | Recoverable |
/// |---------|------|-------------|
/// | [`AttributeError::Malformed`] | `ATTR_MALFORMED` | No |
/// | [`AttributeError::MissingUrl`] | `ATTR_MISSING_URL` | No |
/// | [`AttributeError::InvalidThrottle`] | `ATTR_INVALID_THROTTLE` | No |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    /// Not a valid attribute object.
    #[error("malformed call attributes: {message}")]
    Malformed {
        /// Parser message.
        message: String,
    },
    /// No URL and no URL builder.
    #[error("call has no url")]
    MissingUrl,
    /// Throttle settings cannot be honored.
    #[error("invalid throttle settings: {reason}")]
    InvalidThrottle {
        /// What is wrong.
        reason: String,
    },
}

impl ErrorCode for AttributeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "ATTR_MALFORMED",
            Self::MissingUrl => "ATTR_MISSING_URL",
            Self::InvalidThrottle { .. } => "ATTR_INVALID_THROTTLE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// HTTP method of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HttpMethod {
    /// Parameters in the query string.
    #[default]
    #[serde(rename = "GET", alias = "get", alias = "Get")]
    Get,
    /// Parameters in a form body.
    #[serde(rename = "POST", alias = "post", alias = "Post")]
    Post,
}

impl HttpMethod {
    /// Upper-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Parameter value.
    pub value: String,
}

impl Parameter {
    /// Creates a parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Throttle settings of a call (`tr`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleSettings {
    /// Coalescing token.
    pub id: String,
    /// Window length in milliseconds.
    #[serde(alias = "d")]
    pub delay_ms: u64,
    /// Whether each new registration restarts the window.
    #[serde(default, alias = "p")]
    pub postpone: bool,
}

impl ThrottleSettings {
    /// Window length.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Canonical call attributes.
///
/// # Example
///
/// ```
/// use ajaxflow_runtime::{CallAttributes, HttpMethod};
/// use ajaxflow_types::ChannelMode;
///
/// let attrs = CallAttributes::from_json(
///     r#"{"u": "/page?x=1", "c": "btn", "ch": "poll|d", "m": true, "ep": {"q": ["a", "b"]}}"#,
/// )
/// .unwrap()
/// .normalize();
///
/// assert_eq!(attrs.url, "/page?x=1");
/// assert_eq!(attrs.channel.mode(), ChannelMode::Drop);
/// assert_eq!(attrs.method, HttpMethod::Post); // multipart forces POST
/// assert_eq!(attrs.extra_parameters.len(), 2);
/// assert!(attrs.ajax_response);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallAttributes {
    /// Target URL.
    #[serde(alias = "u")]
    pub url: String,
    /// Triggering component's element id.
    #[serde(alias = "c")]
    pub component_id: Option<String>,
    /// DOM events the call is bound to.
    #[serde(alias = "e", deserialize_with = "one_or_many")]
    pub event_names: Vec<String>,
    /// Channel the call is scheduled on.
    #[serde(alias = "ch")]
    pub channel: ChannelSpec,
    /// HTTP method.
    #[serde(alias = "mt")]
    pub method: HttpMethod,
    /// Form whose fields are submitted.
    #[serde(alias = "f")]
    pub form_id: Option<String>,
    /// Submit through the iframe transport.
    #[serde(alias = "m", alias = "mp")]
    pub multipart: bool,
    /// Static extra parameters.
    #[serde(alias = "ep", deserialize_with = "extra_parameters")]
    pub extra_parameters: Vec<Parameter>,
    /// Per-call timeout; overrides the configured default.
    #[serde(alias = "rt")]
    pub request_timeout_ms: Option<u64>,
    /// Whether a successful body is an `<ajax-response>` envelope.
    #[serde(alias = "wr")]
    pub ajax_response: bool,
    /// Throttling.
    #[serde(alias = "tr")]
    pub throttle: Option<ThrottleSettings>,
    /// Script predicates; all must pass.
    #[serde(alias = "pre", deserialize_with = "one_or_many")]
    pub preconditions: Vec<String>,
    /// Script parameter providers, evaluated at fire time.
    #[serde(alias = "dep", deserialize_with = "one_or_many")]
    pub dependencies: Vec<String>,
    /// Scripts run when the channel grants the call.
    #[serde(alias = "bh", deserialize_with = "one_or_many")]
    pub before_handlers: Vec<String>,
    /// Scripts run after a successful response.
    #[serde(alias = "sh", deserialize_with = "one_or_many")]
    pub success_handlers: Vec<String>,
    /// Scripts run after a failure.
    #[serde(alias = "fh", deserialize_with = "one_or_many")]
    pub failure_handlers: Vec<String>,
    /// Scripts run after success or failure.
    #[serde(alias = "coh", deserialize_with = "one_or_many")]
    pub complete_handlers: Vec<String>,
    /// Scripts run once suspend locks are released.
    #[serde(alias = "dh", deserialize_with = "one_or_many")]
    pub done_handlers: Vec<String>,
}

impl Default for CallAttributes {
    fn default() -> Self {
        Self {
            url: String::new(),
            component_id: None,
            event_names: Vec::new(),
            channel: ChannelSpec::default(),
            method: HttpMethod::Get,
            form_id: None,
            multipart: false,
            extra_parameters: Vec::new(),
            request_timeout_ms: None,
            ajax_response: true,
            throttle: None,
            preconditions: Vec::new(),
            dependencies: Vec::new(),
            before_handlers: Vec::new(),
            success_handlers: Vec::new(),
            failure_handlers: Vec::new(),
            complete_handlers: Vec::new(),
            done_handlers: Vec::new(),
        }
    }
}

impl CallAttributes {
    /// Attributes for a GET on the default channel.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON attribute object.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::Malformed`] for invalid JSON or types.
    pub fn from_json(json: &str) -> Result<Self, AttributeError> {
        serde_json::from_str(json).map_err(|e| AttributeError::Malformed {
            message: e.to_string(),
        })
    }

    /// Parses an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::Malformed`] for invalid types.
    pub fn from_value(value: Value) -> Result<Self, AttributeError> {
        serde_json::from_value(value).map_err(|e| AttributeError::Malformed {
            message: e.to_string(),
        })
    }

    /// Canonicalizes derived fields.
    ///
    /// - multipart implies POST
    /// - empty ids become `None`
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.multipart {
            self.method = HttpMethod::Post;
        }
        self.component_id = self.component_id.filter(|id| !id.trim().is_empty());
        self.form_id = self.form_id.filter(|id| !id.trim().is_empty());
        self.event_names.retain(|e| !e.trim().is_empty());
        self
    }

    /// Checks that the attributes describe a callable request.
    ///
    /// # Errors
    ///
    /// [`AttributeError::MissingUrl`] for a blank URL,
    /// [`AttributeError::InvalidThrottle`] for a blank throttle id.
    pub fn validate(&self) -> Result<(), AttributeError> {
        if self.url.trim().is_empty() {
            return Err(AttributeError::MissingUrl);
        }
        if let Some(ref tr) = self.throttle {
            if tr.id.trim().is_empty() {
                return Err(AttributeError::InvalidThrottle {
                    reason: "empty id".into(),
                });
            }
        }
        Ok(())
    }

    /// Sets the triggering component.
    #[must_use]
    pub fn with_component(mut self, id: impl Into<String>) -> Self {
        self.component_id = Some(id.into());
        self
    }

    /// Sets the channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<ChannelSpec>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the submitted form.
    #[must_use]
    pub fn with_form(mut self, id: impl Into<String>) -> Self {
        self.form_id = Some(id.into());
        self
    }

    /// Routes through the iframe transport.
    #[must_use]
    pub fn multipart(mut self, multipart: bool) -> Self {
        self.multipart = multipart;
        self
    }

    /// Adds a static parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_parameters.push(Parameter::new(name, value));
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Declares whether the body is an envelope.
    #[must_use]
    pub fn expect_envelope(mut self, envelope: bool) -> Self {
        self.ajax_response = envelope;
        self
    }

    /// Throttles the call under `id`.
    #[must_use]
    pub fn with_throttle(mut self, id: impl Into<String>, delay: Duration, postpone: bool) -> Self {
        self.throttle = Some(ThrottleSettings {
            id: id.into(),
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            postpone,
        });
        self
    }

    /// Adds a script precondition.
    #[must_use]
    pub fn with_precondition_script(mut self, script: impl Into<String>) -> Self {
        self.preconditions.push(script.into());
        self
    }

    /// Adds a script dependency.
    #[must_use]
    pub fn with_dependency_script(mut self, script: impl Into<String>) -> Self {
        self.dependencies.push(script.into());
        self
    }

    /// Adds a success handler script.
    #[must_use]
    pub fn with_success_script(mut self, script: impl Into<String>) -> Self {
        self.success_handlers.push(script.into());
        self
    }

    /// Adds a failure handler script.
    #[must_use]
    pub fn with_failure_script(mut self, script: impl Into<String>) -> Self {
        self.failure_handlers.push(script.into());
        self
    }

    /// Per-call timeout, if any.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

fn one_or_many<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(de)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

fn extra_parameters<'de, D>(de: D) -> Result<Vec<Parameter>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => {
            let mut params = Vec::new();
            for (name, value) in map {
                match value {
                    Value::Array(items) => {
                        for item in items {
                            if let Some(v) = scalar(item) {
                                params.push(Parameter::new(name.clone(), v));
                            }
                        }
                    }
                    other => {
                        if let Some(v) = scalar(other) {
                            params.push(Parameter::new(name, v));
                        }
                    }
                }
            }
            Ok(params)
        }
        list @ Value::Array(_) => serde_json::from_value(list).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!(
            "extra parameters must be a map or a list, got {other}"
        ))),
    }
}

fn scalar(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ajaxflow_types::{assert_error_codes, ChannelMode};

    #[test]
    fn short_and_long_keys_are_equivalent() {
        let short = CallAttributes::from_json(
            r#"{"u":"/a","c":"x","e":"click","ch":"q|s","mt":"POST","f":"form1","rt":500,"wr":false}"#,
        )
        .unwrap();
        let long = CallAttributes::from_json(
            r#"{"url":"/a","component_id":"x","event_names":["click"],"channel":"q|s","method":"POST","form_id":"form1","request_timeout_ms":500,"ajax_response":false}"#,
        )
        .unwrap();
        assert_eq!(short, long);
        assert_eq!(short.request_timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn defaults() {
        let attrs = CallAttributes::from_json(r#"{"u":"/x"}"#).unwrap();
        assert_eq!(attrs.channel, ChannelSpec::default());
        assert_eq!(attrs.method, HttpMethod::Get);
        assert!(attrs.ajax_response);
        assert!(attrs.throttle.is_none());
        assert_eq!(attrs.request_timeout(), None);
    }

    #[test]
    fn bad_channel_falls_back() {
        let attrs = CallAttributes::from_json(r#"{"u":"/x","ch":"nonsense"}"#).unwrap();
        assert_eq!(attrs.channel.name(), "0");
        assert_eq!(attrs.channel.mode(), ChannelMode::Sequential);
    }

    #[test]
    fn extra_parameters_as_list() {
        let attrs = CallAttributes::from_json(
            r#"{"u":"/x","ep":[{"name":"a","value":"1"},{"name":"a","value":"2"}]}"#,
        )
        .unwrap();
        assert_eq!(
            attrs.extra_parameters,
            [Parameter::new("a", "1"), Parameter::new("a", "2")]
        );
    }

    #[test]
    fn extra_parameters_as_map_stringifies_scalars() {
        let attrs =
            CallAttributes::from_json(r#"{"u":"/x","ep":{"n":3,"b":true,"skip":null}}"#).unwrap();
        assert!(attrs.extra_parameters.contains(&Parameter::new("n", "3")));
        assert!(attrs.extra_parameters.contains(&Parameter::new("b", "true")));
        assert_eq!(attrs.extra_parameters.len(), 2);
    }

    #[test]
    fn extra_parameters_reject_scalars() {
        let err = CallAttributes::from_json(r#"{"u":"/x","ep":"a=1"}"#).unwrap_err();
        assert!(matches!(err, AttributeError::Malformed { .. }));
    }

    #[test]
    fn throttle_short_keys() {
        let attrs =
            CallAttributes::from_json(r#"{"u":"/x","tr":{"id":"search","d":300,"p":true}}"#).unwrap();
        let tr = attrs.throttle.unwrap();
        assert_eq!(tr.id, "search");
        assert_eq!(tr.delay(), Duration::from_millis(300));
        assert!(tr.postpone);
    }

    #[test]
    fn handler_lists_accept_single_script() {
        let attrs = CallAttributes::from_json(
            r#"{"u":"/x","pre":"return ok;","sh":["a()","b()"],"coh":null}"#,
        )
        .unwrap();
        assert_eq!(attrs.preconditions, ["return ok;"]);
        assert_eq!(attrs.success_handlers.len(), 2);
        assert!(attrs.complete_handlers.is_empty());
    }

    #[test]
    fn normalize_rules() {
        let attrs = CallAttributes::new("/x")
            .with_component("  ")
            .with_form("")
            .multipart(true)
            .normalize();
        assert_eq!(attrs.method, HttpMethod::Post);
        assert!(attrs.component_id.is_none());
        assert!(attrs.form_id.is_none());
    }

    #[test]
    fn validate_rules() {
        assert_eq!(CallAttributes::default().validate(), Err(AttributeError::MissingUrl));
        let bad = CallAttributes::new("/x").with_throttle("", Duration::from_millis(1), false);
        assert!(matches!(bad.validate(), Err(AttributeError::InvalidThrottle { .. })));
        assert!(CallAttributes::new("/x").validate().is_ok());
    }

    #[test]
    fn malformed_json() {
        let err = CallAttributes::from_json("{not json").unwrap_err();
        assert_eq!(err.code(), "ATTR_MALFORMED");
        let err = CallAttributes::from_json(r#"{"u": 5}"#).unwrap_err();
        assert!(matches!(err, AttributeError::Malformed { .. }));
    }

    #[test]
    fn serialized_form_reparses() {
        let attrs = CallAttributes::new("/x")
            .with_channel("poll|d")
            .with_parameter("k", "v")
            .with_throttle("t", Duration::from_millis(20), true);
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(CallAttributes::from_json(&json).unwrap(), attrs);
    }

    #[test]
    fn error_codes() {
        assert_error_codes(
            &[
                AttributeError::Malformed { message: "x".into() },
                AttributeError::MissingUrl,
                AttributeError::InvalidThrottle { reason: "x".into() },
            ],
            "ATTR_",
        );
    }
}

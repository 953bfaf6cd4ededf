//! Network transport seam.
//!
//! ```text
//!  AjaxCall ──► AjaxRequest ──► dyn Transport ──► AjaxResponse / TransportError
//!                                   │
//!                     ┌─────────────┴─────────────┐
//!                HttpTransport              MockTransport
//!                 (reqwest)               (crate::testing)
//! ```
//!
//! The request is fully built before it reaches the transport: GET
//! parameters are already in the URL, POST parameters are the form
//! body, and the `Ajax-*` headers are set.

mod error;
mod http;

pub use error::TransportError;
pub use http::HttpTransport;

use crate::call::{HttpMethod, Parameter};
use ajaxflow_types::CallId;
use async_trait::async_trait;
use std::time::Duration;

/// Header present on every call.
pub const AJAX_REQUEST_HEADER: &str = "Ajax-Request";
/// Header carrying the page base URL.
pub const AJAX_BASE_URL_HEADER: &str = "Ajax-Base-Url";
/// Response header asking the client to navigate away.
pub const AJAX_LOCATION_HEADER: &str = "Ajax-Location";

/// How the request leaves the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Programmatic request object.
    #[default]
    Xhr,
    /// Hidden iframe form submission (multipart).
    Iframe,
}

/// A fully built outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjaxRequest {
    /// Originating call.
    pub call_id: CallId,
    /// Final URL; for GET it includes every parameter.
    pub url: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Every parameter, in order.
    pub params: Vec<Parameter>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Transport choice.
    pub kind: TransportKind,
    /// Deadline, if any.
    pub timeout: Option<Duration>,
}

impl AjaxRequest {
    /// Form body parameters; `None` for GET.
    #[must_use]
    pub fn form_body(&self) -> Option<&[Parameter]> {
        match self.method {
            HttpMethod::Post => Some(&self.params),
            HttpMethod::Get => None,
        }
    }

    /// Header value by name (ASCII case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// First value of a parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// A completed round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjaxResponse {
    /// HTTP status.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Body text.
    pub body: String,
}

impl AjaxResponse {
    /// A 200 response with `body`.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    /// A response with an arbitrary status.
    #[must_use]
    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by name (ASCII case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Target of an `Ajax-Location` redirect, if any.
    #[must_use]
    pub fn redirect_location(&self) -> Option<&str> {
        self.header(AJAX_LOCATION_HEADER).filter(|v| !v.is_empty())
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Performs one round trip.
///
/// Implementations must return exactly once per request. A response
/// with any status is `Ok`; only failure to get a response is `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was obtained.
    async fn send(&self, request: AjaxRequest) -> Result<AjaxResponse, TransportError>;
}

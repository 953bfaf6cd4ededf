//! HTTP transport backed by `reqwest`.
//!
//! Rust owns the wire concerns here (TLS, per-request timeout, error
//! classification). Relative call URLs are resolved against an optional
//! base URL.
//!
//! Multipart calls are routed here too; without a browser there is no
//! hidden iframe, so they are sent as an ordinary form POST.

use super::{AjaxRequest, AjaxResponse, Transport, TransportError, TransportKind};
use crate::call::HttpMethod;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// `reqwest`-based [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Option<Url>,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base: None,
        }
    }

    /// Uses an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client, base: None }
    }

    /// Resolves relative URLs against `base`.
    #[must_use]
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    /// Absolute URL for `raw`.
    ///
    /// # Errors
    ///
    /// [`TransportError::InvalidUrl`] when `raw` is neither absolute nor
    /// resolvable against the base.
    pub fn resolve(&self, raw: &str) -> Result<Url, TransportError> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base
                .as_ref()
                .and_then(|base| base.join(raw).ok())
                .ok_or_else(|| TransportError::InvalidUrl(raw.to_string())),
            Err(_) => Err(TransportError::InvalidUrl(raw.to_string())),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: AjaxRequest) -> Result<AjaxResponse, TransportError> {
        let url = self.resolve(&request.url)?;
        if request.kind == TransportKind::Iframe {
            debug!(call = %request.call_id, "Multipart call sent as form POST");
        }

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url.clone()),
            HttpMethod::Post => self.client.post(url.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.form_body() {
            let pairs: Vec<(&str, &str)> = body
                .iter()
                .map(|p| (p.name.as_str(), p.value.as_str()))
                .collect();
            builder = builder.form(&pairs);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        trace!(call = %request.call_id, method = %request.method, url = %url, "Sending request");
        let resp = builder
            .send()
            .await
            .map_err(|e| classify(&e, request.timeout))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = resp
            .text()
            .await
            .map_err(|e| classify(&e, request.timeout))?;

        debug!(call = %request.call_id, status, bytes = body.len(), "Response received");
        Ok(AjaxResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(error: &reqwest::Error, timeout: Option<Duration>) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            after_ms: timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        }
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidUrl(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ajaxflow_types::CallId;

    #[test]
    fn resolves_relative_against_base() {
        let transport =
            HttpTransport::new().with_base(Url::parse("http://example.test/app/page").unwrap());
        assert_eq!(
            transport.resolve("?x=1").unwrap().as_str(),
            "http://example.test/app/page?x=1"
        );
        assert_eq!(
            transport.resolve("/other").unwrap().as_str(),
            "http://example.test/other"
        );
        assert_eq!(
            transport.resolve("https://elsewhere.test/").unwrap().host_str(),
            Some("elsewhere.test")
        );
    }

    #[test]
    fn relative_without_base_is_invalid() {
        let err = HttpTransport::new().resolve("/x").unwrap_err();
        assert_eq!(err, TransportError::InvalidUrl("/x".into()));
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect() {
        let transport = HttpTransport::new();
        let request = AjaxRequest {
            call_id: CallId::new(),
            url: "http://127.0.0.1:9/".into(),
            method: HttpMethod::Get,
            params: Vec::new(),
            headers: Vec::new(),
            kind: TransportKind::Xhr,
            timeout: Some(Duration::from_secs(5)),
        };
        let err = transport.send(request).await.unwrap_err();
        assert!(
            matches!(
                err,
                TransportError::Connect(_) | TransportError::Network(_) | TransportError::Timeout { .. }
            ),
            "unexpected {err:?}"
        );
    }
}

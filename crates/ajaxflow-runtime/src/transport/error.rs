//! Transport layer errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`TransportError::Timeout`] | `TRANSPORT_TIMEOUT` | Yes |
//! | [`TransportError::Connect`] | `TRANSPORT_CONNECT` | Yes |
//! | [`TransportError::Network`] | `TRANSPORT_NETWORK` | Yes |
//! | [`TransportError::InvalidUrl`] | `TRANSPORT_INVALID_URL` | No |
//! | [`TransportError::Aborted`] | `TRANSPORT_ABORTED` | No |
//!
//! A non-2xx status is not a transport error; the transport returns the
//! response and the call decides.

use ajaxflow_types::ErrorCode;
use thiserror::Error;

/// Failure to complete a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the deadline.
    #[error("request timed out after {after_ms}ms")]
    Timeout {
        /// Deadline that elapsed.
        after_ms: u64,
    },
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The connection broke mid-exchange.
    #[error("network error: {0}")]
    Network(String),
    /// The URL cannot be resolved.
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    /// The request was cancelled before completing.
    #[error("request aborted")]
    Aborted,
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "TRANSPORT_TIMEOUT",
            Self::Connect(_) => "TRANSPORT_CONNECT",
            Self::Network(_) => "TRANSPORT_NETWORK",
            Self::InvalidUrl(_) => "TRANSPORT_INVALID_URL",
            Self::Aborted => "TRANSPORT_ABORTED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connect(_) | Self::Network(_)
        )
    }
}

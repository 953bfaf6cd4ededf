//! Call failure and outcome types.

use super::AttributeError;
use crate::response::{EnvelopeError, ProcessReport};
use crate::transport::TransportError;
use ajaxflow_types::ErrorCode;
use thiserror::Error;

/// Why a call took its failure path.
///
/// # Error Codes
///
/// | Variant | Code | Recoverable |
/// |---------|------|-------------|
/// | [`CallError::Transport`] | inner `TRANSPORT_*` code | inner |
/// | [`CallError::Envelope`] | inner `ENVELOPE_*` code | No |
/// | [`CallError::Attributes`] | inner `ATTR_*` code | No |
/// | [`CallError::Status`] | `CALL_HTTP_STATUS` | status >= 500 |
/// | [`CallError::NoRuntime`] | `CALL_NO_RUNTIME` | No |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// No response was obtained.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The body was not a valid envelope.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// The attribute object could not describe a request.
    #[error(transparent)]
    Attributes(#[from] AttributeError),
    /// The server answered with a non-2xx status.
    #[error("server answered with status {status}")]
    Status {
        /// HTTP status.
        status: u16,
    },
    /// The channel granted the call outside an async runtime.
    #[error("no async runtime available to execute the call")]
    NoRuntime,
}

impl ErrorCode for CallError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.code(),
            Self::Envelope(e) => e.code(),
            Self::Attributes(e) => e.code(),
            Self::Status { .. } => "CALL_HTTP_STATUS",
            Self::NoRuntime => "CALL_NO_RUNTIME",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::Envelope(e) => e.is_recoverable(),
            Self::Attributes(e) => e.is_recoverable(),
            Self::Status { status } => *status >= 500,
            Self::NoRuntime => false,
        }
    }
}

/// How a call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// A 2xx response was handled.
    Completed {
        /// HTTP status.
        status: u16,
        /// What the envelope did; `None` when no envelope was processed.
        report: Option<ProcessReport>,
    },
    /// The failure path ran.
    Failed(CallError),
    /// A precondition rejected the call before scheduling.
    Cancelled,
    /// A newer call replaced this one while it was queued.
    Superseded,
    /// The channel was busy in active mode.
    Ignored,
    /// The runtime shut down before the call ran.
    Aborted,
}

impl CallOutcome {
    /// Whether a request was issued and succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Whether the call never reached the network.
    #[must_use]
    pub fn never_ran(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Superseded | Self::Ignored | Self::Aborted
        )
    }

    /// The failure cause, if any.
    #[must_use]
    pub fn error(&self) -> Option<&CallError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ajaxflow_types::assert_error_code;

    #[test]
    fn codes_delegate_to_cause() {
        assert_eq!(
            CallError::from(TransportError::Timeout { after_ms: 10 }).code(),
            "TRANSPORT_TIMEOUT"
        );
        assert_eq!(
            CallError::from(EnvelopeError::MissingRoot { found: None }).code(),
            "ENVELOPE_MISSING_ROOT"
        );
        assert_eq!(CallError::from(AttributeError::MissingUrl).code(), "ATTR_MISSING_URL");
        assert_error_code(&CallError::Status { status: 404 }, "CALL_");
        assert_error_code(&CallError::NoRuntime, "CALL_");
    }

    #[test]
    fn recoverability() {
        assert!(CallError::Status { status: 503 }.is_recoverable());
        assert!(!CallError::Status { status: 404 }.is_recoverable());
        assert!(CallError::from(TransportError::Timeout { after_ms: 1 }).is_recoverable());
        assert!(!CallError::NoRuntime.is_recoverable());
    }

    #[test]
    fn outcome_helpers() {
        assert!(CallOutcome::Completed {
            status: 200,
            report: None
        }
        .is_completed());
        assert!(CallOutcome::Superseded.never_ran());
        assert!(!CallOutcome::Failed(CallError::NoRuntime).never_ran());
        assert_eq!(
            CallOutcome::Failed(CallError::NoRuntime).error(),
            Some(&CallError::NoRuntime)
        );
    }
}

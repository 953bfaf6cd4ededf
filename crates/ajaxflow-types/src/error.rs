//! Error-code contract shared by every ajaxflow layer.
//!
//! Each layer owns its own `thiserror` enum (channel, dom, transport,
//! call, config...). They all implement [`ErrorCode`] so that failure
//! handlers, logs and the CLI can branch on a stable string instead of
//! matching on foreign enums.
//!
//! # Code Format
//!
//! ```text
//! TRANSPORT_TIMEOUT
//! └───┬───┘ └──┬──┘
//!   prefix   variant
//! ```
//!
//! - UPPER_SNAKE_CASE, no leading/trailing/double underscores
//! - Prefixed with the owning layer (`CHANNEL_`, `DOM_`, `ENVELOPE_`, ...)
//! - Stable once published
//!
//! # Example
//!
//! ```
//! use ajaxflow_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Timeout,
//!     BadStatus(u16),
//! }
//!
//! impl ErrorCode for FetchError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Timeout => "FETCH_TIMEOUT",
//!             Self::BadStatus(_) => "FETCH_BAD_STATUS",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         match self {
//!             Self::Timeout => true,
//!             Self::BadStatus(status) => *status >= 500,
//!         }
//!     }
//! }
//!
//! assert_eq!(FetchError::Timeout.code(), "FETCH_TIMEOUT");
//! assert!(!FetchError::BadStatus(404).is_recoverable());
//! ```

use std::collections::HashSet;

/// Machine-readable identity of an error.
///
/// # Recoverability
///
/// `is_recoverable` answers one question: would issuing the same call
/// again have a chance to succeed? Timeouts and dropped connections
/// say yes. Malformed envelopes, unknown channel modes and missing
/// configuration files say no.
pub trait ErrorCode {
    /// Stable UPPER_SNAKE_CASE code, prefixed with the owning layer.
    fn code(&self) -> &'static str;

    /// Whether a retry of the same operation may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that `err` carries a well-formed code starting with `expected_prefix`.
///
/// # Panics
///
/// Panics when the code is empty, lacks the prefix, or is not
/// UPPER_SNAKE_CASE.
///
/// # Example
///
/// ```
/// use ajaxflow_types::{assert_error_code, ErrorCode};
///
/// struct Gone;
///
/// impl ErrorCode for Gone {
///     fn code(&self) -> &'static str { "DOM_GONE" }
///     fn is_recoverable(&self) -> bool { false }
/// }
///
/// assert_error_code(&Gone, "DOM_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Runs [`assert_error_code`] over every variant in `errors`.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Asserts that no two variants in `errors` share a code.
///
/// # Panics
///
/// Panics on the first duplicated code.
pub fn assert_unique_error_codes<E: ErrorCode>(errors: &[E]) {
    let mut seen = HashSet::new();
    for err in errors {
        let code = err.code();
        assert!(seen.insert(code), "Error code '{code}' is used twice");
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

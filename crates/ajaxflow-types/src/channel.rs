//! Channel naming: `"name|mode"` tokens.
//!
//! # Grammar
//!
//! ```text
//! spec := name "|" mode
//! name := one or more chars except '|'
//! mode := "s" | "d" | "a"
//! ```
//!
//! Widgets hand channel specs around as plain strings. A token that
//! does not follow the grammar is not an error at call time: it maps to
//! the default channel `0|s` and a warning is logged. Code that wants to
//! reject bad tokens uses [`ChannelSpec::parse`].

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// The channel every call uses unless it names another one.
pub const DEFAULT_CHANNEL: &str = "0|s";

/// Scheduling policy of a channel while it is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelMode {
    /// `s`: queue new entries, run them FIFO.
    #[default]
    Sequential,
    /// `d`: keep only the newest not-yet-started entry.
    Drop,
    /// `a`: ignore new entries while one is active.
    Active,
}

impl ChannelMode {
    /// Parses the one-letter mode.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Sequential),
            'd' => Some(Self::Drop),
            'a' => Some(Self::Active),
            _ => None,
        }
    }

    /// The one-letter form used on the wire.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Sequential => 's',
            Self::Drop => 'd',
            Self::Active => 'a',
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Rejection reasons of the strict parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelSpecError {
    /// No `|` separator in the token.
    #[error("channel spec '{0}' is not of the form name|mode")]
    MissingSeparator(String),

    /// Nothing before the separator.
    #[error("channel spec '{0}' has an empty name")]
    EmptyName(String),

    /// Mode is not one of `s`, `d`, `a`.
    #[error("channel spec '{spec}' has unknown mode '{mode}'")]
    UnknownMode {
        /// The full token.
        spec: String,
        /// Everything after the separator.
        mode: String,
    },
}

impl ErrorCode for ChannelSpecError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingSeparator(_) => "CHANNEL_SPEC_MISSING_SEPARATOR",
            Self::EmptyName(_) => "CHANNEL_SPEC_EMPTY_NAME",
            Self::UnknownMode { .. } => "CHANNEL_SPEC_UNKNOWN_MODE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// A parsed channel token.
///
/// Serializes as the `"name|mode"` string. Deserialization is lenient,
/// like attribute objects coming from widgets: malformed tokens become
/// the default channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChannelSpec {
    name: String,
    mode: ChannelMode,
}

impl ChannelSpec {
    /// Builds a spec from parts.
    #[must_use]
    pub fn new(name: impl Into<String>, mode: ChannelMode) -> Self {
        Self {
            name: name.into(),
            mode,
        }
    }

    /// Strict parse.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelSpecError`] when `token` does not follow `name|mode`.
    pub fn parse(token: &str) -> Result<Self, ChannelSpecError> {
        let (name, mode) = token
            .split_once('|')
            .ok_or_else(|| ChannelSpecError::MissingSeparator(token.to_string()))?;

        if name.is_empty() {
            return Err(ChannelSpecError::EmptyName(token.to_string()));
        }

        let mut chars = mode.chars();
        let parsed = match (chars.next(), chars.next()) {
            (Some(c), None) => ChannelMode::from_char(c),
            _ => None,
        };

        match parsed {
            Some(mode) => Ok(Self::new(name, mode)),
            None => Err(ChannelSpecError::UnknownMode {
                spec: token.to_string(),
                mode: mode.to_string(),
            }),
        }
    }

    /// Parses `token`, falling back to [`DEFAULT_CHANNEL`] on any error.
    ///
    /// An empty token is the default channel without a warning.
    #[must_use]
    pub fn parse_lenient(token: &str) -> Self {
        if token.is_empty() {
            return Self::default();
        }
        match Self::parse(token) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(spec = %token, error = %e, "Malformed channel spec, using default channel");
                Self::default()
            }
        }
    }

    /// Channel name (the registry key).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scheduling policy.
    #[must_use]
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }
}

impl Default for ChannelSpec {
    fn default() -> Self {
        Self::new("0", ChannelMode::Sequential)
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.mode)
    }
}

impl From<String> for ChannelSpec {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<&str> for ChannelSpec {
    fn from(value: &str) -> Self {
        Self::parse_lenient(value)
    }
}

impl From<ChannelSpec> for String {
    fn from(value: ChannelSpec) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for ChannelSpec {
    type Err = ChannelSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//! Configuration errors.

use ajaxflow_types::ErrorCode;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Filesystem step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Read,
    Write,
    CreateDir,
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read config file",
            Self::Write => "write config file",
            Self::CreateDir => "create config directory",
        })
    }
}

/// Configuration error type.
///
/// | Variant | Code |
/// |---------|------|
/// | `File { op: Read }` | `CONFIG_READ_FILE` |
/// | `File { op: Write }` | `CONFIG_WRITE_FILE` |
/// | `File { op: CreateDir }` | `CONFIG_CREATE_DIR` |
/// | `ParseToml` | `CONFIG_PARSE_TOML` |
/// | `Serialize` | `CONFIG_SERIALIZE` |
/// | `InvalidEnvVar` | `CONFIG_INVALID_ENV_VAR` |
///
/// None of them are recoverable: a retry reads the same bytes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot {op} '{}': {source}", path.display())]
    File {
        op: FileOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in '{}': {source}", path.display())]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `value` is the rejected text, `expected` what would have parsed.
    #[error("{name}={value:?} is not a valid {expected}")]
    InvalidEnvVar {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn file(op: FileOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            op,
            path: path.into(),
            source,
        }
    }

    /// The file involved, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path, .. } | Self::ParseToml { path, .. } => Some(path),
            Self::Serialize(_) | Self::InvalidEnvVar { .. } => None,
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::File { op: FileOp::Read, .. } => "CONFIG_READ_FILE",
            Self::File { op: FileOp::Write, .. } => "CONFIG_WRITE_FILE",
            Self::File {
                op: FileOp::CreateDir,
                ..
            } => "CONFIG_CREATE_DIR",
            Self::ParseToml { .. } => "CONFIG_PARSE_TOML",
            Self::Serialize(_) => "CONFIG_SERIALIZE",
            Self::InvalidEnvVar { .. } => "CONFIG_INVALID_ENV_VAR",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

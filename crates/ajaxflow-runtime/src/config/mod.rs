//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌──────────────────────────────────────────────┐
//! │  1. Environment Variables (AJAXFLOW_*)       │  Runtime override
//! ├──────────────────────────────────────────────┤
//! │  2. Project Config (.ajaxflow/config.toml)   │  Project-specific
//! ├──────────────────────────────────────────────┤
//! │  3. Global Config (~/.ajaxflow/config.toml)  │  User defaults
//! ├──────────────────────────────────────────────┤
//! │  4. Default Values (compile-time)            │  Fallback
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `AJAXFLOW_BASE_URL` | `base_url` | String |
//! | `AJAXFLOW_DEFAULT_CHANNEL` | `default_channel` | String |
//! | `AJAXFLOW_REQUEST_TIMEOUT_MS` | `call.request_timeout_ms` | u64 |
//! | `AJAXFLOW_STRIP_SESSION_ID` | `head.strip_session_id` | bool |
//! | `AJAXFLOW_LOG_FILE` | `logging.file_path` (enables `logging.file`) | PathBuf |
//!
//! # Example Configuration
//!
//! ```toml
//! # ~/.ajaxflow/config.toml
//! base_url = "http://localhost:8080/app/"
//! default_channel = "0|s"
//!
//! [call]
//! request_timeout_ms = 0
//! check_presence = true
//! ajax_response_default = true
//!
//! [throttle]
//! default_delay_ms = 500
//!
//! [head]
//! strip_session_id = true
//!
//! [logging]
//! file = false
//! file_level = "debug"
//!
//! [websocket]
//! process_envelopes = true
//! ```

mod error;
mod loader;
mod resolver;
mod types;

pub use error::{ConfigError, FileOp};
pub use loader::{save_config, save_global_config, ConfigLoader};
pub use resolver::{ConfigResolver, NoOpResolver};
pub use types::{
    AjaxConfig, CallConfig, HeadConfig, LoggingConfig, ThrottleConfig, WebSocketConfig,
};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".ajaxflow")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".ajaxflow";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";

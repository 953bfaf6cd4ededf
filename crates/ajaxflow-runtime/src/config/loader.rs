//! Layered configuration loading.
//!
//! Defaults, then the global file, then the project file, then
//! `AJAXFLOW_*` variables. A file layer only overrides values it sets
//! away from the defaults; missing files are skipped.

use super::error::FileOp;
use super::{default_config_path, AjaxConfig, ConfigError, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where `AJAXFLOW_*` values come from.
#[derive(Debug, Clone, Default)]
enum EnvSource {
    #[default]
    Process,
    Fixed(HashMap<String, String>),
    Off,
}

impl EnvSource {
    fn get(&self, name: &str) -> Option<String> {
        match self {
            Self::Process => std::env::var(name).ok(),
            Self::Fixed(vars) => vars.get(name).cloned(),
            Self::Off => None,
        }
    }
}

type EnvApply = fn(&mut AjaxConfig, &str) -> Result<(), &'static str>;

/// Every supported variable with the field it sets.
const ENV_OVERRIDES: &[(&str, EnvApply)] = &[
    ("AJAXFLOW_BASE_URL", |c, v| {
        c.base_url = Some(v.to_string()).filter(|v| !v.is_empty());
        Ok(())
    }),
    ("AJAXFLOW_DEFAULT_CHANNEL", |c, v| {
        c.default_channel = v.to_string();
        Ok(())
    }),
    ("AJAXFLOW_REQUEST_TIMEOUT_MS", |c, v| {
        c.call.request_timeout_ms = v.trim().parse().map_err(|_| "integer")?;
        Ok(())
    }),
    ("AJAXFLOW_STRIP_SESSION_ID", |c, v| {
        c.head.strip_session_id = parse_flag(v).ok_or("bool")?;
        Ok(())
    }),
    ("AJAXFLOW_LOG_FILE", |c, v| {
        c.logging.file = true;
        c.logging.file_path = Some(PathBuf::from(v));
        Ok(())
    }),
];

/// Builder for a layered [`AjaxConfig`].
///
/// ```no_run
/// use ajaxflow_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/srv/app")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), ajaxflow_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    global: Option<PathBuf>,
    project_root: Option<PathBuf>,
    env: EnvSource,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the global layer from `path` instead of `~/.ajaxflow/config.toml`.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global = Some(path.into());
        self
    }

    /// Enables the project layer at `<root>/.ajaxflow/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Takes `AJAXFLOW_*` values from `vars` instead of the process
    /// environment.
    #[must_use]
    pub fn with_env_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env = EnvSource::Fixed(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.env = EnvSource::Off;
        self
    }

    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Config files this loader consults, lowest priority first.
    #[must_use]
    pub fn file_layers(&self) -> Vec<PathBuf> {
        let mut layers = Vec::with_capacity(2);
        if !self.skip_global {
            layers.push(self.global.clone().unwrap_or_else(default_config_path));
        }
        if let (false, Some(root)) = (self.skip_project, self.project_root.as_ref()) {
            layers.push(root.join(PROJECT_CONFIG_DIR).join(PROJECT_CONFIG_FILE));
        }
        layers
    }

    /// Builds the merged configuration.
    ///
    /// # Errors
    ///
    /// An existing file that cannot be read or parsed, or an
    /// `AJAXFLOW_*` value of the wrong type.
    pub fn load(&self) -> Result<AjaxConfig, ConfigError> {
        let mut config = AjaxConfig::default();

        for path in self.file_layers() {
            if let Some(layer) = read_layer(&path)? {
                debug!(path = %path.display(), "Config layer applied");
                config.merge(&layer);
            }
        }

        for &(name, apply) in ENV_OVERRIDES {
            let Some(value) = self.env.get(name) else {
                continue;
            };
            apply(&mut config, &value).map_err(|expected| ConfigError::InvalidEnvVar {
                name,
                value: value.clone(),
                expected,
            })?;
            debug!(var = name, "Config override from environment");
        }

        Ok(config)
    }
}

fn read_layer(path: &Path) -> Result<Option<AjaxConfig>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::file(FileOp::Read, path, e)),
    };
    AjaxConfig::from_toml(&content)
        .map(Some)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
}

/// `true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`, any case.
fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Writes `config` to the global config file.
///
/// # Errors
///
/// See [`save_config`].
pub fn save_global_config(config: &AjaxConfig) -> Result<(), ConfigError> {
    save_config(config, &default_config_path())
}

/// Writes `config` as TOML to `path`, creating missing parent
/// directories.
///
/// # Errors
///
/// Serialization or filesystem failures.
pub fn save_config(config: &AjaxConfig, path: &Path) -> Result<(), ConfigError> {
    let toml = config.to_toml()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::file(FileOp::CreateDir, parent, e))?;
    }
    std::fs::write(path, toml).map_err(|e| ConfigError::file(FileOp::Write, path, e))
}

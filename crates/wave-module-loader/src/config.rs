//! Loader configuration

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Unknown file extension
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// The content did not parse
    #[error("Failed to parse {format}: {message}")]
    Parse {
        /// Format being parsed
        format: ConfigFormat,
        /// Parser diagnostic
        message: String,
    },

    /// A referenced environment variable is unset and has no default
    #[error("Environment variable '{0}' not set and no default provided")]
    MissingEnvVar(String),

    /// The configuration parsed but is not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Config result type
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// How `reload` replaces a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadStrategy {
    /// Unload and load under one critical section; the module is never
    /// observably absent
    #[default]
    Atomic,
    /// Release the controller lock between unload and load; other threads
    /// may observe the module as absent, or load the path themselves
    ReleaseLock,
}

/// File watcher settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Reload modules when their library file changes
    #[serde(default)]
    pub enabled: bool,

    /// Minimum delay between two reloads triggered by the watcher
    #[serde(default = "default_debounce", with = "humantime_serde")]
    pub debounce: Duration,
}

fn default_debounce() -> Duration {
    Duration::from_secs(1)
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce: default_debounce(),
        }
    }
}

/// Module loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Libraries to load at startup, in order
    #[serde(default)]
    pub modules: Vec<PathBuf>,

    /// Reload behavior
    #[serde(default)]
    pub reload_strategy: ReloadStrategy,

    /// File watcher
    #[serde(default)]
    pub watch: WatchConfig,
}

impl LoaderConfig {
    /// Load and validate a configuration file
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let format = ConfigFormat::from_path(path)?;
        let config = Self::load_from_str(&content, format)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a string after expanding environment variables
    pub fn load_from_str(content: &str, format: ConfigFormat) -> ConfigResult<Self> {
        let expanded = expand_env_vars(content)?;

        let parse_error = |message: String| ConfigError::Parse { format, message };

        match format {
            ConfigFormat::Yaml => {
                serde_yaml::from_str(&expanded).map_err(|e| parse_error(e.to_string()))
            }
            ConfigFormat::Toml => toml::from_str(&expanded).map_err(|e| parse_error(e.to_string())),
            ConfigFormat::Json => {
                serde_json::from_str(&expanded).map_err(|e| parse_error(e.to_string()))
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();

        for path in &self.modules {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "module path cannot be empty".to_string(),
                ));
            }

            if !seen.insert(path) {
                return Err(ConfigError::Invalid(format!(
                    "module path listed twice: {}",
                    path.display()
                )));
            }
        }

        if self.watch.enabled && self.watch.debounce.is_zero() {
            tracing::warn!("watch.debounce is zero; every file event triggers a reload");
        }

        Ok(())
    }
}

/// Supported configuration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigFormat::Yaml => write!(f, "YAML"),
            ConfigFormat::Toml => write!(f, "TOML"),
            ConfigFormat::Json => write!(f, "JSON"),
        }
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references
fn expand_env_vars(content: &str) -> ConfigResult<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| ConfigError::Invalid(format!("Invalid regex: {e}")))?;

    let mut result = String::with_capacity(content.len());
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let var_name = var_name.as_str();

        let value = match env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(3) {
                Some(default) => default.as_str().to_string(),
                None => return Err(ConfigError::MissingEnvVar(var_name.to_string())),
            },
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

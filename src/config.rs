//! Configuration file parser for ~/.config/lede/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`,
//! which runs in standalone (local) mode against a cache in the config
//! directory. Unknown keys are silently ignored by serde.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which transport talks to the News service. Exactly one is active per
/// process; switching modes requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Cookie-based app session established once at startup.
    Session,
    /// HTTP basic auth on every request.
    Credentials,
    /// No remote; the cache is the only truth.
    #[default]
    Local,
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. The custom Debug impl masks `password` so credentials never
/// leak into logs or error output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the News service API root.
    pub server_url: String,

    /// Transport mode: "session", "credentials", or "local".
    pub mode: TransportMode,

    /// Account name for the networked modes.
    pub username: String,

    /// Account password for the networked modes.
    pub password: Option<String>,

    /// Path of the SQLite cache. Empty = `<config dir>/cache.db`.
    pub database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            mode: TransportMode::Local,
            username: String::new(),
            password: None,
            database_path: String::new(),
        }
    }
}

/// Mask `password` in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url)
            .field("mode", &self.mode)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database_path", &self.database_path)
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The config directory path (~/.config/lede/).
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HOME environment variable not set",
            ))
        })?;
        Ok(PathBuf::from(home).join(".config").join("lede"))
    }

    /// Resolved cache path: the configured one, or the default next to the
    /// config file.
    pub fn resolved_database_path(&self) -> Result<PathBuf, ConfigError> {
        if self.database_path.is_empty() {
            Ok(Self::config_dir()?.join("cache.db"))
        } else {
            Ok(PathBuf::from(&self.database_path))
        }
    }
}

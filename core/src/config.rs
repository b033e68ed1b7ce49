use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DepotError, Result};
use crate::security::InsecureOptions;

/// Depot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Root directory of the image store
    pub store_dir: PathBuf,

    /// Security checks to skip
    pub insecure_options: InsecureOptions,

    /// Verbose per-fetch diagnostics
    pub debug: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            insecure_options: InsecureOptions::none(),
            debug: false,
            log_level: LogLevel::Warn,
        }
    }
}

impl DepotConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            DepotError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: DepotConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                tracing::debug!(path = %p.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Overlay `DEPOT_*` environment variables.
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("DEPOT_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        if let Ok(debug) = std::env::var("DEPOT_DEBUG") {
            self.debug = matches!(debug.as_str(), "1" | "true" | "yes");
        }
        if let Ok(opts) = std::env::var("DEPOT_INSECURE_OPTIONS") {
            self.insecure_options = opts.parse()?;
        }
        Ok(self)
    }
}

/// Default store location (~/.depot/store).
pub fn default_store_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".depot"))
        .unwrap_or_else(|| PathBuf::from(".depot"))
        .join("store")
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

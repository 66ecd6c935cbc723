//! Runtime configuration for the bindings.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. a JSON file: `$MEDIA_BRIDGE_CONFIG`, else `<config dir>/media-bridge/config.json` if present
//! 3. `MEDIA_BRIDGE_TIMEOUT_MS` / `MEDIA_BRIDGE_STRIP_FILE_SCHEME` environment variables

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "MEDIA_BRIDGE_CONFIG";
pub const TIMEOUT_ENV: &str = "MEDIA_BRIDGE_TIMEOUT_MS";
pub const STRIP_FILE_SCHEME_ENV: &str = "MEDIA_BRIDGE_STRIP_FILE_SCHEME";

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(String),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "Failed to read config {}: {}", path.display(), e),
            Self::Parse(msg) => write!(f, "Invalid config file: {}", msg),
            Self::InvalidValue { key, value } => write!(f, "Invalid value for {}: {}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for String {
    fn from(err: ConfigError) -> Self {
        err.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Deadline for deferred calls. `None` waits for the native side indefinitely.
    pub deferred_timeout_ms: Option<u64>,
    /// Remove a leading `file://` from locators (iOS recording paths need bare absolute paths).
    pub strip_file_scheme: bool,
    /// Service name of the media plugin in the native host.
    pub media_service: String,
    /// Service name of the tracking plugin in the native host.
    pub tracking_service: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            deferred_timeout_ms: None,
            strip_file_scheme: false,
            media_service: "Media".to_string(),
            tracking_service: "Rover".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from the config file (if any) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_json(&raw)?;
        tracing::info!("Loaded bridge config from {}", path.display());
        Ok(config)
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(explicit));
        }
        let default = dirs::config_dir()?.join("media-bridge").join("config.json");
        default.exists().then_some(default)
    }

    /// Apply `MEDIA_BRIDGE_*` overrides looked up through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: TIMEOUT_ENV.to_string(),
                value: raw.clone(),
            })?;
            // 0 disables the deadline
            self.deferred_timeout_ms = (ms > 0).then_some(ms);
        }

        if let Some(raw) = lookup(STRIP_FILE_SCHEME_ENV) {
            self.strip_file_scheme = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: STRIP_FILE_SCHEME_ENV.to_string(),
                        value: raw,
                    })
                }
            };
        }

        Ok(())
    }

    pub fn deferred_timeout(&self) -> Option<Duration> {
        self.deferred_timeout_ms.map(Duration::from_millis)
    }
}

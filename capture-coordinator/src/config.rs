//! Coordinator configuration.
//!
//! Loads from a TOML file and falls back to defaults for anything
//! missing, so a partial config file is always valid.

use capture_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub sniffer: SnifferConfig,

    /// Knobs forwarded to the per-tab engine instances.
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bound on every capped history buffer.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            history_cap: default_history_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Endpoint that receives completed sessions.
    #[serde(default = "default_session_endpoint")]
    pub session_endpoint: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            session_endpoint: default_session_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Path to the state database. `None` puts it under the platform
    /// data directory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("capture-coordinator")
                .join("state.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnifferConfig {
    /// MIME patterns worth caching; a trailing `*` matches any suffix.
    #[serde(default = "crate::sniffer::default_interest")]
    pub mimes: Vec<String>,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            mimes: crate::sniffer::default_interest(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_history_cap() -> usize {
    50
}

fn default_session_endpoint() -> String {
    "http://127.0.0.1:8787/api/sessions".to_string()
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capture-coordinator")
            .join("config.toml")
    }
}

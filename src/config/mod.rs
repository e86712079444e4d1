//! Configuration module for serialscope-rs
//!
//! Configuration is read once at startup and is immutable afterwards. The
//! binary splits [`AppConfig`] into its sections and hands each component the
//! section it needs.
//!
//! # App Data Location
//!
//! The configuration file and log files live in the platform-appropriate
//! data directory under `dev.serialscope.serialscope-rs`:
//! - **Linux**: `~/.local/share/dev.serialscope.serialscope-rs/`
//! - **macOS**: `~/Library/Application Support/dev.serialscope.serialscope-rs/`
//! - **Windows**: `%APPDATA%\dev.serialscope.serialscope-rs\`
//!
//! The `SERIALSCOPE_CONFIG` environment variable points at a different file.
//!
//! # Example
//!
//! ```toml
//! [storage]
//! backend = "remote"
//!
//! [storage.remote]
//! url = "http://localhost:8086"
//! token = "my-token"
//! org = "myorg"
//! bucket = "mybucket"
//!
//! [serial]
//! read_chunk_size = 128
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.serialscope.serialscope-rs";

/// Configuration filename inside the app data directory
pub const CONFIG_FILE: &str = "config.toml";

/// Log directory name inside the app data directory
pub const LOG_DIR: &str = "logs";

/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "SERIALSCOPE_CONFIG";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        BridgeError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            BridgeError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Resolve the configuration file path (environment override first)
pub fn config_path() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => app_data_dir().map(|p| p.join(CONFIG_FILE)),
    }
}

// ==================== App Config ====================

/// Complete startup configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage engine settings
    pub storage: StorageConfig,
    /// Serial port manager settings
    pub serial: SerialConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::from_toml(&content).map_err(|e| e.with_context(format!("{:?}", path)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            tracing::warn!("Could not determine config path, using defaults");
            return Self::default();
        };

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BridgeError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, content)
            .map_err(|e| BridgeError::Config(format!("Failed to write config file: {}", e)))
    }
}

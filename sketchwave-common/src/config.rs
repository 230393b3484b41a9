//! Configuration file loading
//!
//! Locates and parses the SketchWave TOML configuration file. Resolution
//! order for the file path:
//! 1. `SKETCHWAVE_CONFIG` environment variable (highest priority)
//! 2. Platform config directory (`~/.config/sketchwave/config.toml` etc.)
//! 3. `/etc/sketchwave/config.toml` (Linux system-wide)
//!
//! A missing file is not an error: callers receive `TomlConfig::default()`
//! and fall back to environment variables for individual settings.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// TOML configuration file contents
///
/// Every field is optional; service-level resolution (ENV → TOML) decides
/// which source wins and which settings are mandatory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// API key for the vision-language service
    pub vision_api_key: Option<String>,
    /// Base URL for the vision-language service
    pub vision_base_url: Option<String>,
    /// Model name for vision-language calls
    pub vision_model: Option<String>,
    /// API key for the async compose service
    pub compose_api_key: Option<String>,
    /// Base URL for the async compose service
    pub compose_base_url: Option<String>,
    /// HTTP listen port
    pub listen_port: Option<u16>,
    /// Poll interval for composition tasks, milliseconds
    pub poll_interval_ms: Option<u64>,
    /// Poll attempt ceiling for composition tasks
    pub poll_max_attempts: Option<u32>,
}

impl TomlConfig {
    /// Load configuration from the resolved config file path
    ///
    /// Returns `TomlConfig::default()` when no config file exists.
    /// Returns an error only when a file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let Some(path) = resolve_config_path() else {
            debug!("No config file found, using defaults");
            return Ok(Self::default());
        };

        info!(path = %path.display(), "Loading config file");
        let contents = std::fs::read_to_string(&path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Resolve the config file path, returning None when no file exists
fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SKETCHWAVE_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        return None;
    }

    if let Some(dir) = dirs::config_dir() {
        let user_config = dir.join("sketchwave").join("config.toml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/sketchwave/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

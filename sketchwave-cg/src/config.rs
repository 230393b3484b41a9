//! Configuration resolution for sketchwave-cg
//!
//! Two-tier resolution with ENV → TOML priority for every setting. API keys
//! are validated at startup so a misconfigured service fails fast with a
//! clear message instead of failing on the first generation request.

use crate::clients::compose::DEFAULT_COMPOSE_BASE_URL;
use crate::clients::vision::{DEFAULT_VISION_BASE_URL, DEFAULT_VISION_MODEL};
use crate::types::PollPlan;
use sketchwave_common::config::TomlConfig;
use sketchwave_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Default HTTP listen port for the composition generator service
pub const DEFAULT_LISTEN_PORT: u16 = 5731;

/// Resolved service configuration, read-only after startup
#[derive(Debug, Clone)]
pub struct CgConfig {
    pub listen_port: u16,
    pub vision_api_key: String,
    pub vision_base_url: String,
    pub vision_model: String,
    pub compose_api_key: String,
    pub compose_base_url: String,
    pub poll: PollPlan,
}

impl CgConfig {
    /// Resolve configuration from environment variables and the TOML file
    ///
    /// Fails when either external-service API key is missing or invalid.
    pub fn resolve(toml_config: &TomlConfig) -> Result<Self> {
        let vision_api_key = resolve_api_key(
            "vision",
            "SKETCHWAVE_VISION_API_KEY",
            toml_config.vision_api_key.as_deref(),
        )?;
        let compose_api_key = resolve_api_key(
            "compose",
            "SKETCHWAVE_COMPOSE_API_KEY",
            toml_config.compose_api_key.as_deref(),
        )?;

        let poll = PollPlan {
            max_attempts: toml_config
                .poll_max_attempts
                .unwrap_or_else(|| PollPlan::default().max_attempts),
            interval: toml_config
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| PollPlan::default().interval),
        };

        Ok(Self {
            listen_port: toml_config.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
            vision_api_key,
            vision_base_url: resolve_optional(
                "SKETCHWAVE_VISION_BASE_URL",
                toml_config.vision_base_url.as_deref(),
                DEFAULT_VISION_BASE_URL,
            ),
            vision_model: resolve_optional(
                "SKETCHWAVE_VISION_MODEL",
                toml_config.vision_model.as_deref(),
                DEFAULT_VISION_MODEL,
            ),
            compose_api_key,
            compose_base_url: resolve_optional(
                "SKETCHWAVE_COMPOSE_BASE_URL",
                toml_config.compose_base_url.as_deref(),
                DEFAULT_COMPOSE_BASE_URL,
            ),
            poll,
        })
    }
}

/// Resolve a mandatory API key with ENV → TOML priority
fn resolve_api_key(service: &str, env_var: &str, toml_key: Option<&str>) -> Result<String> {
    let env_key = std::env::var(env_var).ok();

    let mut sources = Vec::new();
    if env_key.as_deref().map(is_valid_key).unwrap_or(false) {
        sources.push("environment");
    }
    if toml_key.map(is_valid_key).unwrap_or(false) {
        sources.push("TOML");
    }
    if sources.len() > 1 {
        warn!(
            "{} API key found in multiple sources: {}. Using environment (highest priority).",
            service,
            sources.join(", ")
        );
    }

    if let Some(key) = env_key {
        if is_valid_key(&key) {
            info!("{} API key loaded from environment variable", service);
            return Ok(key);
        }
    }

    if let Some(key) = toml_key {
        if is_valid_key(key) {
            info!("{} API key loaded from TOML config", service);
            return Ok(key.to_string());
        }
    }

    Err(Error::Config(format!(
        "{} API key not configured. Set {} or add it to the config file.",
        service, env_var
    )))
}

/// Resolve an optional setting with ENV → TOML → default priority
fn resolve_optional(env_var: &str, toml_value: Option<&str>, default: &str) -> String {
    if let Ok(value) = std::env::var(env_var) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    toml_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

/// Basic sanity check: non-empty, no embedded whitespace
fn is_valid_key(key: &str) -> bool {
    let trimmed = key.trim();
    !trimmed.is_empty() && !trimmed.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation_rejects_blank_and_spaced() {
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
        assert!(!is_valid_key("two words"));
        assert!(is_valid_key("vk-0123456789"));
    }

    #[test]
    fn resolve_uses_toml_keys_and_defaults() {
        // Env resolution is process-global, so this test only exercises the
        // TOML tier and built-in defaults.
        let toml_config = TomlConfig {
            vision_api_key: Some("vk-abc123".to_string()),
            compose_api_key: Some("ck-abc123".to_string()),
            poll_interval_ms: Some(500),
            poll_max_attempts: Some(10),
            ..Default::default()
        };

        let config = CgConfig::resolve(&toml_config).unwrap();
        assert_eq!(config.vision_api_key, "vk-abc123");
        assert_eq!(config.vision_model, DEFAULT_VISION_MODEL);
        assert_eq!(config.compose_base_url, DEFAULT_COMPOSE_BASE_URL);
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(config.poll.max_attempts, 10);
        assert_eq!(config.poll.interval, Duration::from_millis(500));
    }

    #[test]
    fn missing_keys_fail_fast() {
        let result = CgConfig::resolve(&TomlConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

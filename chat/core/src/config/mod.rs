//! TOML Configuration File Support
//!
//! Centralized configuration loading for the gateway chat client, supporting
//! a TOML configuration file at `~/.config/gateway-chat/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [gateway]
//! base_url = "https://gateway.internal:8443"
//! api_key = "sk-ops-..."
//! connect_timeout_ms = 5000
//!
//! [chat]
//! default_model = "gpt-4o-mini"
//! temperature = 0.4
//! working_dir = "/srv/projects/demo"
//! tools_enabled = true
//!
//! [models]
//! "gpt-4o-mini" = "GPT-4o mini"
//! "claude-sonnet" = "Claude Sonnet"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::GatewayConfig;
use crate::store::DEFAULT_CHANGE_CAPACITY;

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Sampling temperature used when none is configured
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Gateway section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayToml {
    /// Gateway base URL
    pub base_url: Option<String>,

    /// Bearer token
    pub api_key: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Streaming completion endpoint path
    pub stream_path: Option<String>,

    /// Session endpoint path prefix
    pub sessions_path: Option<String>,

    /// Health endpoint path
    pub health_path: Option<String>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Model used when a turn names none
    pub default_model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Working directory for tool execution
    pub working_dir: Option<PathBuf>,

    /// Whether models may call tools
    pub tools_enabled: Option<bool>,

    /// Store change notification buffer
    pub broadcast_capacity: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigToml {
    /// Gateway configuration section
    pub gateway: GatewayToml,

    /// Chat configuration section
    pub chat: ChatToml,

    /// Model id to display name
    pub models: HashMap<String, String>,
}

// =============================================================================
// Main Configuration Structs
// =============================================================================

/// Conversation settings consumed by the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub struct ChatConfig {
    /// Model used when a turn names none; also the primary model for history
    pub default_model: String,
    /// Sampling temperature, within `0.0..=2.0`
    pub temperature: f32,
    /// Working directory sent with every request
    pub working_dir: Option<PathBuf>,
    /// Whether models may call tools
    pub tools_enabled: bool,
    /// Store change notification buffer
    pub broadcast_capacity: usize,
    /// Model id to display name
    pub model_names: HashMap<String, String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            working_dir: None,
            tools_enabled: false,
            broadcast_capacity: DEFAULT_CHANGE_CAPACITY,
            model_names: HashMap::new(),
        }
    }
}

impl ChatConfig {
    /// Create settings for a default model
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            ..Default::default()
        }
    }

    /// Enable or disable tools
    #[must_use]
    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    /// Register a display name for a model
    #[must_use]
    pub fn with_model_name(mut self, model: impl Into<String>, name: impl Into<String>) -> Self {
        self.model_names.insert(model.into(), name.into());
        self
    }

    /// Human-readable name of a model, falling back to its id
    #[must_use]
    pub fn display_name<'a>(&'a self, model: &'a str) -> &'a str {
        self.model_names.get(model).map_or(model, String::as_str)
    }
}

/// Fully resolved client configuration
#[derive(Clone, Debug)]
pub struct ChatConfigFile {
    /// Gateway connection settings
    pub gateway: GatewayConfig,

    /// Conversation settings
    pub chat: ChatConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ChatConfigFile {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            chat: ChatConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ChatConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check the values no layer may leave invalid
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an empty base URL or
    /// default model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "gateway base_url must not be empty".to_string(),
            ));
        }
        if self.chat.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "chat default_model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/gateway-chat/config.toml` or
/// `~/.config/gateway-chat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gateway-chat").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the merged result is invalid. A missing config file is not an error.
pub fn load_config() -> Result<ChatConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChatConfigFile, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `env` to look up environment variables
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ChatConfigFile, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = ChatConfigFile::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConfigToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ChatConfigFile, toml: ConfigToml) {
    // Gateway settings
    if let Some(url) = toml.gateway.base_url {
        config.gateway.base_url = url;
    }
    if toml.gateway.api_key.is_some() {
        config.gateway.api_key = toml.gateway.api_key;
    }
    if let Some(timeout) = toml.gateway.connect_timeout_ms {
        config.gateway.connect_timeout = Duration::from_millis(timeout);
    }
    if let Some(path) = toml.gateway.stream_path {
        config.gateway.stream_path = path;
    }
    if let Some(path) = toml.gateway.sessions_path {
        config.gateway.sessions_path = path;
    }
    if let Some(path) = toml.gateway.health_path {
        config.gateway.health_path = path;
    }

    // Chat settings
    if let Some(model) = toml.chat.default_model {
        config.chat.default_model = model;
    }
    if let Some(temperature) = toml.chat.temperature {
        config.chat.temperature = clamp_temperature(temperature);
    }
    if toml.chat.working_dir.is_some() {
        config.chat.working_dir = toml.chat.working_dir;
    }
    if let Some(enabled) = toml.chat.tools_enabled {
        config.chat.tools_enabled = enabled;
    }
    if let Some(capacity) = toml.chat.broadcast_capacity {
        config.chat.broadcast_capacity = capacity.max(1);
    }

    config.chat.model_names.extend(toml.models);
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ChatConfigFile, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("GATEWAY_URL") {
        config.gateway.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = env("GATEWAY_API_KEY") {
        config.gateway.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("GATEWAY_MODEL") {
        config.chat.default_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(temperature) = env("GATEWAY_TEMPERATURE") {
        if let Ok(t) = temperature.parse::<f32>() {
            config.chat.temperature = clamp_temperature(t);
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %temperature, "Ignoring unparseable GATEWAY_TEMPERATURE");
        }
    }
    if let Some(dir) = env("GATEWAY_WORKING_DIR") {
        config.chat.working_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = env("GATEWAY_TOOLS") {
        config.chat.tools_enabled = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
}

fn clamp_temperature(temperature: f32) -> f32 {
    if temperature.is_nan() {
        return DEFAULT_TEMPERATURE;
    }
    temperature.clamp(0.0, 2.0)
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Gateway URL override
    pub base_url: Option<String>,

    /// API key override
    pub api_key: Option<String>,

    /// Default model override
    pub default_model: Option<String>,

    /// Temperature override
    pub temperature: Option<f32>,

    /// Working directory override
    pub working_dir: Option<PathBuf>,

    /// Tools override
    pub tools_enabled: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set gateway URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set API key override
    #[must_use]
    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Set temperature override
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set working directory override
    #[must_use]
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Set tools override
    #[must_use]
    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = Some(enabled);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override leaves the
    /// configuration invalid.
    pub fn apply(&self, config: &mut ChatConfigFile) -> Result<(), ConfigError> {
        if self.base_url.is_some()
            || self.api_key.is_some()
            || self.default_model.is_some()
            || self.temperature.is_some()
            || self.working_dir.is_some()
            || self.tools_enabled.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.gateway.base_url.clone_from(url);
        }
        if let Some(ref key) = self.api_key {
            config.gateway.api_key = Some(key.clone());
        }
        if let Some(ref model) = self.default_model {
            config.chat.default_model.clone_from(model);
        }
        if let Some(temperature) = self.temperature {
            config.chat.temperature = clamp_temperature(temperature);
        }
        if let Some(ref dir) = self.working_dir {
            config.chat.working_dir = Some(dir.clone());
        }
        if let Some(enabled) = self.tools_enabled {
            config.chat.tools_enabled = enabled;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = ChatConfigFile::default();

        assert_eq!(config.gateway.base_url, "http://localhost:8080");
        assert_eq!(config.chat.default_model, DEFAULT_MODEL);
        assert!((config.chat.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert!(!config.chat.tools_enabled);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_with_env(Some(dir.path().join("absent.toml")), no_env).unwrap();

        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_default_config_path_layout() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("gateway-chat/config.toml"));
        }
    }

    // =========================================================================
    // File Loading Tests
    // =========================================================================

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
[gateway]
base_url = "https://gw.example.com"
api_key = "secret"
connect_timeout_ms = 2500
stream_path = "/v2/stream"

[chat]
default_model = "claude-sonnet"
temperature = 0.2
working_dir = "/srv/app"
tools_enabled = true
broadcast_capacity = 0

[models]
"claude-sonnet" = "Claude Sonnet"
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.gateway.base_url, "https://gw.example.com");
        assert_eq!(config.gateway.api_key.as_deref(), Some("secret"));
        assert_eq!(config.gateway.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.gateway.stream_path, "/v2/stream");
        assert_eq!(config.gateway.sessions_path, "/api/sessions");
        assert_eq!(config.chat.default_model, "claude-sonnet");
        assert_eq!(config.chat.working_dir, Some(PathBuf::from("/srv/app")));
        assert!(config.chat.tools_enabled);
        assert_eq!(config.chat.broadcast_capacity, 1);
        assert_eq!(config.chat.display_name("claude-sonnet"), "Claude Sonnet");
        assert_eq!(config.chat.display_name("other"), "other");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config("[chat]\ntemperature = 9.5\n");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert!((config.chat.temperature - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.chat.default_model, DEFAULT_MODEL);
        assert_eq!(config.gateway.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let file = write_config("[gateway\nbase_url = ");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_empty_model_fails_validation() {
        let file = write_config("[chat]\ndefault_model = \"  \"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    // =========================================================================
    // Priority Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_config("[chat]\ndefault_model = \"from-file\"\ntools_enabled = true\n");
        let env = |key: &str| match key {
            "GATEWAY_MODEL" => Some("from-env".to_string()),
            "GATEWAY_TOOLS" => Some("false".to_string()),
            "GATEWAY_TEMPERATURE" => Some("not-a-number".to_string()),
            _ => None,
        };

        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert_eq!(config.source(), ConfigSource::Env);
        assert_eq!(config.chat.default_model, "from-env");
        assert!(!config.chat.tools_enabled);
        assert!((config.chat.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = |key: &str| (key == "GATEWAY_URL").then(|| "http://env:1".to_string());
        let mut config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.gateway.base_url, "http://env:1");

        ConfigOverrides::new()
            .with_base_url("http://cli:2".to_string())
            .with_temperature(-1.0)
            .with_tools_enabled(true)
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.source(), ConfigSource::Cli);
        assert_eq!(config.gateway.base_url, "http://cli:2");
        assert!(config.chat.temperature.abs() < f32::EPSILON);
        assert!(config.chat.tools_enabled);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = ChatConfigFile::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);

        let result = ConfigOverrides::new()
            .with_base_url(String::new())
            .apply(&mut config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}

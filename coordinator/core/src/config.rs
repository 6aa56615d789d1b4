//! TOML Configuration File Support
//!
//! Loads face coordinator settings from `$XDG_CONFIG_HOME/baymax/face.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. `BAYMAX_*` environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [timing]
//! happy_revert_ms = 1000
//! error_revert_ms = 2000
//! idle_blink_interval_ms = 4000   # 0 disables the idle blink
//!
//! [channels]
//! inbox_capacity = 256
//! render_capacity = 64
//!
//! [telemetry]
//! enabled = true
//!
//! [transport]
//! socket_path = "/run/user/1000/baymax/face.sock"
//! max_connections = 16
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::CoordinatorConfig;

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

/// Tracks where the configuration last got a value from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Built-in default
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

/// `[timing]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingToml {
    /// Delay before the post-speech happy face reverts, in milliseconds
    pub happy_revert_ms: Option<u64>,

    /// Delay before the error face reverts, in milliseconds
    pub error_revert_ms: Option<u64>,

    /// Idle blink period in milliseconds (0 disables)
    pub idle_blink_interval_ms: Option<u64>,
}

/// `[channels]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsToml {
    /// Coordinator inbox capacity
    pub inbox_capacity: Option<usize>,

    /// Per-subscriber render buffer
    pub render_capacity: Option<usize>,
}

/// `[telemetry]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryToml {
    /// Whether render commands are mirrored as published events
    pub enabled: Option<bool>,
}

/// `[transport]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Unix socket path
    pub socket_path: Option<String>,

    /// Maximum concurrent client connections
    pub max_connections: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceToml {
    /// Timing section
    pub timing: TimingToml,

    /// Channel sizing section
    pub channels: ChannelsToml,

    /// Telemetry section
    pub telemetry: TelemetryToml,

    /// Transport section
    pub transport: TransportToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved face coordinator configuration
///
/// Use [`load_config`] to build one with proper priority handling.
#[derive(Clone, Debug)]
pub struct FaceConfig {
    /// Coordinator timing and inbox sizing
    pub coordinator: CoordinatorConfig,

    /// Per-subscriber render buffer
    pub render_capacity: usize,

    /// Mirror render commands as published events
    pub telemetry_enabled: bool,

    /// Unix socket path
    pub socket_path: PathBuf,

    /// Maximum concurrent client connections
    pub max_connections: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            render_capacity: 64,
            telemetry_enabled: false,
            socket_path: default_socket_path(),
            max_connections: 16,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl FaceConfig {
    /// Configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the most recent value came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Override the recorded source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Reject values the coordinator cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for zero capacities, zero
    /// revert delays or a zero connection limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("inbox_capacity", self.coordinator.inbox_capacity),
            ("render_capacity", self.render_capacity),
            ("max_connections", self.max_connections),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.coordinator.happy_revert.is_zero() {
            return Err(ConfigError::ValidationError(
                "happy_revert_ms must be greater than zero".to_string(),
            ));
        }
        if self.coordinator.error_revert.is_zero() {
            return Err(ConfigError::ValidationError(
                "error_revert_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Default configuration file path
///
/// `$XDG_CONFIG_HOME/baymax/face.toml`, usually `~/.config/baymax/face.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("baymax").join("face.toml"))
}

/// Default Unix socket path
///
/// `$XDG_RUNTIME_DIR/baymax/face.sock`, falling back to the system temp dir.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("baymax")
        .join("face.sock")
}

/// Load configuration from the default path, environment and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or if the result fails validation. A missing file is not an error.
pub fn load_config() -> Result<FaceConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the result
/// fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<FaceConfig, ConfigError> {
    let mut config = FaceConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: FaceToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
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

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    config.validate()?;
    Ok(config)
}

fn blink_interval(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn apply_toml_config(config: &mut FaceConfig, toml: &FaceToml) {
    if let Some(ms) = toml.timing.happy_revert_ms {
        config.coordinator.happy_revert = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.timing.error_revert_ms {
        config.coordinator.error_revert = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.timing.idle_blink_interval_ms {
        config.coordinator.blink_interval = blink_interval(ms);
    }

    if let Some(capacity) = toml.channels.inbox_capacity {
        config.coordinator.inbox_capacity = capacity;
    }
    if let Some(capacity) = toml.channels.render_capacity {
        config.render_capacity = capacity;
    }

    if let Some(enabled) = toml.telemetry.enabled {
        config.telemetry_enabled = enabled;
    }

    if let Some(ref path) = toml.transport.socket_path {
        config.socket_path = PathBuf::from(path);
    }
    if let Some(max) = toml.transport.max_connections {
        config.max_connections = max;
    }
}

/// Apply `BAYMAX_*` overrides read through `lookup`
///
/// Unparseable values are logged and ignored.
fn apply_env_config(config: &mut FaceConfig, lookup: impl Fn(&str) -> Option<String>) {
    fn parsed<T: std::str::FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
    ) -> Option<T> {
        let raw = lookup(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
                None
            }
        }
    }

    if let Some(ms) = parsed::<u64>(&lookup, "BAYMAX_HAPPY_REVERT_MS") {
        config.coordinator.happy_revert = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parsed::<u64>(&lookup, "BAYMAX_ERROR_REVERT_MS") {
        config.coordinator.error_revert = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parsed::<u64>(&lookup, "BAYMAX_IDLE_BLINK_MS") {
        config.coordinator.blink_interval = blink_interval(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(capacity) = parsed::<usize>(&lookup, "BAYMAX_INBOX_CAPACITY") {
        config.coordinator.inbox_capacity = capacity;
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = lookup("BAYMAX_TELEMETRY") {
        config.telemetry_enabled = enabled != "0" && !enabled.eq_ignore_ascii_case("false");
        config.source = ConfigSource::Env;
    }
    if let Some(path) = lookup("BAYMAX_SOCKET") {
        config.socket_path = PathBuf::from(path);
        config.source = ConfigSource::Env;
    }
    if let Some(max) = parsed::<usize>(&lookup, "BAYMAX_MAX_CONNECTIONS") {
        config.max_connections = max;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Socket path override
    pub socket_path: Option<PathBuf>,
    /// Idle blink period override in milliseconds (0 disables)
    pub idle_blink_interval_ms: Option<u64>,
    /// Telemetry override
    pub telemetry_enabled: Option<bool>,
    /// Connection limit override
    pub max_connections: Option<usize>,
}

impl ConfigOverrides {
    /// Empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket path override
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Set idle blink period override
    #[must_use]
    pub fn with_idle_blink_interval_ms(mut self, ms: u64) -> Self {
        self.idle_blink_interval_ms = Some(ms);
        self
    }

    /// Set telemetry override
    #[must_use]
    pub fn with_telemetry_enabled(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = Some(enabled);
        self
    }

    /// Set connection limit override
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.socket_path.is_none()
            && self.idle_blink_interval_ms.is_none()
            && self.telemetry_enabled.is_none()
            && self.max_connections.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut FaceConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref path) = self.socket_path {
            config.socket_path = path.clone();
        }
        if let Some(ms) = self.idle_blink_interval_ms {
            config.coordinator.blink_interval = blink_interval(ms);
        }
        if let Some(enabled) = self.telemetry_enabled {
            config.telemetry_enabled = enabled;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

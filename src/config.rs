//! Configuration system for ws-session
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (WS_SESSION_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::session::SessionConfig;

/// File name searched for in the working directory
pub const LOCAL_CONFIG_FILE: &str = "ws-session.toml";

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Session connection and timing settings
    pub session: SessionSettings,

    /// Console reconnect policy
    pub reconnect: ReconnectSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Session connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Server WebSocket URL
    pub url: String,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Time to wait for the welcome frame in milliseconds
    pub welcome_timeout_ms: u64,

    /// Heartbeat interval used when the server does not announce one
    pub default_heartbeat_interval_ms: u64,

    /// Unanswered heartbeats tolerated before a stale warning
    pub missed_ack_limit: u32,

    /// Upper bound on each shutdown step in milliseconds
    pub close_grace_ms: u64,

    /// Capacity of the session event queue
    pub event_queue_size: usize,
}

/// Reconnect policy for the interactive console
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Reconnect after the session ends unexpectedly
    pub enabled: bool,

    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,

    /// Maximum reconnection attempts (0 = infinite)
    pub max_attempts: u32,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// How often the log file rolls over
    pub rotation: LogRotation,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// Log file rollover period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

// Default implementations

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8788/websocket".to_string(),
            connect_timeout_ms: 10000,
            welcome_timeout_ms: 5000,
            default_heartbeat_interval_ms: 20000,
            missed_ack_limit: 3,
            close_grace_ms: 1000,
            event_queue_size: 64,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            max_attempts: 5,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            rotation: LogRotation::Daily,
            max_files: 5,
            json_format: false,
        }
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            welcome_timeout: Duration::from_millis(settings.welcome_timeout_ms),
            default_heartbeat_interval: Duration::from_millis(settings.default_heartbeat_interval_ms),
            missed_ack_limit: settings.missed_ack_limit,
            close_grace: Duration::from_millis(settings.close_grace_ms),
            event_queue_size: settings.event_queue_size,
        }
    }
}

impl ClientConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            Error::config_parse(format!("Failed to parse {}: {}", path.display(), e), Some(e))
        })
    }

    /// Find the configuration file to use
    pub fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // An explicit path must exist
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        for path in Self::search_paths() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Standard locations, in search order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("ws-session").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".ws-session").join("config.toml"));
        }
        paths
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Session settings
        if let Ok(val) = std::env::var("WS_SESSION_URL") {
            self.session.url = val;
        }
        if let Some(n) = env_parse("WS_SESSION_CONNECT_TIMEOUT_MS") {
            self.session.connect_timeout_ms = n;
        }
        if let Some(n) = env_parse("WS_SESSION_WELCOME_TIMEOUT_MS") {
            self.session.welcome_timeout_ms = n;
        }
        if let Some(n) = env_parse("WS_SESSION_HEARTBEAT_INTERVAL_MS") {
            self.session.default_heartbeat_interval_ms = n;
        }
        if let Some(n) = env_parse("WS_SESSION_MISSED_ACK_LIMIT") {
            self.session.missed_ack_limit = n;
        }

        // Reconnect settings
        if let Some(enabled) = env_flag("WS_SESSION_RECONNECT") {
            self.reconnect.enabled = enabled;
        }
        if let Some(n) = env_parse("WS_SESSION_RECONNECT_MAX_ATTEMPTS") {
            self.reconnect.max_attempts = n;
        }

        // Logging settings
        if let Ok(val) = std::env::var("WS_SESSION_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("WS_SESSION_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Some(json) = env_flag("WS_SESSION_LOG_JSON") {
            self.logging.json_format = json;
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = &self.session.url;
        if url.is_empty() {
            return Err(Error::config_field_invalid("session.url", "session.url cannot be empty"));
        }
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(Error::config_field_invalid(
                "session.url",
                "session.url must start with ws:// or wss://",
            ));
        }

        let positive = [
            ("session.connect_timeout_ms", self.session.connect_timeout_ms),
            ("session.welcome_timeout_ms", self.session.welcome_timeout_ms),
            (
                "session.default_heartbeat_interval_ms",
                self.session.default_heartbeat_interval_ms,
            ),
            ("session.close_grace_ms", self.session.close_grace_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(Error::config_field_invalid(
                    field,
                    format!("{} must be greater than 0", field),
                ));
            }
        }

        if self.session.missed_ack_limit == 0 {
            return Err(Error::config_field_invalid(
                "session.missed_ack_limit",
                "session.missed_ack_limit must be at least 1",
            ));
        }
        if self.session.event_queue_size == 0 {
            return Err(Error::config_field_invalid(
                "session.event_queue_size",
                "session.event_queue_size must be at least 1",
            ));
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            return Err(Error::config_field_invalid(
                "reconnect.max_delay_ms",
                "reconnect.max_delay_ms must not be below reconnect.initial_delay_ms",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Session timing derived from `[session]`
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from(&self.session)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|val| val.eq_ignore_ascii_case("true") || val == "1")
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location for `config init`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("ws-session"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".ws-session")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    info!(path = %config_path.display(), "Configuration file created");
    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# ws-session configuration

[session]
# Server WebSocket URL
url = "ws://localhost:8788/websocket"

# Connection timeout in milliseconds
connect_timeout_ms = 10000

# Time to wait for the welcome frame in milliseconds
welcome_timeout_ms = 5000

# Heartbeat interval used when the server does not announce one
default_heartbeat_interval_ms = 20000

# Unanswered heartbeats tolerated before a stale connection warning
missed_ack_limit = 3

# Upper bound on each shutdown step in milliseconds
close_grace_ms = 1000

# Capacity of the session event queue
event_queue_size = 64

[reconnect]
# Reconnect the console after the session ends unexpectedly
enabled = false

# Backoff delays in milliseconds
initial_delay_ms = 1000
max_delay_ms = 30000

# Maximum reconnection attempts (0 = infinite)
max_attempts = 5

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.ws-session/logs/ws-session.log"

# How often the log file rolls over: hourly, daily or never
rotation = "daily"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

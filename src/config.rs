//! # Configuration Management
//!
//! Centralized configuration for the client transport core.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults and `default_with_overrides()`
//!
//! The UI layer usually starts from the loaded configuration and replaces the
//! host, port and username with whatever the player typed before connecting.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default server port
pub const DEFAULT_PORT: u16 = 26950;

/// Socket send/receive buffer size (1 MiB)
pub const SOCKET_BUFFER_SIZE: usize = 1 << 20;

/// Max allowed frame size (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Longest username the server accepts
pub const MAX_USERNAME_LEN: usize = 16;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Connection target and retry behaviour
    #[serde(default)]
    pub client: ClientConfig,

    /// Socket and framing configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("MPCLIENT_HOST") {
            config.client.host = host;
        }

        if let Ok(port) = std::env::var("MPCLIENT_PORT") {
            config.client.port = port
                .parse::<u16>()
                .map_err(|e| ProtocolError::ConfigError(format!("Invalid MPCLIENT_PORT: {e}")))?;
        }

        if let Ok(username) = std::env::var("MPCLIENT_USERNAME") {
            config.client.username = username;
        }

        if let Ok(attempts) = std::env::var("MPCLIENT_CONNECT_ATTEMPTS") {
            if let Ok(val) = attempts.parse::<u32>() {
                config.client.connect_attempts = val;
            }
        }

        if let Ok(timeout) = std::env::var("MPCLIENT_ATTEMPT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.attempt_timeout = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Server host name or IP address
    pub host: String,

    /// Server port, shared by the stream and datagram transports
    pub port: u16,

    /// Name announced to the server after the welcome packet
    pub username: String,

    /// Connect attempts before giving up
    pub connect_attempts: u32,

    /// How long a single connect attempt may stay in flight
    #[serde(with = "duration_serde")]
    pub attempt_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_PORT,
            username: String::from("Player"),
            connect_attempts: timeout::CONNECT_ATTEMPTS,
            attempt_timeout: timeout::CONNECT_ATTEMPT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Server host cannot be empty".to_string());
        } else if self.host.contains(char::is_whitespace) {
            errors.push(format!("Invalid server host: '{}'", self.host));
        }

        if self.port == 0 {
            errors.push("Server port cannot be 0".to_string());
        }

        if self.username.is_empty() {
            errors.push("Username cannot be empty".to_string());
        } else if self.username.chars().count() > MAX_USERNAME_LEN {
            errors.push(format!(
                "Username too long: {} characters (maximum: {MAX_USERNAME_LEN})",
                self.username.chars().count()
            ));
        }

        if self.connect_attempts == 0 {
            errors.push("Connect attempts must be greater than 0".to_string());
        } else if self.connect_attempts > 100 {
            errors.push(format!(
                "Connect attempts too high: {} (maximum: 100)",
                self.connect_attempts
            ));
        }

        if self.attempt_timeout.as_millis() < 10 {
            errors.push("Attempt timeout too short (minimum: 10ms)".to_string());
        } else if self.attempt_timeout.as_secs() > 60 {
            errors.push("Attempt timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// OS receive buffer size for the stream socket
    pub receive_buffer_size: usize,

    /// OS send buffer size for the stream socket
    pub send_buffer_size: usize,

    /// Largest frame accepted from or sent to the server
    pub max_frame_size: usize,

    /// Largest datagram the receive loop can hold
    pub max_datagram_size: usize,

    /// Whether to disable Nagle's algorithm on the stream socket
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

fn default_nodelay() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: SOCKET_BUFFER_SIZE,
            send_buffer_size: SOCKET_BUFFER_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            max_datagram_size: 65_536,
            nodelay: default_nodelay(),
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.receive_buffer_size < 1024 || self.send_buffer_size < 1024 {
            errors.push("Socket buffer sizes too small (minimum: 1 KB)".to_string());
        }

        if self.max_frame_size < 8 {
            errors.push("Max frame size too small (minimum: 8 bytes)".to_string());
        } else if self.max_frame_size > i32::MAX as usize {
            errors.push(format!(
                "Max frame size too large: {} bytes (length header is a 32-bit integer)",
                self.max_frame_size
            ));
        }

        if self.max_datagram_size < 8 {
            errors.push("Max datagram size too small (minimum: 8 bytes)".to_string());
        } else if self.max_datagram_size > 65_536 {
            errors.push(format!(
                "Max datagram size too large: {} bytes (maximum: 65536)",
                self.max_datagram_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("multiplayer-client"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

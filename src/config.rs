//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::protocol::Protocol;

/// Baud rates accepted for the sensor link
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 57600, 115200, 230400, 460800, 921600];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_fallback_ports")]
    pub fallback_ports: Vec<String>,

    #[serde(default)]
    pub auto_detect: bool,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub protocol: Protocol,
}

/// Reconnect/backoff configuration for the ingestion loop
#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Open attempts allowed before the first successful connection (0 = unlimited)
    #[serde(default = "default_max_startup_attempts")]
    pub max_startup_attempts: u32,
}

/// WebSocket server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    #[serde(default = "default_ws_path")]
    pub path: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; empty logs to stdout only
    #[serde(default)]
    pub dir: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_fallback_ports() -> Vec<String> { vec!["/dev/ttyUSB0".to_string()] }
fn default_baud_rate() -> u32 { 115200 }

fn default_initial_backoff_ms() -> u64 { 500 }
fn default_max_backoff_ms() -> u64 { 5000 }
fn default_max_startup_attempts() -> u32 { 10 }

fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_server_port() -> u16 { 8080 }
fn default_ws_path() -> String { "/ws".to_string() }
fn default_ping_interval_ms() -> u64 { 5000 }
fn default_pong_timeout_ms() -> u64 { 15000 }
fn default_write_timeout_ms() -> u64 { 1000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            fallback_ports: default_fallback_ports(),
            auto_detect: false,
            baud_rate: default_baud_rate(),
            protocol: Protocol::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_startup_attempts: default_max_startup_attempts(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_server_port(),
            path: default_ws_path(),
            ping_interval_ms: default_ping_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: String::new(),
        }
    }
}

impl SerialConfig {
    /// Device paths to try, primary first, without duplicates
    pub fn candidate_paths(&self) -> Vec<String> {
        let mut paths = vec![self.port.clone()];
        for path in &self.fallback_ports {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }
}

impl ReconnectConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl ServerConfig {
    /// Socket address string for the listener (e.g. "0.0.0.0:8080")
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults, so an empty
    /// file yields the same configuration as [`Config::default`].
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imu_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if self.serial.fallback_ports.iter().any(|p| p.is_empty()) {
            return Err(invalid("fallback_ports cannot contain empty paths"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 57600, 115200, 230400, 460800, 921600",
            ));
        }

        if self.reconnect.initial_backoff_ms == 0 || self.reconnect.initial_backoff_ms > 60000 {
            return Err(invalid("initial_backoff_ms must be between 1 and 60000"));
        }

        if self.reconnect.max_backoff_ms == 0 || self.reconnect.max_backoff_ms > 60000 {
            return Err(invalid("max_backoff_ms must be between 1 and 60000"));
        }

        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(invalid("initial_backoff_ms must not exceed max_backoff_ms"));
        }

        if self.server.port == 0 {
            return Err(invalid("server port must be greater than 0"));
        }

        if !self.server.path.starts_with('/') {
            return Err(invalid("server path must start with '/'"));
        }

        if RESERVED_PATHS.contains(&self.server.path.as_str()) {
            return Err(invalid(format!(
                "server path '{}' collides with a built-in route",
                self.server.path
            )));
        }

        if self.server.ping_interval_ms < 100 || self.server.ping_interval_ms > 60000 {
            return Err(invalid("ping_interval_ms must be between 100 and 60000"));
        }

        if self.server.pong_timeout_ms <= self.server.ping_interval_ms
            || self.server.pong_timeout_ms > 300000
        {
            return Err(invalid(
                "pong_timeout_ms must be greater than ping_interval_ms and at most 300000",
            ));
        }

        if self.server.write_timeout_ms == 0 || self.server.write_timeout_ms > 60000 {
            return Err(invalid("write_timeout_ms must be between 1 and 60000"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        Ok(())
    }
}

/// Routes served next to the WebSocket endpoint
const RESERVED_PATHS: [&str; 2] = ["/snapshot", "/health"];

fn invalid(msg: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}

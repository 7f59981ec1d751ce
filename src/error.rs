//! # Error Types
//!
//! Custom error types for IMU Bridge using `thiserror`.
//!
//! A record that cannot be used is a
//! [`DecodeOutcome`](crate::protocol::DecodeOutcome), not an error.

use thiserror::Error;

/// Main error type for IMU Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No candidate serial device could be opened
    #[error("No sensor device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Opening or configuring a specific serial port failed
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Reading from an open transport failed
    #[error("Transport read error: {0}")]
    Read(String),

    /// The transport closed cleanly
    #[error("Transport reached end of stream")]
    EndOfStream,

    /// The ingestion loop gave up opening the transport before it ever streamed
    #[error("Transport open failed after {attempts} attempts")]
    OpenAttemptsExhausted { attempts: u32 },

    /// Listener bind or serve failure
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Whether this error ends the current connection but not the process.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Read(_) | BridgeError::EndOfStream | BridgeError::Io(_))
    }
}

/// Result type alias for IMU Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

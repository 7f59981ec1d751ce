//! # Transport Module
//!
//! Owns the connection to the sensor and turns it into a sequence of raw
//! records.
//!
//! This module handles:
//! - Opening the serial port at the configured baud rate
//! - Trying fallback device paths and OS-enumerated ports
//! - Line and fixed-frame record splitting
//! - The [`Connector`] / [`RecordSource`] seams the ingestion loop drives

pub mod reader;
pub mod serial;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::SerialConfig;
use crate::error::Result;
use crate::protocol::Protocol;

pub use reader::{Framing, RecordReader, MAX_LINE_LEN};
pub use serial::SensorSerial;

/// One record as delimited by the transport framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    /// A trimmed text line
    Line(String),
    /// A complete fixed-size frame
    Frame(Bytes),
    /// A text line longer than the reader keeps; its bytes were discarded
    Overlong { length: usize },
}

/// An open connection yielding records
#[async_trait]
pub trait RecordSource: Send {
    /// Read the next record
    ///
    /// A `Read` error leaves the decision to reconnect with the caller.
    async fn next_record(&mut self) -> Result<RawRecord>;

    /// Human-readable endpoint (device path) for logs
    fn endpoint(&self) -> &str;
}

/// Opens connections to the sensor
#[async_trait]
pub trait Connector: Send {
    async fn open(&mut self) -> Result<Box<dyn RecordSource>>;
}

/// Connector for the USB serial link
#[derive(Debug, Clone)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    pub fn framing(&self) -> Framing {
        self.config.protocol.framing()
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&mut self) -> Result<Box<dyn RecordSource>> {
        let (port, path) = SensorSerial::open(&self.config)?.into_parts();
        Ok(Box::new(RecordReader::new(port, self.framing(), path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[test]
    fn test_connector_framing_follows_protocol() {
        let mut config = SerialConfig::default();
        config.protocol = Protocol::Binary;
        let connector = SerialConnector::new(config);
        assert!(matches!(connector.framing(), Framing::Fixed { .. }));
        assert_eq!(connector.protocol(), Protocol::Binary);
    }

    #[tokio::test]
    async fn test_connector_open_fails_without_device() {
        let config = SerialConfig {
            port: "/dev/nonexistent_sensor".to_string(),
            fallback_ports: Vec::new(),
            ..SerialConfig::default()
        };
        let mut connector = SerialConnector::new(config);

        match connector.open().await {
            Err(BridgeError::SerialPortNotFound(msg)) => assert!(msg.contains("nonexistent_sensor")),
            Err(other) => panic!("Expected SerialPortNotFound, got: {:?}", other),
            Ok(_) => panic!("Expected open to fail"),
        }
    }
}

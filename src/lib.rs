//! # IMU Bridge Library
//!
//! Stream orientation and motion telemetry from a serial IMU to browser
//! dashboards over WebSocket.
//!
//! This library provides the pieces of the bridge: the serial transport, the
//! record decoders, the merged telemetry store, the client broadcaster and the
//! ingestion loop that drives them.

pub mod config;
pub mod error;
pub mod ingest;
pub mod protocol;
pub mod server;
pub mod telemetry;
pub mod transport;

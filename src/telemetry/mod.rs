//! # Telemetry Module
//!
//! Keeps the merged, last-known-good view of everything the sensor reported.

pub mod store;

pub use store::{Snapshot, TelemetryStore};

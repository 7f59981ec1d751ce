//! # Serial Port Handling
//!
//! Opens the sensor's USB serial link, trying each configured device path in
//! order and optionally every port the OS enumerates.

use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{BridgeError, Result};

/// Sensor serial port handle
pub struct SensorSerial {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
}

impl std::fmt::Debug for SensorSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SensorSerial {
    /// Open the sensor described by `config`
    ///
    /// Tries `port`, then `fallback_ports`, then (with `auto_detect`) every
    /// enumerated port not already tried.
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` listing every path tried if none opens.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imu_bridge::config::SerialConfig;
    /// use imu_bridge::transport::serial::SensorSerial;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let serial = SensorSerial::open(&SerialConfig::default())?;
    ///     println!("Connected to: {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let mut paths = config.candidate_paths();
        if config.auto_detect {
            let discovered = discover_ports(&paths);
            paths.extend(discovered);
        }
        Self::open_with_paths(&paths, config.baud_rate)
    }

    /// Open the first path in `paths` that succeeds
    pub fn open_with_paths<S: AsRef<str>>(paths: &[S], baud_rate: u32) -> Result<Self> {
        for path in paths {
            let path = path.as_ref();
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened sensor at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                }
            }
        }

        let tried: Vec<&str> = paths.iter().map(|p| p.as_ref()).collect();
        Err(BridgeError::SerialPortNotFound(tried.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    /// Path of the opened device
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Split into the stream and its device path
    pub fn into_parts(self) -> (tokio_serial::SerialStream, String) {
        (self.port, self.device_path)
    }
}

/// Ports the OS reports, minus those in `exclude`
pub fn discover_ports(exclude: &[String]) -> Vec<String> {
    match tokio_serial::available_ports() {
        Ok(ports) => {
            let names: Vec<String> = ports
                .into_iter()
                .map(|p| p.port_name)
                .filter(|name| !exclude.contains(name))
                .collect();
            debug!("Discovered serial ports: {:?}", names);
            names
        }
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

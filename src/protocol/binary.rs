//! # Binary Frame Decoder
//!
//! Decodes the fixed-size, CRC-checked frames emitted by the binary firmware
//! build, and the raw register blocks read from the BNO055 and BMP280 over
//! I2C. Both share the same fixed-point scaling.
//!
//! ## Frame Layout (20 bytes, big-endian)
//!
//! | Offset | Size | Field | Scaling |
//! |--------|------|-------|---------|
//! | 0 | 1 | Sync (0xA5) | - |
//! | 1 | 6 | Heading, roll, pitch (i16) | / 16.0 deg |
//! | 7 | 6 | Acceleration X, Y, Z (i16) | / 100.0 m/s² |
//! | 13 | 2 | Temperature (i16) | / 100.0 °C |
//! | 15 | 3 | Pressure (u24) | / 100.0 hPa |
//! | 18 | 1 | Flags (reserved) | - |
//! | 19 | 1 | CRC-8/DVB-S2 over bytes 1..19 | - |

use super::crc::crc8;
use super::reading::{Environment, Euler, Reading, Vector3};
use super::DecodeOutcome;

/// Frame sync byte
pub const FRAME_SYNC: u8 = 0xA5;

/// Total frame size in bytes
pub const FRAME_SIZE: usize = 20;

/// Euler angle LSB per degree (BNO055 default unit selection)
pub const ORIENTATION_DIVISOR: f64 = 16.0;

/// Acceleration LSB per m/s²
pub const ACCELERATION_DIVISOR: f64 = 100.0;

/// Barometer LSB per °C and per hPa
pub const BAROMETER_DIVISOR: f64 = 100.0;

/// Pascals per hectopascal
pub const PA_PER_HPA: f64 = 100.0;

/// Standard sea-level pressure used for altitude (hPa)
pub const SEA_LEVEL_HPA: f64 = 1013.25;

/// BNO055 7-bit I2C address (COM3 low)
pub const BNO055_ADDRESS: u8 = 0x28;

/// BMP280 7-bit I2C address (SDO low)
pub const BMP280_ADDRESS: u8 = 0x76;

/// Register blocks read by an I2C collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterBlock {
    /// BNO055 EUL_DATA: heading, roll, pitch
    Euler,
    /// BNO055 ACC_DATA: x, y, z
    Acceleration,
    /// BMP280 compensated block: pressure (u24) then temperature (i16)
    Barometer,
}

impl RegisterBlock {
    /// Chip bus address
    pub fn device_address(self) -> u8 {
        match self {
            RegisterBlock::Euler | RegisterBlock::Acceleration => BNO055_ADDRESS,
            RegisterBlock::Barometer => BMP280_ADDRESS,
        }
    }

    /// First register of the block
    pub fn register(self) -> u8 {
        match self {
            RegisterBlock::Euler => 0x1A,
            RegisterBlock::Acceleration => 0x08,
            RegisterBlock::Barometer => 0xF7,
        }
    }

    /// Bytes to read starting at [`RegisterBlock::register`]
    pub fn len(self) -> usize {
        match self {
            RegisterBlock::Euler | RegisterBlock::Acceleration => 6,
            RegisterBlock::Barometer => 5,
        }
    }
}

fn i16_at(bytes: &[u8], offset: usize) -> f64 {
    i16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as f64
}

fn u24_at(bytes: &[u8], offset: usize) -> f64 {
    u32::from_be_bytes([0, bytes[offset], bytes[offset + 1], bytes[offset + 2]]) as f64
}

fn euler_at(bytes: &[u8], offset: usize) -> Euler {
    Euler::new(
        i16_at(bytes, offset) / ORIENTATION_DIVISOR,
        i16_at(bytes, offset + 2) / ORIENTATION_DIVISOR,
        i16_at(bytes, offset + 4) / ORIENTATION_DIVISOR,
    )
}

fn acceleration_at(bytes: &[u8], offset: usize) -> Vector3 {
    Vector3::new(
        i16_at(bytes, offset) / ACCELERATION_DIVISOR,
        i16_at(bytes, offset + 2) / ACCELERATION_DIVISOR,
        i16_at(bytes, offset + 4) / ACCELERATION_DIVISOR,
    )
}

fn environment(pressure_raw: f64, temperature_raw: f64) -> Environment {
    let pressure_hpa = pressure_raw / BAROMETER_DIVISOR;
    Environment {
        temperature: temperature_raw / BAROMETER_DIVISOR,
        pressure: pressure_hpa * PA_PER_HPA,
        altitude: altitude_from_pressure(pressure_hpa),
    }
}

/// Altitude in metres from pressure in hPa (international barometric formula)
pub fn altitude_from_pressure(pressure_hpa: f64) -> f64 {
    if pressure_hpa <= 0.0 {
        return 0.0;
    }
    44330.0 * (1.0 - (pressure_hpa / SEA_LEVEL_HPA).powf(1.0 / 5.255))
}

/// Decode one complete binary frame
pub fn decode_frame(frame: &[u8]) -> DecodeOutcome {
    if frame.len() != FRAME_SIZE {
        return DecodeOutcome::Malformed(format!(
            "frame is {} bytes, expected {}",
            frame.len(),
            FRAME_SIZE
        ));
    }

    if frame[0] != FRAME_SYNC {
        return DecodeOutcome::Malformed(format!("invalid sync byte: 0x{:02X}", frame[0]));
    }

    let received = frame[FRAME_SIZE - 1];
    let calculated = crc8(&frame[1..FRAME_SIZE - 1]);
    if received != calculated {
        return DecodeOutcome::Malformed(format!(
            "CRC mismatch: expected 0x{:02X}, got 0x{:02X}",
            calculated, received
        ));
    }

    DecodeOutcome::Decoded(Reading {
        orientation: Some(euler_at(frame, 1)),
        acceleration: Some(acceleration_at(frame, 7)),
        environment: Some(environment(u24_at(frame, 15), i16_at(frame, 13))),
        ..Reading::default()
    })
}

/// Decode a register block read by an I2C collaborator
pub fn decode_registers(block: RegisterBlock, bytes: &[u8]) -> DecodeOutcome {
    if bytes.len() < block.len() {
        return DecodeOutcome::Malformed(format!(
            "{:?} block needs {} bytes, got {}",
            block,
            block.len(),
            bytes.len()
        ));
    }

    let mut reading = Reading::default();
    match block {
        RegisterBlock::Euler => reading.orientation = Some(euler_at(bytes, 0)),
        RegisterBlock::Acceleration => reading.acceleration = Some(acceleration_at(bytes, 0)),
        RegisterBlock::Barometer => {
            reading.environment = Some(environment(u24_at(bytes, 0), i16_at(bytes, 3)));
        }
    }
    DecodeOutcome::Decoded(reading)
}

//! # Sensor Protocol Module
//!
//! Stateless decoders turning one raw record into a typed [`Reading`].
//!
//! This module handles:
//! - Category-tagged text lines (`eul analog 12.50 -3.20 0.10`)
//! - Fixed nine-field comma-separated records
//! - CRC-checked binary frames and I2C register blocks

pub mod binary;
pub mod crc;
pub mod csv;
pub mod reading;
pub mod text;

use serde::Deserialize;

use crate::transport::{Framing, RawRecord, MAX_LINE_LEN};
use reading::Reading;

/// Result of decoding one record
///
/// Neither `Ignored` nor `Malformed` is an error for the ingestion loop: the
/// record is dropped and the loop reads the next one.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// The record carried usable data
    Decoded(Reading),
    /// The record carries no data this cycle (markers, untagged lines)
    Ignored,
    /// The record violates a fixed-format protocol
    Malformed(String),
}

/// Wire protocol spoken by the sensor firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Category-tagged free-text lines
    #[default]
    Tagged,
    /// Nine comma-separated fields per line
    Csv,
    /// Fixed-size CRC-checked binary frames
    Binary,
}

impl Protocol {
    /// How the transport must split the byte stream for this protocol
    pub fn framing(self) -> Framing {
        match self {
            Protocol::Tagged | Protocol::Csv => Framing::Line,
            Protocol::Binary => Framing::Fixed {
                size: binary::FRAME_SIZE,
                sync: Some(binary::FRAME_SYNC),
                checksum: true,
            },
        }
    }

    /// Decode one record
    ///
    /// A record whose shape does not match the protocol (a frame handed to a
    /// line decoder or the reverse) is `Malformed`.
    pub fn decode(self, record: &RawRecord) -> DecodeOutcome {
        match (self, record) {
            (Protocol::Tagged, RawRecord::Line(line)) => text::decode_line(line),
            (Protocol::Csv, RawRecord::Line(line)) => csv::decode_record(line),
            (Protocol::Binary, RawRecord::Frame(frame)) => binary::decode_frame(frame),
            (_, RawRecord::Overlong { length }) => DecodeOutcome::Malformed(format!(
                "line of {} bytes exceeds the {} byte limit",
                length, MAX_LINE_LEN
            )),
            (protocol, _) => {
                DecodeOutcome::Malformed(format!("record shape does not match {:?}", protocol))
            }
        }
    }
}

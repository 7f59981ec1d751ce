//! # CRC-8/DVB-S2
//!
//! Checksum trailing every binary sensor frame.
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00, no reflection, no final XOR

const POLY: u8 = 0xD5;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }

    table
}

/// Compute the CRC over a byte slice
///
/// # Examples
///
/// ```
/// use imu_bridge::protocol::crc::crc8;
///
/// // Standard check value for CRC-8/DVB-S2
/// assert_eq!(crc8(b"123456789"), 0xBC);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| TABLE[(crc ^ byte) as usize])
}

//! # Record Reader
//!
//! Splits a byte stream into records: newline-terminated text lines, or
//! fixed-size binary frames optionally aligned on a sync byte.
//!
//! Checked frames are validated here so that a false sync (a payload byte
//! equal to the sync byte) costs one byte, not one frame: on a bad checksum
//! the reader slides forward a single byte and hunts for the next sync inside
//! the rejected bytes.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, trace};

use super::{RawRecord, RecordSource};
use crate::error::{BridgeError, Result};
use crate::protocol::crc::crc8;

/// Longest text line kept, in bytes, excluding the newline
pub const MAX_LINE_LEN: usize = 1024;

/// How a byte stream is split into records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Bytes up to and including `\n`, trimmed of surrounding whitespace
    Line,
    /// Exactly `size` bytes
    ///
    /// With `sync`, bytes are skipped until it appears. With `checksum`, the
    /// last byte must be the CRC-8 of the bytes between the first and the
    /// last; candidates that fail are rejected one byte at a time.
    Fixed {
        size: usize,
        sync: Option<u8>,
        checksum: bool,
    },
}

/// Reads records from any async byte stream
pub struct RecordReader<R> {
    inner: BufReader<R>,
    framing: Framing,
    endpoint: String,
    line: Vec<u8>,
    pending: BytesMut,
}

impl<R> std::fmt::Debug for RecordReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("endpoint", &self.endpoint)
            .field("framing", &self.framing)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin + Send> RecordReader<R> {
    pub fn new(inner: R, framing: Framing, endpoint: impl Into<String>) -> Self {
        Self {
            inner: BufReader::new(inner),
            framing,
            endpoint: endpoint.into(),
            line: Vec::with_capacity(128),
            pending: BytesMut::new(),
        }
    }

    /// Read the next record
    ///
    /// # Errors
    ///
    /// - `EndOfStream` if the stream closed on a record boundary
    /// - `Read` on I/O failure, or if the stream closed inside a fixed frame
    pub async fn read_record(&mut self) -> Result<RawRecord> {
        match self.framing {
            Framing::Line => self.read_line().await,
            Framing::Fixed { size, sync, checksum } => self.read_frame(size, sync, checksum).await,
        }
    }

    async fn read_line(&mut self) -> Result<RawRecord> {
        self.line.clear();
        let mut limited = (&mut self.inner).take(MAX_LINE_LEN as u64 + 1);
        let n = limited
            .read_until(b'\n', &mut self.line)
            .await
            .map_err(|e| BridgeError::Read(format!("{}: {}", self.endpoint, e)))?;

        if n == 0 {
            return Err(BridgeError::EndOfStream);
        }

        if self.line.len() > MAX_LINE_LEN && !self.line.ends_with(b"\n") {
            let length = self.discard_line().await?;
            debug!("{} dropped {} byte line (limit {})", self.endpoint, length, MAX_LINE_LEN);
            return Ok(RawRecord::Overlong { length });
        }

        let line = String::from_utf8_lossy(&self.line).trim().to_string();
        trace!("{} line: {}", self.endpoint, line);
        Ok(RawRecord::Line(line))
    }

    /// Consume the rest of an over-long line; returns its length without the newline
    async fn discard_line(&mut self) -> Result<usize> {
        let mut length = self.line.len();
        loop {
            self.line.clear();
            let mut limited = (&mut self.inner).take(MAX_LINE_LEN as u64);
            let n = limited
                .read_until(b'\n', &mut self.line)
                .await
                .map_err(|e| BridgeError::Read(format!("{}: {}", self.endpoint, e)))?;

            if self.line.ends_with(b"\n") {
                return Ok(length + n - 1);
            }
            if n == 0 {
                return Ok(length);
            }
            length += n;
        }
    }

    async fn read_frame(&mut self, size: usize, sync: Option<u8>, checksum: bool) -> Result<RawRecord> {
        let mut skipped = 0usize;

        loop {
            if let Some(sync) = sync {
                match self.pending.iter().position(|&byte| byte == sync) {
                    Some(start) => {
                        skipped += start;
                        self.pending.advance(start);
                    }
                    None => {
                        skipped += self.pending.len();
                        self.pending.clear();
                    }
                }
            }

            if self.pending.len() >= size {
                if !checksum || checksum_matches(&self.pending[..size]) {
                    if skipped > 0 {
                        debug!("{} skipped {} bytes to find a frame", self.endpoint, skipped);
                    }
                    return Ok(RawRecord::Frame(self.pending.split_to(size).freeze()));
                }
                // Look for the next sync inside the rejected candidate
                self.pending.advance(1);
                skipped += 1;
                continue;
            }

            self.pending.reserve(size);
            let n = self
                .inner
                .read_buf(&mut self.pending)
                .await
                .map_err(|e| BridgeError::Read(format!("{}: {}", self.endpoint, e)))?;

            if n == 0 {
                if self.pending.is_empty() {
                    return Err(BridgeError::EndOfStream);
                }
                return Err(BridgeError::Read(format!(
                    "{}: stream closed after {} of {} frame bytes",
                    self.endpoint,
                    self.pending.len(),
                    size
                )));
            }
        }
    }
}

/// Trailing CRC-8 over every byte between the first and the last
fn checksum_matches(frame: &[u8]) -> bool {
    match frame {
        [_, body @ .., crc] => crc8(body) == *crc,
        _ => false,
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> RecordSource for RecordReader<R> {
    async fn next_record(&mut self) -> Result<RawRecord> {
        self.read_record().await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use bytes::Bytes;

    fn unchecked(size: usize) -> Framing {
        Framing::Fixed { size, sync: None, checksum: false }
    }

    /// Sync byte, `payload`, then the CRC-8 of the payload
    fn checked_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xA5];
        frame.extend_from_slice(payload);
        frame.push(crc8(payload));
        frame
    }

    fn line(record: RawRecord) -> String {
        match record {
            RawRecord::Line(line) => line,
            other => panic!("expected line, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lines_are_trimmed() {
        let data: &[u8] = b"  acc analog 1.0 2.0 3.0\r\nprint end\n";
        let mut reader = RecordReader::new(data, Framing::Line, "test");

        assert_eq!(line(reader.read_record().await.unwrap()), "acc analog 1.0 2.0 3.0");
        assert_eq!(line(reader.read_record().await.unwrap()), "print end");
        assert!(matches!(reader.read_record().await, Err(BridgeError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let data: &[u8] = b"1,2,3";
        let mut reader = RecordReader::new(data, Framing::Line, "test");

        assert_eq!(line(reader.read_record().await.unwrap()), "1,2,3");
        assert!(matches!(reader.read_record().await, Err(BridgeError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let data: &[u8] = b"eul analog \xFF 1.0 2.0 3.0\n";
        let mut reader = RecordReader::new(data, Framing::Line, "test");

        let text = line(reader.read_record().await.unwrap());
        assert!(text.starts_with("eul analog"));
    }

    #[tokio::test]
    async fn test_fixed_frames() {
        let data: &[u8] = &[1, 2, 3, 4, 5, 6];
        let mut reader = RecordReader::new(data, unchecked(3), "test");

        assert_eq!(
            reader.read_record().await.unwrap(),
            RawRecord::Frame(Bytes::from_static(&[1, 2, 3]))
        );
        assert_eq!(
            reader.read_record().await.unwrap(),
            RawRecord::Frame(Bytes::from_static(&[4, 5, 6]))
        );
        assert!(matches!(reader.read_record().await, Err(BridgeError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_short_frame_is_read_error() {
        let data: &[u8] = &[1, 2, 3, 4];
        let mut reader = RecordReader::new(data, unchecked(3), "test");

        assert!(reader.read_record().await.is_ok());
        match reader.read_record().await {
            Err(BridgeError::Read(msg)) => assert!(msg.contains("1 of 3")),
            other => panic!("expected Read error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sync_hunting() {
        let data: &[u8] = &[0x00, 0x13, 0xA5, 7, 8, 0xA5, 9, 10];
        let framing = Framing::Fixed { size: 3, sync: Some(0xA5), checksum: false };
        let mut reader = RecordReader::new(data, framing, "test");

        assert_eq!(
            reader.read_record().await.unwrap(),
            RawRecord::Frame(Bytes::from_static(&[0xA5, 7, 8]))
        );
        assert_eq!(
            reader.read_record().await.unwrap(),
            RawRecord::Frame(Bytes::from_static(&[0xA5, 9, 10]))
        );
        assert!(matches!(reader.read_record().await, Err(BridgeError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_frames_split_across_writes() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = RecordReader::new(rx, unchecked(4), "duplex");

        let writer = tokio::spawn(async move {
            tx.write_all(&[1, 2]).await.unwrap();
            tokio::task::yield_now().await;
            tx.write_all(&[3, 4]).await.unwrap();
        });

        assert_eq!(
            reader.read_record().await.unwrap(),
            RawRecord::Frame(Bytes::from_static(&[1, 2, 3, 4]))
        );
        writer.await.unwrap();
        assert!(matches!(reader.read_record().await, Err(BridgeError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_line_split_across_reads_then_io_error() {
        let mock = tokio_test::io::Builder::new()
            .read(b"mag analog 1.0")
            .read(b"0 2.00 3.00\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();
        let mut reader = RecordReader::new(mock, Framing::Line, "/dev/ttyUSB0");

        assert_eq!(line(reader.read_record().await.unwrap()), "mag analog 1.00 2.00 3.00");
        match reader.read_record().await {
            Err(BridgeError::Read(msg)) => {
                assert!(msg.contains("/dev/ttyUSB0"));
                assert!(msg.contains("unplugged"));
            }
            other => panic!("expected Read error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_opened_mid_frame_with_sync_in_payload() {
        // Second byte of every frame equals the sync byte
        let frame = checked_frame(&[0x00, 0xA5, 0x00, 0x00, 0x03, 0xD5, 0x09, 0x25]);
        let stream: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * 50).skip(1).collect();
        let framing = Framing::Fixed { size: frame.len(), sync: Some(0xA5), checksum: true };
        let mut reader = RecordReader::new(&stream[..], framing, "test");

        let mut frames = 0;
        loop {
            match reader.read_record().await {
                Ok(RawRecord::Frame(bytes)) => {
                    assert_eq!(&bytes[..], &frame[..]);
                    frames += 1;
                }
                Ok(other) => panic!("expected frame, got {:?}", other),
                Err(BridgeError::EndOfStream) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(frames, 49);
    }

    #[tokio::test]
    async fn test_bad_checksum_resyncs_inside_rejected_bytes() {
        let good = checked_frame(&[1, 2, 3, 4]);
        let mut corrupt = checked_frame(&[5, 6, 7, 8]);
        corrupt[2] ^= 0xFF;

        let mut stream = corrupt.clone();
        stream.extend_from_slice(&good);
        let framing = Framing::Fixed { size: good.len(), sync: Some(0xA5), checksum: true };
        let mut reader = RecordReader::new(&stream[..], framing, "test");

        assert_eq!(reader.read_record().await.unwrap(), RawRecord::Frame(Bytes::from(good)));
        assert!(matches!(reader.read_record().await, Err(BridgeError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_overlong_line_dropped() {
        let mut data = vec![b'7'; MAX_LINE_LEN * 3 + 10];
        data.extend_from_slice(b"\nacc analog 1.00 2.00 3.00\n");
        let mut reader = RecordReader::new(&data[..], Framing::Line, "test");

        assert_eq!(
            reader.read_record().await.unwrap(),
            RawRecord::Overlong { length: MAX_LINE_LEN * 3 + 10 }
        );
        assert_eq!(line(reader.read_record().await.unwrap()), "acc analog 1.00 2.00 3.00");
        assert!(matches!(reader.read_record().await, Err(BridgeError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_line_at_limit_kept() {
        let mut data = vec![b'x'; MAX_LINE_LEN];
        data.push(b'\n');
        let mut reader = RecordReader::new(&data[..], Framing::Line, "test");

        assert_eq!(line(reader.read_record().await.unwrap()).len(), MAX_LINE_LEN);
    }

    #[tokio::test]
    async fn test_endpoint_name() {
        let data: &[u8] = b"";
        let reader = RecordReader::new(data, Framing::Line, "/dev/ttyACM0");
        assert_eq!(RecordSource::endpoint(&reader), "/dev/ttyACM0");
    }
}

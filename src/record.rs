//! Record layout, stream items and the trace encoder
//!
//! A playback buffer is a flat byte sequence of variable-length records,
//! terminated by a single zero-length record (the end marker). All fields
//! are packed little-endian in byte-address order:
//!
//! ```text
//! offset 0       length    whole record, header + payload (0 = end marker)
//! offset 1..4    channel   24-bit bus channel
//! offset 4..12   timestamp 64-bit absolute issue time
//! offset 12..14  address   16-bit sub-channel register selector
//! offset 14..    payload   up to 64 bytes
//! ```

use crate::{EngineError, Result};
use std::fmt;

/// Encoded size of the record header (length, channel, timestamp, address).
pub const HEADER_LEN: usize = 1 + 3 + 8 + 2;

/// Maximum payload size: the data field is a 512-bit container.
pub const MAX_DATA_LEN: usize = 64;

/// Maximum encoded record size, which is also the slicer window size.
pub const MAX_RECORD_LEN: usize = HEADER_LEN + MAX_DATA_LEN;

/// A decoded unit of work: one timed command for the bus.
///
/// `length` is the encoded size of the whole record and doubles as the
/// stride the decoder tells the slicer to advance by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub length: u8,
    pub channel: u32,
    pub timestamp: u64,
    pub address: u16,
    pub data: Vec<u8>,
}

impl Record {
    /// Build a record from its fields, computing `length`.
    pub fn new(channel: u32, timestamp: u64, address: u16, data: Vec<u8>) -> Result<Self> {
        if data.len() > MAX_DATA_LEN {
            return Err(EngineError::PayloadTooLong(data.len()));
        }
        Ok(Self {
            length: (HEADER_LEN + data.len()) as u8,
            channel,
            timestamp,
            address,
            data,
        })
    }

    /// Decode one record from the front of a slicer window.
    ///
    /// The caller is expected to have screened the zero-length end marker
    /// already; a zero length here is reported as [`EngineError::RecordTooShort`].
    pub fn decode(window: &[u8]) -> Result<Self> {
        debug_assert!(window.len() >= MAX_RECORD_LEN);

        let length = window[0];
        if (length as usize) < HEADER_LEN {
            return Err(EngineError::RecordTooShort(length));
        }
        if (length as usize) > MAX_RECORD_LEN {
            return Err(EngineError::RecordTooLong(length));
        }

        let channel =
            u32::from(window[1]) | u32::from(window[2]) << 8 | u32::from(window[3]) << 16;
        let timestamp = u64::from_le_bytes(window[4..12].try_into().unwrap());
        let address = u16::from_le_bytes(window[12..14].try_into().unwrap());
        let data = window[HEADER_LEN..length as usize].to_vec();

        Ok(Self {
            length,
            channel,
            timestamp,
            address,
            data,
        })
    }

    /// Append the encoded form of this record to a byte buffer.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.length);
        out.push(self.channel as u8);
        out.push((self.channel >> 8) as u8);
        out.push((self.channel >> 16) as u8);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.address.to_le_bytes());
        out.extend_from_slice(&self.data);
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Record[ch={}, t={}, addr={:#06x}, {} data bytes]",
            self.channel,
            self.timestamp,
            self.address,
            self.data.len()
        )
    }
}

/// The item flowing between pipeline stages.
///
/// `End` is the end-of-packet tag the decoder synthesizes during shutdown
/// so that the one-record-deep downstream stages can drain; it carries no
/// command and is never issued to the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transfer {
    Record(Record),
    End,
}

/// Incrementally encodes a playback buffer, record by record.
///
/// Mirrors the producer side of the record contract: `append` encodes one
/// record, `finish` writes the zero-length end marker and returns the
/// buffer ready to hand to a [`BufferMemory`](crate::BufferMemory).
#[derive(Debug, Default)]
pub struct TraceBuilder {
    buffer: Vec<u8>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one record at the end of the buffer.
    pub fn append(&mut self, channel: u32, timestamp: u64, address: u16, data: &[u8]) -> Result<()> {
        let record = Record::new(channel, timestamp, address, data.to_vec())?;
        record.encode_into(&mut self.buffer);
        Ok(())
    }

    /// Number of encoded bytes so far, excluding the end marker.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Terminate the stream with the zero-length end marker and return the
    /// finished buffer.
    pub fn finish(mut self) -> Vec<u8> {
        self.buffer.push(0);
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let record = Record::new(0x030201, 0x1122334455667788, 0xBEEF, vec![0xAA]).unwrap();
        let mut bytes = Vec::new();
        record.encode_into(&mut bytes);

        assert_eq!(bytes[0], 15); // 14-byte header + 1 payload byte
        assert_eq!(&bytes[1..4], &[0x01, 0x02, 0x03]);
        assert_eq!(&bytes[4..12], &0x1122334455667788u64.to_le_bytes());
        assert_eq!(&bytes[12..14], &[0xEF, 0xBE]);
        assert_eq!(bytes[14], 0xAA);
    }

    #[test]
    fn test_decode_matches_encode() {
        let record = Record::new(7, 42, 3, vec![1, 2, 3, 4]).unwrap();
        let mut window = Vec::new();
        record.encode_into(&mut window);
        window.resize(MAX_RECORD_LEN, 0);

        assert_eq!(Record::decode(&window).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_short_length() {
        let mut window = vec![0u8; MAX_RECORD_LEN];
        window[0] = 5;
        assert!(matches!(
            Record::decode(&window),
            Err(EngineError::RecordTooShort(5))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut window = vec![0u8; MAX_RECORD_LEN];
        window[0] = 0xFF;
        assert!(matches!(
            Record::decode(&window),
            Err(EngineError::RecordTooLong(0xFF))
        ));
    }

    #[test]
    fn test_payload_bounded_by_data_field() {
        assert!(matches!(
            Record::new(1, 0, 0, vec![0; MAX_DATA_LEN + 1]),
            Err(EngineError::PayloadTooLong(_))
        ));
    }

    #[test]
    fn test_trace_builder_appends_end_marker() {
        let mut trace = TraceBuilder::new();
        trace.append(1, 100, 0, &[0x55]).unwrap();
        let bytes = trace.finish();

        assert_eq!(bytes.len(), HEADER_LEN + 1 + 1);
        assert_eq!(*bytes.last().unwrap(), 0);
    }
}

//! Redundancy (RED) block headers per RFC 2198 as profiled by RFC 4103.
//!
//! A redundant block header is 4 bytes:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |1|   block PT  |  timestamp offset         |   block length    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The final (primary) block header is a single byte with the leading
//! bit clear, carrying just the payload type.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::Result;

/// Size of one redundant-block header
pub const RED_HEADER_SIZE: usize = 4;

/// Size of the primary-block header
pub const RED_PRIMARY_HEADER_SIZE: usize = 1;

/// Largest representable timestamp offset (14 bits)
pub const MAX_TIMESTAMP_OFFSET: u32 = 0x3FFF;

/// Largest representable block length (10 bits)
pub const MAX_BLOCK_LENGTH: usize = 0x3FF;

/// One parsed redundant-block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedBlockHeader {
    /// Payload type of the redundant data (the T.140 payload type)
    pub payload_type: u8,
    /// Milliseconds between this block's original timestamp and the
    /// carrying packet's timestamp
    pub timestamp_offset: u16,
    /// Length in bytes of the redundant data
    pub block_length: u16,
}

impl RedBlockHeader {
    /// Serialize as a 4-byte redundant-block header (leading bit set).
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8(0x80 | (self.payload_type & 0x7F));
        // 24 bits: 14-bit offset, 10-bit length, big-endian
        let packed: u32 =
            ((self.timestamp_offset as u32 & MAX_TIMESTAMP_OFFSET) << 10) | (self.block_length as u32 & 0x3FF);
        buf.put_u8((packed >> 16) as u8);
        buf.put_u8((packed >> 8) as u8);
        buf.put_u8(packed as u8);
    }
}

/// Write the 1-byte primary-block header (leading bit clear).
pub fn serialize_primary_header(payload_type: u8, buf: &mut BytesMut) {
    buf.put_u8(payload_type & 0x7F);
}

/// The decoded redundancy section of an RTT packet: the redundant
/// generations (oldest first, payloads attached) and the primary data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedPayload {
    /// Redundant generations, oldest first
    pub blocks: Vec<(RedBlockHeader, Bytes)>,
    /// Payload type from the primary-block header
    pub primary_payload_type: u8,
    /// The primary (new) data
    pub primary: Bytes,
}

/// Parse a RED-encapsulated payload: block headers, then payloads in
/// the same order, then the primary data.
pub fn parse_red_payload(payload: &[u8]) -> Result<RedPayload> {
    let mut buf = payload;
    let mut headers = Vec::new();

    let primary_payload_type = loop {
        if buf.remaining() < 1 {
            return Err(Error::MediaParse("missing primary block header".to_string()));
        }
        let first = buf.get_u8();
        if first & 0x80 == 0 {
            break first & 0x7F;
        }
        if buf.remaining() < RED_HEADER_SIZE - 1 {
            return Err(Error::MediaParse("truncated redundant block header".to_string()));
        }
        let b1 = buf.get_u8() as u32;
        let b2 = buf.get_u8() as u32;
        let b3 = buf.get_u8() as u32;
        let packed = (b1 << 16) | (b2 << 8) | b3;
        headers.push(RedBlockHeader {
            payload_type: first & 0x7F,
            timestamp_offset: (packed >> 10) as u16,
            block_length: (packed & 0x3FF) as u16,
        });
    };

    let redundant_total: usize = headers.iter().map(|h| h.block_length as usize).sum();
    if buf.remaining() < redundant_total {
        return Err(Error::MediaParse(format!(
            "redundant data truncated: need {} have {}",
            redundant_total,
            buf.remaining()
        )));
    }

    let mut blocks = Vec::with_capacity(headers.len());
    for header in headers {
        let data = Bytes::copy_from_slice(&buf[..header.block_length as usize]);
        buf.advance(header.block_length as usize);
        blocks.push((header, data));
    }
    let primary = Bytes::copy_from_slice(buf);

    Ok(RedPayload {
        blocks,
        primary_payload_type,
        primary,
    })
}

//! RTP packet structures per RFC 3550.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::{Result, RtpCsrc, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RTP protocol version (always 2 in practice)
pub const RTP_VERSION: u8 = 2;

/// Minimum header size (without CSRC or extensions)
pub const RTP_MIN_HEADER_SIZE: usize = 12;

/// RTP header implementation according to RFC 3550
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (should be 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// CSRC count (number of contributing sources)
    pub cc: u8,

    /// Marker bit
    pub marker: bool,

    /// Payload type
    pub payload_type: u8,

    /// Sequence number
    pub sequence_number: RtpSequenceNumber,

    /// Timestamp
    pub timestamp: RtpTimestamp,

    /// Synchronization source identifier
    pub ssrc: RtpSsrc,

    /// Contributing source identifiers
    pub csrc: Vec<RtpCsrc>,
}

impl RtpHeader {
    /// Create a new RTP header with default values
    pub fn new(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
    ) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            cc: 0,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
        }
    }

    /// Get the size of the header in bytes
    pub fn size(&self) -> usize {
        RTP_MIN_HEADER_SIZE + self.csrc.len() * 4
    }

    /// Parse an RTP header from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTP_MIN_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTP_MIN_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        // First byte: version (2 bits), padding (1), extension (1), CSRC count (4)
        let first = buf.get_u8();
        let version = first >> 6;
        if version != RTP_VERSION {
            return Err(Error::InvalidPacket(format!("Invalid RTP version: {}", version)));
        }
        let padding = (first & 0x20) != 0;
        let extension = (first & 0x10) != 0;
        let cc = first & 0x0F;

        // Second byte: marker (1 bit), payload type (7 bits)
        let second = buf.get_u8();
        let marker = (second & 0x80) != 0;
        let payload_type = second & 0x7F;

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        if buf.remaining() < cc as usize * 4 {
            return Err(Error::BufferTooSmall {
                required: cc as usize * 4,
                available: buf.remaining(),
            });
        }
        let mut csrc = Vec::with_capacity(cc as usize);
        for _ in 0..cc {
            csrc.push(buf.get_u32());
        }

        // Skip any extension header; RTT carries none
        if extension {
            if buf.remaining() < 4 {
                return Err(Error::BufferTooSmall {
                    required: 4,
                    available: buf.remaining(),
                });
            }
            let _profile = buf.get_u16();
            let words = buf.get_u16() as usize;
            if buf.remaining() < words * 4 {
                return Err(Error::BufferTooSmall {
                    required: words * 4,
                    available: buf.remaining(),
                });
            }
            buf.advance(words * 4);
        }

        Ok(Self {
            version,
            padding,
            extension,
            cc,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
        })
    }

    /// Serialize the header into a buffer
    pub fn serialize(&self, buf: &mut BytesMut) {
        let mut first = (self.version << 6) | (self.csrc.len() as u8 & 0x0F);
        if self.padding {
            first |= 0x20;
        }
        if self.extension {
            first |= 0x10;
        }
        buf.put_u8(first);

        let mut second = self.payload_type & 0x7F;
        if self.marker {
            second |= 0x80;
        }
        buf.put_u8(second);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }
    }
}

/// A complete RTP packet: header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create a packet from header fields and a payload
    pub fn new_with_payload(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
        payload: Bytes,
    ) -> Self {
        Self {
            header: RtpHeader::new(payload_type, sequence_number, timestamp, ssrc),
            payload,
        }
    }

    /// Total serialized size in bytes
    pub fn size(&self) -> usize {
        self.header.size() + self.payload.len()
    }

    /// Serialize the packet to wire format
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        self.header.serialize(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a packet from wire bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let header = RtpHeader::parse(&mut buf)?;
        let payload = Bytes::copy_from_slice(buf);
        Ok(Self { header, payload })
    }
}

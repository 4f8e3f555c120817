//! Synchronous packetizer for outgoing real-time text.

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

use crate::clock::MediaClock;
use crate::packet::{RtpHeader, RTP_MIN_HEADER_SIZE};
use crate::red::{
    serialize_primary_header, RedBlockHeader, MAX_BLOCK_LENGTH, MAX_TIMESTAMP_OFFSET,
    RED_HEADER_SIZE, RED_PRIMARY_HEADER_SIZE,
};
use crate::ring::RedundancyRing;
use crate::{Error, Result, RttParameters, RtpSequenceNumber, RtpSsrc};

/// Builds the RTP packets of one outgoing RTT stream.
///
/// Owns the sequence counter, the session SSRC, the monotonic clock and
/// the redundancy ring. Purely synchronous — the paced sender task
/// drives it, and tests can drive it directly.
#[derive(Debug)]
pub struct RttEncoder {
    params: RttParameters,
    clock: MediaClock,
    ring: RedundancyRing,
    ssrc: RtpSsrc,
    sequence_number: RtpSequenceNumber,
}

impl RttEncoder {
    /// An encoder with a freshly drawn SSRC and sequence number.
    pub fn new(params: RttParameters) -> Self {
        let mut rng = rand::thread_rng();
        Self::with_parts(params, rng.gen(), rng.gen())
    }

    /// An encoder with explicit SSRC and initial sequence number.
    pub fn with_parts(
        params: RttParameters,
        ssrc: RtpSsrc,
        initial_sequence: RtpSequenceNumber,
    ) -> Self {
        RttEncoder {
            params,
            clock: MediaClock::start(),
            ring: RedundancyRing::new(),
            ssrc,
            sequence_number: initial_sequence,
        }
    }

    pub fn params(&self) -> &RttParameters {
        &self.params
    }

    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    /// Encode new text into a wire-ready packet.
    ///
    /// With redundancy enabled the text is RED-encapsulated together
    /// with the retained generations; otherwise it goes out as a plain
    /// T.140 payload.
    pub fn encode_text(&mut self, text: &[u8]) -> Result<Bytes> {
        if self.params.uses_redundancy() {
            self.encode_red(text)
        } else {
            Ok(self.encode_plain(text))
        }
    }

    /// Encode a redundancy-only packet (no new text), refreshing the
    /// receiver's reassembly window. Returns `None` once every retained
    /// generation has drained.
    pub fn encode_idle(&mut self) -> Result<Option<Bytes>> {
        if !self.params.uses_redundancy() || self.ring.is_drained(self.params.redundancy_level) {
            return Ok(None);
        }
        self.encode_red(&[]).map(Some)
    }

    /// Whether a redundancy-only send is still worthwhile.
    pub fn has_pending_redundancy(&self) -> bool {
        self.params.uses_redundancy() && !self.ring.is_drained(self.params.redundancy_level)
    }

    fn encode_plain(&mut self, text: &[u8]) -> Bytes {
        let now = self.clock.now_ms();
        let mut header = RtpHeader::new(
            self.params.t140_payload_type,
            self.sequence_number,
            now,
            self.ssrc,
        );
        header.marker = true;

        let mut buf = BytesMut::with_capacity(RTP_MIN_HEADER_SIZE + text.len());
        header.serialize(&mut buf);
        buf.put_slice(text);
        self.sequence_number = self.sequence_number.wrapping_add(1);
        buf.freeze()
    }

    fn encode_red(&mut self, text: &[u8]) -> Result<Bytes> {
        if text.len() > MAX_BLOCK_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "text block of {} bytes exceeds the {}-byte redundancy limit",
                text.len(),
                MAX_BLOCK_LENGTH
            )));
        }

        let level = self.params.redundancy_level;
        let now = self.clock.now_ms();

        let mut header = RtpHeader::new(
            self.params.red_payload_type,
            self.sequence_number,
            now,
            self.ssrc,
        );
        header.marker = !text.is_empty();

        let red_len = self.ring.total_len(level);
        let capacity = RTP_MIN_HEADER_SIZE
            + level * RED_HEADER_SIZE
            + RED_PRIMARY_HEADER_SIZE
            + red_len
            + text.len();
        let mut buf = BytesMut::with_capacity(capacity);
        header.serialize(&mut buf);

        // Redundant-block headers, oldest generation first. The wire
        // offset is the block's age at this instant; vacant slots get 0.
        for (created_ts, payload) in self.ring.generations(level) {
            let offset = if payload.is_empty() {
                0
            } else {
                crate::clock::elapsed_ms(created_ts, now).min(MAX_TIMESTAMP_OFFSET)
            };
            RedBlockHeader {
                payload_type: self.params.t140_payload_type,
                timestamp_offset: offset as u16,
                block_length: payload.len() as u16,
            }
            .serialize(&mut buf);
        }
        serialize_primary_header(self.params.t140_payload_type, &mut buf);

        // Redundant data oldest-first, then the new text
        for (_, payload) in self.ring.generations(level) {
            buf.put_slice(payload);
        }
        buf.put_slice(text);

        self.ring.push(now, Bytes::copy_from_slice(text));
        self.sequence_number = self.sequence_number.wrapping_add(1);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::RtpPacket;
    use crate::red::parse_red_payload;
    use std::time::Duration;

    fn red_params(level: usize) -> RttParameters {
        RttParameters {
            redundancy_level: level,
            ..RttParameters::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_red_packet_layout() {
        let mut encoder = RttEncoder::with_parts(red_params(3), 0xcafebabe, 100);
        let wire = encoder.encode_text(b"Hi").unwrap();

        // 12 RTP + 3*4 red headers + 1 primary header + 0 red data + 2 text
        assert_eq!(wire.len(), 27);

        let packet = RtpPacket::parse(&wire).unwrap();
        assert!(packet.header.marker);
        assert_eq!(packet.header.payload_type, 99);
        assert_eq!(packet.header.sequence_number, 100);
        assert_eq!(packet.header.ssrc, 0xcafebabe);

        let red = parse_red_payload(&packet.payload).unwrap();
        assert_eq!(red.blocks.len(), 3);
        assert!(red.blocks.iter().all(|(h, d)| h.block_length == 0 && d.is_empty()));
        assert_eq!(red.primary_payload_type, 98);
        assert_eq!(&red.primary[..], b"Hi");
    }

    #[tokio::test(start_paused = true)]
    async fn second_packet_carries_prior_text_with_its_age() {
        let mut encoder = RttEncoder::with_parts(red_params(3), 1, 0);
        encoder.encode_text(b"Hi").unwrap();

        tokio::time::advance(Duration::from_millis(50)).await;
        let wire = encoder.encode_text(b"!").unwrap();

        // 12 + 12 + 1 + 2 redundant + 1 new
        assert_eq!(wire.len(), 28);

        let packet = RtpPacket::parse(&wire).unwrap();
        assert_eq!(packet.header.sequence_number, 1);
        assert_eq!(packet.header.timestamp, 50);

        let red = parse_red_payload(&packet.payload).unwrap();
        assert_eq!(red.blocks[0].0.block_length, 0);
        assert_eq!(red.blocks[1].0.block_length, 0);
        assert_eq!(red.blocks[2].0.block_length, 2);
        assert_eq!(red.blocks[2].0.timestamp_offset, 50);
        assert_eq!(&red.blocks[2].1[..], b"Hi");
        assert_eq!(&red.primary[..], b"!");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_packets_drain_the_ring() {
        let mut encoder = RttEncoder::with_parts(red_params(2), 1, 0);
        encoder.encode_text(b"ab").unwrap();
        assert!(encoder.has_pending_redundancy());

        // First idle packet still carries "ab"
        let wire = encoder.encode_idle().unwrap().unwrap();
        let packet = RtpPacket::parse(&wire).unwrap();
        assert!(!packet.header.marker);
        let red = parse_red_payload(&packet.payload).unwrap();
        assert_eq!(&red.blocks[1].1[..], b"ab");
        assert!(red.primary.is_empty());

        // Second idle packet shifts "ab" to the oldest generation
        let wire = encoder.encode_idle().unwrap().unwrap();
        let red = parse_red_payload(&RtpPacket::parse(&wire).unwrap().payload).unwrap();
        assert_eq!(&red.blocks[0].1[..], b"ab");

        // Ring is drained; no further idle packets
        assert!(encoder.encode_idle().unwrap().is_none());
        assert!(!encoder.has_pending_redundancy());
    }

    #[tokio::test(start_paused = true)]
    async fn no_redundancy_emits_plain_t140() {
        let params = RttParameters {
            red_payload_type: 0,
            redundancy_level: 0,
            ..RttParameters::default()
        };
        let mut encoder = RttEncoder::with_parts(params, 7, 10);
        let wire = encoder.encode_text("hello".as_bytes()).unwrap();

        let packet = RtpPacket::parse(&wire).unwrap();
        assert_eq!(packet.header.payload_type, 98);
        assert!(packet.header.marker);
        assert_eq!(&packet.payload[..], b"hello");
        assert!(encoder.encode_idle().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_numbers_wrap() {
        let mut encoder = RttEncoder::with_parts(red_params(1), 1, u16::MAX);
        let first = RtpPacket::parse(&encoder.encode_text(b"a").unwrap()).unwrap();
        let second = RtpPacket::parse(&encoder.encode_text(b"b").unwrap()).unwrap();
        assert_eq!(first.header.sequence_number, u16::MAX);
        assert_eq!(second.header.sequence_number, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_text_is_refused() {
        let mut encoder = RttEncoder::with_parts(red_params(1), 1, 0);
        let big = vec![b'x'; MAX_BLOCK_LENGTH + 1];
        assert!(matches!(
            encoder.encode_text(&big),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn offset_is_clamped_to_the_field_width() {
        let mut encoder = RttEncoder::with_parts(red_params(1), 1, 0);
        encoder.encode_text(b"x").unwrap();
        tokio::time::advance(Duration::from_millis(20_000)).await;
        let wire = encoder.encode_text(b"y").unwrap();
        let red = parse_red_payload(&RtpPacket::parse(&wire).unwrap().payload).unwrap();
        assert_eq!(red.blocks[0].0.timestamp_offset as u32, MAX_TIMESTAMP_OFFSET);
    }
}

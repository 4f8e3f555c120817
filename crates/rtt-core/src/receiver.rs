//! Reassembly of an incoming real-time text stream.

use tracing::{debug, trace};

use crate::packet::RtpPacket;
use crate::red::parse_red_payload;
use crate::{Error, Result, RttParameters};

/// Half the sequence space: receivers accept forward jumps below this
/// and treat everything else as stale or duplicate (16-bit modular).
const SEQUENCE_FORWARD_WINDOW: u16 = 0x8000;

/// Counters for one receiving session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Packets accepted in order (including gap-recovered arrivals)
    pub packets_received: u64,
    /// Lost packets whose text was recovered from redundancy
    pub packets_recovered: u64,
    /// Lost packets that no redundancy covered
    pub packets_lost: u64,
    /// Duplicate or stale packets dropped
    pub packets_discarded: u64,
}

/// Rebuilds the text stream from RTP packets, filling loss gaps from
/// the redundant generations each packet carries.
///
/// Each accepted packet yields the text the stream gained, in sender
/// order. A malformed packet leaves the receiver state untouched — the
/// caller logs and drops it, and reassembly continues with the next
/// packet.
#[derive(Debug)]
pub struct RttReceiver {
    params: RttParameters,
    last_sequence: Option<u16>,
    stats: ReceiverStats,
}

impl RttReceiver {
    pub fn new(params: RttParameters) -> Self {
        RttReceiver {
            params,
            last_sequence: None,
            stats: ReceiverStats::default(),
        }
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Process one incoming packet; returns recovered text segments in
    /// sender order.
    pub fn process(&mut self, wire: &[u8]) -> Result<Vec<String>> {
        let packet = RtpPacket::parse(wire)?;
        self.process_packet(&packet)
    }

    /// Process an already-parsed packet.
    pub fn process_packet(&mut self, packet: &RtpPacket) -> Result<Vec<String>> {
        let sequence = packet.header.sequence_number;

        let gap = match self.last_sequence {
            Some(last) => {
                let delta = sequence.wrapping_sub(last);
                if delta == 0 || delta >= SEQUENCE_FORWARD_WINDOW {
                    trace!(sequence, last, "duplicate or stale packet dropped");
                    self.stats.packets_discarded += 1;
                    return Ok(Vec::new());
                }
                (delta - 1) as usize
            }
            // First packet of the session: its redundancy predates us
            None => 0,
        };

        let segments = if self.is_red(packet.header.payload_type) {
            self.process_red(packet, gap)?
        } else if packet.header.payload_type == self.params.t140_payload_type {
            self.process_plain(packet, gap)
        } else {
            return Err(Error::MediaParse(format!(
                "unexpected payload type {}",
                packet.header.payload_type
            )));
        };

        self.last_sequence = Some(sequence);
        self.stats.packets_received += 1;
        Ok(segments)
    }

    fn is_red(&self, payload_type: u8) -> bool {
        self.params.red_payload_type != 0 && payload_type == self.params.red_payload_type
    }

    fn process_red(&mut self, packet: &RtpPacket, gap: usize) -> Result<Vec<String>> {
        let red = parse_red_payload(&packet.payload)?;

        // The newest `gap` generations are exactly the packets we never
        // saw; apply them oldest-first ahead of the primary data.
        let generations = red.blocks.len();
        let recoverable = gap.min(generations);
        if gap > generations {
            debug!(gap, generations, "loss exceeds redundancy span");
            self.stats.packets_lost += (gap - generations) as u64;
        }
        self.stats.packets_recovered += recoverable as u64;

        let mut segments = Vec::new();
        for (_, data) in &red.blocks[generations - recoverable..] {
            push_text(&mut segments, data);
        }
        push_text(&mut segments, &red.primary);
        Ok(segments)
    }

    fn process_plain(&mut self, packet: &RtpPacket, gap: usize) -> Vec<String> {
        if gap > 0 {
            debug!(gap, "plain T.140 stream lost packets without redundancy");
            self.stats.packets_lost += gap as u64;
        }
        let mut segments = Vec::new();
        push_text(&mut segments, &packet.payload);
        segments
    }
}

fn push_text(segments: &mut Vec<String>, data: &[u8]) {
    if !data.is_empty() {
        segments.push(String::from_utf8_lossy(data).into_owned());
    }
}

//! RTT session parameters, derived from a negotiated media description.

use rtext_sip_core::sdp::MediaDescription;

use crate::ring::MAX_REDUNDANCY;

/// T.140 encoding name in rtpmap entries
pub const T140_ENCODING: &str = "t140";

/// RED encoding name in rtpmap entries
pub const RED_ENCODING: &str = "red";

/// Parameters of one real-time text session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RttParameters {
    /// Primary T.140 RTP payload type
    pub t140_payload_type: u8,
    /// RED RTP payload type; 0 disables redundancy encapsulation
    pub red_payload_type: u8,
    /// Generations of redundancy carried per packet (0-5)
    pub redundancy_level: usize,
    /// Maximum characters per second; 0 means unpaced
    pub cps: u32,
    /// Whether the peer advertised `a=rtt-mixer`
    pub mixer_aware: bool,
}

impl Default for RttParameters {
    fn default() -> Self {
        RttParameters {
            t140_payload_type: 98,
            red_payload_type: 99,
            redundancy_level: 3,
            cps: 0,
            mixer_aware: false,
        }
    }
}

impl RttParameters {
    /// Derive parameters from a negotiated `m=text` media description.
    ///
    /// Looks up rtpmap entries by encoding name. The redundancy level is
    /// the number of times the T.140 payload type appears in the RED
    /// fmtp parameter (e.g. `98/98/98`) minus one — the last occurrence
    /// is the primary encoding. Returns `None` when the description
    /// carries no T.140 format.
    pub fn from_media_description(media: &MediaDescription) -> Option<Self> {
        let t140 = media.rtpmap_by_encoding(T140_ENCODING)?;

        let (red_payload_type, redundancy_level) =
            match media.rtpmap_by_encoding(RED_ENCODING) {
                Some(red) => {
                    let occurrences = media
                        .fmtp(red.payload_type)
                        .map(|raw| {
                            raw.split('/')
                                .filter(|part| {
                                    part.trim().parse::<u8>() == Ok(t140.payload_type)
                                })
                                .count()
                        })
                        .unwrap_or(0);
                    (red.payload_type, occurrences.saturating_sub(1).min(MAX_REDUNDANCY))
                }
                None => (0, 0),
            };

        let cps = media
            .fmtp_params(t140.payload_type)
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("cps"))
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(0);

        let mixer_aware = media.attribute("rtt-mixer").is_some();

        Some(RttParameters {
            t140_payload_type: t140.payload_type,
            red_payload_type,
            redundancy_level,
            cps,
            mixer_aware,
        })
    }

    /// Whether packets are RED-encapsulated.
    pub fn uses_redundancy(&self) -> bool {
        self.red_payload_type != 0 && self.redundancy_level > 0
    }
}

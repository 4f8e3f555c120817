//! Typed session/media description accessors consumed by the media layer.
//!
//! SDP parsing and serialization are out of scope for this stack; peers
//! hand over an already-decoded description and the media layer reads
//! rtpmap/fmtp/attribute data through the accessors below.

/// One `a=rtpmap` entry of a media description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    /// RTP payload type number
    pub payload_type: u8,
    /// Encoding name as written (e.g. "t140", "red")
    pub encoding: String,
    /// Clock rate in Hz
    pub clock_rate: u32,
    /// Channel count; 0 when the rtpmap carried none
    pub channels: u32,
}

/// A single media block (`m=` section) of a session description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaDescription {
    /// Media type token ("audio", "text", ...)
    pub media_type: String,
    /// Transport port
    pub port: u16,
    /// Transport protocol ("RTP/AVP", ...)
    pub protocol: String,
    /// Format numbers from the m= line, in order
    pub formats: Vec<String>,
    /// rtpmap entries, in order
    pub rtpmaps: Vec<RtpMap>,
    /// fmtp entries: format number -> raw parameter string
    pub fmtps: Vec<(String, String)>,
    /// Media-level attributes, value-less attributes carry `None`
    pub attributes: Vec<(String, Option<String>)>,
}

/// An opaque, already-decoded session description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDescription {
    /// Media blocks in order of appearance
    pub media: Vec<MediaDescription>,
    /// Session-level attributes
    pub attributes: Vec<(String, Option<String>)>,
}

impl SessionDescription {
    /// First media block with the given type token.
    pub fn media(&self, media_type: &str) -> Option<&MediaDescription> {
        self.media
            .iter()
            .find(|m| m.media_type.eq_ignore_ascii_case(media_type))
    }
}

impl MediaDescription {
    pub fn new(media_type: &str, port: u16, protocol: &str) -> Self {
        MediaDescription {
            media_type: media_type.to_string(),
            port,
            protocol: protocol.to_string(),
            ..Default::default()
        }
    }

    /// Register a format with its rtpmap entry.
    pub fn add_rtpmap(&mut self, payload_type: u8, encoding: &str, clock_rate: u32, channels: u32) {
        self.formats.push(payload_type.to_string());
        self.rtpmaps.push(RtpMap {
            payload_type,
            encoding: encoding.to_string(),
            clock_rate,
            channels,
        });
    }

    pub fn add_fmtp(&mut self, format: u8, params: &str) {
        self.fmtps.push((format.to_string(), params.to_string()));
    }

    pub fn add_attribute(&mut self, attribute: &str, value: Option<&str>) {
        self.attributes
            .push((attribute.to_string(), value.map(|v| v.to_string())));
    }

    /// Look up an rtpmap entry by encoding name (case-insensitive).
    pub fn rtpmap_by_encoding(&self, encoding: &str) -> Option<&RtpMap> {
        self.rtpmaps
            .iter()
            .find(|m| m.encoding.eq_ignore_ascii_case(encoding))
    }

    /// Raw fmtp parameter string for a format number.
    pub fn fmtp(&self, format: u8) -> Option<&str> {
        let format = format.to_string();
        self.fmtps
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, p)| p.as_str())
    }

    /// fmtp parameters for a format, split into ordered name/value pairs.
    /// Bare tokens (no `=`) yield an empty value.
    pub fn fmtp_params(&self, format: u8) -> Vec<(String, String)> {
        match self.fmtp(format) {
            Some(raw) => raw
                .split(';')
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(|p| match p.split_once('=') {
                    Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                    None => (p.to_string(), String::new()),
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Media-level attribute value by name (case-insensitive).
    /// `Some(None)` means the attribute is present without a value.
    pub fn attribute(&self, attribute: &str) -> Option<Option<&str>> {
        self.attributes
            .iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(attribute))
            .map(|(_, v)| v.as_deref())
    }
}

use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for RTT media operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer too small for the structure being read or written
    #[error("Buffer too small: need {required} but have {available}")]
    BufferTooSmall {
        required: usize,
        available: usize,
    },

    /// Structurally invalid RTP packet
    #[error("Invalid RTP packet: {0}")]
    InvalidPacket(String),

    /// Malformed redundancy encapsulation; the packet is discarded and
    /// the receiver continues
    #[error("Malformed RED payload: {0}")]
    MediaParse(String),

    /// Invalid parameter for an RTT operation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The outbound packet channel is gone
    #[error("Packet channel closed")]
    ChannelClosed,
}

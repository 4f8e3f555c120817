//! # rtext-rtt-core
//!
//! Real-time text (RFC 4103) over RTP for the rtext stack: a paced
//! sender with RED redundancy encapsulation and a receiver that rebuilds
//! a gap-free text stream from the redundant generations.
//!
//! ## Sending
//!
//! [`RttSender`] queues strings from any number of producers, paces
//! characters when a `cps` cap is negotiated, normalizes line endings to
//! U+2028 and emits wire-ready RTP packets. While redundant generations
//! remain undelivered it refreshes them with redundancy-only packets
//! every 300 ms.
//!
//! ## Receiving
//!
//! [`RttReceiver`] tracks the RTP sequence run; on a gap it pulls the
//! missing text out of the next packet's redundant generations, so up to
//! `redundancy_level` consecutive losses are invisible.
//!
//! Session parameters come from negotiated SDP via
//! [`RttParameters::from_media_description`].

pub mod clock;
pub mod encoder;
pub mod error;
pub mod packet;
pub mod params;
pub mod receiver;
pub mod red;
pub mod ring;
pub mod sender;

pub use clock::MediaClock;
pub use encoder::RttEncoder;
pub use error::{Error, Result};
pub use packet::{RtpHeader, RtpPacket, RTP_MIN_HEADER_SIZE};
pub use params::RttParameters;
pub use receiver::{ReceiverStats, RttReceiver};
pub use red::{RedBlockHeader, RedPayload};
pub use ring::{RedundancyRing, MAX_REDUNDANCY};
pub use sender::{RttSender, SenderStats, SEND_IDLE_TIME};

/// Typedef for RTP timestamp values
pub type RtpTimestamp = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Typedef for RTP contributing source identifier
pub type RtpCsrc = u32;

//! Events emitted by message channels.

use std::net::SocketAddr;

use bytes::Bytes;

/// Events delivered on the receiver handed out at channel construction.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Raw bytes arrived from a remote endpoint
    MessageReceived {
        /// Remote endpoint the bytes came from
        source: SocketAddr,
        /// The received bytes, exactly as read off the wire
        bytes: Bytes,
    },

    /// The channel closed (locally or by the peer); no further events follow
    Closed,

    /// A transport-level error that did not close the channel
    Error(String),
}

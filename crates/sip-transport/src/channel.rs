//! The channel contract consumed by the transaction layer.

use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;

/// A type alias for handling `Result`s with `ChannelError`
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors surfaced by a message channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The underlying connection is gone
    #[error("Channel disconnected")]
    Disconnected,

    /// The remote endpoint cannot be reached
    #[error("Endpoint unreachable: {0}")]
    Unreachable(SocketAddr),

    /// The channel was closed locally
    #[error("Channel closed")]
    Closed,

    /// Transport-level I/O failure
    #[error("Channel I/O error: {0}")]
    Io(String),
}

/// A bidirectional byte channel to one or more remote SIP endpoints.
///
/// Implementations hand out an event receiver at construction; inbound
/// bytes, closure and errors arrive as [`crate::ChannelEvent`]s. Message
/// framing and parsing are the consumer's concern.
#[async_trait::async_trait]
pub trait MessageChannel: Send + Sync + std::fmt::Debug {
    /// Send raw bytes to a remote endpoint.
    async fn send(&self, destination: SocketAddr, bytes: Bytes) -> Result<()>;

    /// The local endpoint this channel is bound to.
    fn local_endpoint(&self) -> SocketAddr;

    /// Whether the transport is reliable (TCP/TLS) or not (UDP).
    ///
    /// Reliable channels suppress retransmission timers and zero the
    /// transaction wait timers K/D/I/J.
    fn is_reliable(&self) -> bool;

    /// Close the channel. Idempotent.
    async fn close(&self);

    /// Whether the channel has been closed.
    fn is_closed(&self) -> bool;
}

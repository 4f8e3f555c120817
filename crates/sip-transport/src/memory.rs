//! In-process channel pair for tests and examples.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::{ChannelError, MessageChannel, Result};
use crate::events::ChannelEvent;

// Default event channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// One end of an in-process duplex byte channel.
///
/// `MemoryChannel::pair` wires two ends together; bytes sent on one end
/// arrive as [`ChannelEvent::MessageReceived`] on the other. [`sever`]
/// simulates a broken link: subsequent sends fail with `Disconnected`
/// and both ends observe [`ChannelEvent::Closed`].
///
/// [`sever`]: MemoryChannel::sever
#[derive(Clone)]
pub struct MemoryChannel {
    inner: Arc<Inner>,
}

struct Inner {
    local: SocketAddr,
    reliable: bool,
    closed: AtomicBool,
    severed: Arc<AtomicBool>,
    peer_tx: mpsc::Sender<ChannelEvent>,
    own_tx: mpsc::Sender<ChannelEvent>,
}

impl MemoryChannel {
    /// Create a connected pair of channels with their event receivers.
    pub fn pair(
        addr_a: SocketAddr,
        addr_b: SocketAddr,
        reliable: bool,
    ) -> (
        (MemoryChannel, mpsc::Receiver<ChannelEvent>),
        (MemoryChannel, mpsc::Receiver<ChannelEvent>),
    ) {
        let (tx_a, rx_a) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let severed = Arc::new(AtomicBool::new(false));

        let a = MemoryChannel {
            inner: Arc::new(Inner {
                local: addr_a,
                reliable,
                closed: AtomicBool::new(false),
                severed: severed.clone(),
                peer_tx: tx_b.clone(),
                own_tx: tx_a.clone(),
            }),
        };
        let b = MemoryChannel {
            inner: Arc::new(Inner {
                local: addr_b,
                reliable,
                closed: AtomicBool::new(false),
                severed,
                peer_tx: tx_a,
                own_tx: tx_b,
            }),
        };
        ((a, rx_a), (b, rx_b))
    }

    /// Break the link: all further sends on either end fail with
    /// `Disconnected` and both ends receive `Closed`.
    pub async fn sever(&self) {
        if self.inner.severed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(local = %self.inner.local, "memory channel severed");
        let _ = self.inner.own_tx.send(ChannelEvent::Closed).await;
        let _ = self.inner.peer_tx.send(ChannelEvent::Closed).await;
    }
}

#[async_trait::async_trait]
impl MessageChannel for MemoryChannel {
    async fn send(&self, destination: SocketAddr, bytes: Bytes) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        if self.inner.severed.load(Ordering::SeqCst) {
            return Err(ChannelError::Disconnected);
        }
        debug!(local = %self.inner.local, %destination, len = bytes.len(), "memory channel send");
        self.inner
            .peer_tx
            .send(ChannelEvent::MessageReceived {
                source: self.inner.local,
                bytes,
            })
            .await
            .map_err(|_| ChannelError::Disconnected)
    }

    fn local_endpoint(&self) -> SocketAddr {
        self.inner.local
    }

    fn is_reliable(&self) -> bool {
        self.inner.reliable
    }

    async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.own_tx.send(ChannelEvent::Closed).await;
        let _ = self.inner.peer_tx.send(ChannelEvent::Closed).await;
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryChannel({})", self.inner.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[tokio::test]
    async fn bytes_cross_the_pair() {
        let ((a, _rx_a), (b, mut rx_b)) = MemoryChannel::pair(addr(5060), addr(5070), false);

        a.send(addr(5070), Bytes::from_static(b"hello")).await.unwrap();

        assert_eq!(b.local_endpoint(), addr(5070));
        match rx_b.recv().await.unwrap() {
            ChannelEvent::MessageReceived { source, bytes } => {
                assert_eq!(source, addr(5060));
                assert_eq!(&bytes[..], b"hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn sever_fails_sends_and_notifies_both_ends() {
        let ((a, mut rx_a), (b, mut rx_b)) = MemoryChannel::pair(addr(5060), addr(5070), true);

        b.sever().await;

        assert_eq!(
            a.send(addr(5070), Bytes::from_static(b"x")).await,
            Err(ChannelError::Disconnected)
        );
        assert!(matches!(rx_a.recv().await.unwrap(), ChannelEvent::Closed));
        assert!(matches!(rx_b.recv().await.unwrap(), ChannelEvent::Closed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let ((a, mut rx_a), (_b, _rx_b)) = MemoryChannel::pair(addr(1), addr(2), true);
        a.close().await;
        a.close().await;
        assert!(a.is_closed());
        // Exactly one Closed event
        assert!(matches!(rx_a.recv().await.unwrap(), ChannelEvent::Closed));
        assert!(rx_a.try_recv().is_err());
    }
}

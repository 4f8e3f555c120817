//! The paced real-time text sender task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::encoder::RttEncoder;
use crate::{Error, Result, RttParameters};

/// Idle interval after which a redundancy-only packet goes out while
/// redundant generations remain undelivered.
pub const SEND_IDLE_TIME: Duration = Duration::from_millis(300);

// Capacity of the outbound packet channel
const PACKET_CHANNEL_CAPACITY: usize = 64;

// Capacity of the text queue
const TEXT_QUEUE_CAPACITY: usize = 64;

/// Counters for one sending session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Packets emitted, including redundancy-only refreshes
    pub packets_sent: u64,
    /// Characters of new text carried
    pub chars_sent: u64,
}

/// Queued, paced sender for one outgoing RTT stream.
///
/// Producers enqueue strings from any task; the sender task dequeues
/// them one at a time, normalizes line endings to U+2028, splits into
/// characters when a cps cap applies, and emits wire-ready packets on
/// the channel handed out at construction.
#[derive(Debug)]
pub struct RttSender {
    params: RttParameters,
    text_tx: mpsc::Sender<String>,
    stats: Arc<Mutex<SenderStats>>,
    worker: Option<Worker>,
    task: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Worker {
    encoder: RttEncoder,
    text_rx: mpsc::Receiver<String>,
    packet_tx: mpsc::Sender<Bytes>,
    cps: u32,
    stats: Arc<Mutex<SenderStats>>,
}

impl RttSender {
    /// Create a sender and the receiver of its outgoing packets.
    pub fn new(params: RttParameters) -> (Self, mpsc::Receiver<Bytes>) {
        let (text_tx, text_rx) = mpsc::channel(TEXT_QUEUE_CAPACITY);
        let (packet_tx, packet_rx) = mpsc::channel(PACKET_CHANNEL_CAPACITY);
        let stats = Arc::new(Mutex::new(SenderStats::default()));

        let worker = Worker {
            encoder: RttEncoder::new(params.clone()),
            text_rx,
            packet_tx,
            cps: params.cps,
            stats: stats.clone(),
        };

        (
            RttSender {
                params,
                text_tx,
                stats,
                worker: Some(worker),
                task: None,
            },
            packet_rx,
        )
    }

    pub fn params(&self) -> &RttParameters {
        &self.params
    }

    /// Snapshot of the send counters.
    pub fn stats(&self) -> SenderStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Start the sender task. Returns `true` when the task was started,
    /// `false` when it was already running.
    pub fn start(&mut self) -> bool {
        if self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return false;
        }
        let Some(worker) = self.worker.take() else {
            return false;
        };
        debug!("rtt sender task starting");
        self.task = Some(tokio::spawn(worker.run()));
        true
    }

    /// Whether the sender task is currently running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Queue text for transmission.
    pub async fn enqueue(&self, text: impl Into<String>) -> Result<()> {
        self.text_tx
            .send(text.into())
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Stop the sender task. A stopped sender cannot be restarted;
    /// create a fresh one per session.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("rtt sender task stopped");
        }
    }
}

impl Drop for RttSender {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Worker {
    async fn run(mut self) {
        loop {
            match timeout(SEND_IDLE_TIME, self.text_rx.recv()).await {
                Ok(Some(text)) => {
                    if !self.send_text(&text).await {
                        break;
                    }
                }
                // Every producer handle dropped
                Ok(None) => break,
                // Idle: keep the receiver's reassembly window fresh
                Err(_) => {
                    match self.encoder.encode_idle() {
                        Ok(Some(packet)) => {
                            if !self.emit(packet, 0).await {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(error) => warn!(%error, "idle encode failed"),
                    }
                }
            }
        }
        debug!("rtt sender loop ended");
    }

    /// Returns false when the packet channel is gone.
    async fn send_text(&mut self, text: &str) -> bool {
        let normalized = normalize_line_endings(text);
        if normalized.is_empty() {
            return true;
        }

        if self.cps == 0 {
            match self.encoder.encode_text(normalized.as_bytes()) {
                Ok(packet) => self.emit(packet, normalized.chars().count()).await,
                Err(error) => {
                    warn!(%error, "dropping unencodable text block");
                    true
                }
            }
        } else {
            // One character per 1000/cps ms, respecting code points
            let interval = Duration::from_millis(1000 / self.cps as u64);
            let mut buf = [0u8; 4];
            for (i, ch) in normalized.chars().enumerate() {
                if i > 0 {
                    tokio::time::sleep(interval).await;
                }
                let bytes = ch.encode_utf8(&mut buf).as_bytes();
                match self.encoder.encode_text(bytes) {
                    Ok(packet) => {
                        if !self.emit(packet, 1).await {
                            return false;
                        }
                    }
                    Err(error) => warn!(%error, "dropping unencodable character"),
                }
            }
            true
        }
    }

    async fn emit(&mut self, packet: Bytes, chars: usize) -> bool {
        if self.packet_tx.send(packet).await.is_err() {
            debug!("packet channel closed; sender loop ending");
            return false;
        }
        if let Ok(mut stats) = self.stats.lock() {
            stats.packets_sent += 1;
            stats.chars_sent += chars as u64;
        }
        true
    }
}

/// T.140 line separator handling: CRLF and lone LF become U+2028.
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\u{2028}").replace('\n', "\u{2028}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::RtpPacket;
    use crate::red::parse_red_payload;

    fn params(level: usize, cps: u32) -> RttParameters {
        RttParameters {
            redundancy_level: level,
            cps,
            ..RttParameters::default()
        }
    }

    #[test]
    fn line_endings_normalize_to_u2028() {
        assert_eq!(
            normalize_line_endings("a\r\nb\nc").as_bytes(),
            &[0x61, 0xE2, 0x80, 0xA8, 0x62, 0xE2, 0x80, 0xA8, 0x63]
        );
        // Lone CR is not a line ending in T.140 streams
        assert_eq!(normalize_line_endings("a\rb"), "a\rb");
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_idempotent() {
        let (mut sender, _packets) = RttSender::new(params(3, 0));
        assert!(sender.start());
        assert!(!sender.start());
        assert!(sender.is_running());
        sender.stop();
        assert!(!sender.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn unpaced_text_goes_out_whole() {
        let (mut sender, mut packets) = RttSender::new(params(3, 0));
        sender.start();
        sender.enqueue("Hi").await.unwrap();

        let wire = packets.recv().await.unwrap();
        let packet = RtpPacket::parse(&wire).unwrap();
        assert!(packet.header.marker);
        let red = parse_red_payload(&packet.payload).unwrap();
        assert_eq!(&red.primary[..], b"Hi");

        assert_eq!(sender.stats().chars_sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn paced_text_goes_out_one_character_at_a_time() {
        let (mut sender, mut packets) = RttSender::new(params(0, 10));
        sender.start();
        sender.enqueue("abc").await.unwrap();

        let started = tokio::time::Instant::now();
        let mut chars = Vec::new();
        for _ in 0..3 {
            let wire = packets.recv().await.unwrap();
            let packet = RtpPacket::parse(&wire).unwrap();
            chars.push(packet.payload.to_vec());
        }
        assert_eq!(chars, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        // 10 cps: the third character leaves no earlier than 200 ms in
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_packets_flow_until_the_ring_drains() {
        let (mut sender, mut packets) = RttSender::new(params(3, 0));
        sender.start();
        sender.enqueue("Hi").await.unwrap();

        // The text packet, then three idle refreshes drain the ring
        let mut lengths = Vec::new();
        for _ in 0..4 {
            let wire = packets.recv().await.unwrap();
            let packet = RtpPacket::parse(&wire).unwrap();
            let red = parse_red_payload(&packet.payload).unwrap();
            lengths.push((packet.header.marker, red.primary.len()));
        }
        assert_eq!(
            lengths,
            vec![(true, 2), (false, 0), (false, 0), (false, 0)]
        );

        // Drained: no further idle packets
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(packets.try_recv().is_err());
        assert_eq!(sender.stats().packets_sent, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_producers_share_the_queue() {
        let (mut sender, mut packets) = RttSender::new(params(2, 0));
        let plain = RttParameters {
            red_payload_type: 0,
            redundancy_level: 0,
            ..RttParameters::default()
        };
        let (mut plain_sender, mut plain_packets) = RttSender::new(plain);
        plain_sender.start();
        sender.start();

        let tx = sender.text_tx.clone();
        tokio::spawn(async move {
            tx.send("from-task".to_string()).await.unwrap();
        });
        sender.enqueue("direct").await.unwrap();

        let mut bodies = Vec::new();
        for _ in 0..2 {
            let wire = packets.recv().await.unwrap();
            let packet = RtpPacket::parse(&wire).unwrap();
            let red = parse_red_payload(&packet.payload).unwrap();
            bodies.push(String::from_utf8(red.primary.to_vec()).unwrap());
        }
        bodies.sort();
        assert_eq!(bodies, vec!["direct".to_string(), "from-task".to_string()]);

        plain_sender.enqueue("x").await.unwrap();
        let wire = plain_packets.recv().await.unwrap();
        assert_eq!(&RtpPacket::parse(&wire).unwrap().payload[..], b"x");
    }
}

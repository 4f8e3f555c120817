//! RFC 3261 transaction timers.
//!
//! RFC 3261 defines per-transaction timers that drive retransmission and
//! state-machine timeouts:
//!
//! - **Timer A** (INVITE client): request retransmission interval
//! - **Timer B** (INVITE client): transaction timeout
//! - **Timer D** (INVITE client): wait time for response retransmissions
//! - **Timer E** (non-INVITE client): request retransmission interval
//! - **Timer F** (non-INVITE client): transaction timeout
//! - **Timer G** (INVITE server): response retransmission interval
//! - **Timer H** (INVITE server): wait time for ACK
//! - **Timer I** (INVITE server): wait time in Confirmed state
//! - **Timer J** (non-INVITE server): wait time for request retransmissions
//! - **Timer K** (non-INVITE client): wait time for response retransmissions
//!
//! Timers are scheduled on a [`TimerWheel`] drained by the dispatcher loop;
//! expirations are delivered to the owning state machine as messages, not
//! callbacks.

mod wheel;

pub use wheel::TimerWheel;

use std::fmt;
use std::time::Duration;

/// The RFC 3261 timer identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerType {
    A,
    B,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerType::A => "A",
            TimerType::B => "B",
            TimerType::D => "D",
            TimerType::E => "E",
            TimerType::F => "F",
            TimerType::G => "G",
            TimerType::H => "H",
            TimerType::I => "I",
            TimerType::J => "J",
            TimerType::K => "K",
        };
        f.write_str(name)
    }
}

/// Base timer configuration (RFC 3261 table 4 defaults).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSettings {
    /// T1: RTT estimate and base retransmission interval
    pub t1: Duration,
    /// T2: cap for retransmission-interval doubling
    pub t2: Duration,
    /// T4: maximum lifetime of a message in the network
    pub t4: Duration,
    /// Timer D: wait time for INVITE response retransmissions (unreliable)
    pub wait_time_d: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        TimerSettings {
            t1: Duration::from_millis(500),
            t2: Duration::from_millis(4000),
            t4: Duration::from_millis(5000),
            wait_time_d: Duration::from_secs(32),
        }
    }
}

impl TimerSettings {
    /// 64*T1: the default transaction timeout (timers B, F, H, J).
    pub fn transaction_timeout(&self) -> Duration {
        self.t1 * 64
    }

    /// The next retransmission interval: doubled, capped at T2.
    pub fn next_retransmit_interval(&self, current: Duration) -> Duration {
        (current * 2).min(self.t2)
    }
}

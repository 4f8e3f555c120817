//! Monotonic 32-bit millisecond clock for RTP timestamps and RED offsets.
//!
//! All time deltas are modular: `later.wrapping_sub(earlier)`. The
//! 32-bit wrap (about 49.7 days) bounds a single session's offset
//! correctness and is deliberate.

use tokio::time::Instant;

/// A session's monotonic millisecond clock.
///
/// Backed by the runtime clock, so paused-time tests drive it with
/// `tokio::time::advance`. Never wall-clock: clock adjustments must not
/// disturb timestamps or redundancy offsets.
#[derive(Debug, Clone)]
pub struct MediaClock {
    base: Instant,
}

impl MediaClock {
    /// A clock whose zero is now.
    pub fn start() -> Self {
        MediaClock { base: Instant::now() }
    }

    /// Milliseconds since the clock base, wrapped to 32 bits.
    pub fn now_ms(&self) -> u32 {
        self.base.elapsed().as_millis() as u32
    }
}

/// Modular milliseconds from `earlier` to `later`.
pub fn elapsed_ms(earlier: u32, later: u32) -> u32 {
    later.wrapping_sub(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn elapsed_is_modular() {
        assert_eq!(elapsed_ms(100, 150), 50);
        // Across the 32-bit wrap
        assert_eq!(elapsed_ms(u32::MAX - 10, 20), 31);
        assert_eq!(elapsed_ms(0, u32::MAX), u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_follows_runtime_time() {
        let clock = MediaClock::start();
        assert_eq!(clock.now_ms(), 0);
        tokio::time::advance(Duration::from_millis(1234)).await;
        assert_eq!(clock.now_ms(), 1234);
    }
}

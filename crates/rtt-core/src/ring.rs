//! Fixed-slot ring of redundant text generations.

use bytes::Bytes;

/// Number of ring slots; the active prefix is the redundancy level.
pub const MAX_REDUNDANCY: usize = 5;

#[derive(Debug, Clone, Default)]
struct Slot {
    /// Session-clock timestamp the block was created at
    created_ts: u32,
    /// Block data; empty means a vacant generation
    payload: Bytes,
}

/// The sender's redundancy ring.
///
/// Allocated once per session; each send overwrites one slot in place
/// and advances the start index, so generations shift through without
/// reallocating. Stored creation timestamps move with their blocks
/// unchanged — the wire offset is computed against the current clock at
/// serialization time.
#[derive(Debug)]
pub struct RedundancyRing {
    slots: [Slot; MAX_REDUNDANCY],
    /// Index the next push writes to; the oldest retained generation
    /// for level N sits N slots behind it
    start: usize,
}

impl RedundancyRing {
    pub fn new() -> Self {
        RedundancyRing {
            slots: Default::default(),
            start: 0,
        }
    }

    /// Record the block just sent as the newest generation, dropping the
    /// oldest. An empty payload records a vacant generation.
    pub fn push(&mut self, created_ts: u32, payload: Bytes) {
        self.slots[self.start] = Slot { created_ts, payload };
        self.start = (self.start + 1) % MAX_REDUNDANCY;
    }

    /// The newest `level` generations, oldest first:
    /// `(created_ts, payload)`.
    pub fn generations(&self, level: usize) -> impl Iterator<Item = (u32, &Bytes)> {
        let level = level.min(MAX_REDUNDANCY);
        (0..level).map(move |i| {
            let idx = (self.start + MAX_REDUNDANCY - level + i) % MAX_REDUNDANCY;
            (self.slots[idx].created_ts, &self.slots[idx].payload)
        })
    }

    /// Total bytes across the newest `level` generations.
    pub fn total_len(&self, level: usize) -> usize {
        self.generations(level).map(|(_, p)| p.len()).sum()
    }

    /// Whether every generation in the active prefix is vacant.
    pub fn is_drained(&self, level: usize) -> bool {
        self.generations(level).all(|(_, p)| p.is_empty())
    }
}

impl Default for RedundancyRing {
    fn default() -> Self {
        Self::new()
    }
}

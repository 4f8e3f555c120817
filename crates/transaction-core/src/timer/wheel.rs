//! A one-shot timer store drained by the dispatcher loop.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Ordered store of named one-shot timers.
///
/// Re-arming an id replaces its previous arming; cancellation is
/// idempotent. `pop_due` drains expired timers ordered by deadline, and
/// within one deadline by arming order. The wheel never spawns tasks —
/// the owning loop sleeps until [`TimerWheel::next_deadline`] (with its
/// own tick cap) and drains.
#[derive(Debug)]
pub struct TimerWheel<K> {
    entries: BTreeMap<(Instant, u64), K>,
    index: HashMap<K, (Instant, u64)>,
    seq: u64,
}

impl<K> TimerWheel<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        TimerWheel {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            seq: 0,
        }
    }

    /// Schedule `id` to fire after `delay`, replacing any prior arming.
    pub fn arm(&mut self, id: K, delay: Duration) {
        self.cancel(&id);
        let slot = (Instant::now() + delay, self.seq);
        self.seq += 1;
        self.entries.insert(slot, id.clone());
        self.index.insert(id, slot);
    }

    /// Cancel a timer. Does nothing when `id` is not armed.
    pub fn cancel(&mut self, id: &K) {
        if let Some(slot) = self.index.remove(id) {
            self.entries.remove(&slot);
        }
    }

    /// Cancel every timer matching the predicate.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) {
        let victims: Vec<K> = self.index.keys().filter(|k| pred(k)).cloned().collect();
        for id in victims {
            self.cancel(&id);
        }
    }

    /// The earliest deadline currently armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every timer due at `now`, in firing order.
    pub fn pop_due(&mut self, now: Instant) -> Vec<K> {
        let mut due = Vec::new();
        while let Some((slot, id)) = self.entries.pop_first() {
            if slot.0 > now {
                self.entries.insert(slot, id);
                break;
            }
            self.index.remove(&id);
            due.push(id);
        }
        due
    }

    pub fn is_armed(&self, id: &K) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for TimerWheel<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_in_deadline_order() {
        let mut wheel = TimerWheel::new();
        wheel.arm("late", Duration::from_millis(200));
        wheel.arm("early", Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(wheel.pop_due(Instant::now()), vec!["early", "late"]);
        assert!(wheel.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn same_deadline_drains_in_arming_order() {
        let mut wheel = TimerWheel::new();
        wheel.arm("first", Duration::from_millis(100));
        wheel.arm("second", Duration::from_millis(100));
        wheel.arm("third", Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(wheel.pop_due(Instant::now()), vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let mut wheel = TimerWheel::new();
        wheel.arm("x", Duration::from_millis(50));
        wheel.cancel(&"x");
        wheel.cancel(&"x");

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(wheel.pop_due(Instant::now()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_prior_arming() {
        let mut wheel = TimerWheel::new();
        wheel.arm("x", Duration::from_millis(50));
        wheel.arm("x", Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(100)).await;
        // The original 50 ms arming must not fire
        assert!(wheel.pop_due(Instant::now()).is_empty());
        assert!(wheel.is_armed(&"x"));

        tokio::time::advance(Duration::from_millis(450)).await;
        assert_eq!(wheel.pop_due(Instant::now()), vec!["x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_due_leaves_future_timers() {
        let mut wheel = TimerWheel::new();
        wheel.arm("soon", Duration::from_millis(100));
        wheel.arm("later", Duration::from_millis(10_000));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(wheel.pop_due(Instant::now()), vec!["soon"]);
        assert_eq!(wheel.len(), 1);
        assert!(wheel.next_deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_where_removes_matching_group() {
        let mut wheel = TimerWheel::new();
        wheel.arm(("tx1", "A"), Duration::from_millis(100));
        wheel.arm(("tx1", "B"), Duration::from_millis(100));
        wheel.arm(("tx2", "A"), Duration::from_millis(100));

        wheel.cancel_where(|(tx, _)| *tx == "tx1");

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(wheel.pop_due(Instant::now()), vec![("tx2", "A")]);
    }
}

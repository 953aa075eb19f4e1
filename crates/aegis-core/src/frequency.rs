//! Fixed-capacity windowed action counter. Once the ring is full, the
//! oldest entry is silently overwritten — the counter becomes a lossy
//! approximation, the accepted trade-off for O(1) `record` and
//! O(capacity) `count`.

use std::sync::Mutex;

use crate::types::FrequencyScope;

#[derive(Debug, Clone)]
struct Slot {
    timestamp_ms: u64,
    agent_id: String,
    session_key: String,
    tool_name: String,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<Slot>>,
    head: usize,
}

/// Default ring capacity per the spec's performance knob.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Thread-safe fixed-size ring of recent actions.
#[derive(Debug)]
pub struct FrequencyCounter {
    inner: Mutex<Ring>,
    capacity: usize,
}

impl FrequencyCounter {
    /// Create a counter with the given ring capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { inner: Mutex::new(Ring { slots: vec![None; capacity], head: 0 }), capacity }
    }

    /// The configured ring capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record one action occurrence, overwriting the oldest slot once full.
    pub fn record(&self, timestamp_ms: u64, agent_id: &str, session_key: &str, tool_name: &str) {
        let mut ring = self.inner.lock().expect("frequency ring mutex poisoned");
        let head = ring.head;
        ring.slots[head] = Some(Slot {
            timestamp_ms,
            agent_id: agent_id.to_string(),
            session_key: session_key.to_string(),
            tool_name: tool_name.to_string(),
        });
        ring.head = (head + 1) % self.capacity;
    }

    /// Count entries within `window_seconds` of `now_ms` that match
    /// `scope` for the given `agent_id`/`session_key`. Never exceeds
    /// `capacity`.
    #[must_use]
    pub fn count(&self, window_seconds: u64, scope: FrequencyScope, agent_id: &str, session_key: &str, now_ms: u64) -> usize {
        let ring = self.inner.lock().expect("frequency ring mutex poisoned");
        let window_ms = window_seconds.saturating_mul(1000);
        let cutoff = now_ms.saturating_sub(window_ms);
        ring.slots
            .iter()
            .flatten()
            .filter(|slot| slot.timestamp_ms >= cutoff && slot.timestamp_ms <= now_ms)
            .filter(|slot| match scope {
                FrequencyScope::Agent => slot.agent_id == agent_id,
                FrequencyScope::Session => slot.session_key == session_key,
                FrequencyScope::Global => true,
            })
            .count()
    }

    /// Count entries within `window_seconds` of `now_ms` matching both
    /// `agent_id` and `session_key` — used by the risk assessor's
    /// frequency factor, which scopes by the (agent, session) pair rather
    /// than either alone.
    #[must_use]
    pub fn count_agent_session(&self, window_seconds: u64, agent_id: &str, session_key: &str, now_ms: u64) -> usize {
        let ring = self.inner.lock().expect("frequency ring mutex poisoned");
        let window_ms = window_seconds.saturating_mul(1000);
        let cutoff = now_ms.saturating_sub(window_ms);
        ring.slots
            .iter()
            .flatten()
            .filter(|slot| slot.timestamp_ms >= cutoff && slot.timestamp_ms <= now_ms)
            .filter(|slot| slot.agent_id == agent_id && slot.session_key == session_key)
            .count()
    }

    /// Zero the ring and reset the write head.
    pub fn clear(&self) {
        let mut ring = self.inner.lock().expect("frequency ring mutex poisoned");
        ring.slots.iter_mut().for_each(|s| *s = None);
        ring.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_within_window_by_scope() {
        let fc = FrequencyCounter::new(10);
        for i in 0..5 {
            fc.record(1_000 + i * 1_000, "forge", "sess-a", "exec");
        }
        fc.record(6_000, "other", "sess-b", "exec");

        assert_eq!(fc.count(60, FrequencyScope::Agent, "forge", "sess-a", 6_000), 5);
        assert_eq!(fc.count(60, FrequencyScope::Session, "forge", "sess-a", 6_000), 5);
        assert_eq!(fc.count(60, FrequencyScope::Global, "forge", "sess-a", 6_000), 6);
    }

    #[test]
    fn old_entries_fall_outside_window() {
        let fc = FrequencyCounter::new(10);
        fc.record(0, "forge", "sess-a", "exec");
        fc.record(100_000, "forge", "sess-a", "exec");
        assert_eq!(fc.count(10, FrequencyScope::Agent, "forge", "sess-a", 100_000), 1);
    }

    #[test]
    fn overwrites_oldest_at_capacity_and_never_exceeds_it() {
        let fc = FrequencyCounter::new(3);
        for i in 0..10 {
            fc.record(i * 1_000, "forge", "sess-a", "exec");
        }
        let count = fc.count(1_000_000, FrequencyScope::Agent, "forge", "sess-a", 10_000);
        assert_eq!(count, 3);
    }

    #[test]
    fn clear_resets_counts() {
        let fc = FrequencyCounter::new(5);
        fc.record(1_000, "forge", "sess-a", "exec");
        fc.clear();
        assert_eq!(fc.count(60, FrequencyScope::Agent, "forge", "sess-a", 1_000), 0);
    }
}

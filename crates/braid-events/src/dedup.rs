//! Bounded recently-seen event ID window.
//!
//! The transport is at-least-once, so every consumer must tolerate repeats.
//! [`SeenEvents`] records event IDs in a FIFO window of fixed capacity; a
//! repeat inside the window is reported as already seen and dropped before
//! any mutation. The window is bounded so a long-lived session cannot grow
//! memory without limit — beyond the window, idempotence of the individual
//! reducers takes over.

use std::collections::{HashSet, VecDeque};

use braid_core::EventId;

/// Default capacity of the seen-ID window per session scope.
pub const DEFAULT_SEEN_CAPACITY: usize = 1024;

/// A bounded FIFO set of recently-seen event IDs.
#[derive(Clone, Debug)]
pub struct SeenEvents {
    capacity: usize,
    order: VecDeque<EventId>,
    ids: HashSet<EventId>,
}

impl SeenEvents {
    /// Create a window with the given capacity (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    /// Record an ID. Returns `true` if it was fresh, `false` on a repeat.
    ///
    /// Recording a fresh ID at capacity evicts the oldest entry.
    pub fn insert(&mut self, id: &EventId) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                let _ = self.ids.remove(&evicted);
            }
        }
        self.order.push_back(id.clone());
        let _ = self.ids.insert(id.clone());
        true
    }

    /// Whether an ID is currently within the window.
    #[must_use]
    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    /// Number of IDs currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for SeenEvents {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SEEN_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_then_repeat() {
        let mut seen = SeenEvents::default();
        let id = EventId::from("e1");
        assert!(seen.insert(&id));
        assert!(!seen.insert(&id));
        assert!(seen.contains(&id));
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut seen = SeenEvents::with_capacity(2);
        let (a, b, c) = (EventId::from("a"), EventId::from("b"), EventId::from("c"));
        assert!(seen.insert(&a));
        assert!(seen.insert(&b));
        assert!(seen.insert(&c));
        assert_eq!(seen.len(), 2);
        assert!(!seen.contains(&a), "oldest should be evicted");
        assert!(seen.contains(&b));
        assert!(seen.contains(&c));
    }

    #[test]
    fn evicted_id_treated_as_fresh_again() {
        // Beyond the window the reducers' own idempotence takes over; the
        // window itself just reports the ID as fresh.
        let mut seen = SeenEvents::with_capacity(1);
        let (a, b) = (EventId::from("a"), EventId::from("b"));
        assert!(seen.insert(&a));
        assert!(seen.insert(&b));
        assert!(seen.insert(&a));
    }

    #[test]
    fn zero_capacity_clamped_to_one() {
        let mut seen = SeenEvents::with_capacity(0);
        let id = EventId::from("e1");
        assert!(seen.insert(&id));
        assert!(!seen.insert(&id));
    }

    #[test]
    fn empty_window() {
        let seen = SeenEvents::default();
        assert!(seen.is_empty());
        assert_eq!(seen.len(), 0);
    }
}

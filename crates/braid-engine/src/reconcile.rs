//! Optimistic-session identity reconciliation.
//!
//! A session created optimistically lives under a client-assigned temporary
//! ID until the backend answers with the real one. [`IdentityReconciler`]
//! tracks which temporary IDs are still pending and guarantees the rename is
//! applied exactly once, however many times the confirmation callback fires.
//!
//! It also owns the early-event buffer: events for the real ID can arrive on
//! the firehose before the creation response does, addressed to a session
//! the store has never heard of. While any reconciliation is pending those
//! events are held (bounded, oldest dropped first) and replayed through
//! normal dispatch once the rename lands.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use braid_core::SessionId;
use braid_events::StreamEvent;

/// Tracks pending provisional identities and buffers events that outran
/// session creation.
#[derive(Debug)]
pub struct IdentityReconciler {
    pending: HashSet<SessionId>,
    early: HashMap<SessionId, VecDeque<StreamEvent>>,
    capacity: usize,
}

impl IdentityReconciler {
    /// Create a reconciler whose per-session early buffer holds at most
    /// `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: HashSet::new(),
            early: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Start tracking a provisional session ID.
    pub fn register(&mut self, temp_id: SessionId) {
        debug!(%temp_id, "tracking provisional session");
        let _ = self.pending.insert(temp_id);
    }

    /// Whether this ID is a still-pending provisional.
    #[must_use]
    pub fn is_pending(&self, id: &SessionId) -> bool {
        self.pending.contains(id)
    }

    /// Whether any reconciliation is pending at all.
    ///
    /// While this holds, events for unknown session IDs may belong to a
    /// session whose real ID has not arrived yet and are buffered rather
    /// than dropped.
    #[must_use]
    pub fn any_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Mark a provisional ID reconciled.
    ///
    /// Returns `true` the first time only; repeat confirmations for the
    /// same ID return `false` and must not be re-applied.
    pub fn complete(&mut self, temp_id: &SessionId) -> bool {
        let first = self.pending.remove(temp_id);
        if !first {
            debug!(%temp_id, "repeat confirmation ignored");
        }
        first
    }

    /// Stop tracking a provisional that failed to create.
    pub fn abandon(&mut self, temp_id: &SessionId) {
        if self.pending.remove(temp_id) {
            debug!(%temp_id, "provisional session abandoned");
        }
    }

    /// Buffer an event whose session is not known yet.
    ///
    /// The buffer is bounded per session ID; at capacity the oldest event
    /// is dropped to admit the new one.
    pub fn buffer_early(&mut self, event: StreamEvent) {
        let queue = self.early.entry(event.session_id.clone()).or_default();
        if queue.len() >= self.capacity {
            let dropped = queue.pop_front();
            warn!(
                session_id = %event.session_id,
                dropped_event = dropped.as_ref().map(|e| e.event_id.as_str()).unwrap_or(""),
                "early-event buffer full, dropping oldest"
            );
        }
        queue.push_back(event);
    }

    /// Number of buffered events for a session ID.
    #[must_use]
    pub fn early_len(&self, id: &SessionId) -> usize {
        self.early.get(id).map_or(0, VecDeque::len)
    }

    /// Drain buffered events for a now-known session, in arrival order.
    pub fn take_early(&mut self, id: &SessionId) -> Vec<StreamEvent> {
        self.early
            .remove(id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drain every buffered event, in per-session arrival order.
    ///
    /// Called when the last pending reconciliation resolves: anything still
    /// buffered belongs to sessions no rename will ever claim and must go
    /// back through normal dispatch instead of sitting here forever.
    pub fn take_all_early(&mut self) -> Vec<StreamEvent> {
        self.early.drain().flat_map(|(_, queue)| queue).collect()
    }
}

impl Default for IdentityReconciler {
    fn default() -> Self {
        Self::new(256)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

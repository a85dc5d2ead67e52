//! Per-session `(status, read-state)` bucket machine.
//!
//! Every accepted event for a session drives its [`BucketEntry`], regardless
//! of whether any timeline consumer is attached:
//!
//! - a non-terminal event moves the session to `processing`; `done` moves it
//!   back to `idle`
//! - activity marks the session `unread` unless it is the one currently open
//! - sessions keep a stable processing order: entering `processing` appends
//!   to the order list, finishing removes, and re-entering appends again at
//!   the end rather than resuming an old position
//!
//! Transitions happen only here, driven by events and by which session is
//! open. Nothing else edits entries directly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::trace;

use braid_core::{BucketEntry, BucketStatus, ReadState, SessionId};
use braid_events::EventType;

/// Bucket classification for all known sessions.
#[derive(Debug, Default)]
pub struct SessionBuckets {
    entries: HashMap<SessionId, BucketEntry>,
    processing_order: Vec<SessionId>,
    open: Option<SessionId>,
}

impl SessionBuckets {
    /// Empty bucket set with no open session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an entry exists for a session, starting at `(idle, read)`.
    pub fn track(&mut self, session_id: SessionId, now: DateTime<Utc>) {
        let _ = self
            .entries
            .entry(session_id.clone())
            .or_insert_with(|| BucketEntry::initial(session_id, now));
    }

    /// Fold one accepted event into the session's entry.
    pub fn observe_event(&mut self, session_id: &SessionId, event_type: EventType, now: DateTime<Utc>) {
        let is_open = self.open.as_ref() == Some(session_id);
        let entry = self
            .entries
            .entry(session_id.clone())
            .or_insert_with(|| BucketEntry::initial(session_id.clone(), now));

        entry.last_activity_at = now;
        if !is_open {
            entry.read_state = ReadState::Unread;
        }

        if event_type.is_terminal() {
            if entry.status == BucketStatus::Processing {
                entry.status = BucketStatus::Idle;
                self.processing_order.retain(|id| id != session_id);
                trace!(%session_id, "session idle");
            }
        } else if entry.status == BucketStatus::Idle {
            entry.status = BucketStatus::Processing;
            self.processing_order.push(session_id.clone());
            trace!(%session_id, "session processing");
        }
    }

    /// Mark a session open: it becomes read and stays read while open.
    pub fn open(&mut self, session_id: &SessionId) {
        self.open = Some(session_id.clone());
        self.mark_read(session_id);
    }

    /// Clear the open session, if any.
    pub fn close(&mut self) {
        self.open = None;
    }

    /// The currently open session.
    #[must_use]
    pub fn open_session(&self) -> Option<&SessionId> {
        self.open.as_ref()
    }

    /// Mark a session read without opening it.
    pub fn mark_read(&mut self, session_id: &SessionId) {
        if let Some(entry) = self.entries.get_mut(session_id) {
            entry.read_state = ReadState::Read;
        }
    }

    /// Mark a session unread.
    pub fn mark_unread(&mut self, session_id: &SessionId) {
        if let Some(entry) = self.entries.get_mut(session_id) {
            entry.read_state = ReadState::Unread;
        }
    }

    /// A session's entry.
    #[must_use]
    pub fn entry(&self, session_id: &SessionId) -> Option<&BucketEntry> {
        self.entries.get(session_id)
    }

    /// Currently processing sessions, in the order they started processing.
    #[must_use]
    pub fn processing_order(&self) -> &[SessionId] {
        &self.processing_order
    }

    /// All sessions currently in a given `(status, read-state)` bucket.
    ///
    /// Processing sessions come back in processing order; idle sessions by
    /// most recent activity first.
    #[must_use]
    pub fn in_bucket(&self, status: BucketStatus, read_state: ReadState) -> Vec<SessionId> {
        let matches = |id: &SessionId| {
            self.entries
                .get(id)
                .is_some_and(|e| e.status == status && e.read_state == read_state)
        };
        if status == BucketStatus::Processing {
            self.processing_order.iter().filter(|id| matches(id)).cloned().collect()
        } else {
            let mut idle: Vec<&BucketEntry> = self
                .entries
                .values()
                .filter(|e| e.status == status && e.read_state == read_state)
                .collect();
            idle.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
            idle.into_iter().map(|e| e.session_id.clone()).collect()
        }
    }

    /// Drop a session's entry and order position.
    pub fn remove(&mut self, session_id: &SessionId) {
        let _ = self.entries.remove(session_id);
        self.processing_order.retain(|id| id != session_id);
        if self.open.as_ref() == Some(session_id) {
            self.open = None;
        }
    }

    /// Rename a session's key, keeping its state, order position, and open
    /// status.
    pub fn rekey(&mut self, from: &SessionId, to: SessionId) {
        if from == &to {
            return;
        }
        if let Some(mut entry) = self.entries.remove(from) {
            entry.session_id = to.clone();
            let _ = self.entries.insert(to.clone(), entry);
        }
        for id in &mut self.processing_order {
            if id == from {
                *id = to.clone();
            }
        }
        if self.open.as_ref() == Some(from) {
            self.open = Some(to);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! In-memory session store shared by the engine's consumers.
//!
//! All maps are keyed by [`SessionId`]. While a session is provisional the
//! key is the client-assigned temporary ID; [`SessionStore::rekey`] moves
//! every piece of state to the real ID in one step during reconciliation, so
//! no consumer ever observes a half-renamed session.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use braid_core::{Message, PlanState, Session, SessionId};

/// Shared client-side state for all of one user's sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    messages: HashMap<SessionId, Vec<Message>>,
    plans: HashMap<SessionId, PlanState>,
    last_errors: HashMap<SessionId, Value>,
}

impl SessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session entry.
    pub fn upsert_session(&mut self, session: Session) {
        let _ = self.sessions.insert(session.id.clone(), session);
    }

    /// Whether a session with this ID exists.
    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Look up a session.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Look up a session mutably.
    pub fn session_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// All sessions, in no particular order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// A session's message timeline (empty slice if none yet).
    #[must_use]
    pub fn messages(&self, id: &SessionId) -> &[Message] {
        self.messages.get(id).map_or(&[], Vec::as_slice)
    }

    /// Mutable access to a session's timeline, created on first use.
    pub fn messages_mut(&mut self, id: &SessionId) -> &mut Vec<Message> {
        self.messages.entry(id.clone()).or_default()
    }

    /// A session's plan state, if any patch or refetch has produced one.
    #[must_use]
    pub fn plan(&self, id: &SessionId) -> Option<&PlanState> {
        self.plans.get(id)
    }

    /// Mutable access to a session's plan state, created on first use.
    pub fn plan_mut(&mut self, id: &SessionId) -> &mut PlanState {
        self.plans.entry(id.clone()).or_default()
    }

    /// Record the most recent error payload surfaced for a session.
    pub fn record_error(&mut self, id: &SessionId, payload: Value) {
        let _ = self.last_errors.insert(id.clone(), payload);
    }

    /// The most recent error payload for a session.
    #[must_use]
    pub fn last_error(&self, id: &SessionId) -> Option<&Value> {
        self.last_errors.get(id)
    }

    /// Clear the surfaced error for a session.
    pub fn clear_error(&mut self, id: &SessionId) {
        let _ = self.last_errors.remove(id);
    }

    /// Drop every piece of state for a session.
    pub fn remove_session(&mut self, id: &SessionId) {
        let _ = self.sessions.remove(id);
        let _ = self.messages.remove(id);
        let _ = self.plans.remove(id);
        let _ = self.last_errors.remove(id);
    }

    /// Move all state from one session key to another.
    ///
    /// Messages are rewritten to carry the new session ID. If state already
    /// exists under `to` (events for the real ID raced the rename), the
    /// moved messages are appended ahead of it so the optimistic timeline
    /// keeps its position.
    pub fn rekey(&mut self, from: &SessionId, to: SessionId) {
        if from == &to {
            return;
        }
        if let Some(mut session) = self.sessions.remove(from) {
            session.id = to.clone();
            let _ = self.sessions.insert(to.clone(), session);
        } else {
            warn!(%from, %to, "rekey for unknown session");
        }
        if let Some(mut moved) = self.messages.remove(from) {
            for m in &mut moved {
                m.session_id = to.clone();
            }
            let existing = self.messages.remove(&to).unwrap_or_default();
            moved.extend(existing);
            let _ = self.messages.insert(to.clone(), moved);
        }
        if let Some(plan) = self.plans.remove(from) {
            let _ = self.plans.entry(to.clone()).or_insert(plan);
        }
        if let Some(err) = self.last_errors.remove(from) {
            let _ = self.last_errors.entry(to).or_insert(err);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

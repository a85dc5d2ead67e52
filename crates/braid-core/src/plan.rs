//! Per-session derived plan state.
//!
//! A [`PlanPatch`] is a partial, mergeable update produced by parsing plan
//! tool results. Patches apply optimistically; the authoritative state is
//! re-fetched from the persistent store after `done` (eventual consistency),
//! so a lost or reordered patch is recoverable, never fatal.

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// One checklist item in a session's plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTask {
    /// Stable task ID (merge key).
    pub id: String,
    /// Display label.
    pub label: String,
    /// Completion flag.
    pub done: bool,
}

/// The merged plan state for one session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanState {
    /// Checklist items, in first-seen order.
    pub tasks: Vec<PlanTask>,
}

/// A partial update to a session's plan state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPatch {
    /// Target session.
    pub session_id: SessionId,
    /// Tasks to upsert, keyed by [`PlanTask::id`].
    pub tasks: Vec<PlanTask>,
}

impl PlanState {
    /// Merge a patch into this state.
    ///
    /// Known task IDs are updated in place (label and done flag); unknown
    /// IDs are appended, preserving the order in which they first appeared.
    pub fn apply(&mut self, patch: &PlanPatch) {
        for task in &patch.tasks {
            if let Some(existing) = self.tasks.iter_mut().find(|t| t.id == task.id) {
                existing.label.clone_from(&task.label);
                existing.done = task.done;
            } else {
                self.tasks.push(task.clone());
            }
        }
    }

    /// Replace the whole state with a refetched authoritative value.
    pub fn replace(&mut self, tasks: Vec<PlanTask>) {
        self.tasks = tasks;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, label: &str, done: bool) -> PlanTask {
        PlanTask {
            id: id.into(),
            label: label.into(),
            done,
        }
    }

    #[test]
    fn apply_appends_unknown_tasks() {
        let mut state = PlanState::default();
        state.apply(&PlanPatch {
            session_id: "s1".into(),
            tasks: vec![task("a", "write tests", false)],
        });
        assert_eq!(state.tasks.len(), 1);
        assert!(!state.tasks[0].done);
    }

    #[test]
    fn apply_updates_known_tasks_in_place() {
        let mut state = PlanState::default();
        state.replace(vec![task("a", "write tests", false), task("b", "ship", false)]);
        state.apply(&PlanPatch {
            session_id: "s1".into(),
            tasks: vec![task("a", "write tests", true)],
        });
        assert_eq!(state.tasks.len(), 2);
        assert!(state.tasks[0].done);
        assert_eq!(state.tasks[1].id, "b");
    }

    #[test]
    fn apply_preserves_first_seen_order() {
        let mut state = PlanState::default();
        state.apply(&PlanPatch {
            session_id: "s1".into(),
            tasks: vec![task("a", "one", false)],
        });
        state.apply(&PlanPatch {
            session_id: "s1".into(),
            tasks: vec![task("b", "two", false), task("a", "one", true)],
        });
        let ids: Vec<&str> = state.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn replace_discards_previous_state() {
        let mut state = PlanState::default();
        state.replace(vec![task("a", "old", false)]);
        state.replace(vec![task("z", "new", true)]);
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].id, "z");
    }
}

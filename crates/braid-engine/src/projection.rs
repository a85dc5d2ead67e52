//! Read-side turn grouping.
//!
//! [`project`] folds a session's canonical message list into display-ready
//! [`TurnGroup`]s: each user message opens a turn that collects every
//! assistant and tool message up to the next user message. Messages arriving
//! before any user message (a resumed conversation tail, or assistant
//! fragments that outran the optimistic user message) form a leading
//! userless turn.
//!
//! This is a projection, not authoritative state: it holds clones of the
//! merger's messages and can be rebuilt from them at any time.

use braid_core::{Message, Role};

/// One conversational turn: a user message and the responses it produced.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnGroup {
    /// The user message that opened the turn, if any.
    pub user: Option<Message>,
    /// Assistant and tool messages in the turn, in timeline order.
    pub responses: Vec<Message>,
}

impl TurnGroup {
    /// Whether any response in this turn is still streaming.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.responses.iter().any(|m| m.is_streaming)
    }
}

/// Group a timeline into turns.
#[must_use]
pub fn project(messages: &[Message]) -> Vec<TurnGroup> {
    let mut groups: Vec<TurnGroup> = Vec::new();
    for message in messages {
        if message.role == Role::User {
            groups.push(TurnGroup {
                user: Some(message.clone()),
                responses: Vec::new(),
            });
        } else {
            if groups.is_empty() {
                groups.push(TurnGroup {
                    user: None,
                    responses: Vec::new(),
                });
            }
            let last = groups
                .last_mut()
                .unwrap_or_else(|| unreachable!("groups is non-empty"));
            last.responses.push(message.clone());
        }
    }
    groups
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

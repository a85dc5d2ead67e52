//! The canonical [`Message`] owned by the timeline merger.
//!
//! For a given `(session_id, message_id)` there is exactly one `Message`;
//! all fragment events for that ID mutate it in place, never create a
//! duplicate. The part list is append-only (see [`crate::content`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ContentPart;
use crate::ids::{MessageId, SessionId, ToolCallId};

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The human user.
    #[serde(rename = "user")]
    User,
    /// The assistant (model).
    #[serde(rename = "assistant")]
    Assistant,
    /// A tool acting on the assistant's behalf.
    #[serde(rename = "tool")]
    Tool,
}

/// A single message in a session's conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID (server-assigned, carried on fragment events).
    pub id: MessageId,
    /// Session this message belongs to.
    pub session_id: SessionId,
    /// Message role.
    pub role: Role,
    /// Ordered content parts.
    pub parts: Vec<ContentPart>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Still receiving fragments. Flipped false by the terminal event.
    pub is_streaming: bool,
    /// Confirmed by the backend. Optimistic user messages start false.
    pub delivered: bool,
}

impl Message {
    /// Create an empty streaming assistant message, as the merger does when
    /// the first fragment for an unknown message ID arrives.
    #[must_use]
    pub fn streaming_assistant(id: MessageId, session_id: SessionId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            session_id,
            role: Role::Assistant,
            parts: Vec::new(),
            created_at,
            is_streaming: true,
            delivered: true,
        }
    }

    /// Create an optimistic user message (not yet delivered).
    #[must_use]
    pub fn optimistic_user(session_id: SessionId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            role: Role::User,
            parts: vec![ContentPart::text(text)],
            created_at,
            is_streaming: false,
            delivered: false,
        }
    }

    /// Append delta text, extending the trailing text part if there is one.
    ///
    /// Contiguous text deltas coalesce into a single part rather than one
    /// part per event.
    pub fn push_delta(&mut self, delta: &str) {
        if let Some(ContentPart::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
        } else {
            self.parts.push(ContentPart::text(delta));
        }
    }

    /// Concatenated text of all text parts, in order.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let ContentPart::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    /// Index of the tool invocation part with the given ID, if present.
    #[must_use]
    pub fn invocation_index(&self, id: &ToolCallId) -> Option<usize> {
        self.parts
            .iter()
            .position(|p| p.is_invocation() && p.invocation_id() == Some(id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

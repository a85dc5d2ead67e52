//! Content part types.
//!
//! These are the primitive building blocks that appear inside messages.
//! A message's part list only grows, and only its trailing text part may be
//! extended in place — parts are never reordered or deleted once appended.
//! The one exception is orphan re-pairing: a tool result that arrived before
//! its invocation is tagged `orphaned` and moved next to the invocation when
//! the matching `tool_call` event shows up.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ToolCallId;

/// One content part of a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    /// Accumulated streaming text. Contiguous deltas coalesce into one part.
    #[serde(rename = "text")]
    Text {
        /// The text content.
        text: String,
    },
    /// A tool invocation emitted by the assistant.
    #[serde(rename = "tool_use")]
    ToolInvocation {
        /// Tool call ID.
        id: ToolCallId,
        /// Tool name.
        name: String,
        /// Tool arguments (opaque JSON).
        arguments: Value,
    },
    /// The result paired with a tool invocation.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// ID of the invocation this result corresponds to.
        #[serde(rename = "toolUseId")]
        tool_use_id: ToolCallId,
        /// Result content.
        content: String,
        /// Whether the tool execution errored.
        #[serde(rename = "isError")]
        is_error: bool,
        /// True when the result arrived before its invocation and has not
        /// been re-paired yet.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        orphaned: bool,
    },
}

impl ContentPart {
    /// Create a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool invocation part.
    #[must_use]
    pub fn invocation(id: impl Into<ToolCallId>, name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolInvocation {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a tool result part paired with a known invocation.
    #[must_use]
    pub fn result(tool_use_id: impl Into<ToolCallId>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
            orphaned: false,
        }
    }

    /// Returns `true` if this is a text part.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Returns `true` if this is a tool invocation part.
    #[must_use]
    pub fn is_invocation(&self) -> bool {
        matches!(self, Self::ToolInvocation { .. })
    }

    /// The invocation ID this part refers to, for both invocations and results.
    #[must_use]
    pub fn invocation_id(&self) -> Option<&ToolCallId> {
        match self {
            Self::Text { .. } => None,
            Self::ToolInvocation { id, .. } => Some(id),
            Self::ToolResult { tool_use_id, .. } => Some(tool_use_id),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! The [`EventType`] enum — all stream event type discriminators.
//!
//! Every variant has an exact `#[serde(rename)]` matching the wire string
//! delivered by the transport. Domain helper methods replace ad hoc string
//! comparisons with compile-time exhaustiveness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// All stream event types delivered over the firehose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Streaming text fragment (named chunk by some backends).
    #[serde(rename = "chunk")]
    Chunk,
    /// Streaming text fragment (token-level granularity).
    #[serde(rename = "token")]
    Token,
    /// Tool invocation emitted by the assistant.
    #[serde(rename = "tool_call")]
    ToolCall,
    /// Result of a tool invocation.
    #[serde(rename = "tool_result")]
    ToolResult,
    /// Terminal marker: the target message stops streaming.
    #[serde(rename = "done")]
    Done,
    /// Error surfaced by the agent backend.
    #[serde(rename = "error")]
    Error,
    /// Agent status update (side channel, not message-shaping).
    #[serde(rename = "agent_status")]
    AgentStatus,
}

/// All event types, for iteration in tests.
pub const ALL_EVENT_TYPES: [EventType; 7] = [
    EventType::Chunk,
    EventType::Token,
    EventType::ToolCall,
    EventType::ToolResult,
    EventType::Done,
    EventType::Error,
    EventType::AgentStatus,
];

impl EventType {
    /// The exact wire string for this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Token => "token",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Done => "done",
            Self::Error => "error",
            Self::AgentStatus => "agent_status",
        }
    }

    /// Terminal events flip a session's bucket back to idle.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Message-shaping events mutate the timeline; the rest are routed to
    /// side-channel handling.
    #[must_use]
    pub fn is_message_shaping(self) -> bool {
        matches!(
            self,
            Self::Chunk | Self::Token | Self::ToolCall | Self::ToolResult | Self::Done
        )
    }

    /// Events that may create a message which does not exist yet. This
    /// includes `tool_result`, whose early arrival creates the placeholder
    /// its orphaned part lives in; `done` for an unknown message ID is
    /// ignored instead.
    #[must_use]
    pub fn may_create_message(self) -> bool {
        matches!(self, Self::Chunk | Self::Token | Self::ToolCall | Self::ToolResult)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "chunk" => Ok(Self::Chunk),
            "token" => Ok(Self::Token),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "agent_status" => Ok(Self::AgentStatus),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_wire_strings_roundtrip() {
        for et in ALL_EVENT_TYPES {
            let json = serde_json::to_string(&et).unwrap();
            assert_eq!(json, format!("\"{}\"", et.as_str()));
            let back: EventType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, et);
        }
    }

    #[test]
    fn from_str_matches_as_str() {
        for et in ALL_EVENT_TYPES {
            assert_eq!(et.as_str().parse::<EventType>().unwrap(), et);
        }
    }

    #[test]
    fn from_str_rejects_unknown() {
        assert!("heartbeat".parse::<EventType>().is_err());
    }

    #[test]
    fn only_done_is_terminal() {
        for et in ALL_EVENT_TYPES {
            assert_eq!(et.is_terminal(), et == EventType::Done);
        }
    }

    #[test]
    fn side_channel_types_not_message_shaping() {
        assert!(!EventType::Error.is_message_shaping());
        assert!(!EventType::AgentStatus.is_message_shaping());
        assert!(EventType::Chunk.is_message_shaping());
        assert!(EventType::Done.is_message_shaping());
    }

    #[test]
    fn only_done_never_creates_messages() {
        for et in ALL_EVENT_TYPES {
            let expected = et.is_message_shaping() && et != EventType::Done;
            assert_eq!(et.may_create_message(), expected, "{et}");
        }
    }

    #[test]
    fn display_uses_wire_string() {
        assert_eq!(format!("{}", EventType::ToolResult), "tool_result");
    }
}

//! The [`StreamEvent`] struct — one transport-delivered unit.
//!
//! The wire format is a flat JSON object with base fields at the top level
//! (`event_id`, `type`, `sessionId`, `messageId`) and type-specific payload
//! fields (`delta`, `toolCall`, `result`, `data`). [`StreamEvent::from_envelope`]
//! validates a raw body before deserializing so that the specific reason for
//! rejection (missing type, missing session, foreign user) is available to
//! the router's drop logging.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use braid_core::{EventId, MessageId, SessionId, ToolCallId, UserId};

use crate::errors::{EventError, Result};
use crate::event_type::EventType;

/// Payload carried by `tool_call` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    /// Tool call ID.
    pub id: ToolCallId,
    /// Tool name.
    pub name: String,
    /// Tool arguments (opaque JSON).
    pub arguments: Value,
}

/// Payload carried by `tool_result` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    /// ID of the tool call this result corresponds to.
    #[serde(rename = "tool_use_id")]
    pub tool_use_id: ToolCallId,
    /// Result content.
    pub content: String,
    /// Whether the tool execution errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// One event delivered over the firehose.
///
/// Events are immutable and consumed at most once; the engine drops repeats
/// of the same [`event_id`](Self::event_id) via [`crate::SeenEvents`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    /// Unique event ID, the dedup key.
    #[serde(rename = "event_id")]
    pub event_id: EventId,
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Session this event addresses.
    pub session_id: SessionId,
    /// Message this event addresses, when message-shaping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Text fragment for `chunk`/`token` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    /// Invocation payload for `tool_call` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallPayload>,
    /// Result payload for `tool_result` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResultPayload>,
    /// Opaque payload for `error`/`agent_status` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl StreamEvent {
    /// Validate and parse a raw envelope body for the authenticated user.
    ///
    /// Checks field presence before deserializing so the router can log the
    /// specific reason an envelope was dropped. An embedded `userId` that
    /// does not match `authed` is rejected (cross-tenant defense); an absent
    /// `userId` is accepted because the transport connection itself is
    /// per-user.
    pub fn from_envelope(body: &Value, authed: &UserId) -> Result<Self> {
        if let Some(embedded) = body.get("userId").and_then(Value::as_str) {
            if embedded != authed.as_str() {
                return Err(EventError::ForeignUser(embedded.to_owned()));
            }
        }
        if body.get("event_id").and_then(Value::as_str).is_none() {
            return Err(EventError::MissingEventId);
        }
        if body.get("type").and_then(Value::as_str).is_none() {
            return Err(EventError::MissingEventType);
        }
        if body.get("sessionId").and_then(Value::as_str).is_none() {
            return Err(EventError::MissingSessionId);
        }
        Ok(serde_json::from_value(body.clone())?)
    }

    /// Build a `chunk` event.
    #[must_use]
    pub fn chunk(
        event_id: impl Into<EventId>,
        session_id: impl Into<SessionId>,
        message_id: impl Into<MessageId>,
        delta: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: EventType::Chunk,
            session_id: session_id.into(),
            message_id: Some(message_id.into()),
            delta: Some(delta.into()),
            tool_call: None,
            result: None,
            data: None,
        }
    }

    /// Build a `tool_call` event.
    #[must_use]
    pub fn tool_call(
        event_id: impl Into<EventId>,
        session_id: impl Into<SessionId>,
        message_id: impl Into<MessageId>,
        call: ToolCallPayload,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: EventType::ToolCall,
            session_id: session_id.into(),
            message_id: Some(message_id.into()),
            delta: None,
            tool_call: Some(call),
            result: None,
            data: None,
        }
    }

    /// Build a `tool_result` event.
    #[must_use]
    pub fn tool_result(
        event_id: impl Into<EventId>,
        session_id: impl Into<SessionId>,
        message_id: impl Into<MessageId>,
        result: ToolResultPayload,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: EventType::ToolResult,
            session_id: session_id.into(),
            message_id: Some(message_id.into()),
            delta: None,
            tool_call: None,
            result: Some(result),
            data: None,
        }
    }

    /// Build a `done` event.
    #[must_use]
    pub fn done(
        event_id: impl Into<EventId>,
        session_id: impl Into<SessionId>,
        message_id: impl Into<MessageId>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: EventType::Done,
            session_id: session_id.into(),
            message_id: Some(message_id.into()),
            delta: None,
            tool_call: None,
            result: None,
            data: None,
        }
    }

    /// Build an `error` or `agent_status` side-channel event.
    #[must_use]
    pub fn side_channel(
        event_id: impl Into<EventId>,
        event_type: EventType,
        session_id: impl Into<SessionId>,
        data: Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type,
            session_id: session_id.into(),
            message_id: None,
            delta: None,
            tool_call: None,
            result: None,
            data: Some(data),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn authed() -> UserId {
        UserId::from("u1")
    }

    fn chunk_body() -> Value {
        serde_json::json!({
            "event_id": "e1",
            "type": "chunk",
            "sessionId": "s1",
            "messageId": "m1",
            "delta": "Hel",
        })
    }

    // ── Envelope validation ──────────────────────────────────────────

    #[test]
    fn parses_chunk_envelope() {
        let ev = StreamEvent::from_envelope(&chunk_body(), &authed()).unwrap();
        assert_eq!(ev.event_type, EventType::Chunk);
        assert_eq!(ev.session_id.as_str(), "s1");
        assert_eq!(ev.message_id.as_deref(), Some("m1"));
        assert_eq!(ev.delta.as_deref(), Some("Hel"));
    }

    #[test]
    fn rejects_missing_event_id() {
        let mut body = chunk_body();
        let _ = body.as_object_mut().unwrap().remove("event_id");
        let err = StreamEvent::from_envelope(&body, &authed()).unwrap_err();
        assert_matches!(err, EventError::MissingEventId);
    }

    #[test]
    fn rejects_missing_type() {
        let mut body = chunk_body();
        let _ = body.as_object_mut().unwrap().remove("type");
        let err = StreamEvent::from_envelope(&body, &authed()).unwrap_err();
        assert_matches!(err, EventError::MissingEventType);
    }

    #[test]
    fn rejects_missing_session_id() {
        let mut body = chunk_body();
        let _ = body.as_object_mut().unwrap().remove("sessionId");
        let err = StreamEvent::from_envelope(&body, &authed()).unwrap_err();
        assert_matches!(err, EventError::MissingSessionId);
    }

    #[test]
    fn rejects_foreign_user() {
        let mut body = chunk_body();
        let _ = body
            .as_object_mut()
            .unwrap()
            .insert("userId".into(), Value::String("u2".into()));
        let err = StreamEvent::from_envelope(&body, &authed()).unwrap_err();
        assert_matches!(err, EventError::ForeignUser(u) if u == "u2");
    }

    #[test]
    fn accepts_matching_embedded_user() {
        let mut body = chunk_body();
        let _ = body
            .as_object_mut()
            .unwrap()
            .insert("userId".into(), Value::String("u1".into()));
        assert!(StreamEvent::from_envelope(&body, &authed()).is_ok());
    }

    #[test]
    fn rejects_unknown_type_as_malformed() {
        let mut body = chunk_body();
        let _ = body
            .as_object_mut()
            .unwrap()
            .insert("type".into(), Value::String("heartbeat".into()));
        let err = StreamEvent::from_envelope(&body, &authed()).unwrap_err();
        assert_matches!(err, EventError::Malformed(_));
    }

    // ── Payload shapes ───────────────────────────────────────────────

    #[test]
    fn tool_result_payload_wire_names() {
        let body = serde_json::json!({
            "event_id": "e2",
            "type": "tool_result",
            "sessionId": "s1",
            "messageId": "m1",
            "result": {"tool_use_id": "t1", "content": "ok", "isError": false},
        });
        let ev = StreamEvent::from_envelope(&body, &authed()).unwrap();
        let result = ev.result.unwrap();
        assert_eq!(result.tool_use_id.as_str(), "t1");
        assert_eq!(result.is_error, Some(false));
    }

    #[test]
    fn tool_result_is_error_optional() {
        let body = serde_json::json!({
            "event_id": "e2",
            "type": "tool_result",
            "sessionId": "s1",
            "messageId": "m1",
            "result": {"tool_use_id": "t1", "content": "ok"},
        });
        let ev = StreamEvent::from_envelope(&body, &authed()).unwrap();
        assert_eq!(ev.result.unwrap().is_error, None);
    }

    #[test]
    fn tool_call_payload_wire_names() {
        let body = serde_json::json!({
            "event_id": "e3",
            "type": "tool_call",
            "sessionId": "s1",
            "messageId": "m1",
            "toolCall": {"id": "t1", "name": "read_file", "arguments": {"path": "x"}},
        });
        let ev = StreamEvent::from_envelope(&body, &authed()).unwrap();
        let call = ev.tool_call.unwrap();
        assert_eq!(call.name, "read_file");
        assert_eq!(call.arguments["path"], "x");
    }

    #[test]
    fn constructor_roundtrip() {
        let ev = StreamEvent::chunk("e1", "s1", "m1", "Hi");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event_id"], "e1");
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["sessionId"], "s1");
        let back = StreamEvent::from_envelope(&json, &authed()).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn side_channel_constructor() {
        let ev = StreamEvent::side_channel(
            "e9",
            EventType::AgentStatus,
            "s1",
            serde_json::json!({"status": "local_tool_job"}),
        );
        assert!(ev.message_id.is_none());
        assert_eq!(ev.data.unwrap()["status"], "local_tool_job");
    }
}

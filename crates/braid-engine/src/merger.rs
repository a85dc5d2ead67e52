//! The timeline merger: a pure reducer from fragment events to messages.
//!
//! [`apply`] folds one message-shaping event into a session's message list.
//! It owns the invariants the rest of the engine relies on:
//!
//! - exactly one [`Message`] per `(session_id, message_id)`; fragments for a
//!   known ID mutate it in place, never duplicate it
//! - the part list only grows; only the trailing text part is extended
//! - a `tool_result` with no matching invocation is kept as an orphaned part
//!   and re-paired when the `tool_call` arrives, not dropped
//! - `done` and repeated tool events are idempotent
//!
//! `apply` is deterministic and does no I/O; duplicate-event suppression and
//! session scoping happen before it (see [`crate::router`] and
//! [`ScopeFilter`]).

use chrono::{DateTime, Utc};
use tracing::debug;

use braid_core::{ContentPart, Message, SessionId};
use braid_events::{EventType, StreamEvent};

/// Which session a timeline consumer is willing to accept events for.
///
/// A consumer attached to a not-yet-created session holds [`Pending`] and
/// accepts nothing; events that race session creation are handled by the
/// reconciler's early-event buffer instead of being misattributed. Once the
/// session ID is known the filter is narrowed to exactly that session.
///
/// [`Pending`]: ScopeFilter::Pending
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Session not yet known; accept nothing.
    Pending,
    /// Accept events for exactly this session.
    Session(SessionId),
}

impl ScopeFilter {
    /// Whether an event for `session_id` passes this filter.
    #[must_use]
    pub fn accepts(&self, session_id: &SessionId) -> bool {
        match self {
            Self::Pending => false,
            Self::Session(id) => id == session_id,
        }
    }

    /// Narrow the filter to a known session.
    pub fn bind(&mut self, session_id: SessionId) {
        *self = Self::Session(session_id);
    }
}

/// Fold one event into a session's message list.
///
/// Returns `true` if the list changed. Non-message-shaping events and
/// fragments that cannot be applied (missing `messageId`, missing payload,
/// `done` for an unknown message) are logged and leave the list untouched.
pub fn apply(messages: &mut Vec<Message>, event: &StreamEvent, now: DateTime<Utc>) -> bool {
    if !event.event_type.is_message_shaping() {
        return false;
    }

    let Some(message_id) = event.message_id.clone() else {
        debug!(event_id = %event.event_id, kind = event.event_type.as_str(), "dropping fragment without messageId");
        return false;
    };

    match event.event_type {
        EventType::Chunk | EventType::Token => {
            let Some(delta) = event.delta.as_deref() else {
                debug!(event_id = %event.event_id, "dropping text fragment without delta");
                return false;
            };
            let msg = find_or_create(messages, event, message_id, now);
            msg.push_delta(delta);
            true
        }
        EventType::ToolCall => {
            let Some(call) = event.tool_call.clone() else {
                debug!(event_id = %event.event_id, "dropping tool_call without payload");
                return false;
            };
            let msg = find_or_create(messages, event, message_id, now);
            if msg.invocation_index(&call.id).is_some() {
                return false;
            }
            msg.parts.push(ContentPart::invocation(call.id.clone(), call.name, call.arguments));
            repair_orphan(msg, &call.id);
            true
        }
        EventType::ToolResult => {
            let Some(result) = event.result.clone() else {
                debug!(event_id = %event.event_id, "dropping tool_result without payload");
                return false;
            };
            let msg = find_or_create(messages, event, message_id, now);
            if has_result(msg, &result.tool_use_id) {
                return false;
            }
            let paired = msg.invocation_index(&result.tool_use_id).is_some();
            if !paired {
                debug!(
                    tool_use_id = %result.tool_use_id,
                    message_id = %msg.id,
                    "tool_result before its tool_call, keeping as orphan"
                );
            }
            msg.parts.push(ContentPart::ToolResult {
                tool_use_id: result.tool_use_id,
                content: result.content,
                is_error: result.is_error.unwrap_or(false),
                orphaned: !paired,
            });
            true
        }
        EventType::Done => {
            let Some(msg) = find_mut(messages, &message_id) else {
                debug!(message_id = %message_id, "done for unknown message, ignoring");
                return false;
            };
            if !msg.is_streaming {
                return false;
            }
            msg.is_streaming = false;
            true
        }
        EventType::Error | EventType::AgentStatus => false,
    }
}

/// Look up a message by ID.
fn find_mut<'a>(messages: &'a mut [Message], id: &braid_core::MessageId) -> Option<&'a mut Message> {
    messages.iter_mut().find(|m| &m.id == id)
}

/// Look up a message, creating a streaming assistant placeholder if absent.
fn find_or_create<'a>(
    messages: &'a mut Vec<Message>,
    event: &StreamEvent,
    message_id: braid_core::MessageId,
    now: DateTime<Utc>,
) -> &'a mut Message {
    if let Some(idx) = messages.iter().position(|m| m.id == message_id) {
        &mut messages[idx]
    } else {
        messages.push(Message::streaming_assistant(message_id, event.session_id.clone(), now));
        messages.last_mut().unwrap_or_else(|| unreachable!("just pushed"))
    }
}

/// Whether a result part for this invocation ID already exists.
fn has_result(msg: &Message, id: &braid_core::ToolCallId) -> bool {
    msg.parts.iter().any(|p| {
        matches!(p, ContentPart::ToolResult { tool_use_id, .. } if tool_use_id == id)
    })
}

/// Re-pair an orphaned result with a freshly appended invocation: the orphan
/// moves to just after the invocation and its flag clears.
fn repair_orphan(msg: &mut Message, call_id: &braid_core::ToolCallId) {
    let orphan_idx = msg.parts.iter().position(|p| {
        matches!(p, ContentPart::ToolResult { tool_use_id, orphaned: true, .. } if tool_use_id == call_id)
    });
    let Some(orphan_idx) = orphan_idx else {
        return;
    };
    let mut part = msg.parts.remove(orphan_idx);
    if let ContentPart::ToolResult { orphaned, .. } = &mut part {
        *orphaned = false;
    }
    let insert_at = msg
        .invocation_index(call_id)
        .map_or(msg.parts.len(), |i| i + 1);
    msg.parts.insert(insert_at, part);
    debug!(tool_use_id = %call_id, message_id = %msg.id, "re-paired orphaned tool_result");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use braid_events::{ToolCallPayload, ToolResultPayload};

    fn call(id: &str, name: &str) -> ToolCallPayload {
        ToolCallPayload {
            id: id.into(),
            name: name.into(),
            arguments: serde_json::json!({}),
        }
    }

    fn result(id: &str, content: &str) -> ToolResultPayload {
        ToolResultPayload {
            tool_use_id: id.into(),
            content: content.into(),
            is_error: Some(false),
        }
    }

    fn apply_all(events: &[StreamEvent]) -> Vec<Message> {
        let mut messages = Vec::new();
        let now = Utc::now();
        for ev in events {
            let _ = apply(&mut messages, ev, now);
        }
        messages
    }

    // ── Scope filter ─────────────────────────────────────────────────

    #[test]
    fn pending_scope_accepts_nothing() {
        let f = ScopeFilter::Pending;
        assert!(!f.accepts(&"s1".into()));
    }

    #[test]
    fn bound_scope_accepts_only_its_session() {
        let mut f = ScopeFilter::Pending;
        f.bind("s1".into());
        assert!(f.accepts(&"s1".into()));
        assert!(!f.accepts(&"s2".into()));
    }

    // ── Text fragments ───────────────────────────────────────────────

    #[test]
    fn first_chunk_creates_streaming_assistant() {
        let messages = apply_all(&[StreamEvent::chunk("e1", "s1", "m1", "Hel")]);
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert_eq!(m.id.as_str(), "m1");
        assert!(m.is_streaming);
        assert_eq!(m.text(), "Hel");
    }

    #[test]
    fn chunks_coalesce_into_one_part() {
        let messages = apply_all(&[
            StreamEvent::chunk("e1", "s1", "m1", "Hel"),
            StreamEvent::chunk("e2", "s1", "m1", "lo "),
            StreamEvent::chunk("e3", "s1", "m1", "world"),
        ]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].parts.len(), 1);
        assert_eq!(messages[0].text(), "Hello world");
    }

    #[test]
    fn fragments_for_two_messages_stay_separate() {
        let messages = apply_all(&[
            StreamEvent::chunk("e1", "s1", "m1", "a"),
            StreamEvent::chunk("e2", "s1", "m2", "b"),
            StreamEvent::chunk("e3", "s1", "m1", "a"),
        ]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "aa");
        assert_eq!(messages[1].text(), "b");
    }

    #[test]
    fn chunk_without_delta_is_dropped() {
        let mut ev = StreamEvent::chunk("e1", "s1", "m1", "x");
        ev.delta = None;
        let mut messages = Vec::new();
        assert!(!apply(&mut messages, &ev, Utc::now()));
        assert!(messages.is_empty());
    }

    #[test]
    fn chunk_without_message_id_is_dropped() {
        let mut ev = StreamEvent::chunk("e1", "s1", "m1", "x");
        ev.message_id = None;
        let mut messages = Vec::new();
        assert!(!apply(&mut messages, &ev, Utc::now()));
        assert!(messages.is_empty());
    }

    // ── Tool calls and results ───────────────────────────────────────

    #[test]
    fn tool_call_appends_invocation_part() {
        let messages = apply_all(&[
            StreamEvent::chunk("e1", "s1", "m1", "Let me check. "),
            StreamEvent::tool_call("e2", "s1", "m1", call("t1", "read_file")),
        ]);
        let m = &messages[0];
        assert_eq!(m.parts.len(), 2);
        assert_eq!(m.invocation_index(&"t1".into()), Some(1));
        assert!(m.is_streaming, "tool_call does not end streaming");
    }

    #[test]
    fn duplicate_tool_call_is_noop() {
        let ev = StreamEvent::tool_call("e2", "s1", "m1", call("t1", "read_file"));
        let mut messages = Vec::new();
        assert!(apply(&mut messages, &ev, Utc::now()));
        assert!(!apply(&mut messages, &ev, Utc::now()));
        assert_eq!(messages[0].parts.len(), 1);
    }

    #[test]
    fn tool_result_pairs_with_invocation() {
        let messages = apply_all(&[
            StreamEvent::tool_call("e1", "s1", "m1", call("t1", "read_file")),
            StreamEvent::tool_result("e2", "s1", "m1", result("t1", "contents")),
        ]);
        let m = &messages[0];
        assert_eq!(m.parts.len(), 2);
        assert_matches::assert_matches!(
            &m.parts[1],
            ContentPart::ToolResult { tool_use_id, orphaned: false, .. } if tool_use_id.as_str() == "t1"
        );
    }

    #[test]
    fn duplicate_tool_result_is_noop() {
        let mut messages = apply_all(&[
            StreamEvent::tool_call("e1", "s1", "m1", call("t1", "read_file")),
            StreamEvent::tool_result("e2", "s1", "m1", result("t1", "contents")),
        ]);
        let dup = StreamEvent::tool_result("e3", "s1", "m1", result("t1", "contents"));
        assert!(!apply(&mut messages, &dup, Utc::now()));
        assert_eq!(messages[0].parts.len(), 2);
    }

    #[test]
    fn early_tool_result_kept_as_orphan() {
        let messages = apply_all(&[StreamEvent::tool_result("e1", "s1", "m1", result("t1", "early"))]);
        assert_matches::assert_matches!(
            &messages[0].parts[0],
            ContentPart::ToolResult { orphaned: true, .. }
        );
    }

    #[test]
    fn late_tool_call_repairs_orphan() {
        let messages = apply_all(&[
            StreamEvent::tool_result("e1", "s1", "m1", result("t1", "early")),
            StreamEvent::tool_call("e2", "s1", "m1", call("t1", "read_file")),
        ]);
        let m = &messages[0];
        assert_eq!(m.parts.len(), 2);
        assert_eq!(m.invocation_index(&"t1".into()), Some(0));
        assert_matches::assert_matches!(
            &m.parts[1],
            ContentPart::ToolResult { orphaned: false, .. }
        );
    }

    #[test]
    fn orphan_repair_interleaved_with_done() {
        // Out-of-order worked sequence: result, done, then the call.
        let messages = apply_all(&[
            StreamEvent::tool_result("e1", "s1", "m1", result("t1", "r")),
            StreamEvent::done("e2", "s1", "m1"),
            StreamEvent::tool_call("e3", "s1", "m1", call("t1", "ls")),
        ]);
        let m = &messages[0];
        assert!(!m.is_streaming);
        assert_eq!(m.invocation_index(&"t1".into()), Some(0));
        assert_matches::assert_matches!(&m.parts[1], ContentPart::ToolResult { orphaned: false, .. });
    }

    #[test]
    fn error_result_flag_carried() {
        let mut res = result("t1", "boom");
        res.is_error = Some(true);
        let messages = apply_all(&[
            StreamEvent::tool_call("e1", "s1", "m1", call("t1", "sh")),
            StreamEvent::tool_result("e2", "s1", "m1", res),
        ]);
        assert_matches::assert_matches!(&messages[0].parts[1], ContentPart::ToolResult { is_error: true, .. });
    }

    // ── Terminal events ──────────────────────────────────────────────

    #[test]
    fn done_ends_streaming_idempotently() {
        let mut messages = apply_all(&[StreamEvent::chunk("e1", "s1", "m1", "hi")]);
        let done = StreamEvent::done("e2", "s1", "m1");
        assert!(apply(&mut messages, &done, Utc::now()));
        assert!(!messages[0].is_streaming);
        let done_again = StreamEvent::done("e3", "s1", "m1");
        assert!(!apply(&mut messages, &done_again, Utc::now()));
    }

    #[test]
    fn done_for_unknown_message_is_ignored() {
        let mut messages = Vec::new();
        assert!(!apply(&mut messages, &StreamEvent::done("e1", "s1", "m9"), Utc::now()));
        assert!(messages.is_empty());
    }

    #[test]
    fn side_channel_events_do_not_shape_messages() {
        let ev = StreamEvent::side_channel("e1", EventType::Error, "s1", serde_json::json!({"message": "x"}));
        let mut messages = Vec::new();
        assert!(!apply(&mut messages, &ev, Utc::now()));
        assert!(messages.is_empty());
    }

    // ── Worked sequence ──────────────────────────────────────────────

    #[test]
    fn full_turn_in_order() {
        let messages = apply_all(&[
            StreamEvent::chunk("e1", "s1", "m1", "Checking. "),
            StreamEvent::tool_call("e2", "s1", "m1", call("t1", "read_file")),
            StreamEvent::tool_result("e3", "s1", "m1", result("t1", "42 lines")),
            StreamEvent::chunk("e4", "s1", "m1", "The file has 42 lines."),
            StreamEvent::done("e5", "s1", "m1"),
        ]);
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert!(!m.is_streaming);
        assert_eq!(m.parts.len(), 4);
        assert!(m.parts[0].is_text());
        assert!(m.parts[1].is_invocation());
        assert_matches::assert_matches!(&m.parts[2], ContentPart::ToolResult { orphaned: false, .. });
        assert!(m.parts[3].is_text());
    }

    // ── Properties ───────────────────────────────────────────────────

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// After both the call and the result have been applied, in either
        /// order and at any interleaving distance, the pair is intact and
        /// nothing is orphaned.
        fn assert_paired(messages: &[Message]) {
            let m = &messages[0];
            assert!(m.invocation_index(&"t1".into()).is_some());
            for part in &m.parts {
                if let ContentPart::ToolResult { orphaned, .. } = part {
                    assert!(!orphaned);
                }
            }
        }

        /// One of the six orderings of three events.
        fn permuted(mut pool: Vec<StreamEvent>, perm: usize) -> Vec<StreamEvent> {
            let mut ordered = Vec::with_capacity(pool.len());
            let mut k = perm;
            for i in (1..=pool.len()).rev() {
                ordered.push(pool.remove(k % i));
                k /= i;
            }
            ordered
        }

        proptest! {
            #[test]
            fn call_and_result_pair_in_any_order(call_first: bool, interleave_done: bool) {
                let call_ev = StreamEvent::tool_call("e1", "s1", "m1", call("t1", "ls"));
                let result_ev = StreamEvent::tool_result("e2", "s1", "m1", result("t1", "ok"));
                let mut events = if call_first {
                    vec![call_ev, result_ev]
                } else {
                    vec![result_ev, call_ev]
                };
                if interleave_done {
                    events.insert(1, StreamEvent::done("e3", "s1", "m1"));
                }
                assert_paired(&apply_all(&events));
            }

            #[test]
            fn chunk_bursts_never_duplicate(deltas in proptest::collection::vec("[a-z]{1,8}", 1..16)) {
                let events: Vec<StreamEvent> = deltas
                    .iter()
                    .enumerate()
                    .map(|(n, d)| StreamEvent::chunk(format!("e{n}"), "s1", "m1", d.as_str()))
                    .collect();
                let messages = apply_all(&events);
                prop_assert_eq!(messages.len(), 1);
                prop_assert_eq!(messages[0].parts.len(), 1, "contiguous deltas coalesce");
                prop_assert_eq!(messages[0].text(), deltas.concat());
            }

            #[test]
            fn reapplying_tool_and_done_events_is_a_noop(perm in 0usize..6) {
                let pool = vec![
                    StreamEvent::tool_call("e1", "s1", "m1", call("t1", "ls")),
                    StreamEvent::tool_result("e2", "s1", "m1", result("t1", "ok")),
                    StreamEvent::done("e3", "s1", "m1"),
                ];
                let ordered = permuted(pool, perm);
                let now = Utc::now();
                let mut messages = Vec::new();
                for ev in &ordered {
                    let _ = apply(&mut messages, ev, now);
                }
                let settled = messages.clone();
                for ev in &ordered {
                    prop_assert!(!apply(&mut messages, ev, now), "repeat must not change state");
                    prop_assert_eq!(&messages, &settled);
                }
            }
        }
    }
}

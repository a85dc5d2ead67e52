//! The transport seam.
//!
//! One long-lived connection per authenticated user delivers raw envelopes
//! for all of that user's sessions. Reconnect and backoff live behind the
//! [`Transport`] trait — the engine only requires at-least-once, possibly
//! out-of-order, possibly duplicated delivery.
//!
//! [`ChannelTransport`] is the in-process implementation used by the
//! surrounding application (which feeds it from its SSE/WebSocket client)
//! and by tests.

use serde_json::Value;
use tokio::sync::broadcast;

use braid_core::UserId;

/// One raw unit delivered by the transport, before validation.
#[derive(Clone, Debug)]
pub struct RawEnvelope {
    /// User identity the connection attributes this envelope to, if the
    /// transport knows it.
    pub user_id: Option<UserId>,
    /// Unparsed envelope body.
    pub body: Value,
}

impl RawEnvelope {
    /// Build an envelope attributed to a user.
    #[must_use]
    pub fn for_user(user_id: impl Into<UserId>, body: Value) -> Self {
        Self {
            user_id: Some(user_id.into()),
            body,
        }
    }

    /// Build an envelope with no connection-level attribution.
    #[must_use]
    pub fn anonymous(body: Value) -> Self {
        Self {
            user_id: None,
            body,
        }
    }
}

/// A source of raw envelopes.
pub trait Transport: Send + Sync {
    /// Open a subscription to the envelope stream.
    ///
    /// Every subscriber sees every envelope published after it subscribes.
    fn subscribe(&self) -> broadcast::Receiver<RawEnvelope>;
}

/// In-process transport backed by a tokio broadcast channel.
pub struct ChannelTransport {
    tx: broadcast::Sender<RawEnvelope>,
}

impl ChannelTransport {
    /// Create a transport with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an envelope to all current subscribers.
    ///
    /// Publishing with no subscribers is not an error; the envelope is
    /// simply dropped, matching a transport with nobody listening.
    pub fn publish(&self, envelope: RawEnvelope) {
        let _ = self.tx.send(envelope);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Transport for ChannelTransport {
    fn subscribe(&self) -> broadcast::Receiver<RawEnvelope> {
        self.tx.subscribe()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let transport = ChannelTransport::default();
        let mut rx = transport.subscribe();
        transport.publish(RawEnvelope::for_user("u1", serde_json::json!({"type": "done"})));
        let env = rx.recv().await.unwrap();
        assert_eq!(env.user_id.as_deref(), Some("u1"));
        assert_eq!(env.body["type"], "done");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let transport = ChannelTransport::default();
        transport.publish(RawEnvelope::anonymous(serde_json::json!({})));
        assert_eq!(transport.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn all_subscribers_see_every_envelope() {
        let transport = ChannelTransport::default();
        let mut rx1 = transport.subscribe();
        let mut rx2 = transport.subscribe();
        transport.publish(RawEnvelope::anonymous(serde_json::json!({"n": 1})));
        assert_eq!(rx1.recv().await.unwrap().body["n"], 1);
        assert_eq!(rx2.recv().await.unwrap().body["n"], 1);
    }
}

//! The firehose router.
//!
//! [`EventRouter`] sits between the raw transport and the engine's
//! consumers. For each raw envelope it:
//!
//! 1. rejects envelopes attributed to a different user than the one this
//!    router was built for
//! 2. validates and parses the body into a [`StreamEvent`], logging and
//!    counting drops (malformed bodies never reach consumers)
//! 3. calls every registered handler with the accepted event,
//!    synchronously, in registration order
//!
//! Dispatch is synchronous on the caller's task, so events are observed in
//! arrival order and a handler sees the previous event's effects before the
//! next one. Handlers must therefore be fast and non-blocking; anything
//! slow belongs in a spawned side effect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use braid_core::UserId;
use braid_events::StreamEvent;

use crate::transport::RawEnvelope;

type Handler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// Validating fan-out point for one user's event stream.
pub struct EventRouter {
    authed: UserId,
    registry: Arc<Mutex<Registry>>,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

/// Handle for a registered handler; dropping it unregisters.
pub struct Subscription {
    id: u64,
    registry: std::sync::Weak<Mutex<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl EventRouter {
    /// Create a router for the given authenticated user.
    #[must_use]
    pub fn new(authed: UserId) -> Self {
        Self {
            authed,
            registry: Arc::new(Mutex::new(Registry::default())),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// The user this router accepts events for.
    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.authed
    }

    /// Register a handler called for every accepted event.
    ///
    /// Handlers run in registration order on the dispatching task. The
    /// returned [`Subscription`] unregisters the handler when dropped.
    #[must_use]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Validate one raw envelope and fan it out if accepted.
    ///
    /// Returns the parsed event when it was dispatched.
    pub fn dispatch_raw(&self, envelope: &RawEnvelope) -> Option<StreamEvent> {
        if let Some(conn_user) = &envelope.user_id {
            if conn_user != &self.authed {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%conn_user, authed = %self.authed, "dropping envelope from foreign connection");
                return None;
            }
        }
        match StreamEvent::from_envelope(&envelope.body, &self.authed) {
            Ok(event) => {
                self.dispatch(&event);
                Some(event)
            }
            Err(err) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(%err, "dropping invalid envelope");
                None
            }
        }
    }

    /// Fan an already-validated event out to every handler.
    pub fn dispatch(&self, event: &StreamEvent) {
        let _ = self.accepted.fetch_add(1, Ordering::Relaxed);
        // Snapshot so a handler may subscribe or drop subscriptions without
        // deadlocking on the registry.
        let handlers: Vec<Handler> = self
            .registry
            .lock()
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of events accepted and dispatched so far.
    #[must_use]
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Number of envelopes dropped at validation.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn chunk_body(event_id: &str) -> serde_json::Value {
        serde_json::json!({
            "event_id": event_id,
            "type": "chunk",
            "sessionId": "s1",
            "messageId": "m1",
            "delta": "x",
        })
    }

    #[test]
    fn valid_envelope_reaches_handlers() {
        let router = EventRouter::new("u1".into());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = router.subscribe(move |ev| sink.lock().push(ev.event_id.clone()));

        let accepted = router.dispatch_raw(&RawEnvelope::for_user("u1", chunk_body("e1")));
        assert!(accepted.is_some());
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(router.accepted_count(), 1);
    }

    #[test]
    fn malformed_envelope_is_dropped_not_fatal() {
        let router = EventRouter::new("u1".into());
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let _sub = router.subscribe(move |_| {
            let _ = sink.fetch_add(1, Ordering::SeqCst);
        });

        assert!(router.dispatch_raw(&RawEnvelope::anonymous(serde_json::json!({"nope": 1}))).is_none());
        assert!(router.dispatch_raw(&RawEnvelope::for_user("u1", chunk_body("e1"))).is_some());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(router.dropped_count(), 1);
    }

    #[test]
    fn foreign_connection_user_is_dropped() {
        let router = EventRouter::new("u1".into());
        assert!(router.dispatch_raw(&RawEnvelope::for_user("u2", chunk_body("e1"))).is_none());
        assert_eq!(router.dropped_count(), 1);
    }

    #[test]
    fn foreign_embedded_user_is_dropped() {
        let router = EventRouter::new("u1".into());
        let mut body = chunk_body("e1");
        let _ = body
            .as_object_mut()
            .unwrap()
            .insert("userId".into(), serde_json::Value::String("u2".into()));
        assert!(router.dispatch_raw(&RawEnvelope::anonymous(body)).is_none());
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let router = EventRouter::new("u1".into());
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let _a = router.subscribe(move |_| first.lock().push("first"));
        let _b = router.subscribe(move |_| second.lock().push("second"));

        let _ = router.dispatch_raw(&RawEnvelope::for_user("u1", chunk_body("e1")));
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let router = EventRouter::new("u1".into());
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let sub = router.subscribe(move |_| {
            let _ = sink.fetch_add(1, Ordering::SeqCst);
        });

        let _ = router.dispatch_raw(&RawEnvelope::for_user("u1", chunk_body("e1")));
        drop(sub);
        let _ = router.dispatch_raw(&RawEnvelope::for_user("u1", chunk_body("e2")));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_preserves_arrival_order() {
        let router = EventRouter::new("u1".into());
        let ids = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ids);
        let _sub = router.subscribe(move |ev| sink.lock().push(ev.event_id.as_str().to_owned()));

        for n in 0..4 {
            let _ = router.dispatch_raw(&RawEnvelope::for_user("u1", chunk_body(&format!("e{n}"))));
        }
        assert_eq!(*ids.lock(), vec!["e0", "e1", "e2", "e3"]);
    }
}

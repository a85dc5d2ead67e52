//! The engine façade.
//!
//! [`Engine`] wires the router, merger, reconciler, buckets, and debounce
//! table around one shared state lock. All event-driven mutation happens
//! synchronously inside [`EventRouter`] dispatch while the lock is held;
//! collaborator I/O (plan refetches, directory writes, tool-job dispatch)
//! is collected as side effects under the lock and spawned after it is
//! released, so event processing never waits on the network.
//!
//! Per-field ownership inside the lock: the merger owns message content,
//! the reconciler owns identity renames, the bucket machine owns status and
//! read flags. Each reads the others' session keys only to address writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use braid_core::{
    IdentityState, Message, PlanState, PlanTask, Session, SessionId, SessionStatus, UserId,
};
use braid_events::{EventType, SeenEvents, StreamEvent};

use crate::buckets::SessionBuckets;
use crate::collaborators::{PlanService, SessionDirectory, ToolJobDispatcher};
use crate::debounce::DebounceTable;
use crate::errors::{EngineError, Result};
use crate::merger::{self, ScopeFilter};
use crate::projection::{self, TurnGroup};
use crate::reconcile::IdentityReconciler;
use crate::router::{EventRouter, Subscription};
use crate::settings::EngineSettings;
use crate::store::SessionStore;
use crate::transport::Transport;

/// External collaborators the engine calls into.
#[derive(Clone)]
pub struct EngineDeps {
    /// Persistent session directory.
    pub directory: Arc<dyn SessionDirectory>,
    /// Plan storage.
    pub plans: Arc<dyn PlanService>,
    /// Local tool-job executor.
    pub tool_jobs: Arc<dyn ToolJobDispatcher>,
}

/// All mutable engine state, behind one lock.
struct EngineState {
    store: SessionStore,
    buckets: SessionBuckets,
    reconciler: IdentityReconciler,
    seen: HashMap<SessionId, SeenEvents>,
    scope: ScopeFilter,
}

/// Shared core captured by the router handler and spawned effects.
struct Inner {
    user: UserId,
    settings: EngineSettings,
    deps: EngineDeps,
    state: Mutex<EngineState>,
    debounce: DebounceTable<SessionId>,
}

/// Deferred collaborator work, executed after the state lock is released.
enum Effect {
    RefetchPlan(SessionId),
    DebouncedRefetchPlan(SessionId),
    RefetchAllPlans,
    DispatchLocalJob(SessionId, Value),
}

/// Reconciliation engine for one user's session event stream.
pub struct Engine {
    inner: Arc<Inner>,
    router: Arc<EventRouter>,
    _subscription: Subscription,
}

impl Engine {
    /// Create an engine for the given user.
    #[must_use]
    pub fn new(user: UserId, settings: EngineSettings, deps: EngineDeps) -> Self {
        let debounce_window = Duration::from_millis(settings.debounce_window_ms);
        let inner = Arc::new(Inner {
            state: Mutex::new(EngineState {
                store: SessionStore::new(),
                buckets: SessionBuckets::new(),
                reconciler: IdentityReconciler::new(settings.early_event_buffer),
                seen: HashMap::new(),
                scope: ScopeFilter::Pending,
            }),
            user: user.clone(),
            settings,
            deps,
            debounce: DebounceTable::new(debounce_window),
        });
        let router = Arc::new(EventRouter::new(user));
        let handler_inner = Arc::clone(&inner);
        let subscription = router.subscribe(move |event| Self::process(&handler_inner, event));
        Self {
            inner,
            router,
            _subscription: subscription,
        }
    }

    /// The router this engine consumes from, for feeding raw envelopes.
    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Pump a transport's envelopes into the router until it closes.
    pub fn attach(&self, transport: &dyn Transport) -> tokio::task::JoinHandle<()> {
        let mut rx = transport.subscribe();
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        let _ = router.dispatch_raw(&envelope);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "transport subscriber lagged, events lost upstream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Seed sessions from the directory. Live event state is untouched.
    pub async fn seed(&self) -> Result<()> {
        let sessions = self.inner.deps.directory.list_sessions().await?;
        let now = Utc::now();
        let mut state = self.inner.state.lock();
        for session in sessions {
            state.buckets.track(session.id.clone(), now);
            state.store.upsert_session(session);
        }
        Ok(())
    }

    /// Load a session's stored message history into the timeline.
    ///
    /// Used when opening a session that has not merged live events.
    pub async fn hydrate(&self, id: &SessionId) -> Result<()> {
        let record = self.inner.deps.directory.get_session(id, true).await?;
        let Some(record) = record else {
            return Err(EngineError::SessionNotFound(id.to_string()));
        };
        let mut state = self.inner.state.lock();
        state.buckets.track(record.session.id.clone(), Utc::now());
        state.store.upsert_session(record.session);
        *state.store.messages_mut(id) = record.messages;
        Ok(())
    }

    /// Create an optimistic session under a client-assigned temporary ID.
    ///
    /// The session is immediately visible and may carry an optimistic,
    /// un-delivered user message. The caller is expected to obtain the real
    /// ID from the backend and call [`reconcile`](Self::reconcile), or
    /// [`reconcile_failed`](Self::reconcile_failed) if that call fails.
    pub fn begin_optimistic(&self, name: &str, first_message: Option<&str>) -> SessionId {
        let temp_id = SessionId::new();
        let now = Utc::now();
        let mut state = self.inner.state.lock();
        state
            .store
            .upsert_session(Session::provisional(temp_id.clone(), name, self.inner.user.clone(), now));
        state.buckets.track(temp_id.clone(), now);
        state.reconciler.register(temp_id.clone());
        if let Some(text) = first_message {
            state
                .store
                .messages_mut(&temp_id)
                .push(Message::optimistic_user(temp_id.clone(), text, now));
        }
        info!(%temp_id, "optimistic session created");
        temp_id
    }

    /// Rewrite a provisional session to its authoritative ID, exactly once.
    ///
    /// Repeat calls for an already-reconciled session are no-ops. Events
    /// that arrived for the real ID before this call are replayed through
    /// normal dispatch afterwards, in arrival order.
    pub fn reconcile(&self, temp_id: &SessionId, real_id: SessionId) -> Result<()> {
        let mut replay;
        {
            let mut state = self.inner.state.lock();
            if temp_id == &real_id {
                if !state.store.contains(temp_id) {
                    return Err(EngineError::SessionNotFound(temp_id.to_string()));
                }
                let _ = state.reconciler.complete(temp_id);
                confirm_in_place(&mut state, temp_id);
                return Ok(());
            }
            if !state.store.contains(temp_id) {
                if state.store.contains(&real_id) {
                    // Already reconciled by an earlier call.
                    return Ok(());
                }
                return Err(EngineError::SessionNotFound(temp_id.to_string()));
            }
            if !state.reconciler.complete(temp_id) {
                return Ok(());
            }
            info!(%temp_id, %real_id, "reconciling session identity");
            state.store.rekey(temp_id, real_id.clone());
            confirm_in_place(&mut state, &real_id);
            state.buckets.rekey(temp_id, real_id.clone());
            if let Some(seen) = state.seen.remove(temp_id) {
                let _ = state.seen.entry(real_id.clone()).or_insert(seen);
            }
            if state.scope == ScopeFilter::Session(temp_id.clone()) {
                state.scope.bind(real_id.clone());
            }
            replay = state.reconciler.take_early(&real_id);
            if !state.reconciler.any_pending() {
                replay.extend(state.reconciler.take_all_early());
            }
        }
        self.inner.debounce.rekey(temp_id, real_id.clone());
        if !replay.is_empty() {
            debug!(%real_id, count = replay.len(), "replaying early events");
            for event in replay {
                Self::process(&self.inner, &event);
            }
        }
        Ok(())
    }

    /// Mark an optimistic session as failed to create.
    ///
    /// The placeholder and its un-delivered message stay visible; nothing
    /// is retried and the session is never promoted to delivered.
    pub fn reconcile_failed(&self, temp_id: &SessionId) -> Result<()> {
        let replay;
        {
            let mut state = self.inner.state.lock();
            if !state.store.contains(temp_id) {
                return Err(EngineError::SessionNotFound(temp_id.to_string()));
            }
            state.reconciler.abandon(temp_id);
            if let Some(session) = state.store.session_mut(temp_id) {
                session.status = SessionStatus::Failed;
            }
            replay = drain_stale_early(&mut state);
        }
        for event in replay {
            Self::process(&self.inner, &event);
        }
        Ok(())
    }

    /// Append an optimistic user message to an existing session.
    ///
    /// The message starts un-delivered; the next `done` for the session
    /// marks the timeline delivered.
    pub fn push_user_message(&self, id: &SessionId, text: &str) -> Result<braid_core::MessageId> {
        let mut state = self.inner.state.lock();
        if !state.store.contains(id) {
            return Err(EngineError::SessionNotFound(id.to_string()));
        }
        let message = Message::optimistic_user(id.clone(), text, Utc::now());
        let message_id = message.id.clone();
        state.store.messages_mut(id).push(message);
        Ok(message_id)
    }

    /// Apply an optimistic plan patch directly.
    pub fn apply_plan_patch(&self, patch: &braid_core::PlanPatch) {
        self.inner.state.lock().store.plan_mut(&patch.session_id).apply(patch);
    }

    /// Open a session: its timeline consumer becomes active and it is
    /// marked read, staying read while open.
    pub fn open_session(&self, id: &SessionId) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !state.store.contains(id) {
            return Err(EngineError::SessionNotFound(id.to_string()));
        }
        state.buckets.open(id);
        state.scope.bind(id.clone());
        Ok(())
    }

    /// Close the open session; no timeline merges until the next open.
    pub fn close_session(&self) {
        let mut state = self.inner.state.lock();
        state.buckets.close();
        state.scope = ScopeFilter::Pending;
    }

    /// Mark a session read without opening it.
    pub fn mark_read(&self, id: &SessionId) {
        self.inner.state.lock().buckets.mark_read(id);
    }

    /// Mark a session unread.
    pub fn mark_unread(&self, id: &SessionId) {
        self.inner.state.lock().buckets.mark_unread(id);
    }

    /// Rename a session locally and in the directory.
    pub fn rename_session(&self, id: &SessionId, name: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let Some(session) = state.store.session_mut(id) else {
                return Err(EngineError::SessionNotFound(id.to_string()));
            };
            session.name = name.to_owned();
        }
        let directory = Arc::clone(&self.inner.deps.directory);
        let id = id.clone();
        let name = name.to_owned();
        spawn_logged(async move {
            directory.rename_session(&id, &name).await
        });
        Ok(())
    }

    /// Delete a session: synchronously clear every piece of engine state
    /// for it, then delete it from the directory.
    ///
    /// Pending debounce timers are cancelled so no stale side effect fires
    /// after teardown. Deleting a still-provisional session also abandons
    /// its reconciliation so unknown-session events stop being diverted
    /// into the early buffer on its behalf.
    pub fn delete_session(&self, id: &SessionId) -> Result<()> {
        let replay;
        {
            let mut state = self.inner.state.lock();
            if !state.store.contains(id) {
                return Err(EngineError::SessionNotFound(id.to_string()));
            }
            state.store.remove_session(id);
            state.buckets.remove(id);
            let _ = state.seen.remove(id);
            state.reconciler.abandon(id);
            if state.scope == ScopeFilter::Session(id.clone()) {
                state.scope = ScopeFilter::Pending;
            }
            replay = drain_stale_early(&mut state);
        }
        for event in replay {
            Self::process(&self.inner, &event);
        }
        self.inner.debounce.cancel(id);
        let directory = Arc::clone(&self.inner.deps.directory);
        let id = id.clone();
        spawn_logged(async move { directory.delete_session(&id).await });
        Ok(())
    }

    /// Tear down all per-session state, as on logout.
    pub fn clear(&self) {
        self.inner.debounce.cancel_all();
        let mut state = self.inner.state.lock();
        *state = EngineState {
            store: SessionStore::new(),
            buckets: SessionBuckets::new(),
            reconciler: IdentityReconciler::new(self.inner.settings.early_event_buffer),
            seen: HashMap::new(),
            scope: ScopeFilter::Pending,
        };
    }

    // ── Read access ──────────────────────────────────────────────────

    /// Snapshot of one session.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.inner.state.lock().store.session(id).cloned()
    }

    /// Snapshot of all sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.state.lock().store.sessions().cloned().collect()
    }

    /// Snapshot of a session's message timeline.
    #[must_use]
    pub fn messages(&self, id: &SessionId) -> Vec<Message> {
        self.inner.state.lock().store.messages(id).to_vec()
    }

    /// Turn-grouped projection of a session's timeline.
    #[must_use]
    pub fn timeline(&self, id: &SessionId) -> Vec<TurnGroup> {
        projection::project(self.inner.state.lock().store.messages(id))
    }

    /// Snapshot of a session's plan state.
    #[must_use]
    pub fn plan(&self, id: &SessionId) -> Option<PlanState> {
        self.inner.state.lock().store.plan(id).cloned()
    }

    /// Snapshot of a session's bucket entry.
    #[must_use]
    pub fn bucket_entry(&self, id: &SessionId) -> Option<braid_core::BucketEntry> {
        self.inner.state.lock().buckets.entry(id).cloned()
    }

    /// Sessions currently processing, in the order they started.
    #[must_use]
    pub fn processing_order(&self) -> Vec<SessionId> {
        self.inner.state.lock().buckets.processing_order().to_vec()
    }

    /// Sessions currently in a `(status, read-state)` bucket.
    #[must_use]
    pub fn sessions_in_bucket(
        &self,
        status: braid_core::BucketStatus,
        read_state: braid_core::ReadState,
    ) -> Vec<SessionId> {
        self.inner.state.lock().buckets.in_bucket(status, read_state)
    }

    /// The most recent surfaced error for a session.
    #[must_use]
    pub fn last_error(&self, id: &SessionId) -> Option<Value> {
        self.inner.state.lock().store.last_error(id).cloned()
    }

    // ── Event dispatch ───────────────────────────────────────────────

    /// Fold one accepted event into engine state and run its side effects.
    fn process(inner: &Arc<Inner>, event: &StreamEvent) {
        let now = Utc::now();
        let mut effects: Vec<Effect> = Vec::new();
        {
            let mut state = inner.state.lock();

            if !state.store.contains(&event.session_id) {
                if state.reconciler.any_pending() {
                    // May belong to a session whose real ID has not landed.
                    debug!(session_id = %event.session_id, event_id = %event.event_id, "buffering event for unknown session");
                    state.reconciler.buffer_early(event.clone());
                    return;
                }
                debug!(session_id = %event.session_id, "event for unseeded session, tracking it");
                state.store.upsert_session(Session::confirmed(
                    event.session_id.clone(),
                    event.session_id.as_str(),
                    inner.user.clone(),
                    now,
                ));
                state.buckets.track(event.session_id.clone(), now);
            }

            let capacity = inner.settings.seen_capacity;
            let seen = state
                .seen
                .entry(event.session_id.clone())
                .or_insert_with(|| SeenEvents::with_capacity(capacity));
            if !seen.insert(&event.event_id) {
                debug!(event_id = %event.event_id, "duplicate event dropped");
                return;
            }

            state.buckets.observe_event(&event.session_id, event.event_type, now);
            if let Some(session) = state.store.session_mut(&event.session_id) {
                session.status = if event.event_type.is_terminal() {
                    SessionStatus::Idle
                } else {
                    SessionStatus::Processing
                };
            }

            if event.event_type.is_message_shaping() && state.scope.accepts(&event.session_id) {
                let messages = state.store.messages_mut(&event.session_id);
                let _ = merger::apply(messages, event, now);
            }

            match event.event_type {
                EventType::ToolResult => {
                    collect_plan_effects(inner, &mut state, event, &mut effects);
                }
                EventType::Done => {
                    // A completed turn confirms any optimistic user
                    // messages still pending in this timeline.
                    for message in state.store.messages_mut(&event.session_id) {
                        message.delivered = true;
                    }
                    effects.push(Effect::RefetchAllPlans);
                }
                EventType::Error => {
                    let payload = event.data.clone().unwrap_or(Value::Null);
                    state.store.record_error(&event.session_id, payload);
                }
                EventType::AgentStatus => {
                    if let Some(data) = &event.data {
                        if data.get("status").and_then(Value::as_str) == Some("local_tool_job") {
                            effects.push(Effect::DispatchLocalJob(event.session_id.clone(), data.clone()));
                        }
                    }
                }
                EventType::Chunk | EventType::Token | EventType::ToolCall => {}
            }
        }
        run_effects(inner, effects);
    }
}

/// When no reconciliation is pending any more, hand back every buffered
/// early event so it re-enters normal dispatch (where unknown sessions are
/// tracked on the fly). Returns nothing while renames are still pending.
fn drain_stale_early(state: &mut EngineState) -> Vec<StreamEvent> {
    if state.reconciler.any_pending() {
        Vec::new()
    } else {
        state.reconciler.take_all_early()
    }
}

/// Flip a session to confirmed and mark its messages delivered.
fn confirm_in_place(state: &mut EngineState, id: &SessionId) {
    if let Some(session) = state.store.session_mut(id) {
        session.identity = IdentityState::Confirmed;
    }
    for message in state.store.messages_mut(id) {
        message.delivered = true;
    }
}

/// Decide plan side effects for a `tool_result` event.
///
/// The result payload does not carry the tool name; it is resolved from the
/// invocation part already merged into the timeline. When the name cannot
/// be resolved (timeline not merged for this session) no targeted refetch
/// fires; the unconditional refetch on `done` restores consistency.
fn collect_plan_effects(
    inner: &Arc<Inner>,
    state: &mut EngineState,
    event: &StreamEvent,
    effects: &mut Vec<Effect>,
) {
    let Some(result) = &event.result else {
        return;
    };
    let name = state
        .store
        .messages(&event.session_id)
        .iter()
        .flat_map(|m| m.parts.iter())
        .find_map(|p| match p {
            braid_core::ContentPart::ToolInvocation { id, name, .. } if id == &result.tool_use_id => {
                Some(name.clone())
            }
            _ => None,
        });
    let Some(name) = name else {
        return;
    };
    if inner.settings.is_plan_tool(&name) {
        if let Some(patch) = parse_plan_patch(&event.session_id, &result.content) {
            state.store.plan_mut(&event.session_id).apply(&patch);
        }
        effects.push(Effect::RefetchPlan(event.session_id.clone()));
    } else if inner.settings.is_progress_tool(&name) {
        effects.push(Effect::DebouncedRefetchPlan(event.session_id.clone()));
    }
}

/// Parse an optimistic plan patch out of a plan tool's result content.
fn parse_plan_patch(session_id: &SessionId, content: &str) -> Option<braid_core::PlanPatch> {
    #[derive(serde::Deserialize)]
    struct PatchBody {
        tasks: Vec<PlanTask>,
    }
    let body: PatchBody = serde_json::from_str(content).ok()?;
    Some(braid_core::PlanPatch {
        session_id: session_id.clone(),
        tasks: body.tasks,
    })
}

/// Execute deferred effects. Outside a tokio runtime the effects are
/// skipped; the `done` refetch path restores consistency on the next turn.
fn run_effects(inner: &Arc<Inner>, effects: Vec<Effect>) {
    if effects.is_empty() {
        return;
    }
    if tokio::runtime::Handle::try_current().is_err() {
        debug!(count = effects.len(), "no async runtime, skipping side effects");
        return;
    }
    for effect in effects {
        match effect {
            Effect::RefetchPlan(id) => {
                let inner = Arc::clone(inner);
                drop(tokio::spawn(async move { refetch_plan(&inner, &id).await }));
            }
            Effect::DebouncedRefetchPlan(id) => {
                let task_inner = Arc::clone(inner);
                let task_id = id.clone();
                inner
                    .debounce
                    .trigger(id, move || async move { refetch_plan(&task_inner, &task_id).await });
            }
            Effect::RefetchAllPlans => {
                let inner = Arc::clone(inner);
                drop(tokio::spawn(async move { refetch_all_plans(&inner).await }));
            }
            Effect::DispatchLocalJob(id, payload) => {
                let tool_jobs = Arc::clone(&inner.deps.tool_jobs);
                spawn_logged(async move { tool_jobs.dispatch_local_job(&id, payload).await });
            }
        }
    }
}

/// Replace one session's plan with the authoritative value.
async fn refetch_plan(inner: &Arc<Inner>, id: &SessionId) {
    match inner.deps.plans.refetch_plan(id).await {
        Ok(tasks) => inner.state.lock().store.plan_mut(id).replace(tasks),
        Err(err) => warn!(session_id = %id, %err, "plan refetch failed"),
    }
}

/// Replace every session's plan with authoritative values.
async fn refetch_all_plans(inner: &Arc<Inner>) {
    match inner.deps.plans.refetch_all_plans().await {
        Ok(plans) => {
            let mut state = inner.state.lock();
            for (id, tasks) in plans {
                state.store.plan_mut(&id).replace(tasks);
            }
        }
        Err(err) => warn!(%err, "full plan refetch failed"),
    }
}

/// Spawn a fire-and-forget collaborator call, logging failure.
fn spawn_logged<F>(fut: F)
where
    F: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    if tokio::runtime::Handle::try_current().is_err() {
        debug!("no async runtime, skipping collaborator call");
        return;
    }
    drop(tokio::spawn(async move {
        if let Err(err) = fut.await {
            warn!(%err, "collaborator call failed");
        }
    }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

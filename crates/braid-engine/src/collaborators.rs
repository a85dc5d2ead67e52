//! External collaborator interfaces.
//!
//! The engine never talks to the network or disk itself; persistence, plan
//! storage, and local tool execution live behind these traits. Calls are
//! made fire-and-forget from spawned tasks so they never block event
//! dispatch, and their failures are logged rather than surfaced through the
//! event path. The engine also never treats these as the source of truth
//! for live events, only for seeding and post-`done` reconciliation.

use async_trait::async_trait;
use serde_json::Value;

use braid_core::{Message, PlanTask, Session, SessionId};

/// A session plus its stored messages, as returned by the directory.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    /// The stored session entry.
    pub session: Session,
    /// Stored messages, empty unless requested.
    pub messages: Vec<Message>,
}

/// Persistent session directory.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// List all of the user's stored sessions.
    async fn list_sessions(&self) -> anyhow::Result<Vec<Session>>;

    /// Fetch one session, optionally with its message history.
    async fn get_session(&self, id: &SessionId, include_messages: bool)
        -> anyhow::Result<Option<SessionRecord>>;

    /// Rename a stored session.
    async fn rename_session(&self, id: &SessionId, name: &str) -> anyhow::Result<()>;

    /// Delete a stored session.
    async fn delete_session(&self, id: &SessionId) -> anyhow::Result<()>;
}

/// Plan (derived checklist state) storage.
#[async_trait]
pub trait PlanService: Send + Sync {
    /// Fetch the authoritative plan for one session.
    async fn refetch_plan(&self, session_id: &SessionId) -> anyhow::Result<Vec<PlanTask>>;

    /// Fetch authoritative plans for every session, keyed by session ID.
    async fn refetch_all_plans(&self) -> anyhow::Result<Vec<(SessionId, Vec<PlanTask>)>>;
}

/// Local tool-job execution. The engine is a pass-through: it forwards
/// `agent_status` payloads announcing a local job and takes no further part.
#[async_trait]
pub trait ToolJobDispatcher: Send + Sync {
    /// Hand a local tool job payload to the executor.
    async fn dispatch_local_job(&self, session_id: &SessionId, payload: Value) -> anyhow::Result<()>;
}

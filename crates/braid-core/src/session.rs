//! Session and bucket types.
//!
//! [`Session`] carries the identity finite-state tag
//! ([`IdentityState::Provisional`] → [`IdentityState::Confirmed`]) that the
//! reconciler advances exactly once. [`BucketEntry`] is the
//! `(status, read-state)` classification owned by the bucket state machine;
//! its transitions are driven only by events and by which session is
//! currently open, never by direct edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, UserId};

/// Session lifecycle status, as surfaced to the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Created and waiting for input.
    #[serde(rename = "ready")]
    Ready,
    /// An agent turn is in flight.
    #[serde(rename = "processing")]
    Processing,
    /// Turn complete, nothing in flight.
    #[serde(rename = "idle")]
    Idle,
    /// Creation or reconciliation failed.
    #[serde(rename = "failed")]
    Failed,
}

/// Identity reconciliation state.
///
/// A session created optimistically starts `Provisional` under a
/// client-assigned ID and is rewritten to `Confirmed` exactly once when the
/// backend assigns the real ID. Server-confirmed sessions start `Confirmed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityState {
    /// Client-assigned temporary identity; awaiting the real ID.
    #[serde(rename = "provisional")]
    Provisional,
    /// Authoritative identity assigned by the backend.
    #[serde(rename = "confirmed")]
    Confirmed,
}

/// A session entry in the shared store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID (provisional or real; see [`Session::identity`]).
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Owning user.
    pub owner: UserId,
    /// Working-context reference (e.g. a repository path), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Identity reconciliation state.
    pub identity: IdentityState,
}

impl Session {
    /// Create a provisional placeholder for an optimistic session.
    #[must_use]
    pub fn provisional(id: SessionId, name: impl Into<String>, owner: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            status: SessionStatus::Ready,
            owner,
            workspace: None,
            created_at,
            identity: IdentityState::Provisional,
        }
    }

    /// Create a server-confirmed session entry.
    #[must_use]
    pub fn confirmed(id: SessionId, name: impl Into<String>, owner: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            status: SessionStatus::Ready,
            owner,
            workspace: None,
            created_at,
            identity: IdentityState::Confirmed,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Buckets
// ─────────────────────────────────────────────────────────────────────────────

/// Processing status within a bucket entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketStatus {
    /// No turn in flight.
    #[serde(rename = "idle")]
    Idle,
    /// Events arriving, turn in flight.
    #[serde(rename = "processing")]
    Processing,
}

/// Read/unread flag within a bucket entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadState {
    /// Seen by the user (or the session is open).
    #[serde(rename = "read")]
    Read,
    /// Activity since the user last looked.
    #[serde(rename = "unread")]
    Unread,
}

/// Per-session bucket classification used to group sessions for display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketEntry {
    /// Session this entry classifies.
    pub session_id: SessionId,
    /// Processing status.
    pub status: BucketStatus,
    /// Read/unread flag.
    pub read_state: ReadState,
    /// Time of the most recent event for this session.
    pub last_activity_at: DateTime<Utc>,
}

impl BucketEntry {
    /// Initial entry: `(idle, read)`.
    #[must_use]
    pub fn initial(session_id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            status: BucketStatus::Idle,
            read_state: ReadState::Read,
            last_activity_at: now,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Error types for the engine.
//!
//! [`EngineError`] covers the operations the embedding application calls
//! directly (lifecycle, reconciliation, collaborator calls). Event-feed
//! problems never reach this type: malformed or duplicate events are
//! dropped and logged at the router or consumer, per the error handling
//! policy.

use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A collaborator (directory, plan service) call failed.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    /// Operation addressed a session the engine does not know.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Operation is invalid in the session's current identity state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_display() {
        let err = EngineError::SessionNotFound("temp-42".into());
        assert_eq!(err.to_string(), "session not found: temp-42");
    }

    #[test]
    fn invalid_operation_display() {
        let err = EngineError::InvalidOperation("cannot reconcile a confirmed session".into());
        assert_eq!(
            err.to_string(),
            "invalid operation: cannot reconcile a confirmed session"
        );
    }

    #[test]
    fn from_anyhow() {
        let err: EngineError = anyhow::anyhow!("backend unreachable").into();
        assert!(err.to_string().contains("backend unreachable"));
    }
}

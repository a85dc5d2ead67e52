//! Error types for envelope parsing and validation.
//!
//! [`EventError`] is returned when a raw envelope cannot be accepted. The
//! router treats every variant as drop-and-log — malformed input from the
//! transport is never surfaced as a user-visible error.

use thiserror::Error;

/// Errors raised while validating a raw envelope into a [`crate::StreamEvent`].
#[derive(Debug, Error)]
pub enum EventError {
    /// Envelope body was not a JSON object or had wrong field types.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Envelope carried no `type` field.
    #[error("envelope missing event type")]
    MissingEventType,

    /// Envelope carried no `sessionId` field.
    #[error("envelope missing session id")]
    MissingSessionId,

    /// Envelope carried no `event_id` field.
    #[error("envelope missing event id")]
    MissingEventId,

    /// Embedded user identity does not match the authenticated user.
    #[error("envelope for foreign user: {0}")]
    ForeignUser(String),
}

/// Convenience type alias for envelope validation results.
pub type Result<T> = std::result::Result<T, EventError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = EventError::Malformed(serde_err);
        assert!(err.to_string().contains("malformed envelope"));
    }

    #[test]
    fn missing_fields_display() {
        assert_eq!(EventError::MissingEventType.to_string(), "envelope missing event type");
        assert_eq!(EventError::MissingSessionId.to_string(), "envelope missing session id");
        assert_eq!(EventError::MissingEventId.to_string(), "envelope missing event id");
    }

    #[test]
    fn foreign_user_display() {
        let err = EventError::ForeignUser("u2".into());
        assert_eq!(err.to_string(), "envelope for foreign user: u2");
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("bad").unwrap_err();
        let err: EventError = serde_err.into();
        assert!(matches!(err, EventError::Malformed(_)));
    }
}

//! Unified error types for the Guildhall engine.
//!
//! Validation and permission errors are resolved synchronously and never
//! retried. Transient network failures are retried internally and only
//! escalate after exhaustion. Malformed change events are logged and
//! dropped by the realtime layer, never surfaced to callers.

use crate::ids::{QuestId, TemplateId};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, GuildError>;

/// Unified error type for the Guildhall engine.
#[derive(Debug, thiserror::Error)]
pub enum GuildError {
    // ============================================================
    // Validation and permission (resolved locally, never retried)
    // ============================================================
    /// The requested action is not legal from the quest's current status.
    #[error("cannot {action} a quest in status {status}")]
    InvalidTransition { action: String, status: String },

    /// The caller's role or assignment does not authorize the action.
    #[error("{action} not permitted: {reason}")]
    PermissionDenied { action: String, reason: String },

    /// A conflicting action is already in flight for the same quest.
    /// Callers should wait for it to settle, not retry immediately.
    #[error("another action is already in flight for quest {quest}")]
    ActionInProgress { quest: QuestId },

    /// The quest is not present in the current snapshot.
    #[error("quest not found: {id}")]
    QuestNotFound { id: QuestId },

    /// The template is not present in the store.
    #[error("template not found: {id}")]
    TemplateNotFound { id: TemplateId },

    /// The session is already active.
    #[error("session already active")]
    AlreadyActive,

    /// The session has not been activated.
    #[error("session not active - call activate() first")]
    NotActive,

    // ============================================================
    // Infrastructure
    // ============================================================
    /// A transient network failure; retried with backoff before it ever
    /// reaches a caller.
    #[error("transient network failure: {message}")]
    Transient { message: String },

    /// A non-retryable store failure.
    #[error("store error: {message}")]
    Store { message: String },

    /// An incoming change event missing required identity fields. Logged
    /// and dropped by the realtime layer; never mutates state.
    #[error("malformed change event: {reason}")]
    MalformedEvent { reason: String },

    /// Row image decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GuildError {
    /// Whether the retry layer may re-attempt the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, GuildError::Transient { .. })
    }

    pub fn transient(message: impl Into<String>) -> Self {
        GuildError::Transient {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        GuildError::Store {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GuildError::InvalidTransition {
            action: "approve".to_string(),
            status: "Pending".to_string(),
        };
        assert!(err.to_string().contains("approve"));
        assert!(err.to_string().contains("Pending"));

        let err = GuildError::QuestNotFound {
            id: QuestId::from("q-42"),
        };
        assert!(err.to_string().contains("q-42"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(GuildError::transient("timeout").is_transient());
        assert!(!GuildError::store("conflict").is_transient());
        assert!(
            !GuildError::PermissionDenied {
                action: "assign".into(),
                reason: "hero".into()
            }
            .is_transient()
        );
    }
}

// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Visible work-session engine.

use thiserror::Error;

use crate::types::ConnectionState;

/// The primary error type used across all Visible crates.
///
/// Every error is local to the request or event that produced it. None of
/// these variants invalidate the session the request was aimed at.
#[derive(Debug, Error)]
pub enum VisibleError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed client input: missing ids, unknown medium keys, out-of-range
    /// ratings, backwards delivery-status transitions.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced work session does not exist.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// The referenced work assignment does not exist or is not actionable
    /// by the caller.
    #[error("work assignment not found: #{work_id}")]
    AssignmentNotFound { work_id: i64 },

    /// The referenced chat message does not exist.
    #[error("chat message not found: {message_id}")]
    MessageNotFound { message_id: String },

    /// The session already reached a terminal state.
    #[error("session {session_id} is already {state}")]
    SessionTerminal {
        session_id: String,
        state: ConnectionState,
    },

    /// The actor is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Push-notification delivery failed. Logged by callers, never surfaced
    /// as a failure of the operation that triggered the push.
    #[error("delivery failed: {message}")]
    Delivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Live channel errors (socket bind failure, closed outbound queue).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VisibleError {
    /// Stable machine-readable code sent back in error acknowledgements.
    pub fn code(&self) -> &'static str {
        match self {
            VisibleError::Config(_) => "config_error",
            VisibleError::Storage { .. } => "storage_error",
            VisibleError::Validation(_) => "validation_error",
            VisibleError::SessionNotFound { .. } => "session_not_found",
            VisibleError::AssignmentNotFound { .. } => "assignment_not_found",
            VisibleError::MessageNotFound { .. } => "message_not_found",
            VisibleError::SessionTerminal { .. } => "session_terminal",
            VisibleError::PermissionDenied(_) => "permission_denied",
            VisibleError::Delivery { .. } => "delivery_failed",
            VisibleError::Channel { .. } => "channel_error",
            VisibleError::Timeout { .. } => "timeout",
            VisibleError::Internal(_) => "internal_error",
        }
    }

    /// Whether the error was caused by the caller's request rather than by
    /// the server. Client errors are echoed verbatim; server errors are
    /// reported with a generic message.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VisibleError::Validation(_)
                | VisibleError::SessionNotFound { .. }
                | VisibleError::AssignmentNotFound { .. }
                | VisibleError::MessageNotFound { .. }
                | VisibleError::SessionTerminal { .. }
                | VisibleError::PermissionDenied(_)
        )
    }

    /// Shorthand for a storage error built from any error source.
    pub fn storage<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        VisibleError::Storage {
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_for_request_errors() {
        let errors = [
            VisibleError::Validation("bad".into()),
            VisibleError::SessionNotFound {
                session_id: "s".into(),
            },
            VisibleError::SessionTerminal {
                session_id: "s".into(),
                state: ConnectionState::Completed,
            },
            VisibleError::PermissionDenied("nope".into()),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn terminal_error_mentions_state() {
        let err = VisibleError::SessionTerminal {
            session_id: "abc".into(),
            state: ConnectionState::Cancelled,
        };
        assert_eq!(err.to_string(), "session abc is already cancelled");
        assert!(err.is_client_error());
    }

    #[test]
    fn storage_errors_are_server_side() {
        let err = VisibleError::storage("disk full");
        assert_eq!(err.code(), "storage_error");
        assert!(!err.is_client_error());
    }
}

// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Switchboard gateway.

use thiserror::Error;

/// The primary error type used across all Switchboard traits and core operations.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed input rejected synchronously (bad identifier, missing field).
    #[error("validation error: {0}")]
    Validation(String),

    /// Protocol client failures (connect, send, pairing channel).
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The protocol layer rejected the recipient address.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The session exists but has no live connection.
    #[error("session `{0}` is not connected")]
    NotConnected(String),

    /// No session with the given id is known.
    #[error("session `{0}` not found")]
    SessionNotFound(String),

    /// A live handle already exists for the session id.
    #[error("session `{0}` already exists")]
    SessionExists(String),

    /// The session has no current pairing code.
    #[error("no code available for session `{0}`")]
    NoPairingCode(String),

    /// Helpdesk platform unreachable or temporarily failing (retryable).
    #[error("helpdesk unavailable: {message}")]
    HelpdeskUnavailable { message: String },

    /// Helpdesk platform explicitly rejected the request (terminal).
    #[error("helpdesk rejected request ({status}): {message}")]
    HelpdeskRejected { status: u16, message: String },

    /// Webhook sink could not accept the event.
    #[error("webhook error: {message}")]
    Webhook { message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SwitchboardError {
    /// Shorthand for a protocol error without an underlying source.
    pub fn protocol(message: impl Into<String>) -> Self {
        SwitchboardError::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a later retry of the same operation may succeed.
    ///
    /// Validation failures and explicit rejections are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SwitchboardError::Storage { .. }
                | SwitchboardError::Protocol { .. }
                | SwitchboardError::NotConnected(_)
                | SwitchboardError::HelpdeskUnavailable { .. }
                | SwitchboardError::Webhook { .. }
                | SwitchboardError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SwitchboardError::HelpdeskUnavailable {
            message: "503".into()
        }
        .is_transient());
        assert!(SwitchboardError::Timeout {
            duration: std::time::Duration::from_secs(1)
        }
        .is_transient());
        assert!(!SwitchboardError::HelpdeskRejected {
            status: 422,
            message: "bad".into()
        }
        .is_transient());
        assert!(!SwitchboardError::Validation("bad id".into()).is_transient());
        assert!(!SwitchboardError::InvalidRecipient("x".into()).is_transient());
    }

    #[test]
    fn no_pairing_code_message() {
        let err = SwitchboardError::NoPairingCode("s1".into());
        assert!(err.to_string().contains("no code available"));
    }
}

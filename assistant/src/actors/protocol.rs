//! Coordination protocol shared by every actor
//!
//! Defines the message envelope carried by mailboxes and the error
//! taxonomy returned by mailbox, registry and coordination operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{ActorId, MessageBody};
use std::time::Duration;

/// A message addressed to exactly one mailbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub from_id: ActorId,
    pub to_id: ActorId,
    pub body: MessageBody,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Message {
    pub fn new(from_id: ActorId, to_id: ActorId, body: MessageBody) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            from_id,
            to_id,
            body,
            sent_at: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Errors returned by coordination operations.
///
/// All of them are recoverable: callers surface them to their reasoning loop
/// as a structured tool result rather than propagating them.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// Referenced actor is unknown or has been reaped
    #[error("actor not found: {0}")]
    NotFound(ActorId),
    /// Requested capability is outside the catalog (or reserved)
    #[error("tool not available: {0}")]
    ToolNotAvailable(String),
    /// Operation is illegal for the actor's current status
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A blocking operation's deadline elapsed
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Mailbox owner was reaped while the operation was in flight
    #[error("actor gone: {0}")]
    ActorGone(ActorId),
    /// No new unit of execution can be started right now
    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),
    /// The calling actor was cancelled while suspended
    #[error("cancelled while waiting")]
    Cancelled,
    /// Registry actor could not be reached
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl CoordinationError {
    pub fn code(&self) -> &'static str {
        match self {
            CoordinationError::NotFound(_) => "NOT_FOUND",
            CoordinationError::ToolNotAvailable(_) => "TOOL_NOT_AVAILABLE",
            CoordinationError::InvalidState(_) => "INVALID_STATE",
            CoordinationError::Timeout(_) => "TIMEOUT",
            CoordinationError::ActorGone(_) => "ACTOR_GONE",
            CoordinationError::CapacityExhausted(_) => "CAPACITY_EXHAUSTED",
            CoordinationError::Cancelled => "CANCELLED",
            CoordinationError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    pub(crate) fn unavailable(err: impl std::fmt::Display) -> Self {
        CoordinationError::Unavailable(err.to_string())
    }
}

impl From<CoordinationError> for shared_types::CoordinationFault {
    fn from(err: CoordinationError) -> Self {
        shared_types::CoordinationFault {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_carries_code_and_message() {
        let fault: shared_types::CoordinationFault =
            CoordinationError::NotFound(ActorId::from("worker-x")).into();
        assert_eq!(fault.code, "NOT_FOUND");
        assert_eq!(fault.message, "actor not found: worker-x");
    }

    #[test]
    fn test_message_correlation_is_optional() {
        let msg = Message::new(
            ActorId::from("a"),
            ActorId::from("b"),
            MessageBody::text("hi"),
        );
        assert!(msg.correlation_id.is_none());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("correlation_id").is_none());

        let msg = msg.with_correlation(Some("c-1".to_string()));
        assert_eq!(msg.correlation_id.as_deref(), Some("c-1"));
    }
}

//! Shared types between the actor runtime and its reasoning loops
//!
//! These types cross every boundary inside the assistant:
//! - registry snapshots handed to coordination callers
//! - message bodies carried by mailboxes
//! - JSON tool results returned to the language model
//!
//! Serializable with serde so they can be rendered straight into tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

// ============================================================================
// Core Types
// ============================================================================

/// Unique identifier for actors. Never reused within a registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub String);

impl ActorId {
    /// Fresh id carrying the kind as a readable prefix, e.g. `worker-01j9...`.
    pub fn generate(kind: ActorKind) -> Self {
        Self(format!(
            "{}-{}",
            kind.id_prefix(),
            ulid::Ulid::new().to_string().to_lowercase()
        ))
    }

    /// Pseudo-sender used for inbound user traffic on a conversation.
    pub fn user(conversation_id: &str) -> Self {
        Self(format!("user:{conversation_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorKind {
    /// The single actor allowed to talk to the user
    Executive,
    /// Long-lived actor driven by the heartbeat
    BackgroundThinker,
    /// Short-lived actor spawned for one delegated task
    Worker,
}

impl ActorKind {
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ActorKind::Executive => "executive",
            ActorKind::BackgroundThinker => "background",
            ActorKind::Worker => "worker",
        }
    }
}

/// Actor lifecycle.
///
/// ```text
/// Starting → Running ⇄ WaitingOnTool
///    |          |            |
///    +----------+------------+--> Completed | Failed | Killed
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorStatus {
    Starting,
    Running,
    WaitingOnTool,
    Completed,
    Failed,
    Killed,
}

impl ActorStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActorStatus::Completed | ActorStatus::Failed | ActorStatus::Killed
        )
    }

    /// Whether `self → next` is a legal lifecycle edge.
    ///
    /// Terminal states are absorbing and the only backwards edge is
    /// `WaitingOnTool → Running`.
    pub fn can_transition_to(&self, next: ActorStatus) -> bool {
        use ActorStatus::*;
        match (self, next) {
            (Completed | Failed | Killed, _) => false,
            (_, Completed | Failed | Killed) => true,
            (Starting, Running) => true,
            (Running, WaitingOnTool) | (WaitingOnTool, Running) => true,
            _ => false,
        }
    }

    pub fn all() -> [ActorStatus; 6] {
        [
            ActorStatus::Starting,
            ActorStatus::Running,
            ActorStatus::WaitingOnTool,
            ActorStatus::Completed,
            ActorStatus::Failed,
            ActorStatus::Killed,
        ]
    }
}

/// Final payload of an actor once it reached Completed or Failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActorResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ActorResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    pub fn summary(&self) -> String {
        truncate_summary(&self.text, RESULT_SUMMARY_CHARS)
    }
}

// ============================================================================
// Registry Snapshots
// ============================================================================

/// Point-in-time snapshot of a registry entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActorView {
    pub id: ActorId,
    pub kind: ActorKind,
    pub group: Option<String>,
    pub goals: String,
    pub allowed_tools: Vec<String>,
    pub status: ActorStatus,
    pub parent: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: Option<String>,
    pub result: Option<ActorResult>,
    pub mailbox_depth: usize,
    pub kill_requested: bool,
}

/// Entry returned by `discover_actors`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorSummary {
    pub id: ActorId,
    pub kind: ActorKind,
    pub status: ActorStatus,
}

impl From<&ActorView> for ActorSummary {
    fn from(view: &ActorView) -> Self {
        Self {
            id: view.id.clone(),
            kind: view.kind,
            status: view.status,
        }
    }
}

/// Answer to `ping_actor`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PingReport {
    pub id: ActorId,
    pub kind: ActorKind,
    pub status: ActorStatus,
    pub mailbox_depth: usize,
    pub last_active_at: DateTime<Utc>,
    pub progress: Option<String>,
    pub result_summary: Option<String>,
}

impl From<&ActorView> for PingReport {
    fn from(view: &ActorView) -> Self {
        Self {
            id: view.id.clone(),
            kind: view.kind,
            status: view.status,
            mailbox_depth: view.mailbox_depth,
            last_active_at: view.last_active_at,
            progress: view.progress.clone(),
            result_summary: view.result.as_ref().map(ActorResult::summary),
        }
    }
}

/// Acknowledgement of `kill_actor`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KillAck {
    pub id: ActorId,
    /// Status at the time the kill was processed
    pub status: ActorStatus,
    /// Target had already reached a terminal status; nothing was done
    pub already_finished: bool,
    /// A previous kill is still within its grace period; nothing was done
    pub already_requested: bool,
}

/// Acknowledgement of `send_message` (delivery, not a reply)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryAck {
    pub message_id: String,
    pub to: ActorId,
    pub queued_depth: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryStats {
    /// Every unreaped entry keyed by status name, terminal ones included
    pub by_status: BTreeMap<String, usize>,
    /// Unreaped entries not yet in a terminal status
    pub live: usize,
    pub reaped_total: u64,
    pub issued_total: u64,
}

// ============================================================================
// Lifecycle History
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorEventKind {
    Created,
    Started,
    Status,
    Progress,
    KillRequested,
    HardStopped,
    Completed,
    Failed,
    Killed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActorEvent {
    pub at: DateTime<Utc>,
    pub kind: ActorEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ActorEvent {
    pub fn now(kind: ActorEventKind, detail: Option<String>) -> Self {
        Self {
            at: Utc::now(),
            kind,
            detail,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// One coalesced unit of user input for the executive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserTurn {
    pub conversation_id: String,
    pub text: String,
    /// Number of inbound messages folded into this unit
    pub parts: usize,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Opaque payload carried by a mailbox message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        text: String,
    },
    Structured {
        data: serde_json::Value,
    },
    UserTurn(UserTurn),
    /// Posted by the registry to a parent when its child reaches a terminal status
    ActorFinished {
        status: ActorStatus,
        result: Option<ActorResult>,
    },
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        MessageBody::Text { text: text.into() }
    }

    /// Plain-text rendering used when a message is fed into a transcript.
    pub fn render(&self) -> String {
        match self {
            MessageBody::Text { text } => text.clone(),
            MessageBody::Structured { data } => data.to_string(),
            MessageBody::UserTurn(turn) => turn.text.clone(),
            MessageBody::ActorFinished { status, result } => match result {
                Some(result) => format!("finished with status {status}: {}", result.text),
                None => format!("finished with status {status}"),
            },
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatStats {
    pub fired: u64,
    pub skipped: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: bool,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Errors on the wire
// ============================================================================

/// Structured error handed back to a reasoning loop as a tool result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoordinationFault {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Constants
// ============================================================================

/// Characters kept when a result is summarised for `ping_actor`
pub const RESULT_SUMMARY_CHARS: usize = 200;

/// Truncate on a char boundary, appending an ellipsis when shortened.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_actor_id_generation() {
        let id1 = ActorId::generate(ActorKind::Worker);
        let id2 = ActorId::generate(ActorKind::Worker);
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("worker-"));
        assert!(ActorId::generate(ActorKind::BackgroundThinker)
            .as_str()
            .starts_with("background-"));
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use ActorStatus::*;
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Killed));
        assert!(Running.can_transition_to(WaitingOnTool));
        assert!(WaitingOnTool.can_transition_to(Running));
        assert!(WaitingOnTool.can_transition_to(Failed));

        assert!(!Running.can_transition_to(Starting));
        assert!(!Starting.can_transition_to(WaitingOnTool));
        assert!(!Running.can_transition_to(Running));
        for terminal in [Completed, Failed, Killed] {
            for next in ActorStatus::all() {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_names_round_trip_through_strum() {
        assert_eq!(ActorStatus::WaitingOnTool.to_string(), "waiting_on_tool");
        assert_eq!(
            ActorStatus::from_str("killed").unwrap(),
            ActorStatus::Killed
        );
        assert_eq!(ActorKind::BackgroundThinker.to_string(), "background_thinker");
    }

    #[test]
    fn test_message_body_tagged_serialization() {
        let body = MessageBody::ActorFinished {
            status: ActorStatus::Completed,
            result: Some(ActorResult::text("fetched X")),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "actor_finished");
        assert_eq!(json["status"], "completed");
        assert_eq!(body.render(), "finished with status completed: fetched X");
    }

    #[test]
    fn test_truncate_summary_respects_char_boundaries() {
        assert_eq!(truncate_summary("short", 10), "short");
        let long = "é".repeat(250);
        let summary = truncate_summary(&long, RESULT_SUMMARY_CHARS);
        assert_eq!(summary.chars().count(), RESULT_SUMMARY_CHARS + 1);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn test_ping_report_from_view_summarises_result() {
        let now = Utc::now();
        let view = ActorView {
            id: ActorId::from("worker-1"),
            kind: ActorKind::Worker,
            group: Some("g".to_string()),
            goals: "fetch X".to_string(),
            allowed_tools: vec![],
            status: ActorStatus::Completed,
            parent: None,
            created_at: now,
            last_active_at: now,
            finished_at: Some(now),
            progress: None,
            result: Some(ActorResult::text("x".repeat(400))),
            mailbox_depth: 2,
            kill_requested: false,
        };
        let report = PingReport::from(&view);
        assert_eq!(report.mailbox_depth, 2);
        assert_eq!(
            report.result_summary.unwrap().chars().count(),
            RESULT_SUMMARY_CHARS + 1
        );
    }
}

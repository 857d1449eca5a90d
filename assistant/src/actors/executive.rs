//! Executive body - the only actor that talks to the user
//!
//! Waits on its mailbox. A user turn starts a reasoning pass whose final
//! answer is delivered to that conversation. Anything else (worker results,
//! finish notices, background findings) is folded into the transcript and
//! reasoned about on behalf of the most recent conversation. Errors from a
//! pass are reported to the user and never end the loop.
//!
//! A pass started by a user turn is abandoned when a newer turn for the same
//! conversation is already queued: its reply is neither recorded nor
//! delivered, and the queued turn is answered next with the full transcript.

use std::time::Duration;

use async_trait::async_trait;
use shared_types::{ActorId, MessageBody};

use crate::actors::agent_loop::AgentLoop;
use crate::actors::context::{ActorBody, ActorContext, ActorOutcome, BodyError};
use crate::actors::mailbox::ReceiveFilter;
use crate::actors::protocol::{CoordinationError, Message};
use crate::gateway::memory::SharedMemoryStore;
use crate::gateway::model::{Role, Turn};
use crate::gateway::transport::{ConversationFocus, Outbound, SharedTransport};

pub const EXECUTIVE_SYSTEM_PROMPT: &str = "You are the executive of an always-on personal assistant and the only part of it that talks to the user. \
Answer directly when you can. For longer or parallel work, spawn worker actors with spawn_actor, follow them with ping_actor or wait_for_response, and stop them with kill_actor when they are no longer needed. \
Messages from workers and from the background thinker arrive as notes; relay what matters to the user. \
Coordination tools return JSON with \"ok\": false and an error code when something fails; decide whether to retry, report or move on. \
Your final reply in each turn is sent to the user. Reply with an empty message if there is nothing to say.";

/// Transcript turns kept between passes
pub const DEFAULT_TRANSCRIPT_LIMIT: usize = 64;

pub struct ExecutiveBody {
    agent: AgentLoop,
    transport: SharedTransport,
    memory: Option<SharedMemoryStore>,
    focus: ConversationFocus,
    poll: Duration,
    transcript_limit: usize,
}

impl ExecutiveBody {
    pub fn new(
        agent: AgentLoop,
        transport: SharedTransport,
        focus: ConversationFocus,
        poll: Duration,
    ) -> Self {
        Self {
            agent,
            transport,
            memory: None,
            focus,
            poll,
            transcript_limit: DEFAULT_TRANSCRIPT_LIMIT,
        }
    }

    /// Record every turn in the conversation log
    pub fn with_memory(mut self, memory: SharedMemoryStore) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_transcript_limit(mut self, limit: usize) -> Self {
        self.transcript_limit = limit.max(2);
        self
    }

    async fn record(&self, role: &str, content: &str) {
        if let Some(memory) = &self.memory {
            if let Err(err) = memory.record_turn(role, content).await {
                tracing::warn!(error = %err, "Failed to record conversation turn");
            }
        }
    }

    async fn deliver(&self, conversation_id: &str, text: String) {
        if let Err(err) = self
            .transport
            .deliver_to_user(conversation_id, Outbound::text(text))
            .await
        {
            tracing::warn!(conversation_id, error = %err, "Failed to deliver reply");
        }
    }
}

/// Text fed to the model for one mailbox message
fn prompt_for(message: &Message) -> String {
    match &message.body {
        MessageBody::UserTurn(turn) => turn.text.clone(),
        MessageBody::ActorFinished { .. } => {
            format!("[actor {} {}]", message.from_id, message.body.render())
        }
        other => format!("[message from {}] {}", message.from_id, other.render()),
    }
}

/// Drop the oldest turns, cutting at a user turn so tool results keep their calls
pub(crate) fn trim_transcript(transcript: &mut Vec<Turn>, limit: usize) {
    if transcript.len() <= limit {
        return;
    }
    let start = transcript.len() - limit;
    let cut = transcript[start..]
        .iter()
        .position(|turn| turn.role == Role::User)
        .map(|offset| start + offset)
        // No user turn in the window: keep from the last one before it.
        .or_else(|| transcript[..start].iter().rposition(|turn| turn.role == Role::User))
        .unwrap_or(0);
    transcript.drain(..cut);
}

#[async_trait]
impl ActorBody for ExecutiveBody {
    async fn run(self: Box<Self>, ctx: ActorContext) -> Result<ActorOutcome, BodyError> {
        let mut transcript: Vec<Turn> = Vec::new();
        let mut last_conversation: Option<String> = None;
        tracing::info!(actor_id = %ctx.id(), tools = ?ctx.tools().names(), "Executive running");

        loop {
            let message = match ctx.receive(self.poll).await {
                Ok(message) => message,
                Err(CoordinationError::Timeout(_)) => continue,
                Err(CoordinationError::Cancelled) | Err(CoordinationError::ActorGone(_)) => {
                    return Ok(ActorOutcome::Cancelled);
                }
                Err(err) => return Err(err.into()),
            };

            let conversation = match &message.body {
                MessageBody::UserTurn(turn) => Some(turn.conversation_id.clone()),
                _ => last_conversation.clone(),
            };
            if let Some(conversation) = &conversation {
                self.focus.set(conversation);
                last_conversation = Some(conversation.clone());
            }

            let prompt = prompt_for(&message);
            let role = match message.body {
                MessageBody::UserTurn(_) => "user",
                _ => "system",
            };
            self.record(role, &prompt).await;
            transcript.push(Turn::user(prompt));

            // Only user-started passes yield to newer input from the same conversation.
            let newer_turn = match &message.body {
                MessageBody::UserTurn(turn) => Some(ReceiveFilter {
                    from: Some(ActorId::user(&turn.conversation_id)),
                    correlation_id: None,
                }),
                _ => None,
            };
            let superseded = || {
                newer_turn
                    .as_ref()
                    .is_some_and(|filter| ctx.mailbox().contains_matching(filter))
            };

            let outcome = self
                .agent
                .run_interruptible(&ctx, &mut transcript, &superseded)
                .await
                .and_then(|reply| {
                    if superseded() {
                        Err(BodyError::Interrupted)
                    } else {
                        Ok(reply)
                    }
                });

            match outcome {
                Ok(reply) => {
                    let reply = reply.trim().to_string();
                    if reply.is_empty() {
                        tracing::debug!(actor_id = %ctx.id(), "Executive chose not to reply");
                    } else {
                        self.record("assistant", &reply).await;
                        match &conversation {
                            Some(conversation) => self.deliver(conversation, reply).await,
                            None => tracing::info!(
                                actor_id = %ctx.id(),
                                "No conversation to deliver reply to"
                            ),
                        }
                    }
                }
                Err(BodyError::Cancelled) => return Ok(ActorOutcome::Cancelled),
                Err(BodyError::Interrupted) => {
                    tracing::info!(
                        actor_id = %ctx.id(),
                        conversation_id = conversation.as_deref().unwrap_or_default(),
                        "Newer user input queued, dropping stale reply"
                    );
                }
                Err(err) => {
                    tracing::warn!(actor_id = %ctx.id(), error = %err, "Executive pass failed");
                    if let Some(conversation) = &conversation {
                        self.deliver(conversation, format!("Sorry, something went wrong: {err}"))
                            .await;
                    }
                }
            }
            trim_transcript(&mut transcript, self.transcript_limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::model::ToolCallRequest;

    #[test]
    fn test_trim_cuts_at_user_turn() {
        let mut transcript = vec![
            Turn::user("first"),
            Turn::assistant_tool_calls(vec![ToolCallRequest {
                id: "c".to_string(),
                name: "ping_actor".to_string(),
                arguments: serde_json::json!({}),
            }]),
            Turn::tool_result("c", "{}"),
            Turn::assistant("done"),
            Turn::user("second"),
            Turn::assistant("ok"),
        ];
        trim_transcript(&mut transcript, 4);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "second");

        let mut short = vec![Turn::user("a"), Turn::assistant("b")];
        trim_transcript(&mut short, 4);
        assert_eq!(short.len(), 2);
    }

    #[test]
    fn test_trim_keeps_last_user_turn_when_window_has_none() {
        let call = |id: &str| {
            Turn::assistant_tool_calls(vec![ToolCallRequest {
                id: id.to_string(),
                name: "ping_actor".to_string(),
                arguments: serde_json::json!({}),
            }])
        };
        let mut transcript = vec![
            Turn::user("old"),
            Turn::assistant("ok"),
            Turn::user("long task"),
            call("a"),
            Turn::tool_result("a", "{}"),
            call("b"),
            Turn::tool_result("b", "{}"),
            Turn::assistant("finished"),
        ];
        trim_transcript(&mut transcript, 3);
        assert_eq!(transcript.len(), 6);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[0].content, "long task");

        // Nothing to anchor on: leave the transcript alone.
        let mut no_user = vec![Turn::assistant("a"), Turn::assistant("b"), Turn::assistant("c")];
        trim_transcript(&mut no_user, 2);
        assert_eq!(no_user.len(), 3);
    }
}

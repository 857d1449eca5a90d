//! Background thinker - the long-lived actor driven by the heartbeat
//!
//! The body owns the reasoning: it waits on its mailbox for notes and on a
//! round channel for heartbeat requests. Each round runs one reasoning pass
//! over the notes collected since the previous round; anything worth telling
//! the user is posted to the executive, which decides whether to relay it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shared_types::{truncate_summary, ActorId, ActorResult, MessageBody, RESULT_SUMMARY_CHARS};
use tokio::sync::{mpsc, oneshot};

use crate::actors::agent_loop::AgentLoop;
use crate::actors::context::{ActorBody, ActorContext, ActorOutcome, BodyError};
use crate::actors::heartbeat::{HeartbeatRound, RoundError, RoundReport};
use crate::actors::protocol::CoordinationError;
use crate::gateway::model::Turn;

/// Reply meaning "nothing worth forwarding this round"
pub const NO_NOTIFY: &str = "[NO_NOTIFY]";

/// Notes kept between rounds; oldest are dropped first
const MAX_NOTES: usize = 32;

pub const BACKGROUND_SYSTEM_PROMPT: &str = "You are the background thinker of a personal assistant. \
You run periodically, independent of the conversation. Review memory, pending tasks and the notes you were sent. \
If there is something the user should hear about now, reply with that message and it will be forwarded to the executive. \
If there is nothing worth reporting, reply with exactly [NO_NOTIFY].";

const ROUND_PROMPT: &str = "This is a periodic check-in. Review your state:\n\
1. Check your memory blocks for pending tasks, reminders or notes\n\
2. Review recent conversation history for anything that was promised as a follow-up\n\
3. Consider whether there is anything proactive worth raising\n\
Only produce a message if it is genuinely useful right now.";

struct RoundRequest {
    round: u64,
    reply: oneshot::Sender<Result<RoundReport, RoundError>>,
}

/// Reasoning loop of the background thinker
pub struct BackgroundBody {
    agent: AgentLoop,
    executive: ActorId,
    requests: mpsc::Receiver<RoundRequest>,
    poll: Duration,
}

/// Scheduler-facing side: each call runs one round inside the body
#[derive(Clone)]
pub struct BackgroundRounds {
    requests: mpsc::Sender<RoundRequest>,
}

/// Body and its round handle, wired to each other
pub fn background_thinker(
    agent: AgentLoop,
    executive: ActorId,
    poll: Duration,
) -> (BackgroundBody, BackgroundRounds) {
    let (tx, rx) = mpsc::channel(1);
    (
        BackgroundBody {
            agent,
            executive,
            requests: rx,
            poll,
        },
        BackgroundRounds { requests: tx },
    )
}

#[async_trait]
impl HeartbeatRound for BackgroundRounds {
    async fn run_round(&self, round: u64) -> Result<RoundReport, RoundError> {
        let (reply, done) = oneshot::channel();
        self.requests
            .send(RoundRequest { round, reply })
            .await
            .map_err(|_| RoundError::Unavailable)?;
        done.await.map_err(|_| RoundError::Unavailable)?
    }
}

#[async_trait]
impl ActorBody for BackgroundBody {
    async fn run(self: Box<Self>, ctx: ActorContext) -> Result<ActorOutcome, BodyError> {
        let BackgroundBody {
            agent,
            executive,
            mut requests,
            poll,
        } = *self;
        let mut notes: Vec<String> = Vec::new();
        tracing::info!(actor_id = %ctx.id(), executive = %executive, "Background thinker running");

        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(RoundRequest { round, reply }) = request else {
                        return Ok(ActorOutcome::Completed(ActorResult::text("scheduler detached")));
                    };
                    match run_round(&agent, &ctx, &executive, round, &mut notes).await {
                        Ok(report) => {
                            let _ = reply.send(Ok(report));
                        }
                        Err(BodyError::Cancelled) => {
                            let _ = reply.send(Err(RoundError::Failed("cancelled".to_string())));
                            return Ok(ActorOutcome::Cancelled);
                        }
                        Err(err) => {
                            let _ = reply.send(Err(RoundError::Failed(err.to_string())));
                        }
                    }
                }
                message = ctx.receive(poll) => match message {
                    Ok(message) => {
                        notes.push(format!("[from {}] {}", message.from_id, message.body.render()));
                        if notes.len() > MAX_NOTES {
                            notes.remove(0);
                        }
                    }
                    Err(CoordinationError::Timeout(_)) => {}
                    Err(CoordinationError::Cancelled) | Err(CoordinationError::ActorGone(_)) => {
                        return Ok(ActorOutcome::Cancelled);
                    }
                    Err(err) => return Err(err.into()),
                },
            }
        }
    }
}

async fn run_round(
    agent: &AgentLoop,
    ctx: &ActorContext,
    executive: &ActorId,
    round: u64,
    notes: &mut Vec<String>,
) -> Result<RoundReport, BodyError> {
    ctx.report_progress(format!("round {round} running"));

    let now = Utc::now();
    let mut prompt = format!(
        "[HEARTBEAT {round}]\nCurrent time: {}\n\n{ROUND_PROMPT}",
        now.format("%A, %B %d, %Y %H:%M UTC")
    );
    if !notes.is_empty() {
        prompt.push_str("\n\nNotes received since the last round:\n");
        for note in notes.drain(..) {
            prompt.push_str("- ");
            prompt.push_str(&note);
            prompt.push('\n');
        }
    }

    let mut transcript = vec![Turn::user(prompt)];
    let answer = agent.run(ctx, &mut transcript).await?;
    let answer = answer.trim();

    let posted = !answer.is_empty() && !answer.contains(NO_NOTIFY);
    if posted {
        ctx.coordinator()
            .send_message(executive, MessageBody::text(answer), None)
            .await?;
    }
    ctx.report_progress(format!("round {round} finished"));

    Ok(RoundReport {
        round,
        posted,
        summary: truncate_summary(answer, RESULT_SUMMARY_CHARS),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shared_types::{ActorKind, ActorStatus};

    use super::*;
    use crate::actors::registry::{ActorSpec, RegistryHandle};
    use crate::gateway::model::ModelReply;
    use crate::testing::{probe_body, spawn_test_registry, test_registry_config, ScriptedModel};
    use crate::tools::background_tools;

    async fn start_thinker(
        registry: &RegistryHandle,
        model: Arc<ScriptedModel>,
    ) -> (ActorId, ActorContext, BackgroundRounds) {
        let (body, executive_ctx) = probe_body();
        let executive = registry
            .create(ActorSpec::new(ActorKind::Executive, "coordinate", vec![]), body)
            .await
            .unwrap();
        let executive_ctx = executive_ctx.await.unwrap();

        let (body, rounds) = background_thinker(
            AgentLoop::new(model, BACKGROUND_SYSTEM_PROMPT, 4),
            executive,
            Duration::from_millis(50),
        );
        let id = registry
            .create(
                ActorSpec::new(ActorKind::BackgroundThinker, "review", background_tools()),
                Box::new(body),
            )
            .await
            .unwrap();
        (id, executive_ctx, rounds)
    }

    #[tokio::test]
    async fn test_round_posts_answer_with_collected_notes() {
        let (registry, handle) = spawn_test_registry(test_registry_config(), None).await;
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::Completion(
            "Your dentist appointment is tomorrow".to_string(),
        )]));
        let (id, executive_ctx, rounds) = start_thinker(&registry, model.clone()).await;

        executive_ctx
            .coordinator()
            .send_message(&id, MessageBody::text("user mentioned the dentist"), None)
            .await
            .unwrap();
        while registry.get(&id).await.unwrap().mailbox_depth > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = rounds.run_round(1).await.unwrap();
        assert_eq!(report.round, 1);
        assert!(report.posted);

        let prompt = &model.transcripts()[0][0].content;
        assert!(prompt.starts_with("[HEARTBEAT 1]"));
        assert!(prompt.contains("user mentioned the dentist"));

        let posted = executive_ctx.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(posted.from_id, id);
        assert_eq!(posted.body, MessageBody::text("Your dentist appointment is tomorrow"));

        // Notes are consumed by the round that saw them.
        rounds.run_round(2).await.unwrap();
        assert!(!model.transcripts()[1][0].content.contains("dentist"));

        registry.actor_ref().stop(None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_notify_answer_is_not_posted() {
        let (registry, handle) = spawn_test_registry(test_registry_config(), None).await;
        let model = Arc::new(ScriptedModel::completing(format!("All quiet. {NO_NOTIFY}")));
        let (_id, executive_ctx, rounds) = start_thinker(&registry, model).await;

        let report = rounds.run_round(1).await.unwrap();
        assert!(!report.posted);
        assert_eq!(executive_ctx.mailbox().peek_count(), 0);

        registry.actor_ref().stop(None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_the_round_handle_completes_the_thinker() {
        let (registry, handle) = spawn_test_registry(test_registry_config(), None).await;
        let model = Arc::new(ScriptedModel::completing(NO_NOTIFY));
        let (id, _executive_ctx, rounds) = start_thinker(&registry, model).await;

        drop(rounds);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let view = registry.get(&id).await.unwrap();
            if view.status == ActorStatus::Completed {
                assert_eq!(view.result.unwrap().text, "scheduler detached");
                break;
            }
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        registry.actor_ref().stop(None);
        handle.await.unwrap();
    }
}

//! Worker body - one delegated task, one final answer

use async_trait::async_trait;
use shared_types::ActorResult;

use crate::actors::agent_loop::AgentLoop;
use crate::actors::context::{ActorBody, ActorContext, ActorOutcome, BodyError};
use crate::actors::coordination::WorkerFactory;
use crate::actors::registry::ActorSpec;
use crate::gateway::model::{SharedModelGateway, Turn};

pub const WORKER_SYSTEM_PROMPT: &str = "You are a worker actor spawned by a personal assistant to complete one task. \
Work through it with the tools you were given and call report_progress after each meaningful step. \
Messages sent to you by other actors appear in the conversation as they arrive. \
When you are done, reply with a concise final answer; it becomes your result.";

pub struct WorkerBody {
    agent: AgentLoop,
}

impl WorkerBody {
    pub fn new(agent: AgentLoop) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl ActorBody for WorkerBody {
    async fn run(self: Box<Self>, ctx: ActorContext) -> Result<ActorOutcome, BodyError> {
        let mut transcript = vec![Turn::user(format!("Task: {}", ctx.goals()))];
        let answer = self.agent.run(&ctx, &mut transcript).await?;
        tracing::info!(actor_id = %ctx.id(), turns = transcript.len(), "Worker finished its task");
        Ok(ActorOutcome::Completed(ActorResult::text(answer)))
    }
}

/// Builds model-driven workers for `spawn_actor`
pub struct AgentWorkerFactory {
    model: SharedModelGateway,
    max_steps: usize,
}

impl AgentWorkerFactory {
    pub fn new(model: SharedModelGateway, max_steps: usize) -> Self {
        Self { model, max_steps }
    }
}

impl WorkerFactory for AgentWorkerFactory {
    fn build(&self, _spec: &ActorSpec) -> Box<dyn ActorBody> {
        let agent = AgentLoop::new(self.model.clone(), WORKER_SYSTEM_PROMPT, self.max_steps)
            .absorbing_mailbox();
        Box::new(WorkerBody::new(agent))
    }
}

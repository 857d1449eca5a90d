//! Model-driven reasoning loop shared by every actor body
//!
//! Alternates model invocations and tool calls until the model produces a
//! final completion or the step budget runs out. Cancellation is observed
//! before each model invocation, during it, and before each tool call. An
//! optional interrupt check is consulted before each model invocation.

use shared_types::ActorStatus;

use crate::actors::context::{ActorContext, BodyError};
use crate::gateway::model::{ModelContext, ModelReply, SharedModelGateway, Turn};

#[derive(Clone)]
pub struct AgentLoop {
    model: SharedModelGateway,
    system_prompt: String,
    max_steps: usize,
    absorb_mailbox: bool,
}

impl AgentLoop {
    pub fn new(model: SharedModelGateway, system_prompt: impl Into<String>, max_steps: usize) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            max_steps: max_steps.max(1),
            absorb_mailbox: false,
        }
    }

    /// Fold mailbox messages into the transcript before every model call
    pub fn absorbing_mailbox(mut self) -> Self {
        self.absorb_mailbox = true;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run until a final answer; `transcript` keeps every turn produced.
    pub async fn run(&self, ctx: &ActorContext, transcript: &mut Vec<Turn>) -> Result<String, BodyError> {
        self.run_interruptible(ctx, transcript, &|| false).await
    }

    /// Like [`AgentLoop::run`], but ends with `Interrupted` once `interrupted`
    /// returns true at a step boundary.
    pub async fn run_interruptible(
        &self,
        ctx: &ActorContext,
        transcript: &mut Vec<Turn>,
        interrupted: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<String, BodyError> {
        let tools = ctx.tools().definitions();

        for step in 0..self.max_steps {
            ctx.checkpoint()?;
            if interrupted() {
                tracing::debug!(actor_id = %ctx.id(), step, "Reasoning loop interrupted");
                return Err(BodyError::Interrupted);
            }
            if self.absorb_mailbox {
                while let Some(message) = ctx.mailbox().try_receive() {
                    transcript.push(Turn::user(format!(
                        "[message from {}] {}",
                        message.from_id,
                        message.body.render()
                    )));
                }
            }

            let context = ModelContext {
                system: &self.system_prompt,
                transcript: transcript.as_slice(),
            };
            let reply = tokio::select! {
                reply = self.model.invoke(context, &tools) => reply?,
                _ = ctx.cancelled() => return Err(BodyError::Cancelled),
            };
            ctx.touch();

            match reply {
                ModelReply::Completion(text) => {
                    tracing::debug!(actor_id = %ctx.id(), step, "Reasoning loop produced an answer");
                    transcript.push(Turn::assistant(text.clone()));
                    return Ok(text);
                }
                ModelReply::ToolCalls(calls) => {
                    transcript.push(Turn::assistant_tool_calls(calls.clone()));
                    for call in calls {
                        ctx.checkpoint()?;
                        tracing::debug!(actor_id = %ctx.id(), tool = %call.name, "Calling tool");
                        ctx.set_status(ActorStatus::WaitingOnTool);
                        let outcome = ctx
                            .tools()
                            .call_tool(&call.name, ctx, call.arguments.clone())
                            .await;
                        ctx.set_status(ActorStatus::Running);
                        let content = match outcome {
                            Ok(output) => output.content,
                            Err(err) => {
                                tracing::debug!(actor_id = %ctx.id(), tool = %call.name, error = %err, "Tool failed");
                                err.to_string()
                            }
                        };
                        transcript.push(Turn::tool_result(call.id, content));
                    }
                }
            }
        }

        Err(BodyError::StepBudgetExhausted(self.max_steps))
    }
}

//! Coordination verbs exposed as tools
//!
//! Results are JSON: `{"ok": true, "result": ...}` on success and
//! `{"ok": false, "error": {"code", "message"}}` when the operation fails,
//! so the reasoning loop can read the error and decide how to proceed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use shared_types::{ActorId, CoordinationFault, MessageBody};

use crate::actors::context::ActorContext;
use crate::actors::protocol::CoordinationError;
use crate::tools::{
    names, optional_str, optional_u64, required_str, string_list, Tool, ToolCatalog, ToolError,
    ToolOutput, DEFAULT_WORKER_TOOLS,
};

/// Default and ceiling for `wait_for_response`
const DEFAULT_WAIT_SECS: u64 = 30;
const MAX_WAIT_SECS: u64 = 600;

/// Events returned by `actor_history`
const HISTORY_TAIL: usize = 10;

pub fn register_all(catalog: &mut ToolCatalog) {
    catalog.register(SpawnActorTool);
    catalog.register(KillActorTool);
    catalog.register(PingActorTool);
    catalog.register(SendMessageTool);
    catalog.register(DiscoverActorsTool);
    catalog.register(WaitForResponseTool);
    catalog.register(ActorHistoryTool);
    catalog.register(ActorStatsTool);
    catalog.register(ReportProgressTool);
}

pub(crate) fn render<T: Serialize>(result: Result<T, CoordinationError>) -> ToolOutput {
    match result {
        Ok(value) => ToolOutput::ok(json!({ "ok": true, "result": value }).to_string()),
        Err(err) => {
            let fault: CoordinationFault = err.into();
            ToolOutput::failure(json!({ "ok": false, "error": fault }).to_string())
        }
    }
}

fn actor_id(args: &Value) -> Result<ActorId, ToolError> {
    required_str(args, "actor_id").map(ActorId::from)
}

fn id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "actor_id": { "type": "string", "description": description }
        },
        "required": ["actor_id"]
    })
}

/// Spawn a worker actor for one delegated task
pub struct SpawnActorTool;

#[async_trait]
impl Tool for SpawnActorTool {
    fn name(&self) -> &str {
        "spawn_actor"
    }

    fn description(&self) -> &str {
        "Start a worker actor that pursues the given goals on its own. Returns its id immediately; use ping_actor or wait_for_response to follow it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goals": { "type": "string", "description": "What the worker should accomplish" },
                "tools": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tool names to grant (default: a read-only research set)"
                },
                "group": { "type": "string", "description": "Optional group for discover_actors" }
            },
            "required": ["goals"]
        })
    }

    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let goals = required_str(&args, "goals")?;
        let tools = string_list(&args, "tools")
            .filter(|tools| !tools.is_empty())
            .unwrap_or_else(|| names(DEFAULT_WORKER_TOOLS));
        let group = optional_str(&args, "group").map(str::to_string);
        let result = ctx
            .coordinator()
            .spawn_actor(goals, tools, group)
            .await
            .map(|id| json!({ "actor_id": id }));
        Ok(render(result))
    }
}

/// Request cancellation of an actor
pub struct KillActorTool;

#[async_trait]
impl Tool for KillActorTool {
    fn name(&self) -> &str {
        "kill_actor"
    }

    fn description(&self) -> &str {
        "Stop an actor. It gets a short grace period to wind down before it is stopped forcibly. Killing a finished actor is a no-op."
    }

    fn parameters_schema(&self) -> Value {
        id_schema("Actor to stop")
    }

    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let id = actor_id(&args)?;
        Ok(render(ctx.coordinator().kill_actor(&id).await))
    }
}

pub struct PingActorTool;

#[async_trait]
impl Tool for PingActorTool {
    fn name(&self) -> &str {
        "ping_actor"
    }

    fn description(&self) -> &str {
        "Get an actor's status, mailbox depth, last activity and progress or result summary. Never blocks."
    }

    fn parameters_schema(&self) -> Value {
        id_schema("Actor to inspect")
    }

    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let id = actor_id(&args)?;
        Ok(render(ctx.coordinator().ping_actor(&id).await))
    }
}

pub struct SendMessageTool;

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Post a message to another actor's mailbox. Returns a delivery acknowledgement, not a reply."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to_id": { "type": "string", "description": "Recipient actor id" },
                "text": { "type": "string", "description": "Message text" },
                "data": { "type": "object", "description": "Structured payload sent instead of text" },
                "correlation_id": { "type": "string", "description": "Optional id the recipient can echo back" }
            },
            "required": ["to_id"]
        })
    }

    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let to = ActorId::from(required_str(&args, "to_id")?);
        let body = match (args.get("data"), optional_str(&args, "text")) {
            (Some(data), _) if !data.is_null() => MessageBody::Structured { data: data.clone() },
            (_, Some(text)) => MessageBody::text(text),
            _ => return Err(ToolError::new("Provide either 'text' or 'data'")),
        };
        let correlation_id = optional_str(&args, "correlation_id").map(str::to_string);
        Ok(render(
            ctx.coordinator()
                .send_message(&to, body, correlation_id)
                .await,
        ))
    }
}

pub struct DiscoverActorsTool;

#[async_trait]
impl Tool for DiscoverActorsTool {
    fn name(&self) -> &str {
        "discover_actors"
    }

    fn description(&self) -> &str {
        "List the actors of a group, oldest first, with their kind and status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "group": { "type": "string", "description": "Group name" }
            },
            "required": ["group"]
        })
    }

    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let group = required_str(&args, "group")?;
        Ok(render(ctx.coordinator().discover_actors(group).await))
    }
}

pub struct WaitForResponseTool;

#[async_trait]
impl Tool for WaitForResponseTool {
    fn name(&self) -> &str {
        "wait_for_response"
    }

    fn description(&self) -> &str {
        "Block until a message arrives in your mailbox, optionally from a given actor or with a given correlation id. Returns the message, or a TIMEOUT error."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from_id": { "type": "string", "description": "Only accept messages from this actor" },
                "correlation_id": { "type": "string", "description": "Only accept messages carrying this correlation id" },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Seconds to wait (default: 30, max: 600)",
                    "default": DEFAULT_WAIT_SECS
                }
            }
        })
    }

    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let from = optional_str(&args, "from_id").map(ActorId::from);
        let correlation_id = optional_str(&args, "correlation_id").map(str::to_string);
        let timeout = Duration::from_secs(
            optional_u64(&args, "timeout_secs")
                .unwrap_or(DEFAULT_WAIT_SECS)
                .min(MAX_WAIT_SECS),
        );
        let result = ctx
            .coordinator()
            .wait_for_response(from, correlation_id, timeout)
            .await;
        Ok(render(result))
    }
}

/// Recent lifecycle events of an actor
pub struct ActorHistoryTool;

#[async_trait]
impl Tool for ActorHistoryTool {
    fn name(&self) -> &str {
        "actor_history"
    }

    fn description(&self) -> &str {
        "Show the most recent lifecycle events of an actor (created, started, progress, finished)."
    }

    fn parameters_schema(&self) -> Value {
        id_schema("Actor whose history to show")
    }

    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let id = actor_id(&args)?;
        let result = ctx.coordinator().history(&id).await.map(|events| {
            let skip = events.len().saturating_sub(HISTORY_TAIL);
            events.into_iter().skip(skip).collect::<Vec<_>>()
        });
        Ok(render(result))
    }
}

pub struct ActorStatsTool;

#[async_trait]
impl Tool for ActorStatsTool {
    fn name(&self) -> &str {
        "actor_stats"
    }

    fn description(&self) -> &str {
        "Count actors by status."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ActorContext, _args: Value) -> Result<ToolOutput, ToolError> {
        Ok(render(ctx.coordinator().stats().await))
    }
}

/// Lets an actor publish a short progress summary for `ping_actor`
pub struct ReportProgressTool;

#[async_trait]
impl Tool for ReportProgressTool {
    fn name(&self) -> &str {
        "report_progress"
    }

    fn description(&self) -> &str {
        "Record a one-line summary of what you have done so far. Whoever pings you will see it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string", "description": "Short progress summary" }
            },
            "required": ["summary"]
        })
    }

    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let summary = required_str(&args, "summary")?;
        ctx.report_progress(summary);
        Ok(ToolOutput::ok(json!({ "ok": true }).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_success_and_fault() {
        let ok = render::<Value>(Ok(json!({ "actor_id": "worker-1" })));
        assert!(ok.success);
        let parsed: Value = serde_json::from_str(&ok.content).unwrap();
        assert_eq!(parsed["ok"], true);
        assert_eq!(parsed["result"]["actor_id"], "worker-1");

        let err = render::<Value>(Err(CoordinationError::Timeout(Duration::from_secs(2))));
        assert!(!err.success);
        let parsed: Value = serde_json::from_str(&err.content).unwrap();
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["error"]["code"], "TIMEOUT");
    }
}

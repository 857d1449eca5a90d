//! The one tool that reaches the user

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actors::context::ActorContext;
use crate::gateway::transport::{ConversationFocus, Outbound, SharedTransport};
use crate::tools::{optional_str, Tool, ToolError, ToolOutput};

pub struct SendToUserTool {
    transport: SharedTransport,
    focus: ConversationFocus,
}

impl SendToUserTool {
    pub fn new(transport: SharedTransport, focus: ConversationFocus) -> Self {
        Self { transport, focus }
    }
}

#[async_trait]
impl Tool for SendToUserTool {
    fn name(&self) -> &str {
        "send_to_user"
    }

    fn description(&self) -> &str {
        "Send a message or a file to the user right away, before your final answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Message text" },
                "file_path": { "type": "string", "description": "File to send instead of text" },
                "caption": { "type": "string", "description": "Caption for the file" },
                "conversation_id": { "type": "string", "description": "Defaults to the conversation being answered" }
            }
        })
    }

    fn reaches_user(&self) -> bool {
        true
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let conversation_id = optional_str(&args, "conversation_id")
            .map(str::to_string)
            .or_else(|| self.focus.current())
            .ok_or_else(|| ToolError::new("No active conversation to send to"))?;

        let outbound = match (optional_str(&args, "file_path"), optional_str(&args, "text")) {
            (Some(path), _) => Outbound::File {
                path: PathBuf::from(path),
                caption: optional_str(&args, "caption").map(str::to_string),
            },
            (None, Some(text)) => Outbound::text(text),
            (None, None) => return Err(ToolError::new("Provide either 'text' or 'file_path'")),
        };

        self.transport
            .deliver_to_user(&conversation_id, outbound)
            .await
            .map_err(|e| ToolError::new(e.to_string()))?;
        Ok(ToolOutput::ok(format!("Sent to {conversation_id}")))
    }
}

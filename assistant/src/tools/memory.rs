//! Memory tools backed by the memory collaborator

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actors::context::ActorContext;
use crate::gateway::memory::{MemoryError, SharedMemoryStore};
use crate::tools::{optional_u64, required_str, Tool, ToolCatalog, ToolError, ToolOutput};

const DEFAULT_SEARCH_LIMIT: u64 = 5;
const MAX_SEARCH_LIMIT: u64 = 50;

pub fn register_all(catalog: &mut ToolCatalog, store: SharedMemoryStore) {
    catalog.register(MemoryReadTool(store.clone()));
    catalog.register(MemoryUpdateTool(store.clone()));
    catalog.register(MemoryAppendTool(store.clone()));
    catalog.register(ArchivalSearchTool(store.clone()));
    catalog.register(ArchivalInsertTool(store.clone()));
    catalog.register(ConversationSearchTool(store));
}

fn memory_error(err: MemoryError) -> ToolError {
    ToolError::new(err.to_string())
}

fn search_limit(args: &Value) -> usize {
    optional_u64(args, "limit")
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT) as usize
}

fn block_schema(with_content: bool) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Memory block name, e.g. persona or human" }
        },
        "required": ["name"]
    });
    if with_content {
        schema["properties"]["content"] = json!({ "type": "string", "description": "Block content" });
        schema["required"] = json!(["name", "content"]);
    }
    schema
}

fn search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "What to look for" },
            "limit": { "type": "integer", "description": "Maximum results (default: 5)", "default": DEFAULT_SEARCH_LIMIT }
        },
        "required": ["query"]
    })
}

pub struct MemoryReadTool(SharedMemoryStore);

#[async_trait]
impl Tool for MemoryReadTool {
    fn name(&self) -> &str {
        "memory_read"
    }

    fn description(&self) -> &str {
        "Read a core memory block."
    }

    fn parameters_schema(&self) -> Value {
        block_schema(false)
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let name = required_str(&args, "name")?;
        let content = self.0.read_block(name).await.map_err(memory_error)?;
        Ok(ToolOutput::ok(content))
    }
}

pub struct MemoryUpdateTool(SharedMemoryStore);

#[async_trait]
impl Tool for MemoryUpdateTool {
    fn name(&self) -> &str {
        "memory_update"
    }

    fn description(&self) -> &str {
        "Replace the whole content of a core memory block."
    }

    fn parameters_schema(&self) -> Value {
        block_schema(true)
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let name = required_str(&args, "name")?;
        let content = required_str(&args, "content")?;
        self.0
            .update_block(name, content)
            .await
            .map_err(memory_error)?;
        Ok(ToolOutput::ok(format!("Updated block {name}")))
    }
}

pub struct MemoryAppendTool(SharedMemoryStore);

#[async_trait]
impl Tool for MemoryAppendTool {
    fn name(&self) -> &str {
        "memory_append"
    }

    fn description(&self) -> &str {
        "Append a line to a core memory block."
    }

    fn parameters_schema(&self) -> Value {
        block_schema(true)
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let name = required_str(&args, "name")?;
        let content = required_str(&args, "content")?;
        self.0
            .append_block(name, content)
            .await
            .map_err(memory_error)?;
        Ok(ToolOutput::ok(format!("Appended to block {name}")))
    }
}

pub struct ArchivalSearchTool(SharedMemoryStore);

#[async_trait]
impl Tool for ArchivalSearchTool {
    fn name(&self) -> &str {
        "archival_search"
    }

    fn description(&self) -> &str {
        "Search long-term archival memory. Results are ranked by relevance."
    }

    fn parameters_schema(&self) -> Value {
        search_schema()
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(&args, "query")?;
        let hits = self
            .0
            .archival_search(query, search_limit(&args))
            .await
            .map_err(memory_error)?;
        Ok(ToolOutput::ok(json!({ "results": hits }).to_string()))
    }
}

pub struct ArchivalInsertTool(SharedMemoryStore);

#[async_trait]
impl Tool for ArchivalInsertTool {
    fn name(&self) -> &str {
        "archival_insert"
    }

    fn description(&self) -> &str {
        "Store a fact in long-term archival memory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Text to store" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let content = required_str(&args, "content")?;
        self.0
            .archival_insert(content)
            .await
            .map_err(memory_error)?;
        Ok(ToolOutput::ok("Stored"))
    }
}

pub struct ConversationSearchTool(SharedMemoryStore);

#[async_trait]
impl Tool for ConversationSearchTool {
    fn name(&self) -> &str {
        "conversation_search"
    }

    fn description(&self) -> &str {
        "Search past conversation turns."
    }

    fn parameters_schema(&self) -> Value {
        search_schema()
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(&args, "query")?;
        let hits = self
            .0
            .conversation_search(query, search_limit(&args))
            .await
            .map_err(memory_error)?;
        Ok(ToolOutput::ok(json!({ "results": hits }).to_string()))
    }
}

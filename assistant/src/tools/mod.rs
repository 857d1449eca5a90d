//! Tool catalog for actor reasoning loops
//!
//! The catalog maps capability names to handlers behind one `call_tool`
//! contract. Each actor is granted a subset of it at creation time, held in
//! a [`ToolBox`]; the actor core never interprets what a tool does.

pub mod coordination;
pub mod memory;
pub mod user;
pub mod workspace;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use shared_types::ActorKind;
use thiserror::Error;

use crate::actors::context::ActorContext;
use crate::actors::protocol::CoordinationError;
use crate::gateway::memory::SharedMemoryStore;
use crate::gateway::transport::{ConversationFocus, SharedTransport};

pub const COORDINATION_TOOLS: &[&str] = &[
    "spawn_actor",
    "kill_actor",
    "ping_actor",
    "send_message",
    "discover_actors",
    "wait_for_response",
    "actor_history",
    "actor_stats",
];

pub const MEMORY_TOOLS: &[&str] = &[
    "memory_read",
    "memory_update",
    "memory_append",
    "archival_search",
    "archival_insert",
    "conversation_search",
];

pub const WORKSPACE_TOOLS: &[&str] = &["read_file", "write_file", "list_files", "bash"];

/// Granted to a worker when `spawn_actor` names no tools
pub const DEFAULT_WORKER_TOOLS: &[&str] = &[
    "report_progress",
    "send_message",
    "memory_read",
    "archival_search",
    "conversation_search",
    "read_file",
    "list_files",
];

/// Trait for tools that can be executed by an actor
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must be unique)
    fn name(&self) -> &str;

    /// Human-readable description for the model
    fn description(&self) -> &str;

    /// JSON Schema for tool parameters
    fn parameters_schema(&self) -> Value;

    /// Tools that deliver output to the user may only be granted to the executive
    fn reaches_user(&self) -> bool {
        false
    }

    /// Execute on behalf of the actor owning `ctx`
    async fn execute(&self, ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError>;
}

/// Output from tool execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub content: String,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
        }
    }
}

/// Tool execution error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Tool error: {message}")]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Tool description handed to the model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// Collaborators the standard catalog is built from
#[derive(Clone)]
pub struct CatalogDeps {
    pub memory: SharedMemoryStore,
    pub transport: SharedTransport,
    pub focus: ConversationFocus,
    pub workspace_root: PathBuf,
}

/// Global catalog of every tool an actor may be granted
#[derive(Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in tool registered
    pub fn standard(deps: CatalogDeps) -> Self {
        let mut catalog = Self::new();
        coordination::register_all(&mut catalog);
        memory::register_all(&mut catalog, deps.memory);
        catalog.register(user::SendToUserTool::new(deps.transport, deps.focus));
        workspace::register_all(&mut catalog, deps.workspace_root);
        catalog
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get list of available tool names
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Reject grants naming unknown tools, or user-reaching tools for non-executives
    pub fn check_grant(&self, kind: ActorKind, names: &[String]) -> Result<(), CoordinationError> {
        for name in names {
            let tool = self
                .tools
                .get(name)
                .ok_or_else(|| CoordinationError::ToolNotAvailable(name.clone()))?;
            if tool.reaches_user() && kind != ActorKind::Executive {
                return Err(CoordinationError::ToolNotAvailable(format!(
                    "{name} is reserved for the executive"
                )));
            }
        }
        Ok(())
    }

    /// The subset of the catalog named by `names`; unknown names are skipped
    pub fn scoped(&self, names: &[String]) -> ToolBox {
        let tools = names
            .iter()
            .filter_map(|name| {
                self.tools
                    .get(name)
                    .map(|tool| (name.clone(), tool.clone()))
            })
            .collect();
        ToolBox {
            tools: Arc::new(tools),
        }
    }
}

/// Tools granted to one actor
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: Arc<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolBox {
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition::of(tool.as_ref()))
            .collect()
    }

    /// Execute a granted tool by name
    pub async fn call_tool(
        &self,
        name: &str,
        ctx: &ActorContext,
        args: Value,
    ) -> Result<ToolOutput, ToolError> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(ctx, args).await,
            None => Err(ToolError::new(format!(
                "Tool '{name}' is not available to this actor"
            ))),
        }
    }
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| name.to_string()).collect()
}

/// Tools granted to the executive
pub fn executive_tools(actors_enabled: bool) -> Vec<String> {
    let mut tools = Vec::new();
    if actors_enabled {
        tools.extend(names(COORDINATION_TOOLS));
    }
    tools.extend(names(MEMORY_TOOLS));
    tools.extend(names(&["send_to_user", "read_file", "list_files"]));
    tools
}

/// Tools granted to the background thinker
pub fn background_tools() -> Vec<String> {
    let mut tools = names(MEMORY_TOOLS);
    tools.extend(names(&[
        "report_progress",
        "send_message",
        "ping_actor",
        "discover_actors",
    ]));
    tools
}

// ============================================================================
// Argument helpers
// ============================================================================

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::new(format!("Missing '{key}' parameter")))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

pub(crate) fn optional_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

pub(crate) fn string_list(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::InMemoryMemoryStore;
    use crate::testing::RecordingTransport;

    fn catalog() -> ToolCatalog {
        ToolCatalog::standard(CatalogDeps {
            memory: Arc::new(InMemoryMemoryStore::new()),
            transport: Arc::new(RecordingTransport::new()),
            focus: ConversationFocus::default(),
            workspace_root: std::env::temp_dir(),
        })
    }

    #[test]
    fn test_standard_catalog_registers_every_tool() {
        let catalog = catalog();
        for name in COORDINATION_TOOLS
            .iter()
            .chain(MEMORY_TOOLS)
            .chain(WORKSPACE_TOOLS)
            .chain(DEFAULT_WORKER_TOOLS)
        {
            assert!(catalog.contains(name), "missing {name}");
        }
        assert!(catalog.contains("send_to_user"));
        assert!(catalog.get("nonexistent").is_none());
    }

    #[test]
    fn test_check_grant_rejects_unknown_tool() {
        let err = catalog()
            .check_grant(ActorKind::Worker, &names(&["read_file", "teleport"]))
            .unwrap_err();
        assert_eq!(err, CoordinationError::ToolNotAvailable("teleport".to_string()));
    }

    #[test]
    fn test_user_transport_is_reserved_for_executive() {
        let catalog = catalog();
        let grant = names(&["send_to_user"]);
        assert!(matches!(
            catalog.check_grant(ActorKind::Worker, &grant),
            Err(CoordinationError::ToolNotAvailable(_))
        ));
        assert!(matches!(
            catalog.check_grant(ActorKind::BackgroundThinker, &grant),
            Err(CoordinationError::ToolNotAvailable(_))
        ));
        assert!(catalog.check_grant(ActorKind::Executive, &grant).is_ok());
        assert!(catalog
            .check_grant(ActorKind::Executive, &executive_tools(true))
            .is_ok());
        assert!(catalog
            .check_grant(ActorKind::BackgroundThinker, &background_tools())
            .is_ok());
    }

    #[test]
    fn test_scoped_toolbox_only_exposes_grant() {
        let toolbox = catalog().scoped(&names(&["ping_actor", "read_file"]));
        assert_eq!(toolbox.names(), vec!["ping_actor", "read_file"]);
        let definitions = toolbox.definitions();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].parameters["type"], "object");
        assert!(!toolbox.contains("bash"));
    }

    #[test]
    fn test_executive_tools_follow_actor_gate() {
        assert!(executive_tools(true).contains(&"spawn_actor".to_string()));
        let gated = executive_tools(false);
        assert!(!gated.contains(&"spawn_actor".to_string()));
        assert!(gated.contains(&"send_to_user".to_string()));
    }
}

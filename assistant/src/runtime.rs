//! Runtime assembly
//!
//! Builds the process-wide pieces in dependency order and owns them until
//! shutdown:
//!
//! 1. Tool catalog over the memory and transport collaborators
//! 2. RegistryActor, with a worker factory for `spawn_actor`
//! 3. Executive actor, then the background thinker reporting to it
//! 4. HeartbeatActor driving background rounds (when enabled)
//! 5. ConversationManager feeding the executive's mailbox

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorRef};
use serde_json::{Map, Value};
use shared_types::{ActorId, ActorKind, HeartbeatStats};
use tokio::task::JoinHandle;

use crate::actors::agent_loop::AgentLoop;
use crate::actors::background::{background_thinker, BackgroundRounds, BACKGROUND_SYSTEM_PROMPT};
use crate::actors::conversation::{
    ConversationArguments, ConversationManager, ConversationMsg, MailboxTurnSink,
};
use crate::actors::coordination::SharedWorkerFactory;
use crate::actors::executive::{ExecutiveBody, EXECUTIVE_SYSTEM_PROMPT};
use crate::actors::heartbeat::{HeartbeatActor, HeartbeatArguments, HeartbeatMsg};
use crate::actors::protocol::CoordinationError;
use crate::actors::registry::{ActorSpec, RegistryActor, RegistryArguments, RegistryHandle};
use crate::actors::worker::AgentWorkerFactory;
use crate::config::RuntimeConfig;
use crate::gateway::memory::SharedMemoryStore;
use crate::gateway::model::SharedModelGateway;
use crate::gateway::transport::{ConversationFocus, SharedTransport};
use crate::tools::{background_tools, executive_tools, CatalogDeps, ToolCatalog};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to spawn {0}: {1}")]
    Spawn(&'static str, String),
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
    #[error("heartbeat is disabled")]
    HeartbeatDisabled,
    #[error("{0} is not running")]
    Unavailable(&'static str),
}

/// External collaborators the runtime is built over
#[derive(Clone)]
pub struct Collaborators {
    pub model: SharedModelGateway,
    pub memory: SharedMemoryStore,
    pub transport: SharedTransport,
}

struct Heartbeat {
    actor: ActorRef<HeartbeatMsg>,
    handle: JoinHandle<()>,
}

pub struct AssistantRuntime {
    registry: RegistryHandle,
    registry_task: JoinHandle<()>,
    executive: ActorId,
    background: ActorId,
    /// Held so the background thinker keeps accepting rounds
    rounds: BackgroundRounds,
    heartbeat: Option<Heartbeat>,
    conversations: ActorRef<ConversationMsg>,
    conversations_task: JoinHandle<()>,
}

impl AssistantRuntime {
    pub async fn start(
        config: RuntimeConfig,
        collaborators: Collaborators,
    ) -> Result<Self, RuntimeError> {
        let Collaborators {
            model,
            memory,
            transport,
        } = collaborators;
        let instance = ulid::Ulid::new();
        let focus = ConversationFocus::default();

        let catalog = Arc::new(ToolCatalog::standard(CatalogDeps {
            memory: memory.clone(),
            transport: transport.clone(),
            focus: focus.clone(),
            workspace_root: config.workspace_dir.clone(),
        }));
        let workers: SharedWorkerFactory =
            Arc::new(AgentWorkerFactory::new(model.clone(), config.worker_max_steps));

        let (registry_ref, registry_task) = Actor::spawn(
            Some(format!("registry:{instance}")),
            RegistryActor,
            RegistryArguments {
                config: config.registry_config(),
                catalog,
                workers: Some(workers),
            },
        )
        .await
        .map_err(|e| RuntimeError::Spawn("registry", e.to_string()))?;
        let registry = RegistryHandle::new(registry_ref);

        let executive_body = ExecutiveBody::new(
            AgentLoop::new(model.clone(), EXECUTIVE_SYSTEM_PROMPT, config.agent_max_steps),
            transport,
            focus,
            config.executive_poll,
        )
        .with_memory(memory);
        let executive = registry
            .create(
                ActorSpec::new(
                    ActorKind::Executive,
                    "Converse with the user and coordinate workers",
                    executive_tools(config.actors_enabled),
                ),
                Box::new(executive_body),
            )
            .await?;
        let executive_mailbox = registry.mailbox_of(&executive).await?;

        let (background_body, rounds) = background_thinker(
            AgentLoop::new(model, BACKGROUND_SYSTEM_PROMPT, config.agent_max_steps),
            executive.clone(),
            config.executive_poll,
        );
        let background = registry
            .create(
                ActorSpec::new(
                    ActorKind::BackgroundThinker,
                    "Periodic review of memory and pending work",
                    background_tools(),
                ),
                Box::new(background_body),
            )
            .await?;

        let heartbeat = if config.heartbeat_enabled {
            let (actor, handle) = Actor::spawn(
                Some(format!("heartbeat:{instance}")),
                HeartbeatActor,
                HeartbeatArguments {
                    interval: config.heartbeat_interval,
                    round: Arc::new(rounds.clone()),
                },
            )
            .await
            .map_err(|e| RuntimeError::Spawn("heartbeat", e.to_string()))?;
            Some(Heartbeat { actor, handle })
        } else {
            None
        };

        let (conversations, conversations_task) = Actor::spawn(
            Some(format!("conversations:{instance}")),
            ConversationManager,
            ConversationArguments {
                debounce: config.debounce,
                sink: Arc::new(MailboxTurnSink::new(executive.clone(), executive_mailbox)),
            },
        )
        .await
        .map_err(|e| RuntimeError::Spawn("conversation manager", e.to_string()))?;

        tracing::info!(
            executive = %executive,
            background = %background,
            heartbeat_enabled = heartbeat.is_some(),
            heartbeat_interval_secs = config.heartbeat_interval.as_secs(),
            debounce_ms = config.debounce.as_millis() as u64,
            actors_enabled = config.actors_enabled,
            "Assistant runtime started"
        );

        Ok(Self {
            registry,
            registry_task,
            executive,
            background,
            rounds,
            heartbeat,
            conversations,
            conversations_task,
        })
    }

    /// Hand one inbound user message to the coalescer
    pub fn submit(
        &self,
        conversation_id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), RuntimeError> {
        self.conversations
            .cast(ConversationMsg::Inbound {
                conversation_id: conversation_id.to_string(),
                text: text.to_string(),
                metadata,
            })
            .map_err(|_| RuntimeError::Unavailable("conversation manager"))
    }

    /// Drop messages still waiting in a conversation's window
    pub async fn cancel_pending(&self, conversation_id: &str) -> Result<bool, RuntimeError> {
        let conversation_id = conversation_id.to_string();
        ractor::call!(self.conversations, |reply| ConversationMsg::Cancel {
            conversation_id,
            reply,
        })
        .map_err(|_| RuntimeError::Unavailable("conversation manager"))
    }

    /// Run a background round now, unless one is in flight
    pub fn trigger_heartbeat(&self) -> Result<(), RuntimeError> {
        let heartbeat = self
            .heartbeat
            .as_ref()
            .ok_or(RuntimeError::HeartbeatDisabled)?;
        heartbeat
            .actor
            .cast(HeartbeatMsg::TriggerNow)
            .map_err(|_| RuntimeError::Unavailable("heartbeat"))
    }

    pub async fn heartbeat_stats(&self) -> Result<HeartbeatStats, RuntimeError> {
        let heartbeat = self
            .heartbeat
            .as_ref()
            .ok_or(RuntimeError::HeartbeatDisabled)?;
        ractor::call!(heartbeat.actor, |reply| HeartbeatMsg::GetStats { reply })
            .map_err(|_| RuntimeError::Unavailable("heartbeat"))
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn executive_id(&self) -> &ActorId {
        &self.executive
    }

    pub fn background_id(&self) -> &ActorId {
        &self.background
    }

    /// Stop intake and scheduling, then kill every live actor.
    pub async fn shutdown(self, timeout: Duration) {
        tracing::info!("Assistant runtime shutting down");
        self.conversations.stop(Some("shutdown".to_string()));
        let _ = self.conversations_task.await;
        if let Some(heartbeat) = self.heartbeat {
            heartbeat.actor.stop(Some("shutdown".to_string()));
            let _ = heartbeat.handle.await;
        }
        drop(self.rounds);

        self.registry.shutdown(timeout).await;
        let _ = self.registry_task.await;
        tracing::info!("Assistant runtime stopped");
    }
}

//! Coordination operations
//!
//! The verbs a reasoning loop uses to manage other actors. A [`Coordinator`]
//! is bound to one calling actor: spawned actors get it as parent, messages
//! carry it as sender, and `wait_for_response` suspends on its mailbox.
//!
//! Every operation except `wait_for_response` returns promptly.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{
    ActorEvent, ActorId, ActorSummary, DeliveryAck, KillAck, MessageBody, PingReport,
    RegistryStats,
};
use tokio_util::sync::CancellationToken;

use crate::actors::context::ActorBody;
use crate::actors::mailbox::{Mailbox, PendingWait, ReceiveFilter};
use crate::actors::protocol::{CoordinationError, Message};
use crate::actors::registry::{ActorSpec, RegistryHandle};

/// Builds the reasoning loop for an actor created by `spawn_actor`
pub trait WorkerFactory: Send + Sync {
    fn build(&self, spec: &ActorSpec) -> Box<dyn ActorBody>;
}

pub type SharedWorkerFactory = Arc<dyn WorkerFactory>;

#[derive(Clone)]
pub struct Coordinator {
    caller: ActorId,
    registry: RegistryHandle,
    mailbox: Arc<Mailbox>,
    cancel: CancellationToken,
    workers: Option<SharedWorkerFactory>,
    spawn_enabled: bool,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("caller", &self.caller)
            .field("spawn_enabled", &self.spawn_enabled)
            .finish()
    }
}

impl Coordinator {
    pub fn new(
        caller: ActorId,
        registry: RegistryHandle,
        mailbox: Arc<Mailbox>,
        cancel: CancellationToken,
        workers: Option<SharedWorkerFactory>,
        spawn_enabled: bool,
    ) -> Self {
        Self {
            caller,
            registry,
            mailbox,
            cancel,
            workers,
            spawn_enabled,
        }
    }

    pub fn caller(&self) -> &ActorId {
        &self.caller
    }

    /// Create a worker owned by the caller. Returns once the entry exists.
    pub async fn spawn_actor(
        &self,
        goals: &str,
        tools: Vec<String>,
        group: Option<String>,
    ) -> Result<ActorId, CoordinationError> {
        if !self.spawn_enabled {
            return Err(CoordinationError::InvalidState(
                "spawning actors is disabled".to_string(),
            ));
        }
        let workers = self.workers.as_ref().ok_or_else(|| {
            CoordinationError::InvalidState("no worker factory is configured".to_string())
        })?;

        let spec = ActorSpec::worker(goals, tools)
            .in_group(group)
            .with_parent(self.caller.clone());
        let body = workers.build(&spec);
        let id = self.registry.create(spec, body).await?;
        tracing::info!(caller = %self.caller, actor_id = %id, "Spawned worker");
        Ok(id)
    }

    pub async fn kill_actor(&self, id: &ActorId) -> Result<KillAck, CoordinationError> {
        self.registry.kill(id).await
    }

    pub async fn ping_actor(&self, id: &ActorId) -> Result<PingReport, CoordinationError> {
        let view = self.registry.get(id).await?;
        Ok(PingReport::from(&view))
    }

    pub async fn send_message(
        &self,
        to: &ActorId,
        body: MessageBody,
        correlation_id: Option<String>,
    ) -> Result<DeliveryAck, CoordinationError> {
        let mailbox = self.registry.mailbox_of(to).await?;
        let message =
            Message::new(self.caller.clone(), to.clone(), body).with_correlation(correlation_id);
        let message_id = message.id.clone();
        let queued_depth = mailbox.post(message)?;
        tracing::debug!(from = %self.caller, to = %to, queued_depth, "Message delivered");
        Ok(DeliveryAck {
            message_id,
            to: to.clone(),
            queued_depth,
        })
    }

    /// Members of `group` oldest first; an unknown group is simply empty.
    pub async fn discover_actors(
        &self,
        group: &str,
    ) -> Result<Vec<ActorSummary>, CoordinationError> {
        let views = self.registry.list(group).await?;
        Ok(views.iter().map(ActorSummary::from).collect())
    }

    /// Suspend until a matching message reaches the caller's mailbox.
    ///
    /// Returns `Timeout` after `timeout` and `Cancelled` as soon as the caller
    /// itself is killed.
    pub async fn wait_for_response(
        &self,
        from: Option<ActorId>,
        correlation_id: Option<String>,
        timeout: Duration,
    ) -> Result<Message, CoordinationError> {
        let filter = ReceiveFilter {
            from,
            correlation_id,
        };
        if let Some(from) = &filter.from {
            if !self.mailbox.contains_matching(&filter) {
                // Fails NotFound for an unknown sender instead of waiting out the timeout.
                self.registry.get(from).await?;
            }
        }

        let wait = PendingWait::new(self.caller.clone(), filter, timeout);
        tracing::debug!(
            waiter = %wait.waiter_id,
            from = ?wait.filter.from,
            correlation_id = ?wait.filter.correlation_id,
            deadline = %wait.deadline,
            "Waiting for response"
        );
        self.mailbox
            .receive_matching(&wait.filter, wait.timeout(), Some(&self.cancel))
            .await
    }

    pub async fn history(&self, id: &ActorId) -> Result<Vec<ActorEvent>, CoordinationError> {
        self.registry.history(id).await
    }

    pub async fn stats(&self) -> Result<RegistryStats, CoordinationError> {
        self.registry.stats().await
    }
}

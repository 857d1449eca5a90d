//! RegistryActor - single source of truth for actor identity and status
//!
//! Every create, status change, kill and reap is a message to one
//! `RegistryActor`, so all mutations of the table are serialised. Reasoning
//! loops never touch the table directly; they go through a cloneable
//! [`RegistryHandle`].
//!
//! ## State Machine
//!
//! ```text
//! Starting → Running ⇄ WaitingOnTool
//!    |          |            |
//!    +----------+------------+--> Completed | Failed | Killed
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ractor::Actor;
//! use crate::actors::registry::{RegistryActor, RegistryArguments, RegistryHandle};
//!
//! let (registry_ref, _handle) = Actor::spawn(None, RegistryActor, args).await?;
//! let registry = RegistryHandle::new(registry_ref);
//! let id = registry.create(ActorSpec::worker("fetch X", tools), body).await?;
//! ```

pub mod actor;
pub mod protocol;
pub mod state;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use ractor::ActorRef;
use shared_types::{ActorEvent, ActorId, ActorStatus, ActorView, KillAck, RegistryStats};

pub use actor::{RegistryActor, RegistryArguments, RegistryConfig, RegistryState};
pub use protocol::{ActorSpec, LoopExit, RegistryMsg};

use crate::actors::context::{ActorBody, BoxedBody};
use crate::actors::mailbox::Mailbox;
use crate::actors::protocol::CoordinationError;

/// Poll period while waiting for killed actors during shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(25);

/// Typed front for a running RegistryActor
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    actor: ActorRef<RegistryMsg>,
}

impl RegistryHandle {
    pub fn new(actor: ActorRef<RegistryMsg>) -> Self {
        Self { actor }
    }

    pub fn actor_ref(&self) -> &ActorRef<RegistryMsg> {
        &self.actor
    }

    pub async fn create(
        &self,
        spec: ActorSpec,
        body: Box<dyn ActorBody>,
    ) -> Result<ActorId, CoordinationError> {
        let body = BoxedBody(body);
        ractor::call!(self.actor, |reply| RegistryMsg::Create { spec, body, reply })
            .map_err(CoordinationError::unavailable)?
    }

    pub async fn get(&self, id: &ActorId) -> Result<ActorView, CoordinationError> {
        let id = id.clone();
        ractor::call!(self.actor, |reply| RegistryMsg::Get { id, reply })
            .map_err(CoordinationError::unavailable)?
    }

    pub async fn list(&self, group: &str) -> Result<Vec<ActorView>, CoordinationError> {
        let group = group.to_string();
        ractor::call!(self.actor, |reply| RegistryMsg::List { group, reply })
            .map_err(CoordinationError::unavailable)
    }

    pub async fn remove(&self, id: &ActorId) -> Result<ActorView, CoordinationError> {
        let id = id.clone();
        ractor::call!(self.actor, |reply| RegistryMsg::Remove { id, reply })
            .map_err(CoordinationError::unavailable)?
    }

    pub async fn kill(&self, id: &ActorId) -> Result<KillAck, CoordinationError> {
        let id = id.clone();
        ractor::call!(self.actor, |reply| RegistryMsg::Kill { id, reply })
            .map_err(CoordinationError::unavailable)?
    }

    pub async fn mailbox_of(&self, id: &ActorId) -> Result<Arc<Mailbox>, CoordinationError> {
        let id = id.clone();
        ractor::call!(self.actor, |reply| RegistryMsg::MailboxOf { id, reply })
            .map_err(CoordinationError::unavailable)?
    }

    pub async fn history(&self, id: &ActorId) -> Result<Vec<ActorEvent>, CoordinationError> {
        let id = id.clone();
        ractor::call!(self.actor, |reply| RegistryMsg::History { id, reply })
            .map_err(CoordinationError::unavailable)?
    }

    pub async fn stats(&self) -> Result<RegistryStats, CoordinationError> {
        ractor::call!(self.actor, |reply| RegistryMsg::Stats { reply })
            .map_err(CoordinationError::unavailable)
    }

    pub async fn live_ids(&self) -> Result<Vec<ActorId>, CoordinationError> {
        ractor::call!(self.actor, |reply| RegistryMsg::LiveIds { reply })
            .map_err(CoordinationError::unavailable)
    }

    /// Reap every terminal actor that finished at least `max_age` ago
    pub async fn collect_garbage(
        &self,
        max_age: Duration,
    ) -> Result<Vec<ActorId>, CoordinationError> {
        ractor::call!(self.actor, |reply| RegistryMsg::CollectGarbage {
            max_age,
            reply: Some(reply),
        })
        .map_err(CoordinationError::unavailable)
    }

    pub fn set_status(&self, id: &ActorId, status: ActorStatus) {
        let _ = self.actor.cast(RegistryMsg::SetStatus {
            id: id.clone(),
            status,
        });
    }

    pub fn report_progress(&self, id: &ActorId, summary: String) {
        let _ = self.actor.cast(RegistryMsg::Progress {
            id: id.clone(),
            summary,
        });
    }

    pub fn touch(&self, id: &ActorId) {
        let _ = self.actor.cast(RegistryMsg::Touch { id: id.clone() });
    }

    /// Kill every live actor, wait up to `timeout` for them to finish, then stop.
    pub async fn shutdown(&self, timeout: Duration) {
        let live = self.live_ids().await.unwrap_or_default();
        tracing::info!(live = live.len(), "Registry shutting down");
        let kills = futures::future::join_all(live.iter().map(|id| self.kill(id))).await;
        for (id, result) in live.iter().zip(kills) {
            if let Err(err) = result {
                tracing::debug!(actor_id = %id, error = %err, "Kill during shutdown failed");
            }
        }

        let deadline = crate::actors::mailbox::deadline_after(timeout);
        while tokio::time::Instant::now() < deadline {
            match self.stats().await {
                Ok(stats) if stats.live > 0 => tokio::time::sleep(SHUTDOWN_POLL).await,
                _ => break,
            }
        }
        self.actor.stop(Some("shutdown".to_string()));
    }
}

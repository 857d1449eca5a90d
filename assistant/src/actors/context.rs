//! What a reasoning loop sees of its own actor
//!
//! Every body runs inside its own tokio task and receives an [`ActorContext`]:
//! its identity, its mailbox, its cancellation token, the tools it was
//! granted, and a [`Coordinator`] bound to it as caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_types::{ActorId, ActorKind, ActorResult, ActorStatus};
use tokio_util::sync::CancellationToken;

use crate::actors::coordination::Coordinator;
use crate::actors::mailbox::{Mailbox, ReceiveFilter};
use crate::actors::protocol::{CoordinationError, Message};
use crate::actors::registry::RegistryHandle;
use crate::gateway::model::ModelError;
use crate::tools::ToolBox;

/// How a reasoning loop ended on its own terms
#[derive(Debug, Clone, PartialEq)]
pub enum ActorOutcome {
    Completed(ActorResult),
    /// Loop observed its cancellation token and unwound
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("cancelled")]
    Cancelled,
    /// Newer input made the pass obsolete; no reply should be delivered
    #[error("interrupted by newer input")]
    Interrupted,
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
    #[error("step budget of {0} exhausted before a final answer")]
    StepBudgetExhausted(usize),
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
    #[error("{0}")]
    Other(String),
}

/// The reasoning loop of one actor
#[async_trait]
pub trait ActorBody: Send + 'static {
    async fn run(self: Box<Self>, ctx: ActorContext) -> Result<ActorOutcome, BodyError>;
}

/// Owned body travelling inside a registry message
pub struct BoxedBody(pub Box<dyn ActorBody>);

impl std::fmt::Debug for BoxedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxedBody")
    }
}

#[derive(Clone)]
pub struct ActorContext {
    id: ActorId,
    kind: ActorKind,
    goals: String,
    group: Option<String>,
    mailbox: Arc<Mailbox>,
    cancel: CancellationToken,
    registry: RegistryHandle,
    tools: ToolBox,
    coordinator: Coordinator,
}

impl std::fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("tools", &self.tools.names())
            .finish()
    }
}

impl ActorContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ActorId,
        kind: ActorKind,
        goals: String,
        group: Option<String>,
        mailbox: Arc<Mailbox>,
        cancel: CancellationToken,
        registry: RegistryHandle,
        tools: ToolBox,
        coordinator: Coordinator,
    ) -> Self {
        Self {
            id,
            kind,
            goals,
            group,
            mailbox,
            cancel,
            registry,
            tools,
            coordinator,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn goals(&self) -> &str {
        &self.goals
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn tools(&self) -> &ToolBox {
        &self.tools
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Suspension-point check: `Err(Cancelled)` once a kill has been requested.
    pub fn checkpoint(&self) -> Result<(), BodyError> {
        if self.cancel.is_cancelled() {
            Err(BodyError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Only `Running` and `WaitingOnTool` are accepted; terminal statuses
    /// are derived from how the loop exits.
    pub fn set_status(&self, status: ActorStatus) {
        self.registry.set_status(&self.id, status);
    }

    pub fn report_progress(&self, summary: impl Into<String>) {
        self.registry.report_progress(&self.id, summary.into());
    }

    pub fn touch(&self) {
        self.registry.touch(&self.id);
    }

    /// Next message from the head of the mailbox, interrupted by cancellation.
    pub async fn receive(&self, timeout: Duration) -> Result<Message, CoordinationError> {
        self.mailbox
            .receive_matching(&ReceiveFilter::any(), timeout, Some(&self.cancel))
            .await
    }
}

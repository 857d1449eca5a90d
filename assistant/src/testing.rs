//! Scripted collaborators for unit and integration tests
//!
//! Nothing here talks to the network or the terminal: the model replies from
//! a queue, the transport records what it was asked to deliver, and bodies
//! can be written inline as closures.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ractor::Actor;
use shared_types::ActorResult;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::actors::context::{ActorBody, ActorContext, ActorOutcome, BodyError};
use crate::actors::coordination::SharedWorkerFactory;
use crate::actors::registry::{RegistryActor, RegistryArguments, RegistryConfig, RegistryHandle};
use crate::gateway::memory::InMemoryMemoryStore;
use crate::gateway::model::{ModelContext, ModelError, ModelGateway, ModelReply, Turn};
use crate::gateway::transport::{ConversationFocus, Outbound, Transport, TransportError};
use crate::tools::{CatalogDeps, ToolCatalog, ToolDefinition};

/// Model that answers from a queue of canned replies
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    fallback: String,
    delay: Option<Duration>,
    transcripts: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            fallback: "done".to_string(),
            delay: None,
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// Replies with `text` to every invocation
    pub fn completing(text: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallback(text)
    }

    /// Completion used once the queue is empty
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    /// Wait this long before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, reply: ModelReply) {
        self.lock_replies().push_back(Ok(reply));
    }

    pub fn push_error(&self, err: ModelError) {
        self.lock_replies().push_back(Err(err));
    }

    pub fn invocations(&self) -> usize {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Transcript seen by every invocation so far
    pub fn transcripts(&self) -> Vec<Vec<Turn>> {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<ModelReply, ModelError>>> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ModelGateway for ScriptedModel {
    async fn invoke(
        &self,
        context: ModelContext<'_>,
        _tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError> {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context.transcript.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.lock_replies().pop_front();
        next.unwrap_or_else(|| Ok(ModelReply::Completion(self.fallback.clone())))
    }
}

/// Transport that keeps every delivery in memory
#[derive(Debug, Default)]
pub struct RecordingTransport {
    deliveries: Mutex<Vec<(String, Outbound)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(String, Outbound)> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Texts delivered to `conversation_id`, in order
    pub fn texts_for(&self, conversation_id: &str) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter(|(conversation, _)| conversation == conversation_id)
            .filter_map(|(_, outbound)| match outbound {
                Outbound::Text { text } => Some(text),
                Outbound::File { .. } => None,
            })
            .collect()
    }

    /// Poll until at least `count` deliveries were recorded or `timeout` passes
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<(String, Outbound)> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let deliveries = self.deliveries();
            if deliveries.len() >= count || tokio::time::Instant::now() >= deadline {
                return deliveries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver_to_user(
        &self,
        conversation_id: &str,
        outbound: Outbound,
    ) -> Result<(), TransportError> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((conversation_id.to_string(), outbound));
        Ok(())
    }
}

/// Body written as an async closure
pub struct FnBody<F> {
    run: F,
}

#[async_trait]
impl<F, Fut> ActorBody for FnBody<F>
where
    F: FnOnce(ActorContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<ActorOutcome, BodyError>> + Send + 'static,
{
    async fn run(self: Box<Self>, ctx: ActorContext) -> Result<ActorOutcome, BodyError> {
        (self.run)(ctx).await
    }
}

pub fn body_fn<F, Fut>(run: F) -> Box<dyn ActorBody>
where
    F: FnOnce(ActorContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<ActorOutcome, BodyError>> + Send + 'static,
{
    Box::new(FnBody { run })
}

/// Body that hands its context to the test, then idles until killed
pub fn probe_body() -> (Box<dyn ActorBody>, oneshot::Receiver<ActorContext>) {
    let (tx, rx) = oneshot::channel();
    let body = body_fn(move |ctx: ActorContext| async move {
        let _ = tx.send(ctx.clone());
        ctx.cancelled().await;
        Ok(ActorOutcome::Cancelled)
    });
    (body, rx)
}

/// Body that never observes its cancellation token
pub fn stubborn_body() -> Box<dyn ActorBody> {
    body_fn(|_ctx: ActorContext| async move {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        Ok(ActorOutcome::Completed(ActorResult::text("outlived its kill")))
    })
}

/// Catalog with every built-in tool, discarding user deliveries
pub fn test_catalog() -> ToolCatalog {
    ToolCatalog::standard(CatalogDeps {
        memory: Arc::new(InMemoryMemoryStore::new()),
        transport: Arc::new(RecordingTransport::new()),
        focus: ConversationFocus::default(),
        workspace_root: std::env::temp_dir(),
    })
}

/// Fast timings and no background sweep
pub fn test_registry_config() -> RegistryConfig {
    RegistryConfig {
        kill_grace: Duration::from_millis(200),
        max_live_actors: 8,
        reap_after: Duration::from_secs(3600),
        reap_interval: Duration::ZERO,
        ..RegistryConfig::default()
    }
}

pub async fn spawn_test_registry(
    config: RegistryConfig,
    workers: Option<SharedWorkerFactory>,
) -> (RegistryHandle, JoinHandle<()>) {
    let args = RegistryArguments {
        config,
        catalog: Arc::new(test_catalog()),
        workers,
    };
    match Actor::spawn(None, RegistryActor, args).await {
        Ok((actor, handle)) => (RegistryHandle::new(actor), handle),
        Err(err) => panic!("failed to spawn test registry: {err}"),
    }
}

use std::time::Duration;

use shared_types::{ActorId, ActorResult, ActorView};
use tokio::task::JoinHandle;

use crate::actors::context::{ActorBody, ActorContext, ActorOutcome};
use crate::actors::registry::{RegistryConfig, RegistryHandle};
use crate::testing::{body_fn, spawn_test_registry, test_registry_config};

pub(crate) async fn setup_registry() -> (RegistryHandle, JoinHandle<()>) {
    spawn_test_registry(test_registry_config(), None).await
}

pub(crate) async fn setup_registry_with(config: RegistryConfig) -> (RegistryHandle, JoinHandle<()>) {
    spawn_test_registry(config, None).await
}

pub(crate) async fn teardown(registry: RegistryHandle, handle: JoinHandle<()>) {
    registry.actor_ref().stop(None);
    handle.await.unwrap();
}

/// Body that finishes at once with `text`
pub(crate) fn completing(text: &str) -> Box<dyn ActorBody> {
    let text = text.to_string();
    body_fn(move |_ctx: ActorContext| async move { Ok(ActorOutcome::Completed(ActorResult::text(text))) })
}

/// Poll until the actor reaches a terminal status
pub(crate) async fn wait_terminal(registry: &RegistryHandle, id: &ActorId) -> ActorView {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let view = registry.get(id).await.unwrap();
        if view.status.is_terminal() {
            return view;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{id} still {} after 5s",
            view.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

use std::collections::HashSet;
use std::time::Duration;

use shared_types::{ActorEventKind, ActorKind, ActorStatus, MessageBody};

use crate::actors::context::{ActorContext, ActorOutcome, BodyError};
use crate::actors::protocol::CoordinationError;
use crate::actors::registry::{ActorSpec, RegistryConfig};
use crate::testing::{body_fn, probe_body, test_registry_config};
use crate::tools::names;

use super::support::{completing, setup_registry, setup_registry_with, teardown, wait_terminal};

#[tokio::test]
async fn test_ids_are_never_reused_across_create_and_remove() {
    let (registry, handle) = setup_registry().await;
    let mut seen = HashSet::new();

    for round in 0..3 {
        let mut batch = Vec::new();
        for i in 0..3 {
            let spec = ActorSpec::worker(format!("task {round}/{i}"), vec![]);
            let id = registry.create(spec, completing("ok")).await.unwrap();
            assert!(seen.insert(id.clone()), "id {id} issued twice");
            batch.push(id);
        }
        for id in &batch {
            wait_terminal(&registry, id).await;
            registry.remove(id).await.unwrap();
        }
    }

    let stats = registry.stats().await.unwrap();
    assert_eq!(stats.issued_total, 9);
    assert_eq!(stats.reaped_total, 9);
    assert_eq!(stats.live, 0);

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_completed_body_records_result_and_history() {
    let (registry, handle) = setup_registry().await;
    let id = registry
        .create(ActorSpec::worker("fetch X", vec![]), completing("X is 42"))
        .await
        .unwrap();

    let view = wait_terminal(&registry, &id).await;
    assert_eq!(view.status, ActorStatus::Completed);
    assert_eq!(view.result.unwrap().text, "X is 42");
    assert!(view.finished_at.is_some());

    let kinds: Vec<ActorEventKind> = registry
        .history(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ActorEventKind::Created,
            ActorEventKind::Started,
            ActorEventKind::Completed
        ]
    );

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_body_error_and_panic_become_failed() {
    let (registry, handle) = setup_registry().await;

    let failing = registry
        .create(
            ActorSpec::worker("fail", vec![]),
            body_fn(|_ctx: ActorContext| async move { Err(BodyError::Other("boom".to_string())) }),
        )
        .await
        .unwrap();
    let panicking = registry
        .create(
            ActorSpec::worker("panic", vec![]),
            body_fn(|_ctx: ActorContext| async move {
                let missing: Option<u8> = None;
                let _ = missing.expect("exploded");
                Ok(ActorOutcome::Cancelled)
            }),
        )
        .await
        .unwrap();

    let view = wait_terminal(&registry, &failing).await;
    assert_eq!(view.status, ActorStatus::Failed);
    assert_eq!(view.result.unwrap().text, "boom");

    let view = wait_terminal(&registry, &panicking).await;
    assert_eq!(view.status, ActorStatus::Failed);
    assert!(view.result.unwrap().text.contains("panicked"));

    // The registry survives both.
    assert_eq!(registry.stats().await.unwrap().live, 0);

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_status_only_oscillates_between_running_and_waiting() {
    let (registry, handle) = setup_registry().await;
    let (body, ctx) = probe_body();
    let id = registry
        .create(ActorSpec::worker("probe", vec![]), body)
        .await
        .unwrap();
    let ctx = ctx.await.unwrap();
    assert_eq!(registry.get(&id).await.unwrap().status, ActorStatus::Running);

    ctx.set_status(ActorStatus::WaitingOnTool);
    assert_eq!(
        registry.get(&id).await.unwrap().status,
        ActorStatus::WaitingOnTool
    );
    ctx.set_status(ActorStatus::Running);
    ctx.report_progress("halfway");
    // Terminal statuses only come from the loop exiting.
    ctx.set_status(ActorStatus::Completed);
    ctx.set_status(ActorStatus::Starting);

    let view = registry.get(&id).await.unwrap();
    assert_eq!(view.status, ActorStatus::Running);
    assert_eq!(view.progress.as_deref(), Some("halfway"));

    registry.kill(&id).await.unwrap();
    assert_eq!(wait_terminal(&registry, &id).await.status, ActorStatus::Killed);
    ctx.set_status(ActorStatus::Running);
    ctx.report_progress("too late");
    let view = registry.get(&id).await.unwrap();
    assert_eq!(view.status, ActorStatus::Killed);
    assert_eq!(view.progress.as_deref(), Some("halfway"));

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_remove_requires_terminal_status() {
    let (registry, handle) = setup_registry().await;
    let (body, ctx) = probe_body();
    let id = registry
        .create(ActorSpec::worker("probe", vec![]), body)
        .await
        .unwrap();
    let ctx = ctx.await.unwrap();

    assert!(matches!(
        registry.remove(&id).await,
        Err(CoordinationError::InvalidState(_))
    ));

    registry.kill(&id).await.unwrap();
    wait_terminal(&registry, &id).await;
    let removed = registry.remove(&id).await.unwrap();
    assert_eq!(removed.status, ActorStatus::Killed);

    assert_eq!(
        registry.get(&id).await,
        Err(CoordinationError::NotFound(id.clone()))
    );
    assert_eq!(
        registry.remove(&id).await,
        Err(CoordinationError::NotFound(id.clone()))
    );
    assert!(matches!(
        registry.mailbox_of(&id).await,
        Err(CoordinationError::NotFound(_))
    ));
    assert!(ctx.mailbox().is_closed());

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_parent_receives_finish_notice() {
    let (registry, handle) = setup_registry().await;
    let (body, parent_ctx) = probe_body();
    let parent = registry
        .create(ActorSpec::new(ActorKind::Executive, "coordinate", vec![]), body)
        .await
        .unwrap();
    let parent_ctx = parent_ctx.await.unwrap();

    let child = registry
        .create(
            ActorSpec::worker("child task", vec![]).with_parent(parent.clone()),
            completing("child result"),
        )
        .await
        .unwrap();

    let notice = parent_ctx.receive(Duration::from_secs(5)).await.unwrap();
    assert_eq!(notice.from_id, child);
    assert_eq!(notice.to_id, parent);
    match notice.body {
        MessageBody::ActorFinished { status, result } => {
            assert_eq!(status, ActorStatus::Completed);
            assert_eq!(result.unwrap().text, "child result");
        }
        other => panic!("expected a finish notice, got {other:?}"),
    }

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_capacity_limit_refuses_creation() {
    let (registry, handle) = setup_registry_with(RegistryConfig {
        max_live_actors: 2,
        ..test_registry_config()
    })
    .await;

    let (first_body, first_ctx) = probe_body();
    let first = registry
        .create(ActorSpec::worker("one", vec![]), first_body)
        .await
        .unwrap();
    let (second_body, _second_ctx) = probe_body();
    registry
        .create(ActorSpec::worker("two", vec![]), second_body)
        .await
        .unwrap();
    first_ctx.await.unwrap();

    let refused = registry
        .create(ActorSpec::worker("three", vec![]), completing("never"))
        .await;
    assert!(matches!(refused, Err(CoordinationError::CapacityExhausted(_))));
    assert_eq!(registry.stats().await.unwrap().issued_total, 2);

    registry.kill(&first).await.unwrap();
    wait_terminal(&registry, &first).await;
    registry
        .create(ActorSpec::worker("three", vec![]), completing("now"))
        .await
        .unwrap();

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_unknown_or_reserved_tool_creates_no_entry() {
    let (registry, handle) = setup_registry().await;

    let unknown = registry
        .create(
            ActorSpec::worker("teleport", names(&["read_file", "teleport"])),
            completing("never"),
        )
        .await;
    assert_eq!(
        unknown,
        Err(CoordinationError::ToolNotAvailable("teleport".to_string()))
    );

    let reserved = registry
        .create(
            ActorSpec::worker("talk", names(&["send_to_user"])),
            completing("never"),
        )
        .await;
    assert!(matches!(reserved, Err(CoordinationError::ToolNotAvailable(_))));

    let stats = registry.stats().await.unwrap();
    assert_eq!(stats.issued_total, 0);
    assert_eq!(stats.live, 0);
    assert!(stats.by_status.is_empty());

    registry
        .create(
            ActorSpec::new(ActorKind::Executive, "talk", names(&["send_to_user"])),
            completing("ok"),
        )
        .await
        .unwrap();

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_collect_garbage_reaps_only_finished() {
    let (registry, handle) = setup_registry().await;
    let done = registry
        .create(
            ActorSpec::worker("done", vec![]).in_group(Some("batch".into())),
            completing("ok"),
        )
        .await
        .unwrap();
    let (body, _ctx) = probe_body();
    let live = registry
        .create(
            ActorSpec::worker("live", vec![]).in_group(Some("batch".into())),
            body,
        )
        .await
        .unwrap();
    wait_terminal(&registry, &done).await;

    let reaped = registry.collect_garbage(Duration::ZERO).await.unwrap();
    assert_eq!(reaped, vec![done.clone()]);
    assert!(matches!(
        registry.get(&done).await,
        Err(CoordinationError::NotFound(_))
    ));

    let members = registry.list("batch").await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, live);

    // Nothing is old enough for a long retention.
    registry.kill(&live).await.unwrap();
    wait_terminal(&registry, &live).await;
    assert!(registry
        .collect_garbage(Duration::from_secs(3600))
        .await
        .unwrap()
        .is_empty());

    teardown(registry, handle).await;
}

#[tokio::test]
async fn test_list_orders_group_by_creation() {
    let (registry, handle) = setup_registry().await;
    let mut created = Vec::new();
    for i in 0..4 {
        let (body, _ctx) = probe_body();
        let group = if i % 2 == 0 { "even" } else { "odd" };
        let id = registry
            .create(
                ActorSpec::worker(format!("member {i}"), vec![]).in_group(Some(group.into())),
                body,
            )
            .await
            .unwrap();
        created.push((group, id));
    }

    let even: Vec<_> = registry
        .list("even")
        .await
        .unwrap()
        .into_iter()
        .map(|view| view.id)
        .collect();
    let expected: Vec<_> = created
        .iter()
        .filter(|(group, _)| *group == "even")
        .map(|(_, id)| id.clone())
        .collect();
    assert_eq!(even, expected);
    assert!(registry.list("nobody").await.unwrap().is_empty());

    teardown(registry, handle).await;
}

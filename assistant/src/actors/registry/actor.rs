//! RegistryActor - owns every actor's lifecycle
//!
//! The RegistryActor is responsible for:
//! - Creating actors and launching their bodies in supervised tasks
//! - Enforcing the status state machine
//! - Two-phase kill: cooperative cancellation, then a hard stop after the grace period
//! - Notifying parents when a child reaches a terminal status
//! - Reaping finished actors, on request and periodically

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use shared_types::{
    ActorEventKind, ActorId, ActorResult, ActorStatus, KillAck, MessageBody,
};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::actors::context::{ActorBody, ActorContext, ActorOutcome, BodyError};
use crate::actors::coordination::{Coordinator, SharedWorkerFactory};
use crate::actors::mailbox::Mailbox;
use crate::actors::protocol::{CoordinationError, Message};
use crate::actors::registry::{
    protocol::{ActorSpec, LoopExit, RegistryMsg},
    state::{ActorTable, DEFAULT_HISTORY_LIMIT},
    RegistryHandle,
};
use crate::tools::ToolCatalog;

#[derive(Debug, Default)]
pub struct RegistryActor;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Time a killed actor gets to unwind before it is aborted
    pub kill_grace: Duration,
    /// Non-terminal actors allowed at once; creation beyond it is refused
    pub max_live_actors: usize,
    /// Age after which finished actors are reaped by the periodic sweep
    pub reap_after: Duration,
    /// Sweep period; zero disables the sweep
    pub reap_interval: Duration,
    pub history_limit: usize,
    /// When false, `spawn_actor` is refused for every caller
    pub actors_enabled: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_secs(5),
            max_live_actors: 32,
            reap_after: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(60),
            history_limit: DEFAULT_HISTORY_LIMIT,
            actors_enabled: true,
        }
    }
}

#[derive(Clone)]
pub struct RegistryArguments {
    pub config: RegistryConfig,
    /// Capabilities actors can be granted
    pub catalog: Arc<ToolCatalog>,
    /// Builds bodies for actors created through `spawn_actor`
    pub workers: Option<SharedWorkerFactory>,
}

pub struct RegistryState {
    table: ActorTable,
    config: RegistryConfig,
    catalog: Arc<ToolCatalog>,
    workers: Option<SharedWorkerFactory>,
    /// Pending hard-stop timers by target
    hard_stops: HashMap<ActorId, JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

#[async_trait]
impl Actor for RegistryActor {
    type Msg = RegistryMsg;
    type State = RegistryState;
    type Arguments = RegistryArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            max_live_actors = args.config.max_live_actors,
            kill_grace_ms = args.config.kill_grace.as_millis() as u64,
            "RegistryActor starting"
        );

        let sweeper = if args.config.reap_interval.is_zero() {
            None
        } else {
            Some(spawn_sweeper(
                myself.clone(),
                args.config.reap_interval,
                args.config.reap_after,
            ))
        };

        Ok(RegistryState {
            table: ActorTable::new(args.config.history_limit),
            config: args.config,
            catalog: args.catalog,
            workers: args.workers,
            hard_stops: HashMap::new(),
            sweeper,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RegistryMsg::Create { spec, body, reply } => {
                let result = self.handle_create(&myself, state, spec, body.0);
                let _ = reply.send(result);
            }
            RegistryMsg::Get { id, reply } => {
                let _ = reply.send(state.table.get(&id).map(|entry| entry.view()));
            }
            RegistryMsg::List { group, reply } => {
                let _ = reply.send(state.table.list(&group));
            }
            RegistryMsg::Remove { id, reply } => {
                let result = self.handle_remove(state, &id);
                let _ = reply.send(result);
            }
            RegistryMsg::Kill { id, reply } => {
                let result = self.handle_kill(&myself, state, &id);
                let _ = reply.send(result);
            }
            RegistryMsg::MailboxOf { id, reply } => {
                let _ = reply.send(state.table.get(&id).map(|entry| entry.mailbox.clone()));
            }
            RegistryMsg::History { id, reply } => {
                let _ = reply.send(state.table.get(&id).map(|entry| entry.history()));
            }
            RegistryMsg::Stats { reply } => {
                let _ = reply.send(state.table.stats());
            }
            RegistryMsg::LiveIds { reply } => {
                let _ = reply.send(state.table.live_ids());
            }
            RegistryMsg::CollectGarbage { max_age, reply } => {
                let reaped = self.handle_collect_garbage(state, max_age);
                if let Some(reply) = reply {
                    let _ = reply.send(reaped);
                }
            }
            RegistryMsg::Started { id } => {
                if let Err(err) = state.table.transition(&id, ActorStatus::Running, None, None) {
                    tracing::debug!(actor_id = %id, error = %err, "Ignoring start notice");
                }
            }
            RegistryMsg::SetStatus { id, status } => {
                self.handle_set_status(state, &id, status);
            }
            RegistryMsg::Progress { id, summary } => {
                if let Err(err) = state.table.record_progress(&id, summary) {
                    tracing::debug!(actor_id = %id, error = %err, "Ignoring progress report");
                }
            }
            RegistryMsg::Touch { id } => {
                state.table.touch(&id);
            }
            RegistryMsg::LoopExited { id, exit } => {
                self.handle_loop_exited(state, &id, exit);
            }
            RegistryMsg::HardStop { id } => {
                self.handle_hard_stop(state, &id);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(sweeper) = state.sweeper.take() {
            sweeper.abort();
        }
        for (_, timer) in state.hard_stops.drain() {
            timer.abort();
        }
        let live = state.table.live_ids();
        for id in &live {
            if let Ok(entry) = state.table.get_mut(id) {
                entry.cancel.cancel();
                if let Some(abort) = entry.abort.take() {
                    abort.abort();
                }
                entry.mailbox.close();
            }
        }
        tracing::info!(
            actor_id = %myself.get_id(),
            aborted = live.len(),
            "RegistryActor stopped"
        );
        Ok(())
    }
}

impl RegistryActor {
    fn handle_create(
        &self,
        myself: &ActorRef<RegistryMsg>,
        state: &mut RegistryState,
        spec: ActorSpec,
        body: Box<dyn ActorBody>,
    ) -> Result<ActorId, CoordinationError> {
        state.catalog.check_grant(spec.kind, &spec.allowed_tools)?;

        let live = state.table.live_count();
        if live >= state.config.max_live_actors {
            tracing::warn!(
                live,
                limit = state.config.max_live_actors,
                kind = %spec.kind,
                "Refusing to create actor: capacity exhausted"
            );
            return Err(CoordinationError::CapacityExhausted(format!(
                "{live} actors are live (limit {})",
                state.config.max_live_actors
            )));
        }

        let id = state.table.allocate_id(&spec);
        let mailbox = Arc::new(Mailbox::new(id.clone()));
        let cancel = CancellationToken::new();
        let registry = RegistryHandle::new(myself.clone());
        let coordinator = Coordinator::new(
            id.clone(),
            registry.clone(),
            mailbox.clone(),
            cancel.clone(),
            state.workers.clone(),
            state.config.actors_enabled,
        );
        let ctx = ActorContext::new(
            id.clone(),
            spec.kind,
            spec.goals.clone(),
            spec.group.clone(),
            mailbox.clone(),
            cancel.clone(),
            registry,
            state.catalog.scoped(&spec.allowed_tools),
            coordinator,
        );

        tracing::info!(
            actor_id = %id,
            kind = %spec.kind,
            group = ?spec.group,
            parent = ?spec.parent,
            tools = ?spec.allowed_tools,
            "Actor created"
        );

        let entry = state.table.insert(id.clone(), spec, mailbox, cancel);
        entry.abort = Some(launch_body(id.clone(), body, ctx, myself.clone()));
        Ok(id)
    }

    fn handle_kill(
        &self,
        myself: &ActorRef<RegistryMsg>,
        state: &mut RegistryState,
        id: &ActorId,
    ) -> Result<KillAck, CoordinationError> {
        let entry = state.table.get_mut(id)?;
        let status = entry.status;
        if status.is_terminal() {
            return Ok(KillAck {
                id: id.clone(),
                status,
                already_finished: true,
                already_requested: false,
            });
        }
        if entry.kill_requested_at.is_some() {
            return Ok(KillAck {
                id: id.clone(),
                status,
                already_finished: false,
                already_requested: true,
            });
        }

        entry.kill_requested_at = Some(chrono::Utc::now());
        entry.cancel.cancel();
        state.table.record_event(id, ActorEventKind::KillRequested, None);
        tracing::info!(actor_id = %id, status = %status, "Kill requested");

        if status == ActorStatus::Starting {
            // Body has not been observed running yet; nothing to wait for.
            if let Ok(entry) = state.table.get_mut(id) {
                if let Some(abort) = entry.abort.take() {
                    abort.abort();
                }
            }
            self.finish(state, id, ActorStatus::Killed, None, Some("killed before start".to_string()));
        } else {
            let grace = state.config.kill_grace;
            let registry = myself.clone();
            let target = id.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = registry.cast(RegistryMsg::HardStop { id: target });
            });
            state.hard_stops.insert(id.clone(), timer);
        }

        let status = state.table.get(id).map(|entry| entry.status)?;
        Ok(KillAck {
            id: id.clone(),
            status,
            already_finished: false,
            already_requested: false,
        })
    }

    fn handle_hard_stop(&self, state: &mut RegistryState, id: &ActorId) {
        state.hard_stops.remove(id);
        let Ok(entry) = state.table.get_mut(id) else {
            return;
        };
        if entry.status.is_terminal() {
            return;
        }
        if let Some(abort) = entry.abort.take() {
            abort.abort();
        }
        tracing::warn!(
            actor_id = %id,
            grace_ms = state.config.kill_grace.as_millis() as u64,
            "Actor ignored cancellation; hard stopping"
        );
        state.table.record_event(id, ActorEventKind::HardStopped, None);
        self.finish(
            state,
            id,
            ActorStatus::Killed,
            None,
            Some("hard stopped after grace period".to_string()),
        );
    }

    fn handle_set_status(&self, state: &mut RegistryState, id: &ActorId, status: ActorStatus) {
        if !matches!(status, ActorStatus::Running | ActorStatus::WaitingOnTool) {
            tracing::warn!(
                actor_id = %id,
                status = %status,
                "Rejected status report; terminal statuses come from loop exit"
            );
            return;
        }
        let current = match state.table.get(id) {
            Ok(entry) => entry.status,
            Err(_) => return,
        };
        if current == status {
            return;
        }
        if let Err(err) = state.table.transition(id, status, None, None) {
            tracing::warn!(actor_id = %id, error = %err, "Rejected illegal status transition");
        }
    }

    fn handle_loop_exited(&self, state: &mut RegistryState, id: &ActorId, exit: LoopExit) {
        let (status, result, detail) = match exit {
            LoopExit::Completed(result) => (ActorStatus::Completed, Some(result), None),
            LoopExit::Failed(result) => (ActorStatus::Failed, Some(result), None),
            LoopExit::Cancelled => (
                ActorStatus::Killed,
                None,
                Some("cancelled cooperatively".to_string()),
            ),
            LoopExit::Aborted => (ActorStatus::Killed, None, Some("aborted".to_string())),
            LoopExit::Panicked(message) => (
                ActorStatus::Failed,
                Some(ActorResult::text(format!("reasoning loop panicked: {message}"))),
                None,
            ),
        };
        if let Ok(entry) = state.table.get_mut(id) {
            entry.abort = None;
        }
        self.finish(state, id, status, result, detail);
    }

    fn handle_remove(
        &self,
        state: &mut RegistryState,
        id: &ActorId,
    ) -> Result<shared_types::ActorView, CoordinationError> {
        let view = state.table.remove(id)?;
        if let Some(timer) = state.hard_stops.remove(id) {
            timer.abort();
        }
        tracing::info!(actor_id = %id, status = %view.status, "Actor removed");
        Ok(view)
    }

    fn handle_collect_garbage(&self, state: &mut RegistryState, max_age: Duration) -> Vec<ActorId> {
        let expired = state.table.expired(max_age, chrono::Utc::now());
        let mut reaped = Vec::with_capacity(expired.len());
        for id in expired {
            match self.handle_remove(state, &id) {
                Ok(_) => reaped.push(id),
                Err(err) => tracing::debug!(actor_id = %id, error = %err, "Skipping reap"),
            }
        }
        if !reaped.is_empty() {
            tracing::info!(count = reaped.len(), "Reaped finished actors");
        }
        reaped
    }

    /// Move to a terminal status and tell the parent
    fn finish(
        &self,
        state: &mut RegistryState,
        id: &ActorId,
        status: ActorStatus,
        result: Option<ActorResult>,
        detail: Option<String>,
    ) {
        match state.table.transition(id, status, result, detail) {
            Ok(transition) => {
                if let Some(timer) = state.hard_stops.remove(id) {
                    timer.abort();
                }
                tracing::info!(
                    actor_id = %id,
                    from = %transition.previous,
                    status = %transition.current,
                    "Actor finished"
                );
                notify_parent(state, id);
            }
            Err(err) => {
                tracing::debug!(actor_id = %id, error = %err, "Ignoring late terminal transition");
            }
        }
    }
}

fn notify_parent(state: &RegistryState, id: &ActorId) {
    let Ok(entry) = state.table.get(id) else {
        return;
    };
    let Some(parent) = entry.spec.parent.as_ref() else {
        return;
    };
    let Ok(parent_entry) = state.table.get(parent) else {
        return;
    };
    let body = MessageBody::ActorFinished {
        status: entry.status,
        result: entry.result.clone(),
    };
    if let Err(err) = parent_entry
        .mailbox
        .post(Message::new(id.clone(), parent.clone(), body))
    {
        tracing::debug!(actor_id = %id, parent = %parent, error = %err, "Parent not notified");
    }
}

/// Run `body` in its own task and report how it ended
fn launch_body(
    id: ActorId,
    body: Box<dyn ActorBody>,
    ctx: ActorContext,
    registry: ActorRef<RegistryMsg>,
) -> AbortHandle {
    let cancel = ctx.cancel_token().clone();
    let notifier = registry.clone();
    let started_id = id.clone();
    let inner = tokio::spawn(async move {
        if cancel.is_cancelled() {
            return Ok(ActorOutcome::Cancelled);
        }
        let _ = notifier.cast(RegistryMsg::Started { id: started_id });
        body.run(ctx).await
    });
    let abort = inner.abort_handle();

    tokio::spawn(async move {
        let exit = match inner.await {
            Ok(Ok(ActorOutcome::Completed(result))) => LoopExit::Completed(result),
            Ok(Ok(ActorOutcome::Cancelled)) | Ok(Err(BodyError::Cancelled)) => LoopExit::Cancelled,
            Ok(Err(err)) => LoopExit::Failed(ActorResult::text(err.to_string())),
            Err(join_err) if join_err.is_cancelled() => LoopExit::Aborted,
            Err(join_err) => LoopExit::Panicked(join_err.to_string()),
        };
        tracing::debug!(actor_id = %id, exit = ?exit, "Reasoning loop exited");
        let _ = registry.cast(RegistryMsg::LoopExited { id, exit });
    });

    abort
}

fn spawn_sweeper(
    registry: ActorRef<RegistryMsg>,
    period: Duration,
    max_age: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if registry
                .cast(RegistryMsg::CollectGarbage {
                    max_age,
                    reply: None,
                })
                .is_err()
            {
                break;
            }
        }
    })
}

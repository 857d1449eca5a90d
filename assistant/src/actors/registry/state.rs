//! RegistryActor state management
//!
//! Pure bookkeeping over the actor table: id allocation, status transitions,
//! group membership, lifecycle history and reaping. Owns no tasks; the actor
//! in `actor.rs` drives it.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared_types::{
    ActorEvent, ActorEventKind, ActorId, ActorResult, ActorStatus, ActorView, RegistryStats,
};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::actors::mailbox::Mailbox;
use crate::actors::protocol::CoordinationError;
use crate::actors::registry::protocol::ActorSpec;

/// Events kept per actor
pub const DEFAULT_HISTORY_LIMIT: usize = 32;

pub struct ActorEntry {
    seq: u64,
    pub id: ActorId,
    pub spec: ActorSpec,
    pub status: ActorStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: Option<String>,
    pub result: Option<ActorResult>,
    pub mailbox: Arc<Mailbox>,
    pub cancel: CancellationToken,
    pub kill_requested_at: Option<DateTime<Utc>>,
    pub abort: Option<AbortHandle>,
    history: VecDeque<ActorEvent>,
}

impl ActorEntry {
    pub fn view(&self) -> ActorView {
        ActorView {
            id: self.id.clone(),
            kind: self.spec.kind,
            group: self.spec.group.clone(),
            goals: self.spec.goals.clone(),
            allowed_tools: self.spec.allowed_tools.clone(),
            status: self.status,
            parent: self.spec.parent.clone(),
            created_at: self.created_at,
            last_active_at: self.last_active_at,
            finished_at: self.finished_at,
            progress: self.progress.clone(),
            result: self.result.clone(),
            mailbox_depth: self.mailbox.peek_count(),
            kill_requested: self.kill_requested_at.is_some(),
        }
    }

    pub fn history(&self) -> Vec<ActorEvent> {
        self.history.iter().cloned().collect()
    }
}

/// Result of an accepted status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: ActorStatus,
    pub current: ActorStatus,
}

pub struct ActorTable {
    entries: HashMap<ActorId, ActorEntry>,
    groups: HashMap<String, Vec<ActorId>>,
    /// Every id ever handed out, reaped or not
    issued: HashSet<ActorId>,
    next_seq: u64,
    reaped_total: u64,
    history_limit: usize,
}

impl Default for ActorTable {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ActorTable {
    pub fn new(history_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            groups: HashMap::new(),
            issued: HashSet::new(),
            next_seq: 0,
            reaped_total: 0,
            history_limit: history_limit.max(1),
        }
    }

    /// Fresh id that has never been issued by this table
    pub fn allocate_id(&mut self, spec: &ActorSpec) -> ActorId {
        loop {
            let id = ActorId::generate(spec.kind);
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Insert a new entry in `Starting`
    pub fn insert(
        &mut self,
        id: ActorId,
        spec: ActorSpec,
        mailbox: Arc<Mailbox>,
        cancel: CancellationToken,
    ) -> &mut ActorEntry {
        self.issued.insert(id.clone());
        let now = Utc::now();
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(group) = &spec.group {
            self.groups.entry(group.clone()).or_default().push(id.clone());
        }
        let detail = Some(format!("{} in group {:?}", spec.kind, spec.group));
        let mut entry = ActorEntry {
            seq,
            id: id.clone(),
            spec,
            status: ActorStatus::Starting,
            created_at: now,
            last_active_at: now,
            finished_at: None,
            progress: None,
            result: None,
            mailbox,
            cancel,
            kill_requested_at: None,
            abort: None,
            history: VecDeque::new(),
        };
        push_event(
            &mut entry.history,
            self.history_limit,
            ActorEvent::now(ActorEventKind::Created, detail),
        );
        self.entries.entry(id).or_insert(entry)
    }

    pub fn get(&self, id: &ActorId) -> Result<&ActorEntry, CoordinationError> {
        self.entries
            .get(id)
            .ok_or_else(|| CoordinationError::NotFound(id.clone()))
    }

    pub fn get_mut(&mut self, id: &ActorId) -> Result<&mut ActorEntry, CoordinationError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| CoordinationError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &ActorId) -> bool {
        self.entries.contains_key(id)
    }

    /// Group members that have not been reaped, oldest first
    pub fn list(&self, group: &str) -> Vec<ActorView> {
        let mut members: Vec<&ActorEntry> = self
            .groups
            .get(group)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id))
            .collect();
        members.sort_by_key(|entry| entry.seq);
        members.into_iter().map(ActorEntry::view).collect()
    }

    /// Entries that have not reached a terminal status
    pub fn live_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| !entry.status.is_terminal())
            .count()
    }

    pub fn live_ids(&self) -> Vec<ActorId> {
        let mut live: Vec<&ActorEntry> = self
            .entries
            .values()
            .filter(|entry| !entry.status.is_terminal())
            .collect();
        live.sort_by_key(|entry| entry.seq);
        live.into_iter().map(|entry| entry.id.clone()).collect()
    }

    /// Apply a lifecycle edge; illegal edges leave the entry untouched.
    pub fn transition(
        &mut self,
        id: &ActorId,
        next: ActorStatus,
        result: Option<ActorResult>,
        detail: Option<String>,
    ) -> Result<Transition, CoordinationError> {
        let history_limit = self.history_limit;
        let entry = self.get_mut(id)?;
        let previous = entry.status;
        if !previous.can_transition_to(next) {
            return Err(CoordinationError::InvalidState(format!(
                "{id}: {previous} -> {next} is not a legal transition"
            )));
        }

        let now = Utc::now();
        entry.status = next;
        entry.last_active_at = now;
        if next.is_terminal() {
            entry.finished_at = Some(now);
            entry.result = result;
            entry.abort = None;
        }

        let kind = match (previous, next) {
            (_, ActorStatus::Completed) => ActorEventKind::Completed,
            (_, ActorStatus::Failed) => ActorEventKind::Failed,
            (_, ActorStatus::Killed) => ActorEventKind::Killed,
            (ActorStatus::Starting, ActorStatus::Running) => ActorEventKind::Started,
            _ => ActorEventKind::Status,
        };
        let detail = detail.or_else(|| match kind {
            ActorEventKind::Status => Some(next.to_string()),
            _ => entry.result.as_ref().map(ActorResult::summary),
        });
        push_event(
            &mut entry.history,
            history_limit,
            ActorEvent::now(kind, detail),
        );

        Ok(Transition {
            previous,
            current: next,
        })
    }

    pub fn record_progress(
        &mut self,
        id: &ActorId,
        summary: String,
    ) -> Result<(), CoordinationError> {
        let history_limit = self.history_limit;
        let entry = self.get_mut(id)?;
        if entry.status.is_terminal() {
            return Err(CoordinationError::InvalidState(format!(
                "{id} already finished with status {}",
                entry.status
            )));
        }
        entry.last_active_at = Utc::now();
        entry.progress = Some(summary.clone());
        push_event(
            &mut entry.history,
            history_limit,
            ActorEvent::now(ActorEventKind::Progress, Some(summary)),
        );
        Ok(())
    }

    pub fn touch(&mut self, id: &ActorId) {
        if let Some(entry) = self.entries.get_mut(id) {
            if !entry.status.is_terminal() {
                entry.last_active_at = Utc::now();
            }
        }
    }

    pub fn record_event(&mut self, id: &ActorId, kind: ActorEventKind, detail: Option<String>) {
        let history_limit = self.history_limit;
        if let Some(entry) = self.entries.get_mut(id) {
            push_event(
                &mut entry.history,
                history_limit,
                ActorEvent::now(kind, detail),
            );
        }
    }

    /// Drop a terminal entry and close its mailbox. The id stays retired.
    pub fn remove(&mut self, id: &ActorId) -> Result<ActorView, CoordinationError> {
        let entry = self.get(id)?;
        if !entry.status.is_terminal() {
            return Err(CoordinationError::InvalidState(format!(
                "{id} is still {}; only finished actors can be removed",
                entry.status
            )));
        }
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| CoordinationError::NotFound(id.clone()))?;
        if let Some(group) = &entry.spec.group {
            if let Some(members) = self.groups.get_mut(group) {
                members.retain(|member| member != id);
                if members.is_empty() {
                    self.groups.remove(group);
                }
            }
        }
        let view = entry.view();
        entry.mailbox.close();
        self.reaped_total += 1;
        Ok(view)
    }

    /// Terminal entries whose `finished_at` is at least `max_age` in the past
    pub fn expired(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<ActorId> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::max_value());
        let mut expired: Vec<&ActorEntry> = self
            .entries
            .values()
            .filter(|entry| match entry.finished_at {
                Some(finished_at) => now - finished_at >= max_age,
                None => false,
            })
            .collect();
        expired.sort_by_key(|entry| entry.seq);
        expired.into_iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        for entry in self.entries.values() {
            *by_status.entry(entry.status.to_string()).or_default() += 1;
        }
        RegistryStats {
            by_status,
            live: self.live_count(),
            reaped_total: self.reaped_total,
            issued_total: self.issued.len() as u64,
        }
    }
}

fn push_event(history: &mut VecDeque<ActorEvent>, limit: usize, event: ActorEvent) {
    history.push_back(event);
    while history.len() > limit {
        history.pop_front();
    }
}

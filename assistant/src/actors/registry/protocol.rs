//! RegistryActor message protocol

use std::sync::Arc;
use std::time::Duration;

use ractor::RpcReplyPort;
use shared_types::{
    ActorEvent, ActorId, ActorKind, ActorResult, ActorStatus, ActorView, KillAck, RegistryStats,
};

use crate::actors::context::BoxedBody;
use crate::actors::mailbox::Mailbox;
use crate::actors::protocol::CoordinationError;

/// Everything needed to create an actor apart from its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSpec {
    pub kind: ActorKind,
    pub goals: String,
    pub allowed_tools: Vec<String>,
    pub group: Option<String>,
    pub parent: Option<ActorId>,
}

impl ActorSpec {
    pub fn new(kind: ActorKind, goals: impl Into<String>, allowed_tools: Vec<String>) -> Self {
        Self {
            kind,
            goals: goals.into(),
            allowed_tools,
            group: None,
            parent: None,
        }
    }

    pub fn worker(goals: impl Into<String>, allowed_tools: Vec<String>) -> Self {
        Self::new(ActorKind::Worker, goals, allowed_tools)
    }

    pub fn in_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    pub fn with_parent(mut self, parent: ActorId) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// How the task running a body ended, as observed by its supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    Completed(ActorResult),
    Failed(ActorResult),
    /// Body honoured its cancellation token
    Cancelled,
    /// Body task was aborted by a hard stop
    Aborted,
    Panicked(String),
}

#[derive(Debug)]
pub enum RegistryMsg {
    Create {
        spec: ActorSpec,
        body: BoxedBody,
        reply: RpcReplyPort<Result<ActorId, CoordinationError>>,
    },
    Get {
        id: ActorId,
        reply: RpcReplyPort<Result<ActorView, CoordinationError>>,
    },
    /// Members of a group ordered by creation
    List {
        group: String,
        reply: RpcReplyPort<Vec<ActorView>>,
    },
    /// Only terminal actors can be removed
    Remove {
        id: ActorId,
        reply: RpcReplyPort<Result<ActorView, CoordinationError>>,
    },
    Kill {
        id: ActorId,
        reply: RpcReplyPort<Result<KillAck, CoordinationError>>,
    },
    MailboxOf {
        id: ActorId,
        reply: RpcReplyPort<Result<Arc<Mailbox>, CoordinationError>>,
    },
    History {
        id: ActorId,
        reply: RpcReplyPort<Result<Vec<ActorEvent>, CoordinationError>>,
    },
    Stats {
        reply: RpcReplyPort<RegistryStats>,
    },
    /// Ids of every entry that has not reached a terminal status
    LiveIds {
        reply: RpcReplyPort<Vec<ActorId>>,
    },
    /// Reap terminal entries finished at least `max_age` ago
    CollectGarbage {
        max_age: Duration,
        reply: Option<RpcReplyPort<Vec<ActorId>>>,
    },
    // Casts from the body's own task and from its supervisor
    Started {
        id: ActorId,
    },
    SetStatus {
        id: ActorId,
        status: ActorStatus,
    },
    Progress {
        id: ActorId,
        summary: String,
    },
    Touch {
        id: ActorId,
    },
    LoopExited {
        id: ActorId,
        exit: LoopExit,
    },
    /// Grace period of a kill elapsed
    HardStop {
        id: ActorId,
    },
}

//! ConversationManager - debounced delivery of user input to the executive
//!
//! Per conversation the window is either Idle or Armed. The first message of
//! a fresh turn is delivered at once and arms the window; messages arriving
//! while Armed are buffered and each one pushes the deadline out again. When
//! the deadline passes the buffer is delivered as one [`UserTurn`] and the
//! window returns to Idle.
//!
//! ```text
//! Idle --msg--> deliver, Armed(now + debounce)
//! Armed --msg--> buffer, Armed(now + debounce)
//! Armed --expiry--> deliver buffer (if any), Idle
//! ```
//!
//! An arrival that finds the deadline already passed closes the old window
//! first, so a late expiry message never holds back a fresh turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde_json::{Map, Value};
use shared_types::{ActorId, MessageBody, UserTurn};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::actors::mailbox::Mailbox;
use crate::actors::protocol::{CoordinationError, Message};

/// Separator between texts folded into one turn
const PART_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq)]
struct PendingInput {
    text: String,
    metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Idle,
    Armed { deadline: Instant },
}

/// What an arrival did to the window
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    /// Batch of an expired window this arrival closed; deliver it first
    pub flushed: Option<UserTurn>,
    /// Set for the first message of a fresh turn
    pub immediate: Option<UserTurn>,
    pub deadline: Instant,
    /// Identifies the deadline; expiries carrying an older value are stale
    pub generation: u64,
}

/// Coalescing state of one conversation, independent of timers
#[derive(Debug)]
pub struct CoalescingWindow {
    conversation_id: String,
    debounce: Duration,
    state: WindowState,
    buffer: Vec<PendingInput>,
    generation: u64,
}

impl CoalescingWindow {
    pub fn new(conversation_id: impl Into<String>, debounce: Duration) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            debounce,
            state: WindowState::Idle,
            buffer: Vec::new(),
            generation: 0,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, WindowState::Armed { .. })
    }

    pub fn pending_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn on_message(&mut self, text: String, metadata: Map<String, Value>, now: Instant) -> Arrival {
        let flushed = match self.state {
            WindowState::Armed { deadline } if now >= deadline => self.close(),
            _ => None,
        };
        let deadline = now + self.debounce;
        self.generation += 1;
        let input = PendingInput { text, metadata };

        let immediate = match self.state {
            WindowState::Idle => Some(combine(&self.conversation_id, vec![input])),
            WindowState::Armed { .. } => {
                self.buffer.push(input);
                None
            }
        };
        self.state = WindowState::Armed { deadline };

        Arrival {
            flushed,
            immediate,
            deadline,
            generation: self.generation,
        }
    }

    /// Close the window if `generation` is current and its deadline has passed.
    ///
    /// Returns the batched turn when something was buffered.
    pub fn on_expiry(&mut self, generation: u64, now: Instant) -> Option<UserTurn> {
        let WindowState::Armed { deadline } = self.state else {
            return None;
        };
        if generation != self.generation || now < deadline {
            return None;
        }
        self.close()
    }

    fn close(&mut self) -> Option<UserTurn> {
        self.state = WindowState::Idle;
        let batch = std::mem::take(&mut self.buffer);
        if batch.is_empty() {
            None
        } else {
            Some(combine(&self.conversation_id, batch))
        }
    }

    /// Drop buffered input and return to Idle; true if anything was pending
    pub fn cancel(&mut self) -> bool {
        let had_pending = !self.buffer.is_empty();
        self.buffer.clear();
        self.state = WindowState::Idle;
        self.generation += 1;
        had_pending
    }
}

fn combine(conversation_id: &str, batch: Vec<PendingInput>) -> UserTurn {
    let parts = batch.len();
    let mut texts = Vec::with_capacity(parts);
    let mut metadata = Map::new();
    for input in batch {
        texts.push(input.text);
        metadata.extend(input.metadata);
    }
    UserTurn {
        conversation_id: conversation_id.to_string(),
        text: texts.join(PART_SEPARATOR),
        parts,
        metadata,
    }
}

/// Where coalesced turns go
pub trait TurnSink: Send + Sync {
    fn deliver(&self, turn: UserTurn) -> Result<(), CoordinationError>;
}

/// Posts turns into the executive's mailbox
pub struct MailboxTurnSink {
    executive: ActorId,
    mailbox: Arc<Mailbox>,
}

impl MailboxTurnSink {
    pub fn new(executive: ActorId, mailbox: Arc<Mailbox>) -> Self {
        Self { executive, mailbox }
    }
}

impl TurnSink for MailboxTurnSink {
    fn deliver(&self, turn: UserTurn) -> Result<(), CoordinationError> {
        let from = ActorId::user(&turn.conversation_id);
        let message = Message::new(from, self.executive.clone(), MessageBody::UserTurn(turn));
        self.mailbox.post(message).map(|_| ())
    }
}

#[derive(Debug, Default)]
pub struct ConversationManager;

#[derive(Clone)]
pub struct ConversationArguments {
    pub debounce: Duration,
    pub sink: Arc<dyn TurnSink>,
}

#[derive(Debug)]
pub enum ConversationMsg {
    Inbound {
        conversation_id: String,
        text: String,
        metadata: Map<String, Value>,
    },
    WindowExpired {
        conversation_id: String,
        generation: u64,
    },
    Cancel {
        conversation_id: String,
        reply: RpcReplyPort<bool>,
    },
    PendingCount {
        conversation_id: String,
        reply: RpcReplyPort<usize>,
    },
    IsArmed {
        conversation_id: String,
        reply: RpcReplyPort<bool>,
    },
}

struct Slot {
    window: CoalescingWindow,
    timer: Option<JoinHandle<()>>,
}

impl Slot {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub struct ConversationState {
    debounce: Duration,
    sink: Arc<dyn TurnSink>,
    slots: HashMap<String, Slot>,
}

#[async_trait]
impl Actor for ConversationManager {
    type Msg = ConversationMsg;
    type State = ConversationState;
    type Arguments = ConversationArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            debounce_ms = args.debounce.as_millis() as u64,
            "ConversationManager starting"
        );
        Ok(ConversationState {
            debounce: args.debounce,
            sink: args.sink,
            slots: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConversationMsg::Inbound {
                conversation_id,
                text,
                metadata,
            } => {
                let debounce = state.debounce;
                let slot = state
                    .slots
                    .entry(conversation_id.clone())
                    .or_insert_with(|| Slot {
                        window: CoalescingWindow::new(conversation_id.clone(), debounce),
                        timer: None,
                    });
                let arrival = slot.window.on_message(text, metadata, Instant::now());
                slot.disarm();
                slot.timer = Some(spawn_expiry(
                    myself.clone(),
                    conversation_id.clone(),
                    arrival.deadline,
                    arrival.generation,
                ));

                if let Some(turn) = arrival.flushed {
                    tracing::info!(
                        conversation_id = %conversation_id,
                        parts = turn.parts,
                        "Delivering batch of an expired window"
                    );
                    deliver(state.sink.as_ref(), turn);
                }
                match arrival.immediate {
                    Some(turn) => {
                        tracing::info!(conversation_id = %conversation_id, "Delivering first message immediately");
                        deliver(state.sink.as_ref(), turn);
                    }
                    None => tracing::debug!(
                        conversation_id = %conversation_id,
                        pending = slot.window.pending_count(),
                        "Buffered follow-up message; window extended"
                    ),
                }
            }
            ConversationMsg::WindowExpired {
                conversation_id,
                generation,
            } => {
                let Some(slot) = state.slots.get_mut(&conversation_id) else {
                    return Ok(());
                };
                if let Some(turn) = slot.window.on_expiry(generation, Instant::now()) {
                    tracing::info!(
                        conversation_id = %conversation_id,
                        parts = turn.parts,
                        "Delivering batched messages"
                    );
                    deliver(state.sink.as_ref(), turn);
                }
                if !slot.window.is_armed() {
                    slot.timer = None;
                    state.slots.remove(&conversation_id);
                }
            }
            ConversationMsg::Cancel {
                conversation_id,
                reply,
            } => {
                let cancelled = match state.slots.remove(&conversation_id) {
                    Some(mut slot) => {
                        slot.disarm();
                        slot.window.cancel()
                    }
                    None => false,
                };
                if cancelled {
                    tracing::info!(conversation_id = %conversation_id, "Cancelled buffered messages");
                }
                let _ = reply.send(cancelled);
            }
            ConversationMsg::PendingCount {
                conversation_id,
                reply,
            } => {
                let count = state
                    .slots
                    .get(&conversation_id)
                    .map(|slot| slot.window.pending_count())
                    .unwrap_or(0);
                let _ = reply.send(count);
            }
            ConversationMsg::IsArmed {
                conversation_id,
                reply,
            } => {
                let armed = state
                    .slots
                    .get(&conversation_id)
                    .is_some_and(|slot| slot.window.is_armed());
                let _ = reply.send(armed);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for (_, mut slot) in state.slots.drain() {
            slot.disarm();
        }
        tracing::info!(actor_id = %myself.get_id(), "ConversationManager stopped");
        Ok(())
    }
}

fn deliver(sink: &dyn TurnSink, turn: UserTurn) {
    let conversation_id = turn.conversation_id.clone();
    if let Err(err) = sink.deliver(turn) {
        tracing::warn!(conversation_id = %conversation_id, error = %err, "Failed to deliver user turn");
    }
}

fn spawn_expiry(
    manager: ActorRef<ConversationMsg>,
    conversation_id: String,
    deadline: Instant,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let _ = manager.cast(ConversationMsg::WindowExpired {
            conversation_id,
            generation,
        });
    })
}

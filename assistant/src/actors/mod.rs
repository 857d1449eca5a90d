pub mod agent_loop;
pub mod background;
pub mod context;
pub mod conversation;
pub mod coordination;
pub mod executive;
pub mod heartbeat;
pub mod mailbox;
pub mod protocol;
pub mod registry;
pub mod worker;

pub use agent_loop::AgentLoop;
pub use context::{ActorBody, ActorContext, ActorOutcome, BodyError};
pub use conversation::{ConversationManager, ConversationMsg, MailboxTurnSink, TurnSink};
pub use coordination::{Coordinator, SharedWorkerFactory, WorkerFactory};
pub use heartbeat::{HeartbeatActor, HeartbeatMsg, HeartbeatRound};
pub use mailbox::{Mailbox, ReceiveFilter};
pub use protocol::{CoordinationError, Message};
pub use registry::{ActorSpec, RegistryActor, RegistryConfig, RegistryHandle};

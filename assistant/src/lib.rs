//! Assistant - actor coordination runtime for an always-on assistant
//!
//! One executive actor talks to the user, one background thinker runs on a
//! heartbeat, and short-lived workers are spawned, pinged, messaged and
//! killed through the coordination verbs. All actor state lives in a single
//! registry actor; user input reaches the executive through a debouncing
//! conversation manager.

pub mod actors;
pub mod config;
pub mod gateway;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tools;

pub use config::RuntimeConfig;
pub use runtime::{AssistantRuntime, Collaborators, RuntimeError};

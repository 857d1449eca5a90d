//! Transport collaborator - the only way out to the user

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Text { text: String },
    File { path: PathBuf, caption: Option<String> },
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Outbound::Text { text: text.into() }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver_to_user(
        &self,
        conversation_id: &str,
        outbound: Outbound,
    ) -> Result<(), TransportError>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// Conversation the executive is currently answering
#[derive(Debug, Clone, Default)]
pub struct ConversationFocus(Arc<Mutex<Option<String>>>);

impl ConversationFocus {
    pub fn set(&self, conversation_id: &str) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(conversation_id.to_string());
    }

    pub fn current(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Writes outbound traffic to stdout
#[derive(Debug, Default)]
pub struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn deliver_to_user(
        &self,
        conversation_id: &str,
        outbound: Outbound,
    ) -> Result<(), TransportError> {
        let line = match outbound {
            Outbound::Text { text } => format!("[{conversation_id}] {text}\n"),
            Outbound::File { path, caption } => format!(
                "[{conversation_id}] file {}{}\n",
                path.display(),
                caption.map(|c| format!(" ({c})")).unwrap_or_default()
            ),
        };
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| TransportError(e.to_string()))
    }
}

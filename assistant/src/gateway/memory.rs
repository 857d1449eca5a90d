//! Memory collaborator
//!
//! Named core blocks that are read and rewritten whole, an archival store
//! searched by relevance, and the conversation log. The runtime only needs
//! the trait; [`InMemoryMemoryStore`] backs tests and the default binary.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("memory block not found: {0}")]
    BlockNotFound(String),
    #[error("memory backend error: {0}")]
    Backend(String),
}

/// One ranked search result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub content: String,
    pub score: f64,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn read_block(&self, name: &str) -> Result<String, MemoryError>;
    async fn update_block(&self, name: &str, content: &str) -> Result<(), MemoryError>;
    async fn append_block(&self, name: &str, content: &str) -> Result<(), MemoryError>;
    async fn archival_search(&self, query: &str, limit: usize)
        -> Result<Vec<SearchHit>, MemoryError>;
    async fn archival_insert(&self, content: &str) -> Result<(), MemoryError>;
    async fn conversation_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MemoryError>;
    /// Append a line to the conversation log searched by `conversation_search`
    async fn record_turn(&self, role: &str, content: &str) -> Result<(), MemoryError>;
}

pub type SharedMemoryStore = Arc<dyn MemoryStore>;

#[derive(Debug, Clone)]
struct Record {
    content: String,
    at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    blocks: RwLock<BTreeMap<String, String>>,
    archival: RwLock<Vec<Record>>,
    conversation: RwLock<Vec<Record>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given core blocks
    pub fn with_blocks<I, K, V>(blocks: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let blocks = blocks
            .into_iter()
            .map(|(name, content)| (name.into(), content.into()))
            .collect();
        Self {
            blocks: RwLock::new(blocks),
            ..Self::default()
        }
    }
}

/// Fraction of query terms present in `content`, case-insensitive
fn relevance(query_terms: &[String], content: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    let matched = query_terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .count();
    matched as f64 / query_terms.len() as f64
}

fn rank(records: &[Record], query: &str, limit: usize) -> Vec<SearchHit> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let mut hits: Vec<SearchHit> = records
        .iter()
        .filter_map(|record| {
            let score = relevance(&terms, &record.content);
            (score > 0.0).then(|| SearchHit {
                content: record.content.clone(),
                score,
                at: record.at,
            })
        })
        .collect();
    // Highest score first, newest first among equals.
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.at.cmp(&a.at))
    });
    hits.truncate(limit);
    hits
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn read_block(&self, name: &str) -> Result<String, MemoryError> {
        self.blocks
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| MemoryError::BlockNotFound(name.to_string()))
    }

    async fn update_block(&self, name: &str, content: &str) -> Result<(), MemoryError> {
        self.blocks
            .write()
            .await
            .insert(name.to_string(), content.to_string());
        Ok(())
    }

    async fn append_block(&self, name: &str, content: &str) -> Result<(), MemoryError> {
        let mut blocks = self.blocks.write().await;
        let block = blocks.entry(name.to_string()).or_default();
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(content);
        Ok(())
    }

    async fn archival_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        Ok(rank(&self.archival.read().await, query, limit))
    }

    async fn archival_insert(&self, content: &str) -> Result<(), MemoryError> {
        self.archival.write().await.push(Record {
            content: content.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn conversation_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        Ok(rank(&self.conversation.read().await, query, limit))
    }

    async fn record_turn(&self, role: &str, content: &str) -> Result<(), MemoryError> {
        self.conversation.write().await.push(Record {
            content: format!("{role}: {content}"),
            at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocks_read_update_append() {
        let store = InMemoryMemoryStore::with_blocks([("persona", "helpful")]);
        assert_eq!(store.read_block("persona").await.unwrap(), "helpful");
        assert_eq!(
            store.read_block("human").await.unwrap_err(),
            MemoryError::BlockNotFound("human".to_string())
        );

        store.append_block("persona", "concise").await.unwrap();
        assert_eq!(store.read_block("persona").await.unwrap(), "helpful\nconcise");

        store.update_block("persona", "terse").await.unwrap();
        assert_eq!(store.read_block("persona").await.unwrap(), "terse");
    }

    #[tokio::test]
    async fn test_archival_search_ranks_by_term_overlap() {
        let store = InMemoryMemoryStore::new();
        store.archival_insert("the user likes green tea").await.unwrap();
        store.archival_insert("meeting moved to friday").await.unwrap();
        store.archival_insert("green tea, not black tea").await.unwrap();

        let hits = store.archival_search("green tea friday", 5).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[0].content.contains("green"));

        let limited = store.archival_search("tea", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert!(store.archival_search("pizza", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_search_sees_recorded_turns() {
        let store = InMemoryMemoryStore::new();
        store.record_turn("user", "book a table for two").await.unwrap();
        store.record_turn("assistant", "which restaurant?").await.unwrap();
        let hits = store.conversation_search("table", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "user: book a table for two");
    }
}

//! Memory operations
//!
//! The tools don't care which service stores memories; they talk to a
//! `MemoryBackend`. Failures are logged here and flattened: a failed add is
//! `false`, a failed search is an empty result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Trait for memory services so tools don't care about implementation
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Store `content` for `subject`.
    async fn add(&self, content: &str, subject: &str) -> Result<(), MemoryError>;

    /// Ranked memories of `subject` matching `query`.
    async fn search(&self, query: &str, subject: &str) -> Result<Vec<MemoryRecord>, MemoryError>;
}

/// A memory returned from search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub text: String,
    pub relevance_score: f64,
}

impl MemoryRecord {
    pub fn new(text: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            text: text.into(),
            relevance_score,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Memory service request failed: {0}")]
    Transport(String),

    #[error("Memory service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected memory service response: {0}")]
    Decode(String),
}

/// Store a memory. Returns whether the service accepted it.
pub async fn add_memory(backend: &dyn MemoryBackend, content: &str, subject: &str) -> bool {
    match backend.add(content, subject).await {
        Ok(()) => {
            debug!("Stored memory for {}", subject);
            true
        }
        Err(e) => {
            error!("Failed to add memory for {}: {}", subject, e);
            false
        }
    }
}

/// Search memories. Service failures look exactly like an empty result.
pub async fn search_memories(
    backend: &dyn MemoryBackend,
    query: &str,
    subject: &str,
) -> Vec<MemoryRecord> {
    match backend.search(query, subject).await {
        Ok(records) => {
            debug!("Found {} memories for {}", records.len(), subject);
            records
        }
        Err(e) => {
            error!("Failed to search memories for {}: {}", subject, e);
            Vec::new()
        }
    }
}

/// Render search results as the tool's text output.
pub fn format_memories(records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return "No memories found".to_string();
    }
    records
        .iter()
        // `{:?}` keeps the fractional part, so 1.0 reads "1.0" rather than "1"
        .map(|m| format!("Memory: {}\nRelevance: {:?}\n---", m.text, m.relevance_score))
        .collect::<Vec<_>>()
        .join("\n")
}

//! Mem0 platform client
//!
//! Two endpoints are used:
//! - `POST /v1/memories/` stores a message for a `user_id`
//! - `POST /v1/memories/search/` returns ranked matches for a query
//!
//! The API key is not validated up front. Without one, requests simply fail
//! at the service and the tools report that failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use shellmem_core::{MemoryBackend, MemoryError, MemoryRecord};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.mem0.ai";

/// Connection settings for the memory service
#[derive(Debug, Clone)]
pub struct Mem0Config {
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

impl Default for Mem0Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
        }
    }
}

/// One search hit as the service returns it
#[derive(Debug, Clone, Deserialize)]
pub struct Mem0Memory {
    pub id: Option<String>,
    pub memory: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Mem0Memory> for MemoryRecord {
    fn from(m: Mem0Memory) -> Self {
        MemoryRecord::new(m.memory, m.score.unwrap_or(0.0))
    }
}

/// Search responses come either bare or wrapped in `results`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { results: Vec<Mem0Memory> },
    Bare(Vec<Mem0Memory>),
}

impl SearchResponse {
    fn into_memories(self) -> Vec<Mem0Memory> {
        match self {
            SearchResponse::Wrapped { results } => results,
            SearchResponse::Bare(results) => results,
        }
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

pub struct Mem0Client {
    client: reqwest::Client,
    config: Mem0Config,
}

impl Mem0Client {
    pub fn new(config: Mem0Config) -> Result<Self, MemoryError> {
        if config.api_key.is_none() {
            warn!("No memory service API key configured; memory tools will fail");
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("shellmem/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MemoryError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(self.endpoint(path))
            .header("Content-Type", "application/json");
        match &self.config.api_key {
            Some(key) => builder.header("Authorization", format!("Token {}", key.expose_secret())),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, MemoryError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| MemoryError::Transport(e.to_string()))?;

        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(MemoryError::Status { status, body })
        }
    }

    /// Full search hits, including service-side ids and timestamps
    pub async fn search_hits(&self, query: &str, user_id: &str) -> Result<Vec<Mem0Memory>, MemoryError> {
        let body = serde_json::json!({
            "query": query,
            "user_id": user_id,
        });
        let resp = self.send(self.post("/v1/memories/search/").json(&body)).await?;
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| MemoryError::Decode(e.to_string()))?;
        Ok(parsed.into_memories())
    }
}

#[async_trait]
impl MemoryBackend for Mem0Client {
    async fn add(&self, content: &str, subject: &str) -> Result<(), MemoryError> {
        let body = serde_json::json!({
            "messages": [{ "role": "user", "content": content }],
            "user_id": subject,
        });
        self.send(self.post("/v1/memories/").json(&body)).await?;
        debug!("Memory service accepted memory for {}", subject);
        Ok(())
    }

    async fn search(&self, query: &str, subject: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let hits = self.search_hits(query, subject).await?;
        Ok(hits.into_iter().map(MemoryRecord::from).collect())
    }
}

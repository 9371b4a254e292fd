//! Vector index collaborator.

use async_trait::async_trait;
use relay_core::{RelayError, RelayResult};
use relay_providers::retry::RetryPolicy;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One scored match from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    /// Similarity score of the match, higher is closer.
    pub score: f64,
    /// The chunk text.
    pub text: String,
    /// Topic tag assigned at ingestion time.
    pub topic: String,
}

/// Nearest-neighbor search over ingested document chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` closest matches with metadata, best first.
    async fn query(&self, vector: &[f32], top_k: usize) -> RelayResult<Vec<VectorMatch>>;
}

/// Pinecone-style HTTP vector index client (`POST {host}/query`).
pub struct PineconeIndex {
    api_key: SecretString,
    client: reqwest::Client,
    host: String,
    retry: RetryPolicy,
}

impl PineconeIndex {
    /// Create a client for the index served at `host`.
    ///
    /// # Errors
    /// Returns a configuration error if host or key is empty, or the HTTP
    /// client cannot be built.
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> RelayResult<Self> {
        let host = host.into();
        let api_key = api_key.into();
        if host.is_empty() || api_key.is_empty() {
            return Err(RelayError::configuration(
                "vector index host and API key must be set",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: SecretString::new(api_key),
            client,
            host,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> RelayResult<Vec<VectorMatch>> {
        let payload = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };
        let request = self
            .client
            .post(format!("{}/query", self.host))
            .header("Api-Key", self.api_key.expose_secret().as_str())
            .json(&payload);

        let body = self
            .retry
            .send(request, "pinecone")
            .await
            .map_err(|e| RelayError::retrieval(format!("vector index query failed: {e}")))?;

        let response: QueryResponse = serde_json::from_str(&body)
            .map_err(|e| RelayError::retrieval(format!("invalid vector index response: {e}")))?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                score: m.score,
                text: m.metadata.text,
                topic: m.metadata.topic,
            })
            .collect())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: QueryMetadata,
}

#[derive(Default, Deserialize)]
struct QueryMetadata {
    #[serde(default)]
    text: String,
    #[serde(default)]
    topic: String,
}

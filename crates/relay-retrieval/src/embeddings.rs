//! Embedding collaborator and its caching layer.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use relay_core::{sha256_hex, RelayError, RelayResult};
use relay_providers::retry::RetryPolicy;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const DEFAULT_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const EMBEDDING_CACHE_PREFIX: &str = "embeddingcache:";

/// Embeddings are re-derivable, so a week of caching is safe.
pub const EMBEDDING_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Turns text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> RelayResult<Vec<f32>>;
}

/// OpenAI embeddings API client.
pub struct OpenAiEmbeddings {
    api_key: SecretString,
    client: reqwest::Client,
    url: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiEmbeddings {
    /// Create a client with the default endpoint and model.
    ///
    /// # Errors
    /// Returns a configuration error if the key is empty or the HTTP client
    /// cannot be built.
    pub fn new(api_key: impl Into<String>) -> RelayResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RelayError::configuration(
                "embedding API key cannot be empty",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: SecretString::new(api_key),
            client,
            url: DEFAULT_EMBEDDINGS_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the endpoint URL (testing, proxies).
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Override the embedding model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> RelayResult<Vec<f32>> {
        let payload = EmbeddingRequest {
            input: text,
            model: &self.model,
        };
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload);

        let body = self.retry.send(request, "openai").await.map_err(|e| {
            RelayError::retrieval(format!("embedding API request failed: {e}"))
        })?;

        let response: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RelayError::retrieval(format!("invalid embedding response: {e}")))?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RelayError::retrieval("no embedding data returned from API"))
    }
}

/// Caching decorator over any [`Embedder`].
///
/// Embeddings are looked up by `embeddingcache:<sha256(text)>`; misses call
/// the inner embedder and populate the cache with a 7-day TTL. Cache failures
/// degrade to a plain call.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    conn: ConnectionManager,
}

impl CachedEmbedder {
    /// Wrap `inner` with the Redis-backed cache.
    #[must_use]
    pub fn new(inner: Arc<dyn Embedder>, conn: ConnectionManager) -> Self {
        Self { inner, conn }
    }

    fn cache_key(text: &str) -> String {
        format!("{EMBEDDING_CACHE_PREFIX}{}", sha256_hex(text))
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> RelayResult<Vec<f32>> {
        let key = Self::cache_key(text);
        let mut conn = self.conn.clone();

        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Vec<f32>>(&cached) {
                Ok(embedding) => {
                    debug!("embedding cache HIT");
                    return Ok(embedding);
                }
                Err(e) => warn!(error = %e, "discarding undecodable cached embedding"),
            },
            Ok(None) => debug!("embedding cache MISS"),
            Err(e) => warn!(error = %e, "embedding cache read failed"),
        }

        let embedding = self.inner.embed(text).await?;

        match serde_json::to_string(&embedding) {
            Ok(encoded) => {
                if let Err(e) = conn
                    .set_ex::<_, _, ()>(&key, encoded, EMBEDDING_CACHE_TTL_SECS)
                    .await
                {
                    warn!(error = %e, "embedding cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode embedding for cache"),
        }

        Ok(embedding)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn cache_key_is_content_addressed() {
        assert_eq!(
            CachedEmbedder::cache_key("hello"),
            format!("embeddingcache:{}", sha256_hex("hello"))
        );
        assert_ne!(
            CachedEmbedder::cache_key("hello"),
            CachedEmbedder::cache_key("hello "),
        );
    }

    #[tokio::test]
    async fn embed_parses_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbeddings::new("test-key")
            .unwrap()
            .with_url(server.uri());
        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn empty_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let embedder = OpenAiEmbeddings::new("test-key")
            .unwrap()
            .with_url(server.uri());
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("no embedding data"));
    }
}

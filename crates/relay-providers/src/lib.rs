//! # Relay Providers
//!
//! Provider adapters for the LLM gateway.
//!
//! Each adapter translates the uniform message / tool / usage model of
//! `relay-core` to and from one provider's wire dialect:
//! - OpenAI (GPT family) in `openai`
//! - Anthropic (Claude family) in `anthropic`
//! - Google AI (Gemini family) in `google`
//! - Mistral in `mistral`
//!
//! All adapters share the same failure semantics: transient errors (network,
//! 5xx) are retried with exponential backoff, 4xx is fatal, and every HTTP
//! attempt runs under a 120 s timeout.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod google;
pub mod mistral;
pub mod openai;
pub mod retry;
pub mod sse;

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use mistral::MistralClient;
pub use openai::OpenAiClient;
pub use retry::{RetryPolicy, DEFAULT_TIMEOUT};

use async_trait::async_trait;
use futures::stream::BoxStream;
use relay_core::{GenerationConfig, GenerationResult, Message, RelayError, RelayResult, StreamChunk, Tool};
use std::sync::Arc;

/// A lazily produced sequence of stream chunks. Yields at most one
/// [`StreamChunk::Usage`] or one `Err`, then terminates.
pub type GenerationStream = BoxStream<'static, RelayResult<StreamChunk>>;

/// The universal interface every model client implements.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Perform a standard, blocking generation request.
    ///
    /// `messages` must be non-empty and `config.model` must be set. `tools`
    /// may be empty.
    async fn generate(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> RelayResult<GenerationResult>;

    /// Perform a streaming generation request.
    async fn generate_stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> RelayResult<GenerationStream>;
}

/// Build the client for a model id based on its family prefix.
///
/// # Errors
/// Returns a configuration error for unknown model families or empty keys.
pub fn client_for_model(model_id: &str, api_key: &str) -> RelayResult<Arc<dyn ModelClient>> {
    if model_id.starts_with("gpt") {
        Ok(Arc::new(OpenAiClient::new(api_key)?))
    } else if model_id.starts_with("claude") {
        Ok(Arc::new(AnthropicClient::new(api_key)?))
    } else if model_id.starts_with("gemini") {
        Ok(Arc::new(GoogleClient::new(api_key)?))
    } else if model_id.starts_with("mistral") {
        Ok(Arc::new(MistralClient::new(api_key)?))
    } else {
        Err(RelayError::configuration(format!(
            "no provider family for model '{model_id}'"
        )))
    }
}

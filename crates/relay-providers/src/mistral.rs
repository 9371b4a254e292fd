//! Mistral provider adapter.
//!
//! Mistral's `/v1/chat/completions` dialect is OpenAI-shaped, so the
//! translation mirrors the OpenAI adapter with Mistral's auth headers.

use crate::retry::{open_stream, RetryPolicy, DEFAULT_TIMEOUT};
use crate::sse;
use crate::{GenerationStream, ModelClient};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use relay_core::{
    FunctionCall, GenerationConfig, GenerationResult, Message, RelayError, RelayResult, Role,
    StreamChunk, Tool, ToolCall, Usage,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MISTRAL_BASE_URL: &str = "https://api.mistral.ai";
const PROVIDER: &str = "mistral";

/// Client for Mistral chat models.
pub struct MistralClient {
    api_key: SecretString,
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl MistralClient {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns a configuration error if the key is empty or the HTTP client
    /// cannot be built.
    pub fn new(api_key: impl Into<String>) -> RelayResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RelayError::configuration("Mistral API key cannot be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RelayError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: SecretString::new(api_key),
            client,
            base_url: MISTRAL_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the API base URL (testing, proxies).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request_builder(&self, payload: &MistralRequest) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .header("Accept", "application/json")
            .json(payload)
    }

    fn build_payload(
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
        stream: bool,
    ) -> MistralRequest {
        let messages = messages
            .iter()
            .map(|m| MistralMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
                tool_calls: match m.role {
                    Role::Assistant => m.tool_calls.clone(),
                    _ => None,
                },
                tool_call_id: match m.role {
                    Role::Tool => m.tool_call_id.clone(),
                    _ => None,
                },
            })
            .collect();
        let tools: Vec<MistralTool> = tools
            .iter()
            .map(|t| MistralTool {
                kind: "function".to_string(),
                function: t.function.clone(),
            })
            .collect();

        MistralRequest {
            model: config.model.clone(),
            messages,
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
            tools: if tools.is_empty() { None } else { Some(tools) },
            stream,
            max_tokens: (config.max_tokens > 0).then_some(config.max_tokens),
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

#[async_trait]
impl ModelClient for MistralClient {
    async fn generate(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> RelayResult<GenerationResult> {
        let payload = Self::build_payload(messages, config, tools, false);
        debug!(model = %config.model, "sending Mistral chat completion request");

        let body = self.retry.send(self.request_builder(&payload), PROVIDER).await?;
        parse_response(&body)
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> RelayResult<GenerationStream> {
        let payload = Self::build_payload(messages, config, tools, true);
        debug!(model = %config.model, "sending Mistral streaming request");

        let response = open_stream(self.request_builder(&payload), PROVIDER).await?;
        let mut lines = sse::data_lines(response, PROVIDER);

        let stream = try_stream! {
            while let Some(line) = lines.next().await {
                let data = line?;
                let chunk: MistralStreamChunk = serde_json::from_str(&data).map_err(|e| {
                    RelayError::streaming(format!("malformed Mistral stream chunk: {e}"))
                })?;

                let Some(choice) = chunk.choices.into_iter().next() else {
                    continue;
                };
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        yield StreamChunk::Content(content);
                    }
                }
                for call in choice.delta.tool_calls.unwrap_or_default() {
                    yield StreamChunk::ToolCallDelta(ToolCall {
                        id: call.id,
                        kind: "function".to_string(),
                        function: FunctionCall {
                            name: call.function.name,
                            arguments: call.function.arguments,
                        },
                    });
                }
            }
        };

        Ok(stream.boxed())
    }
}

fn parse_response(body: &str) -> RelayResult<GenerationResult> {
    let response: MistralResponse = serde_json::from_str(body).map_err(|e| {
        RelayError::provider(PROVIDER, format!("invalid response JSON: {e}"), None, false)
    })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::provider(PROVIDER, "no choices in response", None, false))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| ToolCall {
            id: c.id,
            kind: "function".to_string(),
            function: FunctionCall {
                name: c.function.name,
                arguments: c.function.arguments,
            },
        })
        .collect();

    Ok(GenerationResult {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        usage: response.usage,
    })
}

// Mistral wire types

#[derive(Debug, Serialize)]
struct MistralRequest {
    model: String,
    messages: Vec<MistralMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<MistralTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct MistralMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct MistralTool {
    #[serde(rename = "type")]
    kind: String,
    function: relay_core::FunctionSpec,
}

#[derive(Debug, Deserialize)]
struct MistralResponse {
    choices: Vec<MistralChoice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct MistralChoice {
    message: MistralResponseMessage,
}

#[derive(Debug, Deserialize)]
struct MistralResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<MistralToolCall>>,
}

#[derive(Debug, Deserialize)]
struct MistralToolCall {
    id: String,
    function: MistralFunctionCall,
}

#[derive(Debug, Deserialize)]
struct MistralFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct MistralStreamChunk {
    #[serde(default)]
    choices: Vec<MistralStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct MistralStreamChoice {
    delta: MistralStreamDelta,
}

#[derive(Debug, Deserialize)]
struct MistralStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<MistralToolCall>>,
}

//! Anthropic provider adapter.
//!
//! Speaks the `/v1/messages` dialect. The notable translations: the system
//! prompt is hoisted out of the message list into a dedicated field, and a
//! tool-result message becomes a user-role message carrying a structured
//! `tool_result` content block.

use crate::retry::{open_stream, RetryPolicy, DEFAULT_TIMEOUT};
use crate::sse;
use crate::{GenerationStream, ModelClient};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use relay_core::{
    FunctionCall, GenerationConfig, GenerationResult, JsonSchema, Message, RelayError,
    RelayResult, Role, StreamChunk, Tool, ToolCall, Usage,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const PROVIDER: &str = "anthropic";

/// Client for Anthropic chat models (Claude family).
pub struct AnthropicClient {
    api_key: SecretString,
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl AnthropicClient {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns a configuration error if the key is empty or the HTTP client
    /// cannot be built.
    pub fn new(api_key: impl Into<String>) -> RelayResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RelayError::configuration(
                "Anthropic API key cannot be empty",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RelayError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: SecretString::new(api_key),
            client,
            base_url: ANTHROPIC_BASE_URL.to_string(),
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

    fn request_builder(&self, payload: &AnthropicRequest) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret().as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload)
    }

    fn build_payload(
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
        stream: bool,
    ) -> AnthropicRequest {
        let (system, messages) = to_anthropic_messages(messages);
        let tools: Vec<AnthropicTool> = tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.function.name.clone(),
                description: t.function.description.clone(),
                input_schema: t.function.parameters.clone(),
            })
            .collect();

        AnthropicRequest {
            model: config.model.clone(),
            messages,
            system,
            tools: if tools.is_empty() { None } else { Some(tools) },
            max_tokens: if config.max_tokens > 0 {
                config.max_tokens
            } else {
                DEFAULT_MAX_TOKENS
            },
            stream,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn generate(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> RelayResult<GenerationResult> {
        let payload = Self::build_payload(messages, config, tools, false);
        debug!(model = %config.model, "sending Anthropic messages request");

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
        debug!(model = %config.model, "sending Anthropic streaming request");

        let response = open_stream(self.request_builder(&payload), PROVIDER).await?;
        let mut lines = sse::data_lines(response, PROVIDER);

        let stream = try_stream! {
            while let Some(line) = lines.next().await {
                let data = line?;
                let event: AnthropicStreamEvent = serde_json::from_str(&data).map_err(|e| {
                    RelayError::streaming(format!("malformed Anthropic stream event: {e}"))
                })?;

                match event.kind.as_str() {
                    "content_block_delta" => {
                        if let Some(delta) = event.delta {
                            if delta.kind == "text_delta" && !delta.text.is_empty() {
                                yield StreamChunk::Content(delta.text);
                            }
                        }
                    }
                    "message_stop" => {
                        let usage = event.usage.unwrap_or_default();
                        yield StreamChunk::Usage(Usage {
                            prompt_tokens: usage.input_tokens,
                            completion_tokens: usage.output_tokens,
                            total_tokens: usage.input_tokens + usage.output_tokens,
                        });
                        return;
                    }
                    _ => {}
                }
            }
        };

        Ok(stream.boxed())
    }
}

/// Hoist the system prompt and convert the remaining messages. A tool-result
/// message is rendered as a user-role message with a `tool_result` block.
fn to_anthropic_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system = None;
    let mut converted = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::System => {
                system = Some(message.content.clone());
            }
            Role::Tool => {
                converted.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                        tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                        content: message.content.clone(),
                    }]),
                });
            }
            Role::Assistant => {
                // Assistant turns that issued tool calls are replayed as
                // tool_use blocks so the ids line up on the next turn.
                match &message.tool_calls {
                    Some(calls) if !calls.is_empty() => {
                        let mut blocks = Vec::new();
                        if !message.content.is_empty() {
                            blocks.push(AnthropicContentBlock::Text {
                                text: message.content.clone(),
                            });
                        }
                        for call in calls {
                            blocks.push(AnthropicContentBlock::ToolUse {
                                id: call.id.clone(),
                                name: call.function.name.clone(),
                                input: serde_json::from_str(&call.function.arguments)
                                    .unwrap_or(serde_json::Value::Object(Default::default())),
                            });
                        }
                        converted.push(AnthropicMessage {
                            role: "assistant".to_string(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                    _ => converted.push(AnthropicMessage {
                        role: "assistant".to_string(),
                        content: AnthropicContent::Text(message.content.clone()),
                    }),
                }
            }
            Role::User => converted.push(AnthropicMessage {
                role: "user".to_string(),
                content: AnthropicContent::Text(message.content.clone()),
            }),
        }
    }

    (system, converted)
}

fn parse_response(body: &str) -> RelayResult<GenerationResult> {
    let response: AnthropicResponse = serde_json::from_str(body).map_err(|e| {
        RelayError::provider(PROVIDER, format!("invalid response JSON: {e}"), None, false)
    })?;

    if response.content.is_empty() {
        return Err(RelayError::provider(
            PROVIDER,
            "no content in response",
            None,
            false,
        ));
    }

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            AnthropicResponseBlock::Text { text } => content.push_str(&text),
            AnthropicResponseBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id,
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name,
                        arguments: input.to_string(),
                    },
                });
            }
            AnthropicResponseBlock::Other => {}
        }
    }

    Ok(GenerationResult {
        content: content.trim().to_string(),
        tool_calls,
        usage: Usage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        },
    })
}

// Anthropic wire types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: JsonSchema,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<AnthropicStreamDelta>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamDelta {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

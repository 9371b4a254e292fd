//! OpenAI provider adapter.
//!
//! Speaks the `/v1/chat/completions` dialect. The tool role and tool-call
//! shapes of the uniform model map onto this dialect directly, so the
//! translation here is the thinnest of the four adapters.

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

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const PROVIDER: &str = "openai";

/// Client for OpenAI chat models (GPT family).
pub struct OpenAiClient {
    api_key: SecretString,
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns a configuration error if the key is empty or the HTTP client
    /// cannot be built.
    pub fn new(api_key: impl Into<String>) -> RelayResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RelayError::configuration("OpenAI API key cannot be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RelayError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: SecretString::new(api_key),
            client,
            base_url: OPENAI_BASE_URL.to_string(),
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

    fn request_builder(&self, payload: &OpenAiRequest) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(payload)
    }

    fn build_payload(
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
        stream: bool,
    ) -> OpenAiRequest {
        let messages = messages.iter().map(to_openai_message).collect();
        let tools: Vec<OpenAiTool> = tools
            .iter()
            .map(|t| OpenAiTool {
                kind: "function".to_string(),
                function: t.function.clone(),
            })
            .collect();

        OpenAiRequest {
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
impl ModelClient for OpenAiClient {
    async fn generate(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> RelayResult<GenerationResult> {
        let payload = Self::build_payload(messages, config, tools, false);
        debug!(model = %config.model, "sending OpenAI chat completion request");

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
        debug!(model = %config.model, "sending OpenAI streaming request");

        let response = open_stream(self.request_builder(&payload), PROVIDER).await?;
        let mut lines = sse::data_lines(response, PROVIDER);

        let stream = try_stream! {
            while let Some(line) = lines.next().await {
                let data = line?;
                let chunk: OpenAiStreamChunk = serde_json::from_str(&data).map_err(|e| {
                    RelayError::streaming(format!("malformed OpenAI stream chunk: {e}"))
                })?;

                let Some(choice) = chunk.choices.into_iter().next() else {
                    continue;
                };
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        yield StreamChunk::Content(content);
                    }
                }
                for delta in choice.delta.tool_calls.unwrap_or_default() {
                    yield StreamChunk::ToolCallDelta(ToolCall {
                        id: delta.id.unwrap_or_default(),
                        kind: "function".to_string(),
                        function: FunctionCall {
                            name: delta.function.name.unwrap_or_default(),
                            arguments: delta.function.arguments.unwrap_or_default(),
                        },
                    });
                }
            }
        };

        Ok(stream.boxed())
    }
}

fn to_openai_message(message: &Message) -> OpenAiMessage {
    match message.role {
        Role::Tool => OpenAiMessage {
            role: message.role.to_string(),
            content: message.content.clone(),
            tool_calls: None,
            tool_call_id: message.tool_call_id.clone(),
        },
        Role::Assistant => OpenAiMessage {
            role: message.role.to_string(),
            content: message.content.clone(),
            tool_calls: message.tool_calls.clone(),
            tool_call_id: None,
        },
        _ => OpenAiMessage {
            role: message.role.to_string(),
            content: message.content.clone(),
            tool_calls: None,
            tool_call_id: None,
        },
    }
}

fn parse_response(body: &str) -> RelayResult<GenerationResult> {
    let response: OpenAiResponse = serde_json::from_str(body).map_err(|e| {
        RelayError::provider(PROVIDER, format!("invalid response JSON: {e}"), None, false)
    })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::provider(PROVIDER, "no choices in response", None, false))?;

    Ok(GenerationResult {
        content: choice.message.content.unwrap_or_default(),
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
        usage: response.usage,
    })
}

// OpenAI wire types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
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
struct OpenAiMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: relay_core::FunctionSpec,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: OpenAiFunctionDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::JsonSchema;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri())
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
            })
    }

    fn calculator_tool() -> Tool {
        Tool::function(
            "calculate",
            "Performs a basic arithmetic calculation.",
            JsonSchema::object(
                [
                    ("operand1", JsonSchema::number("The first number.")),
                    ("operator", JsonSchema::string("One of '+', '-', '*', '/'.")),
                    ("operand2", JsonSchema::number("The second number.")),
                ],
                &["operand1", "operator", "operand2"],
            ),
        )
    }

    #[test]
    fn payload_maps_tool_role_and_choice() {
        let messages = vec![
            Message::system("be brief"),
            Message::user("what is 12 * 7?"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::function("call_1", "calculate", "{}")],
            ),
            Message::tool("call_1", "The result is 84."),
        ];
        let config = GenerationConfig::for_model("gpt-4o");
        let payload =
            OpenAiClient::build_payload(&messages, &config, &[calculator_tool()], false);

        assert_eq!(payload.tool_choice, Some("auto"));
        assert_eq!(payload.messages[2].tool_calls.as_ref().unwrap()[0].id, "call_1");
        assert_eq!(payload.messages[3].role, "tool");
        assert_eq!(payload.messages[3].tool_call_id.as_deref(), Some("call_1"));
        // Zero max_tokens means provider default, so the field is omitted.
        assert!(payload.max_tokens.is_none());
    }

    #[test]
    fn parse_response_extracts_tool_calls() {
        let body = r#"{
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{"id": "call_9", "type": "function",
                    "function": {"name": "calculate", "arguments": "{\"operand1\":12,\"operator\":\"*\",\"operand2\":7}"}}]
            }}],
            "usage": {"prompt_tokens": 30, "completion_tokens": 12, "total_tokens": 42}
        }"#;
        let result = parse_response(body).unwrap();
        assert!(result.content.is_empty());
        assert_eq!(result.tool_calls[0].function.name, "calculate");
        assert_eq!(result.usage.total_tokens, 42);
    }

    #[tokio::test]
    async fn generate_sends_auth_and_parses_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Goroutines and channels."}}],
                "usage": {"prompt_tokens": 8, "completion_tokens": 5, "total_tokens": 13}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client
            .generate(
                &[Message::user("How does Go handle concurrency?")],
                &GenerationConfig::for_model("gpt-4o"),
                &[],
            )
            .await
            .unwrap();

        assert_eq!(result.content, "Goroutines and channels.");
        assert_eq!(result.usage.prompt_tokens, 8);
    }

    #[tokio::test]
    async fn generate_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client
            .generate(
                &[Message::user("hi")],
                &GenerationConfig::for_model("gpt-4o"),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(result.content, "ok");
    }

    #[tokio::test]
    async fn generate_stream_yields_deltas_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .append_header("Content-Type", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let stream = client
            .generate_stream(
                &[Message::user("hi")],
                &GenerationConfig::for_model("gpt-4o"),
                &[],
            )
            .await
            .unwrap();

        let chunks: Vec<_> = stream.collect::<Vec<_>>().await;
        let text: String = chunks
            .into_iter()
            .map(Result::unwrap)
            .filter_map(|c| match c {
                StreamChunk::Content(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello");
    }
}

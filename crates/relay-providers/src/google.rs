//! Google AI (Gemini) provider adapter.
//!
//! Speaks the `generativelanguage.googleapis.com` dialect: `contents` with
//! user/model roles, a dedicated `systemInstruction` field, and
//! `functionDeclarations` for tools. Gemini sometimes omits the completion
//! token count; when that happens and the response has content, this adapter
//! performs a secondary `:countTokens` call and recomputes the totals.

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
use tracing::{debug, warn};

const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;
const PROVIDER: &str = "google";

/// Prefix used when synthesizing tool-call ids. Gemini function calls carry no
/// id of their own; embedding the function name lets the next turn recover it
/// for the `functionResponse` block.
const TOOL_CALL_ID_PREFIX: &str = "gemini-toolcall-";

/// Client for Google Gemini models.
pub struct GoogleClient {
    api_key: SecretString,
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GoogleClient {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns a configuration error if the key is empty or the HTTP client
    /// cannot be built.
    pub fn new(api_key: impl Into<String>) -> RelayResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RelayError::configuration("Gemini API key cannot be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RelayError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: SecretString::new(api_key),
            client,
            base_url: GOOGLE_BASE_URL.to_string(),
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

    fn endpoint_url(&self, model: &str, action: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.base_url,
            model,
            action,
            self.api_key.expose_secret()
        )
    }

    fn build_payload(
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> GoogleRequest {
        let mut contents = Vec::new();
        let mut system_instruction = None;

        for message in messages {
            match message.role {
                Role::System => {
                    system_instruction = Some(GoogleContent {
                        role: None,
                        parts: vec![GooglePart::Text {
                            text: message.content.clone(),
                        }],
                    });
                }
                Role::User => contents.push(GoogleContent {
                    role: Some("user".to_string()),
                    parts: vec![GooglePart::Text {
                        text: message.content.clone(),
                    }],
                }),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !message.content.is_empty() {
                        parts.push(GooglePart::Text {
                            text: message.content.clone(),
                        });
                    }
                    for call in message.tool_calls.iter().flatten() {
                        parts.push(GooglePart::FunctionCall {
                            function_call: GoogleFunctionCall {
                                name: call.function.name.clone(),
                                args: serde_json::from_str(&call.function.arguments)
                                    .unwrap_or(serde_json::Value::Object(Default::default())),
                            },
                        });
                    }
                    if parts.is_empty() {
                        parts.push(GooglePart::Text {
                            text: String::new(),
                        });
                    }
                    contents.push(GoogleContent {
                        role: Some("model".to_string()),
                        parts,
                    });
                }
                Role::Tool => {
                    // Recover the function name from the synthesized id so the
                    // result can be framed as a functionResponse.
                    let name = message
                        .tool_call_id
                        .as_deref()
                        .and_then(|id| id.strip_prefix(TOOL_CALL_ID_PREFIX))
                        .unwrap_or_default()
                        .to_string();
                    if name.is_empty() {
                        contents.push(GoogleContent {
                            role: Some("user".to_string()),
                            parts: vec![GooglePart::Text {
                                text: message.content.clone(),
                            }],
                        });
                    } else {
                        contents.push(GoogleContent {
                            role: Some("function".to_string()),
                            parts: vec![GooglePart::FunctionResponse {
                                function_response: GoogleFunctionResponse {
                                    name,
                                    response: serde_json::json!({
                                        "content": message.content,
                                    }),
                                },
                            }],
                        });
                    }
                }
            }
        }

        let tools: Vec<GoogleTool> = if tools.is_empty() {
            Vec::new()
        } else {
            vec![GoogleTool {
                function_declarations: tools
                    .iter()
                    .map(|t| GoogleFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        };

        GoogleRequest {
            contents,
            system_instruction,
            generation_config: Some(GoogleGenerationConfig {
                temperature: config.temperature,
                top_p: config.top_p,
                max_output_tokens: if config.max_tokens > 0 {
                    config.max_tokens
                } else {
                    DEFAULT_MAX_OUTPUT_TOKENS
                },
            }),
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }

    /// Count tokens for `text` via the `:countTokens` endpoint.
    async fn count_tokens(&self, model: &str, text: &str) -> RelayResult<u32> {
        let url = self.endpoint_url(model, "countTokens");
        let payload = serde_json::json!({
            "contents": [{"parts": [{"text": text}]}],
        });
        let body = self
            .retry
            .send(self.client.post(&url).json(&payload), PROVIDER)
            .await?;
        let response: GoogleCountTokensResponse = serde_json::from_str(&body).map_err(|e| {
            RelayError::provider(PROVIDER, format!("invalid countTokens JSON: {e}"), None, false)
        })?;
        Ok(response.total_tokens)
    }
}

#[async_trait]
impl ModelClient for GoogleClient {
    async fn generate(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> RelayResult<GenerationResult> {
        let payload = Self::build_payload(messages, config, tools);
        let url = self.endpoint_url(&config.model, "generateContent");
        debug!(model = %config.model, "sending Gemini generateContent request");

        let body = self
            .retry
            .send(self.client.post(&url).json(&payload), PROVIDER)
            .await?;
        let mut result = parse_response(&body)?;

        // Gemini occasionally omits the completion count. Recompute it with a
        // secondary token-count call so the usage invariant holds.
        if result.usage.completion_tokens == 0 && !result.content.is_empty() {
            match self.count_tokens(&config.model, &result.content).await {
                Ok(count) => {
                    result.usage.completion_tokens = count;
                    result.usage.total_tokens = result.usage.prompt_tokens + count;
                }
                Err(e) => {
                    warn!(error = %e, "failed to recount Gemini completion tokens");
                }
            }
        }

        Ok(result)
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[Tool],
    ) -> RelayResult<GenerationStream> {
        let payload = Self::build_payload(messages, config, tools);
        let url = format!(
            "{}&alt=sse",
            self.endpoint_url(&config.model, "streamGenerateContent")
        );
        debug!(model = %config.model, "sending Gemini streaming request");

        let response = open_stream(self.client.post(&url).json(&payload), PROVIDER).await?;
        let mut lines = sse::data_lines(response, PROVIDER);

        let stream = try_stream! {
            while let Some(line) = lines.next().await {
                let data = line?;
                let chunk: GoogleResponse = serde_json::from_str(&data).map_err(|e| {
                    RelayError::streaming(format!("malformed Gemini stream chunk: {e}"))
                })?;

                let finished = chunk
                    .candidates
                    .first()
                    .is_some_and(|c| c.finish_reason.is_some());

                if let Some(candidate) = chunk.candidates.into_iter().next() {
                    for part in candidate.content.parts {
                        match part {
                            GooglePart::Text { text } if !text.is_empty() => {
                                yield StreamChunk::Content(text);
                            }
                            GooglePart::FunctionCall { function_call } => {
                                yield StreamChunk::ToolCallDelta(ToolCall {
                                    id: format!("{TOOL_CALL_ID_PREFIX}{}", function_call.name),
                                    kind: "function".to_string(),
                                    function: FunctionCall {
                                        name: function_call.name,
                                        arguments: function_call.args.to_string(),
                                    },
                                });
                            }
                            _ => {}
                        }
                    }
                }

                if finished {
                    if let Some(meta) = chunk.usage_metadata {
                        yield StreamChunk::Usage(usage_from_metadata(&meta));
                    }
                    return;
                }
            }
        };

        Ok(stream.boxed())
    }
}

fn usage_from_metadata(meta: &GoogleUsageMetadata) -> Usage {
    let completion = meta.candidates_token_count.unwrap_or(0);
    Usage {
        prompt_tokens: meta.prompt_token_count,
        completion_tokens: completion,
        total_tokens: meta
            .total_token_count
            .unwrap_or(meta.prompt_token_count + completion),
    }
}

fn parse_response(body: &str) -> RelayResult<GenerationResult> {
    let response: GoogleResponse = serde_json::from_str(body).map_err(|e| {
        RelayError::provider(PROVIDER, format!("invalid response JSON: {e}"), None, false)
    })?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::provider(PROVIDER, "no candidates in response", None, false))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for part in candidate.content.parts {
        match part {
            GooglePart::Text { text } => content.push_str(&text),
            GooglePart::FunctionCall { function_call } => {
                tool_calls.push(ToolCall {
                    id: format!("{TOOL_CALL_ID_PREFIX}{}", function_call.name),
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name: function_call.name,
                        arguments: function_call.args.to_string(),
                    },
                });
            }
            GooglePart::FunctionResponse { .. } => {}
        }
    }

    let usage = response
        .usage_metadata
        .as_ref()
        .map(usage_from_metadata)
        .unwrap_or_default();

    Ok(GenerationResult {
        content: content.trim().to_string(),
        tool_calls,
        usage,
    })
}

// Google wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest {
    contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GoogleGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GoogleTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GooglePart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GoogleFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GoogleFunctionResponse,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTool {
    function_declarations: Vec<GoogleFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GoogleFunctionDeclaration {
    name: String,
    description: String,
    parameters: JsonSchema,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    usage_metadata: Option<GoogleUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    content: GoogleContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: Option<u32>,
    #[serde(default)]
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCountTokensResponse {
    #[serde(default)]
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> GoogleClient {
        GoogleClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri())
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
            })
    }

    #[test]
    fn payload_maps_roles_and_system_instruction() {
        let messages = vec![
            Message::system("be terse"),
            Message::user("hello"),
            Message::assistant("hi"),
        ];
        let payload =
            GoogleClient::build_payload(&messages, &GenerationConfig::for_model("gemini-1.5-pro"), &[]);

        assert!(payload.system_instruction.is_some());
        assert_eq!(payload.contents.len(), 2);
        assert_eq!(payload.contents[0].role.as_deref(), Some("user"));
        assert_eq!(payload.contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn tool_result_becomes_function_response() {
        let messages = vec![Message::tool("gemini-toolcall-calculate", "The result is 84.")];
        let payload =
            GoogleClient::build_payload(&messages, &GenerationConfig::for_model("gemini-1.5-pro"), &[]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["contents"][0]["role"], "function");
        assert_eq!(
            json["contents"][0]["parts"][0]["functionResponse"]["name"],
            "calculate"
        );
    }

    #[test]
    fn parse_response_synthesizes_tool_call_ids() {
        let body = r#"{
            "candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "calculate", "args": {"operand1": 12, "operator": "*", "operand2": 7}}}
            ]}}],
            "usageMetadata": {"promptTokenCount": 15, "candidatesTokenCount": 8, "totalTokenCount": 23}
        }"#;
        let result = parse_response(body).unwrap();
        assert_eq!(result.tool_calls[0].id, "gemini-toolcall-calculate");
        assert_eq!(result.tool_calls[0].function.name, "calculate");
        assert_eq!(result.usage.total_tokens, 23);
    }

    #[tokio::test]
    async fn missing_completion_count_triggers_count_tokens_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "New Delhi."}]}}],
                "usageMetadata": {"promptTokenCount": 9}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:countTokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalTokens": 4
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client
            .generate(
                &[Message::user("What is the capital of India?")],
                &GenerationConfig::for_model("gemini-1.5-pro"),
                &[],
            )
            .await
            .unwrap();

        assert_eq!(result.content, "New Delhi.");
        assert_eq!(result.usage.completion_tokens, 4);
        assert_eq!(result.usage.total_tokens, 13);
    }

    #[tokio::test]
    async fn provided_usage_skips_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "ok"}]}}],
                "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 1, "totalTokenCount": 4}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:countTokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalTokens": 999
            })))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client
            .generate(
                &[Message::user("hi")],
                &GenerationConfig::for_model("gemini-1.5-pro"),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(result.usage.total_tokens, 4);
    }
}

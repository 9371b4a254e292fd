//! Current-weather tool backed by the text-only wttr.in endpoint.

use crate::{ToolExecutor, TOOL_USER_AGENT};
use async_trait::async_trait;
use relay_core::{JsonSchema, RelayError, RelayResult, Tool};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://wttr.in";

/// Fetches current weather for a location.
pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherTool {
    /// Create the tool with its own timeout-configured HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the weather endpoint (testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct WeatherArgs {
    #[serde(default)]
    location: String,
}

#[async_trait]
impl ToolExecutor for WeatherTool {
    fn definition(&self) -> Tool {
        Tool::function(
            "getCurrentWeather",
            "Get the current weather for a specific location",
            JsonSchema::object(
                [(
                    "location",
                    JsonSchema::string(
                        "The city and state, e.g., San Francisco, CA or Kharagpur, India",
                    ),
                )],
                &["location"],
            ),
        )
    }

    async fn execute(&self, arguments: &str) -> RelayResult<String> {
        let args: WeatherArgs = serde_json::from_str(arguments)
            .map_err(|e| RelayError::tool(format!("invalid arguments for weather tool: {e}")))?;
        if args.location.is_empty() {
            return Ok("Error: Location cannot be empty.".to_string());
        }

        let url = format!(
            "{}/{}?format=3",
            self.base_url,
            args.location.replace(' ', "+")
        );
        let response = self
            .client
            .get(&url)
            .header("User-Agent", TOOL_USER_AGENT)
            .send()
            .await
            .map_err(|e| RelayError::tool(format!("failed to call weather API: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::tool(format!(
                "weather API returned non-200 status: {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::tool(format!("failed to read weather API response: {e}")))?;

        if body.contains("Unknown location") {
            return Ok(format!(
                "I couldn't find the weather for '{}'. Please try another location.",
                args.location
            ));
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn location_spaces_become_plus_signs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/San+Francisco,+CA"))
            .and(query_param("format", "3"))
            .and(header("User-Agent", TOOL_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("San Francisco, CA: ⛅️ +14°C"))
            .expect(1)
            .mount(&server)
            .await;

        let tool = WeatherTool::new().with_base_url(server.uri());
        let result = tool
            .execute(r#"{"location":"San Francisco, CA"}"#)
            .await
            .unwrap();
        assert!(result.contains("+14°C"));
    }

    #[tokio::test]
    async fn unknown_location_maps_to_friendly_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Unknown location; please try ~Atlantis"))
            .mount(&server)
            .await;

        let tool = WeatherTool::new().with_base_url(server.uri());
        let result = tool.execute(r#"{"location":"Atlantis"}"#).await.unwrap();
        assert_eq!(
            result,
            "I couldn't find the weather for 'Atlantis'. Please try another location."
        );
    }

    #[tokio::test]
    async fn empty_location_is_a_model_visible_error() {
        let tool = WeatherTool::new();
        let result = tool.execute(r#"{"location":""}"#).await.unwrap();
        assert_eq!(result, "Error: Location cannot be empty.");
    }

    #[tokio::test]
    async fn non_200_is_a_real_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tool = WeatherTool::new().with_base_url(server.uri());
        assert!(tool.execute(r#"{"location":"Paris"}"#).await.is_err());
    }
}

//! Headline tool backed by the NewsAPI top-headlines endpoint.

use crate::{ToolExecutor, TOOL_USER_AGENT};
use async_trait::async_trait;
use relay_core::{JsonSchema, RelayError, RelayResult, Tool};
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://newsapi.org";

/// How many headlines to request and render.
const PAGE_SIZE: u32 = 5;

/// Fetches the latest news headlines. Requires a NewsAPI key.
pub struct NewsTool {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl NewsTool {
    /// Create the tool.
    ///
    /// # Errors
    /// Returns a configuration error when the key is empty.
    pub fn new(api_key: impl Into<String>) -> RelayResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RelayError::configuration("NewsAPI key cannot be empty"));
        }
        Ok(Self {
            api_key,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the news endpoint (testing).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct NewsArgs {
    #[serde(default)]
    query: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    country: String,
}

#[derive(Deserialize)]
struct NewsResponse {
    #[serde(default, rename = "totalResults")]
    total_results: u64,
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

#[derive(Deserialize)]
struct NewsArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: NewsSource,
}

#[derive(Default, Deserialize)]
struct NewsSource {
    #[serde(default)]
    name: String,
}

#[async_trait]
impl ToolExecutor for NewsTool {
    fn definition(&self) -> Tool {
        Tool::function(
            "getNewsHeadlines",
            "Fetches the latest news headlines about a specific topic, category, or from a particular country.",
            JsonSchema::object(
                [
                    (
                        "query",
                        JsonSchema::string(
                            "The topic or keyword to search for in the news, e.g., 'artificial intelligence' or 'latest space missions'.",
                        ),
                    ),
                    (
                        "category",
                        JsonSchema::string(
                            "The category of news. Must be one of: business, entertainment, general, health, science, sports, technology.",
                        ),
                    ),
                    (
                        "country",
                        JsonSchema::string(
                            "The 2-letter ISO 3166-1 code of the country to get headlines from, e.g., 'us' for USA, 'in' for India, or 'gb' for Great Britain.",
                        ),
                    ),
                ],
                &[],
            ),
        )
    }

    async fn execute(&self, arguments: &str) -> RelayResult<String> {
        let args: NewsArgs = serde_json::from_str(arguments)
            .map_err(|e| RelayError::tool(format!("invalid arguments for news tool: {e}")))?;

        let mut params: Vec<(&str, String)> = Vec::new();
        if !args.query.is_empty() {
            params.push(("q", args.query));
        }
        if !args.category.is_empty() {
            params.push(("category", args.category));
        }
        if !args.country.is_empty() {
            params.push(("country", args.country));
        }
        params.push(("pageSize", PAGE_SIZE.to_string()));

        let response = self
            .client
            .get(format!("{}/v2/top-headlines", self.base_url))
            .query(&params)
            .header("X-Api-Key", &self.api_key)
            .header("User-Agent", TOOL_USER_AGENT)
            .send()
            .await
            .map_err(|e| RelayError::tool(format!("failed to call news API: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(format!(
                "Error: News API returned a non-200 status code: {}. Please check the parameters or API key.",
                status.as_u16()
            ));
        }

        let body: NewsResponse = response
            .json()
            .await
            .map_err(|e| RelayError::tool(format!("failed to parse news API response: {e}")))?;

        if body.total_results == 0 {
            return Ok("No news articles found for the given criteria.".to_string());
        }

        let mut out = format!("Here are the top {} headlines:\n", body.articles.len());
        for (i, article) in body.articles.iter().enumerate() {
            let _ = writeln!(out, "{}. {} (Source: {})", i + 1, article.title, article.source.name);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_body() -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "totalResults": 2,
            "articles": [
                {"title": "Rust 2.0 announced", "source": {"name": "TechDaily"}},
                {"title": "Gateway ships", "source": {"name": "Wire"}}
            ]
        })
    }

    #[tokio::test]
    async fn formats_numbered_headlines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/top-headlines"))
            .and(query_param("q", "rust"))
            .and(query_param("pageSize", "5"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_body()))
            .expect(1)
            .mount(&server)
            .await;

        let tool = NewsTool::new("test-key").unwrap().with_base_url(server.uri());
        let result = tool.execute(r#"{"query":"rust"}"#).await.unwrap();
        assert!(result.starts_with("Here are the top 2 headlines:"));
        assert!(result.contains("1. Rust 2.0 announced (Source: TechDaily)"));
        assert!(result.contains("2. Gateway ships (Source: Wire)"));
    }

    #[tokio::test]
    async fn zero_results_reads_as_no_articles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "totalResults": 0, "articles": []
            })))
            .mount(&server)
            .await;

        let tool = NewsTool::new("test-key").unwrap().with_base_url(server.uri());
        let result = tool.execute("{}").await.unwrap();
        assert_eq!(result, "No news articles found for the given criteria.");
    }

    #[tokio::test]
    async fn upstream_error_status_is_model_visible() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tool = NewsTool::new("test-key").unwrap().with_base_url(server.uri());
        let result = tool.execute("{}").await.unwrap();
        assert!(result.starts_with("Error: News API returned a non-200 status code: 401"));
    }

    #[tokio::test]
    async fn empty_key_is_rejected_at_construction() {
        assert!(NewsTool::new("").is_err());
    }

    #[tokio::test]
    async fn all_parameters_are_optional() {
        let def = NewsTool::new("k").unwrap().definition();
        assert!(def.function.parameters.required.is_empty());
        assert_eq!(def.function.parameters.properties.len(), 3);
    }
}

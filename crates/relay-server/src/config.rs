//! Environment configuration for the gateway.
//!
//! Model ids drive env-variable derivation: '-' and '.' are replaced with '_'
//! and the result upper-cased, so `gpt-4o` reads `GPT_4O_COST_INPUT`,
//! `GPT_4O_COST_OUTPUT` and `GPT_4O_BUDGET_USD`. Costs are configured in USD
//! per million tokens and divided down to per-token at load.

use relay_core::{RelayError, RelayResult};
use relay_store::{CostTable, TokenCosts};
use std::collections::HashMap;
use std::env;
use tracing::{info, warn};

/// Path of the router configuration file.
pub const ROUTER_CONFIG_PATH: &str = "config.yaml";

/// Everything the gateway reads from the environment.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Models the gateway may route to, in configuration order.
    pub enabled_models: Vec<String>,
    /// Provider API key per enabled model.
    pub api_keys: HashMap<String, String>,
    /// Per-token USD costs per model.
    pub model_costs: CostTable,
    /// Monthly USD budget per model; absent means unlimited.
    pub model_budgets: HashMap<String, f64>,
    /// Redis address (host:port or URL).
    pub redis_addr: String,
    /// NewsAPI key; the news tool is skipped without it.
    pub news_api_key: String,
    /// OpenAI key used by the embedding collaborator.
    pub embedding_api_key: String,
    /// Vector index host.
    pub vector_index_host: String,
    /// Vector index API key.
    pub vector_index_api_key: String,
    /// Port to listen on.
    pub port: u16,
}

/// Derive the env-variable prefix for a model id.
#[must_use]
pub fn env_prefix(model_id: &str) -> String {
    model_id.replace(['-', '.'], "_").to_uppercase()
}

/// Split an `ENABLED_MODELS` value into model ids.
#[must_use]
pub fn parse_enabled_models(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Provider key env variable for a model family, by id prefix.
fn provider_key_var(model_id: &str) -> Option<&'static str> {
    if model_id.starts_with("gpt") {
        Some("OPENAI_API_KEY")
    } else if model_id.starts_with("claude") {
        Some("ANTHROPIC_API_KEY")
    } else if model_id.starts_with("gemini") {
        Some("GEMINI_API_KEY")
    } else if model_id.starts_with("mistral") {
        Some("MISTRAL_API_KEY")
    } else {
        None
    }
}

impl AppConfig {
    /// Load the configuration from the process environment.
    ///
    /// # Errors
    /// Returns a configuration error when a required variable is missing.
    pub fn from_env() -> RelayResult<Self> {
        let enabled_raw = env::var("ENABLED_MODELS")
            .map_err(|_| RelayError::configuration("ENABLED_MODELS environment variable is not set"))?;
        let enabled_models = parse_enabled_models(&enabled_raw);
        if enabled_models.is_empty() {
            return Err(RelayError::configuration("ENABLED_MODELS is empty"));
        }

        let redis_addr = env::var("REDIS_ADDR")
            .map_err(|_| RelayError::configuration("REDIS_ADDR environment variable is not set"))?;

        let mut config = Self {
            enabled_models,
            redis_addr,
            news_api_key: env::var("NEWS_API_KEY").unwrap_or_default(),
            embedding_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            vector_index_host: env::var("PINECONE_INDEX_HOST").unwrap_or_default(),
            vector_index_api_key: env::var("PINECONE_API_KEY").unwrap_or_default(),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            ..Self::default()
        };

        for model_id in &config.enabled_models {
            match provider_key_var(model_id).map(env::var) {
                Some(Ok(key)) if !key.is_empty() => {
                    config.api_keys.insert(model_id.clone(), key);
                }
                Some(_) => warn!(model = %model_id, "provider API key not set, model will be skipped"),
                None => warn!(model = %model_id, "unknown model provider"),
            }

            let prefix = env_prefix(model_id);
            let cost_input = env::var(format!("{prefix}_COST_INPUT"))
                .ok()
                .and_then(|v| v.parse::<f64>().ok());
            let cost_output = env::var(format!("{prefix}_COST_OUTPUT"))
                .ok()
                .and_then(|v| v.parse::<f64>().ok());
            if let (Some(input), Some(output)) = (cost_input, cost_output) {
                config.model_costs.insert(
                    model_id.clone(),
                    TokenCosts {
                        input: input / 1_000_000.0,
                        output: output / 1_000_000.0,
                    },
                );
                info!(
                    model = %model_id,
                    input_per_mtok = input,
                    output_per_mtok = output,
                    "loaded cost configuration"
                );
            }

            if let Some(budget) = env::var(format!("{prefix}_BUDGET_USD"))
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
            {
                config.model_budgets.insert(model_id.clone(), budget);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_prefix_normalizes_dashes_and_dots() {
        assert_eq!(env_prefix("gpt-4o"), "GPT_4O");
        assert_eq!(env_prefix("claude-3-opus-20240229"), "CLAUDE_3_OPUS_20240229");
        assert_eq!(env_prefix("gemini-1.5-pro"), "GEMINI_1_5_PRO");
    }

    #[test]
    fn enabled_models_split_trims_blanks() {
        assert_eq!(
            parse_enabled_models("gpt-4o, claude-3-opus-20240229 ,,gemini-1.5-pro"),
            vec!["gpt-4o", "claude-3-opus-20240229", "gemini-1.5-pro"]
        );
        assert!(parse_enabled_models("").is_empty());
    }

    #[test]
    fn provider_key_var_matches_families() {
        assert_eq!(provider_key_var("gpt-4o"), Some("OPENAI_API_KEY"));
        assert_eq!(provider_key_var("claude-3-haiku"), Some("ANTHROPIC_API_KEY"));
        assert_eq!(provider_key_var("gemini-1.5-flash"), Some("GEMINI_API_KEY"));
        assert_eq!(provider_key_var("mistral-small"), Some("MISTRAL_API_KEY"));
        assert_eq!(provider_key_var("llama-3"), None);
    }
}

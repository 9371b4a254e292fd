//! Static router configuration, loaded once from YAML at startup.

use relay_core::{RelayError, RelayResult};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Pre-filter thresholds applied before any scoring.
#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// Minimum top-match score at which retrieved context is used.
    pub relevance_threshold: f64,
    /// Error rate above which a model is excluded, once it has enough
    /// requests behind it.
    pub max_error_rate: f64,
    /// Request count a model must exceed before its error rate is trusted.
    pub min_request_count: i64,
    /// Maximum age of the last health check; staler profiles are excluded.
    #[serde(deserialize_with = "deserialize_duration")]
    pub health_check_staleness: Duration,
}

/// Static quality metadata for one model.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ModelScores {
    /// General quality on a 0–10 scale.
    pub quality_score: f64,
    /// Coding-task quality on a 0–10 scale.
    pub coding_score: f64,
}

/// Scoring weights for one named strategy.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RoutingStrategy {
    /// Score quality with the coding score instead of the general one.
    #[serde(default)]
    pub use_coding_score: bool,
    /// Weight of the quality factor.
    pub quality_weight: f64,
    /// Weight of the cost factor.
    pub cost_weight: f64,
    /// Weight of the latency factor.
    pub latency_weight: f64,
}

/// The complete router configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Pre-filter thresholds.
    pub pre_check_thresholds: Thresholds,
    /// Per-model quality metadata. Models missing here are never contenders.
    pub models: HashMap<String, ModelScores>,
    /// Named strategies; must include "default".
    pub strategies: HashMap<String, RoutingStrategy>,
}

impl RouterConfig {
    /// Parse a configuration from YAML text.
    ///
    /// # Errors
    /// Returns a configuration error for unparseable YAML.
    pub fn from_yaml(text: &str) -> RelayResult<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| RelayError::configuration(format!("invalid router config: {e}")))
    }

    /// Load a configuration from a YAML file.
    ///
    /// # Errors
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RelayError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }
}

/// Parse durations written as `300s`, `10m`, `2h`, or bare seconds.
fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => value.split_at(split),
        None => (value, "s"),
    };
    let number: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{value}'"))?;
    let seconds = match unit {
        "s" | "" => number,
        "m" => number * 60,
        "h" => number * 3600,
        _ => return Err(format!("invalid duration unit in '{value}'")),
    };
    Ok(Duration::from_secs(seconds))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
pre_check_thresholds:
  relevance_threshold: 0.75
  max_error_rate: 0.5
  min_request_count: 10
  health_check_staleness: 10m

models:
  gpt-4o:
    quality_score: 9.0
    coding_score: 9.5
  mistral-large-latest:
    quality_score: 8.0
    coding_score: 7.5

strategies:
  default:
    quality_weight: 0.5
    cost_weight: 0.3
    latency_weight: 0.2
  max_quality:
    quality_weight: 1.0
    cost_weight: 0.0
    latency_weight: 0.0
  best-for-coding:
    use_coding_score: true
    quality_weight: 0.8
    cost_weight: 0.1
    latency_weight: 0.1
"#;

    #[test]
    fn sample_config_parses() {
        let config = RouterConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.pre_check_thresholds.health_check_staleness,
            Duration::from_secs(600)
        );
        assert_eq!(config.models["gpt-4o"].coding_score, 9.5);
        assert!(config.strategies["best-for-coding"].use_coding_score);
        assert!(!config.strategies["default"].use_coding_score);
    }

    #[test]
    fn durations_accept_seconds_minutes_hours() {
        assert_eq!(parse_duration("300s").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("10 parsecs").is_err());
    }

    #[test]
    fn malformed_yaml_is_a_configuration_error() {
        let err = RouterConfig::from_yaml("strategies: [oops").unwrap_err();
        assert!(err.to_string().contains("invalid router config"));
    }
}
